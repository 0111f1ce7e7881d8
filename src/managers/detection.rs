//! Host probing for installed package managers

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::registry::{ManagerDescriptor, Probe, REGISTRY};
use super::ManagerKind;
use crate::utils::{is_binary_available, CommandRunner, Platform};

/// Which managers are present on the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetectionMap {
    managers: BTreeMap<ManagerKind, bool>,
}

impl DetectionMap {
    /// A map with every manager absent
    pub fn new() -> Self {
        Self {
            managers: ManagerKind::ALL.iter().map(|kind| (*kind, false)).collect(),
        }
    }

    /// A map with exactly the given managers present
    pub fn from_present<I: IntoIterator<Item = ManagerKind>>(present: I) -> Self {
        let mut map = Self::new();
        for kind in present {
            map.set(kind, true);
        }
        map
    }

    pub fn set(&mut self, kind: ManagerKind, present: bool) {
        self.managers.insert(kind, present);
    }

    pub fn is_present(&self, kind: ManagerKind) -> bool {
        self.managers.get(&kind).copied().unwrap_or(false)
    }

    /// Present managers in registry order
    pub fn present(&self) -> Vec<ManagerKind> {
        self.managers
            .iter()
            .filter(|(_, present)| **present)
            .map(|(kind, _)| *kind)
            .collect()
    }

    pub fn any_present(&self) -> bool {
        self.managers.values().any(|present| *present)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ManagerKind, bool)> + '_ {
        self.managers.iter().map(|(kind, present)| (*kind, *present))
    }
}

/// Source of detection results
#[async_trait]
pub trait Detect: Send + Sync {
    async fn detect(&self) -> DetectionMap;
}

/// A fixed map detects as itself
#[async_trait]
impl Detect for DetectionMap {
    async fn detect(&self) -> DetectionMap {
        self.clone()
    }
}

/// Probes the real host on every call
pub struct SystemDetector {
    runner: Arc<dyn CommandRunner>,
    platform: Platform,
    probe_timeout: Duration,
}

impl SystemDetector {
    pub fn new(runner: Arc<dyn CommandRunner>, probe_timeout: Duration) -> Self {
        Self {
            runner,
            platform: Platform::current(),
            probe_timeout,
        }
    }

    async fn probe(&self, descriptor: &ManagerDescriptor) -> bool {
        if !descriptor.supports_platform(self.platform) {
            return false;
        }

        match descriptor.probe {
            Probe::Binary(binaries) => {
                let lookup = tokio::task::spawn_blocking(move || {
                    binaries.iter().any(|binary| is_binary_available(binary))
                });
                match tokio::time::timeout(self.probe_timeout, lookup).await {
                    Ok(Ok(found)) => found,
                    Ok(Err(e)) => {
                        debug!("Probe for {} panicked: {}", descriptor.kind, e);
                        false
                    }
                    Err(_) => {
                        debug!("Probe for {} timed out", descriptor.kind);
                        false
                    }
                }
            }
            probe @ Probe::Command(_) => match probe.command_spec(self.platform) {
                Some(spec) => self.runner.run(&spec, self.probe_timeout, 0).await.ok,
                None => false,
            },
        }
    }
}

#[async_trait]
impl Detect for SystemDetector {
    async fn detect(&self) -> DetectionMap {
        let probes = REGISTRY.iter().map(|descriptor| async move {
            (descriptor.kind, self.probe(descriptor).await)
        });

        let mut map = DetectionMap::new();
        for (kind, present) in join_all(probes).await {
            map.set(kind, present);
        }

        debug!(
            "Detected managers: {}",
            map.present()
                .iter()
                .map(ManagerKind::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );
        map
    }
}

/// Presence of one manager as reported to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerStatus {
    Installed,
    NotInstalled,
    Unsupported(Platform),
}

impl fmt::Display for ManagerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerStatus::Installed => f.write_str("Installed"),
            ManagerStatus::NotInstalled => f.write_str("Not installed"),
            ManagerStatus::Unsupported(platform) => write!(f, "Unsupported on {platform}"),
        }
    }
}

/// Status of every registered manager on a platform
pub fn list_managers_status(
    detection: &DetectionMap,
    platform: Platform,
) -> BTreeMap<ManagerKind, ManagerStatus> {
    REGISTRY
        .iter()
        .map(|descriptor| {
            let status = if !descriptor.supports_platform(platform) {
                ManagerStatus::Unsupported(platform)
            } else if detection.is_present(descriptor.kind) {
                ManagerStatus::Installed
            } else {
                ManagerStatus::NotInstalled
            };
            (descriptor.kind, status)
        })
        .collect()
}
