use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::scoring::{CLI_APT, CLI_DNF, CLI_GENERIC};
use super::{SearchBackend, SearchResult};
use crate::error::truncate_message;
use crate::managers::{descriptor, ManagerKind};
use crate::utils::{CommandRunner, Platform};

/// Lines of output considered by the delimiter-based parsers
const DELIMITED_LINE_LIMIT: usize = 15;
/// Lines of output considered by the whitespace parser
const GENERIC_LINE_LIMIT: usize = 10;

/// Searches through a system manager's own search subcommand
pub struct CliSearchBackend {
    manager: ManagerKind,
    runner: Arc<dyn CommandRunner>,
    platform: Platform,
    timeout: Duration,
}

impl CliSearchBackend {
    pub fn new(
        manager: ManagerKind,
        runner: Arc<dyn CommandRunner>,
        platform: Platform,
        timeout: Duration,
    ) -> Self {
        Self {
            manager,
            runner,
            platform,
            timeout,
        }
    }
}

#[async_trait]
impl SearchBackend for CliSearchBackend {
    fn manager(&self) -> ManagerKind {
        self.manager
    }

    fn timeout(&self) -> Duration {
        self.timeout + Duration::from_secs(1)
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let command = descriptor(self.manager)
            .search_command(query, self.platform)
            .ok_or_else(|| anyhow!("{} has no search command", self.manager))?;

        let output = self.runner.run(&command, self.timeout, 0).await;
        if !output.ok {
            bail!(
                "'{}' failed: {}",
                command,
                truncate_message(output.error_text(), 100)
            );
        }

        Ok(parse_cli_output(self.manager, &output.stdout))
    }
}

/// Parse a manager's search output into flat-scored results
pub fn parse_cli_output(manager: ManagerKind, stdout: &str) -> Vec<SearchResult> {
    match manager {
        ManagerKind::Apt => parse_apt(stdout),
        ManagerKind::Dnf | ManagerKind::Yum => parse_dnf(manager, stdout),
        _ => parse_generic(manager, stdout),
    }
}

/// `name - description`
fn parse_apt(stdout: &str) -> Vec<SearchResult> {
    stdout
        .lines()
        .take(DELIMITED_LINE_LIMIT)
        .filter_map(|line| line.split_once(" - "))
        .map(|(name, description)| {
            SearchResult::new(name.trim(), description.trim(), ManagerKind::Apt, CLI_APT)
        })
        .collect()
}

/// `name.arch : description`, skipping `=====` banners
fn parse_dnf(manager: ManagerKind, stdout: &str) -> Vec<SearchResult> {
    stdout
        .lines()
        .take(DELIMITED_LINE_LIMIT)
        .filter(|line| !line.trim().is_empty() && !line.starts_with('='))
        .map(|line| {
            let (name, description) = line.split_once(':').unwrap_or((line, ""));
            let name = name.trim().split('.').next().unwrap_or_default();
            SearchResult::new(name, description.trim(), manager, CLI_DNF)
        })
        .collect()
}

/// First whitespace-separated word is the name, the rest the description
fn parse_generic(manager: ManagerKind, stdout: &str) -> Vec<SearchResult> {
    stdout
        .lines()
        .take(GENERIC_LINE_LIMIT)
        .filter_map(|line| {
            let line = line.trim();
            let mut parts = line.splitn(2, char::is_whitespace);
            let name = parts.next().filter(|name| !name.is_empty())?;
            let description = parts.next().unwrap_or("").trim();
            Some(SearchResult::new(name, description, manager, CLI_GENERIC))
        })
        .collect()
}
