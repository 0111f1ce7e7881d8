pub mod platform;
pub mod process;

pub use platform::{is_binary_available, Platform};
pub use process::{CommandRunner, CommandSpec, RunOutput, SystemCommandRunner};

use serde::Serializer;
use std::time::Duration;

/// Serialize a duration as fractional seconds
pub fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}
