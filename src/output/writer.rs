//! Low-level writing logic for output routing

use super::config::OutputMode;
use std::io::{self, Write};

/// Write human-facing text; stdout in human mode, stderr in JSON mode
pub fn write_output(mode: OutputMode, args: std::fmt::Arguments) -> io::Result<()> {
    match mode {
        OutputMode::Human => {
            let mut stdout = io::stdout().lock();
            stdout.write_fmt(args)?;
            stdout.flush()
        }
        OutputMode::Json => {
            let mut stderr = io::stderr().lock();
            stderr.write_fmt(args)?;
            stderr.flush()
        }
    }
}

/// Same as [`write_output`] with a trailing newline
pub fn writeln_output(mode: OutputMode, args: std::fmt::Arguments) -> io::Result<()> {
    write_output(mode, format_args!("{args}\n"))
}

/// Write the machine-readable document; always stdout
pub fn write_document(args: std::fmt::Arguments) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{args}")?;
    stdout.flush()
}
