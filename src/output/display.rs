//! Display macros for user-facing terminal output

/// Print user-facing output without newline.
/// Routes to stdout in human mode, stderr in JSON mode; silent with `--quiet`.
#[macro_export]
macro_rules! display_print {
    ($($arg:tt)*) => {{
        use $crate::output::{current_mode, is_quiet, writer::write_output};
        if !is_quiet() {
            let _ = write_output(current_mode(), format_args!($($arg)*));
        }
    }};
}

/// Print user-facing output with newline
#[macro_export]
macro_rules! display_println {
    () => {
        $crate::display_print!("\n")
    };
    ($($arg:tt)*) => {{
        use $crate::output::{current_mode, is_quiet, writer::writeln_output};
        if !is_quiet() {
            let _ = writeln_output(current_mode(), format_args!($($arg)*));
        }
    }};
}

/// Print user-facing error output with newline.
/// Always routes to stderr, even with `--quiet`.
#[macro_export]
macro_rules! display_eprintln {
    () => {
        eprintln!()
    };
    ($($arg:tt)*) => {{
        eprintln!($($arg)*);
    }};
}
