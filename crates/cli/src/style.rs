//! Shared styling utilities for console output.

use console::Style;

/// Green checkmark.
pub fn ok_mark() -> String {
    Style::new().green().apply_to("✓").to_string()
}

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    format!("{} {}", ok_mark(), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold, white).
pub fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}

/// Create a dim-styled string.
pub fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

/// Branch label (blue).
pub fn branch(name: &str) -> String {
    Style::new().blue().apply_to(name).to_string()
}
