//! Console output helpers
//!
//! Symbols are ASCII-safe on Windows.

use indicatif::{ProgressBar, ProgressStyle};

/// Checkmark symbol
#[cfg(windows)]
pub const CHECK: &str = "[OK]";
#[cfg(not(windows))]
pub const CHECK: &str = "\u{2713}"; // ✓

/// Cross/error symbol
#[cfg(windows)]
pub const CROSS: &str = "[X]";
#[cfg(not(windows))]
pub const CROSS: &str = "\u{2717}"; // ✗

/// Warning symbol
#[cfg(windows)]
pub const WARN: &str = "[!]";
#[cfg(not(windows))]
pub const WARN: &str = "!";

/// Byte-count progress bar for a transfer of `len` bytes
pub fn transfer_bar(len: u64, message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(message.into());
    pb
}

/// Row counter for batch jobs of unknown length
pub fn row_spinner(message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {pos} rows {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.into());
    pb
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Truncate a string from the left for display, keeping the tail
pub fn truncate_left(s: &str, max_len: usize) -> String {
    let count = s.chars().count();
    if count <= max_len {
        return s.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let tail: String = s.chars().skip(count - keep).collect();
    format!("...{}", tail)
}
