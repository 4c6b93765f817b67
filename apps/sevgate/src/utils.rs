//! Small helpers shared by the binary and the printers.

use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};

/// Whether ANSI colors should be emitted. Honors `NO_COLOR`.
pub fn use_colors() -> bool {
    std::env::var_os("NO_COLOR").is_none()
}

pub fn error_prefix() -> String {
    if use_colors() {
        "✖ error:".red().bold().to_string()
    } else {
        "✖ error:".to_string()
    }
}

pub fn note_prefix() -> String {
    if use_colors() {
        "▲ note:".yellow().bold().to_string()
    } else {
        "▲ note:".to_string()
    }
}

pub fn info_prefix() -> String {
    if use_colors() {
        "◆ info:".blue().bold().to_string()
    } else {
        "◆ info:".to_string()
    }
}

/// Render `path` relative to `root` when it lives under it.
pub fn display_path(path: &Path, root: &Path) -> String {
    let rel = if path.is_absolute() {
        pathdiff::diff_paths(path, root)
            .filter(|p| !p.starts_with(".."))
            .unwrap_or_else(|| path.to_path_buf())
    } else {
        PathBuf::from(path)
    };
    rel.to_string_lossy().to_string()
}
