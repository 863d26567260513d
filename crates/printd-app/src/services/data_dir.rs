// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-aware configuration directory resolution.

use std::path::PathBuf;

use printd_core::config::CONFIG_FILE;

/// Directory holding `settings.json`, created if needed.
pub fn config_dir() -> PathBuf {
    let dir = platform_dir();
    if let Err(e) = std::fs::create_dir_all(&dir) {
        tracing::warn!(path = %dir.display(), error = %e, "cannot create config directory");
    }
    dir
}

/// Default location of the settings file.
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

#[cfg(target_os = "macos")]
fn platform_dir() -> PathBuf {
    home()
        .join("Library")
        .join("Application Support")
        .join("PrintService")
}

#[cfg(windows)]
fn platform_dir() -> PathBuf {
    match std::env::var("APPDATA") {
        Ok(appdata) => PathBuf::from(appdata).join("PrintService"),
        Err(_) => home().join("PrintService"),
    }
}

#[cfg(not(any(target_os = "macos", windows)))]
fn platform_dir() -> PathBuf {
    match std::env::var("XDG_CONFIG_HOME") {
        Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg).join("printservice"),
        _ => home().join(".printservice"),
    }
}

fn home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        // Last resort
        .unwrap_or_else(|_| std::env::temp_dir())
}
