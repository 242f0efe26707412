//! Platform-specific adapters for revealing a folder in the system file browser.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

#[cfg(target_os = "macos")]
mod mac;
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
mod unix;
#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "macos")]
use mac::MacFolderRevealer as PlatformImpl;
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
use unix::UnixFolderRevealer as PlatformImpl;
#[cfg(target_os = "windows")]
use windows::WindowsFolderRevealer as PlatformImpl;

static ADAPTER: PlatformImpl = PlatformImpl::new();

pub trait FolderRevealer: Sync + Send {
    /// Open `dir` in the platform's file browser. Returns once the command
    /// has been launched; the window itself is not awaited.
    fn reveal(&self, dir: &Path) -> Result<()>;
}

/// Spawn `command` without waiting for it. Only a failure to launch is an
/// error; the child is reaped on a background thread.
pub(crate) fn launch(mut command: Command) -> Result<()> {
    let program = command.get_program().to_string_lossy().into_owned();
    let mut child = command
        .spawn()
        .with_context(|| format!("failed to launch {program}"))?;
    std::thread::spawn(move || match child.wait() {
        Ok(status) if !status.success() => {
            tracing::debug!("{} exited with {}", program, status);
        }
        Ok(_) => {}
        Err(err) => tracing::debug!("waiting for {} failed: {}", program, err),
    });
    Ok(())
}

/// Revealer backed by the adapter compiled for the current platform.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRevealer;

impl FolderRevealer for SystemRevealer {
    fn reveal(&self, dir: &Path) -> Result<()> {
        ADAPTER.reveal(dir)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn launch_returns_before_the_child_exits() {
        let mut command = Command::new("sleep");
        command.arg("2");
        let started = Instant::now();
        launch(command).expect("sleep launches");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn missing_program_is_a_launch_error() {
        let err = launch(Command::new("proxyctl-no-such-program")).unwrap_err();
        assert!(err.to_string().contains("proxyctl-no-such-program"));
    }
}
