use super::{launch, FolderRevealer};
use anyhow::Result;
use std::path::Path;
use std::process::Command;

pub struct WindowsFolderRevealer;

impl WindowsFolderRevealer {
    pub const fn new() -> Self {
        Self
    }
}

impl FolderRevealer for WindowsFolderRevealer {
    // explorer exits non-zero even when the window opens; launch ignores exit codes.
    fn reveal(&self, dir: &Path) -> Result<()> {
        let mut command = Command::new("explorer");
        command.arg(".").current_dir(dir);
        launch(command)
    }
}
