use super::{launch, FolderRevealer};
use anyhow::Result;
use std::path::Path;
use std::process::Command;

pub struct UnixFolderRevealer;

impl UnixFolderRevealer {
    pub const fn new() -> Self {
        Self
    }
}

impl FolderRevealer for UnixFolderRevealer {
    fn reveal(&self, dir: &Path) -> Result<()> {
        let mut command = Command::new("xdg-open");
        command.arg(".").current_dir(dir);
        launch(command)
    }
}
