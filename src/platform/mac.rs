use super::{launch, FolderRevealer};
use anyhow::Result;
use std::path::Path;
use std::process::Command;

pub struct MacFolderRevealer;

impl MacFolderRevealer {
    pub const fn new() -> Self {
        Self
    }
}

impl FolderRevealer for MacFolderRevealer {
    fn reveal(&self, dir: &Path) -> Result<()> {
        let mut command = Command::new("open");
        command.arg(".").current_dir(dir);
        launch(command)
    }
}
