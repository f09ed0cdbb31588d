use std::{
    fs,
    io::{self, BufWriter, Write as _},
    path::{self, Component, Path, PathBuf},
};

use crate::{extractor::TestTarget, Error, Result};

/// The directory under the workspace that holds the target file.
pub const TARGET_DIR: &str = "test-target";

/// Materializes test targets into `<workspace>/test-target/<file name>`.
#[derive(Debug, Clone)]
pub struct TestTargetWriter {
    dir: PathBuf,
}

impl TestTargetWriter {
    pub fn new(workspace: &Path) -> Self {
        Self::in_dir(workspace.join(TARGET_DIR))
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Recreate the target directory and write one target per line.
    ///
    /// Anything left in the directory by an earlier run is deleted first. The
    /// file is written even when `targets` is empty.
    pub fn write(&self, file_name: &str, targets: &[TestTarget]) -> Result<PathBuf> {
        check_file_name(file_name)?;

        match fs::remove_dir_all(&self.dir) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => return Err(error.into()),
            _ => {}
        }
        fs::create_dir_all(&self.dir)?;

        let path = self.dir.join(file_name);
        let mut writer = BufWriter::new(fs::File::create(&path)?);
        for target in targets {
            writeln!(writer, "{target}")?;
        }
        writer.flush()?;

        tracing::info!(path = %path.display(), targets = targets.len(), "Wrote test targets");
        Ok(path)
    }
}

fn check_file_name(file_name: &str) -> Result<()> {
    let mut components = Path::new(file_name).components();
    match (components.next(), components.next()) {
        // `components` drops a trailing separator, which would name a directory.
        (Some(Component::Normal(_)), None) if !file_name.ends_with(path::is_separator) => Ok(()),
        _ => Err(Error::InvalidTargetFileName(file_name.to_string())),
    }
}
