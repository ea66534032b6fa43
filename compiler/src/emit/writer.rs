use crate::error::CompileError;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// The files of one compile, staged next to their final names
///
/// Nothing under the real artifact names changes until
/// [`publish`](Self::publish), which moves every staged artifact into place
/// and only then writes the manifest. The manifest is what the runtime trusts,
/// so a compile that dies half way leaves no manifest pointing at a mix of
/// old and new artifacts. Staged files that were never published are removed
/// on drop.
pub struct ArtifactBatch {
    dir: PathBuf,
    staged: Vec<Staged>,
}

struct Staged {
    staging: PathBuf,
    target: PathBuf,
}

impl ArtifactBatch {
    pub fn new(dir: &Path) -> Result<Self, CompileError> {
        fs::create_dir_all(dir).map_err(|e| CompileError::io(dir, e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            staged: Vec::new(),
        })
    }

    /// Write `bytes` under a staging name for `file`
    pub fn stage(&mut self, file: &str, bytes: &[u8]) -> Result<(), CompileError> {
        let target = self.dir.join(file);
        let staging = staging_path(&target);
        // Recorded first so a failed write is still cleaned up
        self.staged.push(Staged {
            staging: staging.clone(),
            target,
        });
        write_synced(&staging, bytes)
    }

    /// Move every staged artifact into place, then write the manifest
    pub fn publish(
        mut self,
        manifest: &str,
        bytes: &[u8],
    ) -> Result<Vec<PathBuf>, CompileError> {
        let artifacts = std::mem::take(&mut self.staged);
        let mut published = Vec::with_capacity(artifacts.len() + 1);
        let mut remaining = artifacts.into_iter();
        while let Some(staged) = remaining.next() {
            if let Err(e) = fs::rename(&staged.staging, &staged.target) {
                let target = staged.target.clone();
                self.staged.push(staged);
                self.staged.extend(remaining);
                return Err(CompileError::io(target, e));
            }
            tracing::debug!(path = %staged.target.display(), "Artifact written");
            published.push(staged.target);
        }

        self.stage(manifest, bytes)?;
        if let Some(staged) = self.staged.pop() {
            if let Err(e) = fs::rename(&staged.staging, &staged.target) {
                let target = staged.target.clone();
                self.staged.push(staged);
                return Err(CompileError::io(target, e));
            }
            published.push(staged.target);
        }
        Ok(published)
    }
}

impl Drop for ArtifactBatch {
    fn drop(&mut self) {
        for staged in &self.staged {
            let _ = fs::remove_file(&staged.staging);
        }
    }
}

fn staging_path(target: &Path) -> PathBuf {
    let name = target.file_name().unwrap_or_default().to_string_lossy();
    target.with_file_name(format!(".{}.{}.staged", name, std::process::id()))
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), CompileError> {
    let mut file = File::create(path).map_err(|e| CompileError::io(path, e))?;
    file.write_all(bytes).map_err(|e| CompileError::io(path, e))?;
    file.sync_all().map_err(|e| CompileError::io(path, e))
}
