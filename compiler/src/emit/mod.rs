//! Artifact emission
//!
//! Each plan is rendered into its own artifact, tagged with the logical
//! module prefix configured for it. The container artifact also embeds the
//! configuration it was compiled with, which the runtime serves as the
//! builtin configuration service. A manifest recording the SHA-256 of every
//! artifact is written last; the runtime refuses artifacts that disagree
//! with it.

mod writer;

pub use writer::ArtifactBatch;

use crate::compiler::CompiledPlans;
use crate::config::{ArtifactConfig, CompilerConfig};
use crate::container::ContainerPlan;
use crate::error::CompileError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// Version of the artifact layout
pub const ARTIFACT_FORMAT: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Container,
    Router,
    Middleware,
    Listeners,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Container,
        ArtifactKind::Router,
        ArtifactKind::Middleware,
        ArtifactKind::Listeners,
    ];

    pub fn settings(self, config: &CompilerConfig) -> &ArtifactConfig {
        match self {
            ArtifactKind::Container => &config.output.container,
            ArtifactKind::Router => &config.output.router,
            ArtifactKind::Middleware => &config.output.middleware,
            ArtifactKind::Listeners => &config.output.listeners,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArtifactKind::Container => "container",
            ArtifactKind::Router => "router",
            ArtifactKind::Middleware => "middleware",
            ArtifactKind::Listeners => "listeners",
        })
    }
}

/// One emitted artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact<T> {
    pub format: u32,
    pub module: String,
    pub content: T,
}

impl<T> Artifact<T> {
    pub fn new(module: impl Into<String>, content: T) -> Self {
        Self {
            format: ARTIFACT_FORMAT,
            module: module.into(),
            content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerContent {
    pub plan: ContainerPlan,
    pub config: CompilerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub kind: ArtifactKind,
    pub file: String,
    pub module: String,
    pub sha256: String,
}

/// Hashes of the artifacts of the last compile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub format: u32,
    pub artifacts: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn entry(&self, kind: ArtifactKind) -> Option<&ManifestEntry> {
        self.artifacts.iter().find(|a| a.kind == kind)
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Renders compiled plans into loadable artifacts
pub trait Emitter {
    /// Encode one artifact
    fn render<T: Serialize>(&self, artifact: &Artifact<T>) -> Result<Vec<u8>, CompileError>;

    /// Write every artifact, then the manifest
    ///
    /// Everything is rendered before the first file is touched.
    fn emit(
        &self,
        plans: &CompiledPlans,
        config: &CompilerConfig,
    ) -> Result<Manifest, CompileError> {
        let mut rendered = Vec::with_capacity(ArtifactKind::ALL.len());
        for kind in ArtifactKind::ALL {
            let module = &kind.settings(config).module;
            let bytes = match kind {
                ArtifactKind::Container => self.render(&Artifact::new(
                    module,
                    ContainerContent {
                        plan: plans.container.clone(),
                        config: config.clone(),
                    },
                ))?,
                ArtifactKind::Router => self.render(&Artifact::new(module, &plans.router))?,
                ArtifactKind::Middleware => {
                    self.render(&Artifact::new(module, &plans.middleware))?
                }
                ArtifactKind::Listeners => self.render(&Artifact::new(module, &plans.listeners))?,
            };
            rendered.push((kind, bytes));
        }

        invalidate(config)?;
        let dir = config.output_dir();
        let mut manifest = Manifest {
            format: ARTIFACT_FORMAT,
            artifacts: Vec::new(),
        };
        let mut batch = ArtifactBatch::new(&dir)?;
        for (kind, bytes) in &rendered {
            let settings = kind.settings(config);
            batch.stage(&settings.file, bytes)?;
            manifest.artifacts.push(ManifestEntry {
                kind: *kind,
                file: settings.file.clone(),
                module: settings.module.clone(),
                sha256: sha256_hex(bytes),
            });
        }
        let rendered_manifest = self.render(&Artifact::new("manifest", &manifest))?;
        batch.publish(&config.output.manifest, &rendered_manifest)?;

        tracing::info!(
            dir = %dir.display(),
            artifacts = manifest.artifacts.len(),
            "Artifacts emitted"
        );
        Ok(manifest)
    }
}

/// JSON artifacts
#[derive(Debug, Clone, Copy)]
pub struct JsonEmitter {
    pub pretty: bool,
}

impl Default for JsonEmitter {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl Emitter for JsonEmitter {
    fn render<T: Serialize>(&self, artifact: &Artifact<T>) -> Result<Vec<u8>, CompileError> {
        let mut bytes = if self.pretty {
            serde_json::to_vec_pretty(artifact)?
        } else {
            serde_json::to_vec(artifact)?
        };
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// Remove the manifest of the last compile
///
/// Without a manifest the runtime refuses to boot, so artifacts left over
/// from an earlier compile are never served after a failed one.
pub fn invalidate(config: &CompilerConfig) -> Result<(), CompileError> {
    let path = config.output_dir().join(&config.output.manifest);
    match std::fs::remove_file(&path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Manifest removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CompileError::io(path, e)),
    }
}

/// Paths of every artifact plus the manifest, relative to the output dir
pub fn artifact_files(config: &CompilerConfig) -> Vec<PathBuf> {
    ArtifactKind::ALL
        .iter()
        .map(|kind| PathBuf::from(&kind.settings(config).file))
        .chain(std::iter::once(PathBuf::from(&config.output.manifest)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::MiddlewareEntry;
    use std::fs;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> CompilerConfig {
        let mut config = CompilerConfig::default();
        config.project_root = dir.path().to_path_buf();
        config
    }

    #[test]
    fn test_manifest_hashes_written_artifacts() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let mut plans = CompiledPlans::default();
        plans.middleware.entries.push(MiddlewareEntry {
            class: "Auth".into(),
            priority: 1,
        });

        let manifest = JsonEmitter::default().emit(&plans, &config).unwrap();

        assert_eq!(manifest.artifacts.len(), 4);
        for entry in &manifest.artifacts {
            let bytes = fs::read(config.output_dir().join(&entry.file)).unwrap();
            assert_eq!(sha256_hex(&bytes), entry.sha256);
        }
        for file in artifact_files(&config) {
            assert!(config.output_dir().join(file).exists());
        }
    }

    #[test]
    fn test_artifacts_carry_module_prefix() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.output.router.module = "shop::routes".into();

        JsonEmitter::default()
            .emit(&CompiledPlans::default(), &config)
            .unwrap();

        let raw = fs::read_to_string(config.output_dir().join("router.json")).unwrap();
        let artifact: Artifact<serde_json::Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(artifact.module, "shop::routes");
        assert_eq!(artifact.format, ARTIFACT_FORMAT);
    }

    #[test]
    fn test_no_temporary_files_remain() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        JsonEmitter { pretty: false }
            .emit(&CompiledPlans::default(), &config)
            .unwrap();

        let leftovers: Vec<_> = fs::read_dir(config.output_dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_invalidate_removes_only_the_manifest() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        invalidate(&config).unwrap();

        JsonEmitter::default()
            .emit(&CompiledPlans::default(), &config)
            .unwrap();
        invalidate(&config).unwrap();

        let out = config.output_dir();
        assert!(!out.join(&config.output.manifest).exists());
        assert!(out.join(&config.output.router.file).exists());
    }
}
