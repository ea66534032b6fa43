use crate::config::CompilerConfig;
use crate::emit::{sha256_hex, Artifact, ArtifactKind, ContainerContent, Manifest, ARTIFACT_FORMAT};
use crate::error::RuntimeError;
use crate::events::ListenerTable;
use crate::middleware::MiddlewarePlan;
use crate::routing::RouterPlan;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Artifacts of the last compile, checked against its manifest
#[derive(Debug, Clone)]
pub struct LoadedArtifacts {
    pub dir: PathBuf,
    pub manifest: Manifest,
    pub container: ContainerContent,
    pub router: RouterPlan,
    pub middleware: MiddlewarePlan,
    pub listeners: ListenerTable,
}

impl LoadedArtifacts {
    /// Load every artifact from the configured output directory
    ///
    /// Fails when the manifest or an artifact is missing, when an artifact's
    /// hash differs from the manifest, or when anything cannot be decoded.
    pub fn load(config: &CompilerConfig) -> Result<Self, RuntimeError> {
        let dir = config.output_dir();
        let manifest_path = dir.join(&config.output.manifest);
        let manifest: Manifest = decode(&manifest_path, &read(&manifest_path)?)?;

        let loader = Loader {
            dir: &dir,
            manifest: &manifest,
        };
        let container = loader.load(ArtifactKind::Container)?;
        let router = loader.load(ArtifactKind::Router)?;
        let middleware = loader.load(ArtifactKind::Middleware)?;
        let listeners = loader.load(ArtifactKind::Listeners)?;

        tracing::debug!(dir = %dir.display(), "Artifacts loaded");
        Ok(Self {
            dir,
            manifest,
            container,
            router,
            middleware,
            listeners,
        })
    }

    pub fn path(&self, kind: ArtifactKind) -> PathBuf {
        self.manifest
            .entry(kind)
            .map(|entry| self.dir.join(&entry.file))
            .unwrap_or_else(|| self.dir.clone())
    }
}

struct Loader<'a> {
    dir: &'a Path,
    manifest: &'a Manifest,
}

impl Loader<'_> {
    fn load<T: DeserializeOwned>(&self, kind: ArtifactKind) -> Result<T, RuntimeError> {
        let entry = self
            .manifest
            .entry(kind)
            .ok_or_else(|| RuntimeError::ArtifactMissing {
                path: self.dir.join(kind.to_string()),
            })?;
        let path = self.dir.join(&entry.file);
        let bytes = read(&path)?;
        if sha256_hex(&bytes) != entry.sha256 {
            return Err(RuntimeError::ArtifactStale { path });
        }
        decode(&path, &bytes)
    }
}

fn read(path: &Path) -> Result<Vec<u8>, RuntimeError> {
    fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => RuntimeError::ArtifactMissing {
            path: path.to_path_buf(),
        },
        _ => RuntimeError::ArtifactInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        },
    })
}

fn decode<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T, RuntimeError> {
    let invalid = |message: String| RuntimeError::ArtifactInvalid {
        path: path.to_path_buf(),
        message,
    };
    let artifact: Artifact<T> = serde_json::from_slice(bytes).map_err(|e| invalid(e.to_string()))?;
    if artifact.format != ARTIFACT_FORMAT {
        return Err(invalid(format!(
            "format {} is not supported, expected {}",
            artifact.format, ARTIFACT_FORMAT
        )));
    }
    Ok(artifact.content)
}
