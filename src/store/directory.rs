//! Directory-backed store and file-backed connection monitor
//!
//! Each installed profile is a `<name>.json` live-state document in the
//! store directory. The connection monitor reads a JSON array of connection
//! names written by whatever tracks tunnel state on the host.

use super::{ConnectionMonitor, ProfileStore};
use crate::decode::{DocumentDecoder, LiveProfile, ProfileDecoder};
use crate::error::{ApplyError, VpnsyncError, VpnsyncResult};
use crate::validation::{sanitize_error_message, validate_profile_name};
use async_trait::async_trait;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

const PROFILE_EXTENSION: &str = "json";

pub struct DirectoryProfileStore {
    dir: PathBuf,
}

impl DirectoryProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn profile_path(&self, name: &str) -> Result<PathBuf, ApplyError> {
        validate_profile_name(name).map_err(|e| ApplyError::PlatformRejected(e.to_string()))?;
        Ok(self.dir.join(format!("{}.{}", name, PROFILE_EXTENSION)))
    }
}

/// Map a filesystem error onto the apply taxonomy
///
/// Permission problems will not fix themselves; everything else is retried.
fn io_to_apply(context: &str, error: io::Error) -> ApplyError {
    let message = sanitize_error_message(&format!("{}: {}", context, error));
    match error.kind() {
        io::ErrorKind::PermissionDenied => ApplyError::PlatformRejected(message),
        _ => ApplyError::Transient(message),
    }
}

#[async_trait]
impl ProfileStore for DirectoryProfileStore {
    async fn create_or_update(&self, name: &str, document: &str) -> Result<(), ApplyError> {
        let path = self.profile_path(name)?;
        let profile = DocumentDecoder
            .decode(document)
            .map_err(|e| ApplyError::PlatformRejected(e.to_string()))?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_to_apply("Failed to create store directory", e))?;

        // Write then rename so a reader never sees a half-written profile
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, LiveProfile::encode(&profile))
            .await
            .map_err(|e| io_to_apply("Failed to write profile", e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_to_apply("Failed to install profile", e))?;

        info!("Installed profile '{}' at {:?}", name, path);
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), ApplyError> {
        let path = self.profile_path(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Removed profile '{}'", name);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Profile '{}' already absent", name);
                Ok(())
            }
            Err(e) => Err(io_to_apply("Failed to remove profile", e)),
        }
    }

    async fn list(&self) -> Result<Vec<(String, String)>, ApplyError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_to_apply("Failed to read store directory", e)),
        };

        let mut profiles = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_to_apply("Failed to read store directory", e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(PROFILE_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                warn!("Skipping non UTF-8 profile file {:?}", path);
                continue;
            };
            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| io_to_apply("Failed to read profile", e))?;
            profiles.push((name.to_string(), content));
        }

        profiles.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(profiles)
    }
}

pub struct FileConnectionMonitor {
    path: PathBuf,
}

impl FileConnectionMonitor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConnectionMonitor for FileConnectionMonitor {
    async fn list_active_connection_names(&self) -> VpnsyncResult<HashSet<String>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            // No state file means nothing is connected
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => return Err(VpnsyncError::Io(e)),
        };

        let names: Vec<String> = serde_json::from_str(&content)?;
        Ok(names.into_iter().collect())
    }
}
