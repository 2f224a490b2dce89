use crate::{APP_AUTHOR, APP_NAME, APP_QUALIFIER};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct AppDirs {
    config_dir: PathBuf,
    cache_dir: PathBuf,
    log_dir: PathBuf,
}

impl AppDirs {
    pub fn discover() -> Result<Self, DirsError> {
        let dirs = ProjectDirs::from(APP_QUALIFIER, APP_AUTHOR, APP_NAME)
            .ok_or(DirsError::MissingProjectDirs)?;
        Ok(Self {
            config_dir: dirs.config_dir().to_path_buf(),
            cache_dir: dirs.cache_dir().to_path_buf(),
            log_dir: dirs.data_dir().join("logs"),
        })
    }

    /// Lay every directory out under a single root. Used by tests and by
    /// `--config` runs that keep all state next to the config file.
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            config_dir: root.to_path_buf(),
            cache_dir: root.join("cache"),
            log_dir: root.join("logs"),
        }
    }

    pub fn ensure_exists(&self) -> Result<(), DirsError> {
        for dir in [&self.config_dir, &self.cache_dir, &self.log_dir] {
            ensure_dir(dir)?;
        }
        Ok(())
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

/// Cached plugin sources live in `<cache>/plugins`, one file per id.
pub fn plugin_source_dir(cache_dir: &Path) -> PathBuf {
    cache_dir.join("plugins")
}

/// Private working directory handed to a plugin process.
pub fn plugin_sandbox_dir(cache_dir: &Path, id: &str) -> PathBuf {
    cache_dir.join("sandbox").join(id)
}

pub fn ensure_dir(dir: &Path) -> Result<(), DirsError> {
    std::fs::create_dir_all(dir).map_err(|source| DirsError::CreateDirectory {
        path: dir.to_path_buf(),
        source,
    })
}

#[derive(Debug, Error)]
pub enum DirsError {
    #[error("unable to determine project directories for Chorus")]
    MissingProjectDirs,
    #[error("failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
}
