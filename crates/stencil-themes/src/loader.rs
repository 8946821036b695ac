//! Theme loading from YAML and JSON files

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    error::{Result, ThemeError},
    types::{Theme, ThemeData},
};

/// Default timeout for a single theme file read
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Loads theme records from disk with a bounded read timeout
#[derive(Debug, Clone)]
pub struct ThemeLoader {
    io_timeout: Duration,
}

impl ThemeLoader {
    /// Create a loader with the default timeout
    pub fn new() -> Self {
        Self {
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    /// Create a loader with a custom timeout
    pub fn with_timeout(io_timeout: Duration) -> Self {
        Self { io_timeout }
    }

    /// Whether a path looks like a theme file
    pub fn is_theme_file(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml") | Some("json")
        )
    }

    /// Parse a theme record from text, picking the format from `path`
    pub fn parse(path: &Path, content: &str) -> Result<Theme> {
        let data: ThemeData = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(content)?,
            _ => serde_yaml::from_str(content)?,
        };
        Theme::from_data(data)
    }

    /// Load a single theme file
    pub async fn load_from_file(&self, path: &Path) -> Result<Theme> {
        let content = tokio::time::timeout(self.io_timeout, tokio::fs::read_to_string(path))
            .await
            .map_err(|_| ThemeError::Timeout {
                path: path.to_path_buf(),
                timeout_ms: self.io_timeout.as_millis() as u64,
            })??;
        Self::parse(path, &content)
    }

    /// Load every theme file in a directory (non-recursive)
    ///
    /// Files that fail to load are logged and skipped; themes come back
    /// sorted by file name.
    pub async fn load_from_directory(&self, dir: &Path) -> Result<Vec<Theme>> {
        let scanned = tokio::time::timeout(self.io_timeout, Self::scan_directory(dir))
            .await
            .map_err(|_| ThemeError::Timeout {
                path: dir.to_path_buf(),
                timeout_ms: self.io_timeout.as_millis() as u64,
            })??;
        let Some(paths) = scanned else {
            return Ok(Vec::new());
        };

        let mut themes = Vec::with_capacity(paths.len());
        for path in paths {
            match self.load_from_file(&path).await {
                Ok(theme) => themes.push(theme),
                Err(e) => {
                    tracing::warn!("Failed to load theme {}: {}", path.display(), e);
                }
            }
        }

        tracing::info!("Loaded {} themes from {}", themes.len(), dir.display());
        Ok(themes)
    }
}

impl ThemeLoader {
    async fn scan_directory(dir: &Path) -> Result<Option<Vec<PathBuf>>> {
        match tokio::fs::metadata(dir).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let mut paths: Vec<PathBuf> = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if tokio::fs::metadata(&path).await?.is_file() && Self::is_theme_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(Some(paths))
    }
}

impl Default for ThemeLoader {
    fn default() -> Self {
        Self::new()
    }
}
