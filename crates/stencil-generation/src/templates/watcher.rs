//! Template directory watching for hot reload

use std::path::{Path, PathBuf};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::{error::Result, templates::loader::TemplateLoader};

/// A template file changed on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateChangeEvent {
    /// Created or modified; should be reloaded
    Modified(PathBuf),
    /// Removed; the last loaded version stays active
    Removed(PathBuf),
}

/// Watches a template directory and forwards template file changes
pub struct TemplateWatcher {
    watcher: RecommendedWatcher,
    root: PathBuf,
}

impl std::fmt::Debug for TemplateWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateWatcher")
            .field("root", &self.root)
            .finish()
    }
}

impl TemplateWatcher {
    /// Start watching `dir` recursively
    pub fn watch(dir: &Path) -> Result<(Self, mpsc::UnboundedReceiver<TemplateChangeEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    for path in event
                        .paths
                        .iter()
                        .filter(|p| TemplateLoader::is_template_file(p))
                    {
                        let change = match event.kind {
                            EventKind::Create(_) | EventKind::Modify(_) => {
                                TemplateChangeEvent::Modified(path.clone())
                            }
                            EventKind::Remove(_) => TemplateChangeEvent::Removed(path.clone()),
                            _ => continue,
                        };
                        let _ = tx.send(change);
                    }
                }
                Err(e) => {
                    tracing::error!("Template watch error: {}", e);
                }
            },
            notify::Config::default(),
        )?;
        watcher.watch(dir, RecursiveMode::Recursive)?;
        tracing::info!("Watching templates in {}", dir.display());

        Ok((
            Self {
                watcher,
                root: dir.to_path_buf(),
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop watching
    pub fn stop(mut self) -> Result<()> {
        self.watcher.unwatch(&self.root)?;
        tracing::info!("Stopped watching {}", self.root.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_watch_reports_template_changes() {
        let dir = TempDir::new().unwrap();
        let (watcher, mut rx) = TemplateWatcher::watch(dir.path()).unwrap();

        let path = dir.path().join("new.yaml");
        std::fs::write(&path, "id: new\ntype: page\nframework: jest\n").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            TemplateChangeEvent::Modified(changed) => {
                assert_eq!(changed.file_name(), path.file_name());
            }
            other => panic!("unexpected event: {other:?}"),
        }
        watcher.stop().unwrap();
    }
}
