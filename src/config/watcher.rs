//! Configuration file watcher for hot reload.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::validation::Validate;

/// Monitors a configuration file and publishes every valid new version.
pub struct ConfigWatcher<T> {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<T>,
    _config: PhantomData<fn() -> T>,
}

impl<T> ConfigWatcher<T>
where
    T: DeserializeOwned + Validate + Send + 'static,
{
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<T>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
                _config: PhantomData,
            },
            update_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        // A truncate-then-write shows up as an empty file first.
                        if std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(false) {
                            tracing::debug!(path = ?path, "Config file empty, waiting for content");
                            return;
                        }
                        tracing::info!(path = ?path, "Config file change detected, reloading");
                        match load_config::<T>(&path) {
                            Ok(new_config) => {
                                let _ = tx.send(new_config);
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RtmpLbConfig;
    use std::fs;

    const RELOAD_WAIT: Duration = Duration::from_secs(5);

    /// Receive updates until one satisfies `pred`, or time out.
    async fn wait_for<F>(rx: &mut mpsc::UnboundedReceiver<RtmpLbConfig>, pred: F) -> Option<RtmpLbConfig>
    where
        F: Fn(&RtmpLbConfig) -> bool,
    {
        tokio::time::timeout(RELOAD_WAIT, async {
            while let Some(config) = rx.recv().await {
                if pred(&config) {
                    return Some(config);
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    #[tokio::test]
    async fn publishes_valid_rewrites_only() {
        let path = std::env::temp_dir().join(format!("streamlb-{}-watched.toml", std::process::id()));
        fs::write(&path, "[backend]\nretry_max = 3\n").unwrap();

        let (watcher, mut rx) = ConfigWatcher::<RtmpLbConfig>::new(&path);
        let _handle = watcher.run().unwrap();

        fs::write(&path, "[backend]\nretry_max = 7\n").unwrap();
        let config = wait_for(&mut rx, |c| c.backend.retry_max == 7).await;
        assert!(config.is_some(), "rewrite was never published");

        // Let any trailing events of the first rewrite drain.
        tokio::time::sleep(Duration::from_millis(300)).await;
        while rx.try_recv().is_ok() {}

        fs::write(&path, "api = \"127.0.0.1:9100\"\n").unwrap();
        let published = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;
        assert!(published.is_err(), "invalid config was published");

        fs::remove_file(path).unwrap_or_default();
    }
}
