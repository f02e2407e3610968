//! Live configuration manager.
//!
//! Holds the current config as an atomically swappable snapshot and fans
//! out replacement notifications to subscribers. Updates validate first,
//! then persist to the original path, then publish; a failed update never
//! touches live state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;

use arc_swap::ArcSwap;
use tokio::sync::mpsc;

use crate::config::loader::{load_config, save_config, ConfigError};
use crate::config::schema::{apply_defaults, Config};
use crate::config::validation::validate_config;

/// Capacity of each subscriber channel. Delivery is non-blocking; a
/// subscriber that has not drained the previous notification loses the
/// new one.
const WATCHER_BUFFER: usize = 1;

pub struct Manager {
    path: PathBuf,
    current: ArcSwap<Config>,
    watchers: Mutex<Vec<mpsc::Sender<Arc<Config>>>>,
}

impl Manager {
    /// Load the config from `path` and build a manager around it.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = load_config(&path)?;
        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(Self {
            path,
            current: ArcSwap::from_pointee(config),
            watchers: Mutex::new(Vec::new()),
        })
    }

    /// Current config snapshot.
    pub fn current(&self) -> Arc<Config> {
        self.current.load_full()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Validate, persist and publish a replacement config.
    pub fn update(&self, mut config: Config) -> Result<(), ConfigError> {
        apply_defaults(&mut config);
        validate_config(&config).map_err(ConfigError::Validation)?;

        save_config(&self.path, &config)?;

        let config = Arc::new(config);
        self.current.store(config.clone());
        self.notify(config);

        tracing::info!(path = %self.path.display(), "Configuration updated");
        Ok(())
    }

    /// Subscribe to replacement notifications.
    pub fn subscribe(&self) -> mpsc::Receiver<Arc<Config>> {
        let (tx, rx) = mpsc::channel(WATCHER_BUFFER);
        self.watchers.lock().unwrap().push(tx);
        rx
    }

    /// Verify that the TLS material referenced by the config exists on
    /// disk. The actual certificate reload happens in the listener layer.
    pub fn reload_ssl(&self) -> Result<(), SslReloadError> {
        let config = self.current.load();
        if !config.ssl.enabled {
            return Err(SslReloadError::Disabled);
        }
        if !Path::new(&config.ssl.cert_file).exists() {
            return Err(SslReloadError::MissingCert(config.ssl.cert_file.clone()));
        }
        if !Path::new(&config.ssl.key_file).exists() {
            return Err(SslReloadError::MissingKey(config.ssl.key_file.clone()));
        }
        Ok(())
    }

    fn notify(&self, config: Arc<Config>) {
        let mut watchers = self.watchers.lock().unwrap();
        watchers.retain(|tx| match tx.try_send(config.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!("Config watcher lagging, notification dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SslReloadError {
    #[error("SSL is not enabled")]
    Disabled,

    #[error("SSL cert file not found: {0}")]
    MissingCert(String),

    #[error("SSL key file not found: {0}")]
    MissingKey(String),
}
