//! Snapshot store for the active configuration.
//!
//! # Responsibilities
//! - Own the current immutable snapshot behind a writer lock
//! - Hand out cheap read-only references (`Arc<Config>`)
//! - Swap the snapshot wholesale on successful reload
//! - Notify subscribers with the new snapshot
//!
//! # Design Decisions
//! - Readers clone the `Arc` under a brief read lock and never observe
//!   a partially applied reload
//! - A reload that fails to parse or validate leaves the previous
//!   snapshot in place

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use tokio::task::JoinHandle;

use crate::config::loader::load_config;
use crate::config::schema::Config;
use crate::config::watcher;
use crate::config::ConfigError;
use crate::lifecycle::Shutdown;

type ReloadFn = Box<dyn Fn(Arc<Config>) + Send + Sync>;

/// Configuration manager: load, watch, and swap snapshots.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

pub(crate) struct ManagerInner {
    path: PathBuf,
    current: RwLock<Arc<Config>>,
    subscribers: Mutex<Vec<ReloadFn>>,
    shutdown: Shutdown,
    watch_task: Mutex<Option<JoinHandle<()>>>,
}

impl Manager {
    /// Create a manager and load the initial snapshot from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = Arc::new(load_config(&path)?);
        Ok(Self {
            inner: Arc::new(ManagerInner {
                path,
                current: RwLock::new(config),
                subscribers: Mutex::new(Vec::new()),
                shutdown: Shutdown::new(),
                watch_task: Mutex::new(None),
            }),
        })
    }

    /// Create a manager around an in-memory snapshot, without a backing
    /// file. Used when the configuration is assembled programmatically.
    pub fn from_config(config: Config) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                path: PathBuf::new(),
                current: RwLock::new(Arc::new(config)),
                subscribers: Mutex::new(Vec::new()),
                shutdown: Shutdown::new(),
                watch_task: Mutex::new(None),
            }),
        }
    }

    /// Current snapshot.
    pub fn get(&self) -> Arc<Config> {
        self.inner
            .current
            .read()
            .expect("config lock poisoned")
            .clone()
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Register a callback invoked with each successfully reloaded
    /// snapshot. Subscribers never see an invalid document.
    pub fn subscribe<F>(&self, f: F)
    where
        F: Fn(Arc<Config>) + Send + Sync + 'static,
    {
        self.inner
            .subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .push(Box::new(f));
    }

    /// Re-read the backing file and publish the new snapshot.
    ///
    /// On error the previous snapshot stays current.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let config = Arc::new(load_config(&self.inner.path)?);
        *self.inner.current.write().expect("config lock poisoned") = config.clone();

        let subscribers = self
            .inner
            .subscribers
            .lock()
            .expect("subscriber lock poisoned");
        for f in subscribers.iter() {
            f(config.clone());
        }
        Ok(())
    }

    /// Start watching the backing file for writes.
    pub fn watch(&self) -> Result<(), ConfigError> {
        let handle = watcher::spawn(self.clone(), self.inner.shutdown.subscribe())?;
        *self
            .inner
            .watch_task
            .lock()
            .expect("watch task lock poisoned") = Some(handle);
        Ok(())
    }

    /// Stop the watcher, if running, and wait for it to exit.
    pub async fn stop(&self) {
        self.inner.shutdown.trigger();
        let handle = self
            .inner
            .watch_task
            .lock()
            .expect("watch task lock poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
