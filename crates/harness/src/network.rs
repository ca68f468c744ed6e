use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use advance_client::MemoryView;
use advance_core::{ManualTime, ShowId, SyncConfig, UserRef};
use advance_engine::{EngineError, SyncEngine};
use advance_storage::SqliteStorage;
use tempfile::TempDir;

use crate::{LoopbackTransport, TestPeer};

/// Wall-clock start for every network, so timestamps in assertions are stable.
pub const START_MS: u64 = 1_700_000_000_000;

/// One sync server and the clock shared by it and every peer.
pub struct TestNetwork {
    engine: Arc<Mutex<SyncEngine>>,
    time: ManualTime,
    config: SyncConfig,
    db: Option<(TempDir, String)>,
}

impl TestNetwork {
    pub fn new() -> Result<Self, EngineError> {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Result<Self, EngineError> {
        let time = ManualTime::new(START_MS);
        let engine = SyncEngine::with_time_source(
            SqliteStorage::open_in_memory()?,
            config.clone(),
            Box::new(time.clone()),
        )?;
        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            time,
            config,
            db: None,
        })
    }

    /// A network whose server keeps its database in a temporary file, so
    /// it can be restarted with [`TestNetwork::restart_server`].
    pub fn on_disk() -> Result<Self, Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("advance.db");
        let path = path.to_str().ok_or("temp path is not UTF-8")?.to_string();
        let config = SyncConfig::default();
        let time = ManualTime::new(START_MS);
        let engine = SyncEngine::with_time_source(
            SqliteStorage::open(&path)?,
            config.clone(),
            Box::new(time.clone()),
        )?;
        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            time,
            config,
            db: Some((dir, path)),
        })
    }

    /// Replace the server with a fresh engine over the same database.
    /// Peers created earlier keep talking to the old engine.
    pub fn restart_server(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let (_, path) = self.db.as_ref().ok_or("network is not on disk")?;
        let engine = SyncEngine::with_time_source(
            SqliteStorage::open(path)?,
            self.config.clone(),
            Box::new(self.time.clone()),
        )?;
        self.engine = Arc::new(Mutex::new(engine));
        Ok(())
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn engine(&self) -> MutexGuard<'_, SyncEngine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn now(&self) -> u64 {
        self.time.get()
    }

    pub fn set_now(&self, ms: u64) {
        self.time.set(ms);
    }

    pub fn advance(&self, ms: u64) -> u64 {
        self.time.advance(ms)
    }

    /// Open `show` in a new browser tab for `user`.
    pub fn open_page(&self, show_id: ShowId, user: UserRef, tab: &str, view: MemoryView) -> TestPeer {
        let transport = LoopbackTransport::new(Arc::clone(&self.engine), user.clone());
        TestPeer::new(&self.config, show_id, user, tab, transport, view, self.time.clone())
    }
}
