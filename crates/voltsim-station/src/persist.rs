//! Best-effort connector-state persistence.
//!
//! The engine snapshots its arena through [`ConnectorStateStore`]; failures
//! are logged by the caller and never reach the CSMS.

use crate::connector::ConnectorState;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Store for connector arena snapshots, keyed by station id.
pub trait ConnectorStateStore: Send + Sync {
    fn save(&self, station_id: &str, connectors: &[ConnectorState]) -> Result<()>;
    fn load(&self, station_id: &str) -> Result<Option<Vec<ConnectorState>>>;
}

/// Discards snapshots; the default store.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl ConnectorStateStore for NullStore {
    fn save(&self, _station_id: &str, _connectors: &[ConnectorState]) -> Result<()> {
        Ok(())
    }

    fn load(&self, _station_id: &str) -> Result<Option<Vec<ConnectorState>>> {
        Ok(None)
    }
}

/// JSON-file store, one file per station under a base directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn path_for(&self, station_id: &str) -> PathBuf {
        self.base_dir.join(format!("{station_id}.json"))
    }
}

impl ConnectorStateStore for FileStore {
    fn save(&self, station_id: &str, connectors: &[ConnectorState]) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("creating {}", self.base_dir.display()))?;
        let path = self.path_for(station_id);
        let json = serde_json::to_vec_pretty(connectors)?;
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))
    }

    fn load(&self, station_id: &str) -> Result<Option<Vec<ConnectorState>>> {
        let path = self.path_for(station_id);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()))
            }
        };
        let connectors = serde_json::from_slice(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(connectors))
    }
}
