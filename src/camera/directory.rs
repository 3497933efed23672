//! Camera directory boundary
//!
//! Storage of camera records belongs to the application; the relay engine
//! only needs these two read operations.

use std::collections::BTreeMap;
use std::future::Future;

use parking_lot::RwLock;

use super::record::{CameraId, CameraRecord};

/// Read-only access to stored camera records
pub trait CameraDirectory: Send + Sync + 'static {
    /// Look up a camera by id
    fn get_camera(&self, id: CameraId) -> impl Future<Output = Option<CameraRecord>> + Send;

    /// List all cameras
    fn list_cameras(&self) -> impl Future<Output = Vec<CameraRecord>> + Send;
}

/// In-memory camera directory
///
/// Used by the binary (populated from the config file) and by tests. Records
/// can be replaced at any time; sessions pick up the change on their next
/// connection.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    cameras: RwLock<BTreeMap<CameraId, CameraRecord>>,
}

impl MemoryDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a directory holding the given records
    pub fn from_records(records: impl IntoIterator<Item = CameraRecord>) -> Self {
        let cameras = records.into_iter().map(|r| (r.id, r)).collect();
        Self {
            cameras: RwLock::new(cameras),
        }
    }

    /// Insert or replace a record, returning the previous one
    pub fn upsert(&self, record: CameraRecord) -> Option<CameraRecord> {
        self.cameras.write().insert(record.id, record)
    }

    /// Remove a record
    pub fn remove(&self, id: CameraId) -> Option<CameraRecord> {
        self.cameras.write().remove(&id)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.cameras.read().len()
    }

    /// Whether the directory is empty
    pub fn is_empty(&self) -> bool {
        self.cameras.read().is_empty()
    }
}

impl CameraDirectory for MemoryDirectory {
    async fn get_camera(&self, id: CameraId) -> Option<CameraRecord> {
        self.cameras.read().get(&id).cloned()
    }

    async fn list_cameras(&self) -> Vec<CameraRecord> {
        self.cameras.read().values().cloned().collect()
    }
}
