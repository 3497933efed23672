//! Camera records and the directory they are read from
//!
//! The relay engine never writes camera records. It reads them through a
//! [`CameraDirectory`] right before each connection attempt, so edits made by
//! whatever owns the records apply to the next connection only.

pub mod directory;
pub mod record;

pub use directory::{CameraDirectory, MemoryDirectory};
pub use record::{redacted, CameraId, CameraRecord, Credentials, STREAM_SCHEME};
