//! Statistics for camera relays

pub mod metrics;

pub use metrics::{RelayStats, SessionStats};
