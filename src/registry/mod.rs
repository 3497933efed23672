//! Camera relay registry
//!
//! The registry shares one upstream connection per camera between every
//! viewer watching it. The first viewer opens the camera's frame source, the
//! last one to leave closes it, and a camera nobody watches holds nothing.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<RelayRegistry>
//!                   ┌──────────────────────────┐
//!                   │ sessions: HashMap<Id,    │
//!                   │   CameraSession {        │
//!                   │     phase,               │
//!                   │     tx: broadcast::Tx,   │
//!                   │   }                      │
//!                   │ >                        │
//!                   └────────────┬─────────────┘
//!                                │
//!        ┌───────────────────────┼───────────────────────┐
//!        │                       │                       │
//!        ▼                       ▼                       ▼
//!   [Producer task]        [ViewerChannel]         [ViewerChannel]
//!   source.read_frame()    recv()                  recv()
//!        │                       │                       │
//!        └──► tx.send(Frame) ────┴──► HTTP response ◄────┘
//! ```
//!
//! # Slow viewers
//!
//! Each viewer has a single-slot mailbox (a broadcast channel of capacity 1).
//! The producer never waits for a viewer: a viewer that falls behind skips
//! to the newest frame.

pub mod config;
pub mod frame;
pub mod session;
pub mod store;
pub mod viewer;

pub use config::RegistryConfig;
pub use frame::Frame;
pub use session::{CameraSession, SessionState};
pub use store::RelayRegistry;
pub use viewer::ViewerChannel;
