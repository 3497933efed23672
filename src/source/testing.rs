//! Scripted in-memory frame source for tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use url::Url;

use crate::error::{ConnectError, StreamEnded};

use super::{FrameSource, FrameSourceConnector};

#[derive(Debug, Default)]
struct MockState {
    opened: AtomicUsize,
    closed: AtomicUsize,
    live: AtomicUsize,
    max_live: AtomicUsize,
    fail_open: AtomicBool,
    stalled_hosts: Mutex<HashSet<String>>,
    urls: Mutex<Vec<String>>,
}

/// Connector producing numbered frames (`frame-1`, `frame-2`, ...)
#[derive(Debug, Clone)]
pub(crate) struct MockConnector {
    state: Arc<MockState>,
    interval: Duration,
    open_delay: Duration,
    frame_limit: Option<u64>,
}

impl MockConnector {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(MockState::default()),
            interval: Duration::from_millis(2),
            open_delay: Duration::ZERO,
            frame_limit: None,
        }
    }

    /// Sources end with `StreamEnded::Closed` after `limit` frames
    pub(crate) fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    pub(crate) fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub(crate) fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Every open fails as if the host were unreachable
    pub(crate) fn unreachable(self) -> Self {
        self.set_unreachable(true);
        self
    }

    pub(crate) fn set_unreachable(&self, unreachable: bool) {
        self.state.fail_open.store(unreachable, Ordering::SeqCst);
    }

    /// Opens to `host` never complete
    pub(crate) fn stall_host(&self, host: &str) {
        self.state.stalled_hosts.lock().insert(host.to_string());
    }

    pub(crate) fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Sources currently holding a connection
    pub(crate) fn live(&self) -> usize {
        self.state.live.load(Ordering::SeqCst)
    }

    pub(crate) fn max_live(&self) -> usize {
        self.state.max_live.load(Ordering::SeqCst)
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.state.urls.lock().clone()
    }
}

impl FrameSourceConnector for MockConnector {
    type Source = MockSource;

    async fn open(&self, url: &Url) -> Result<MockSource, ConnectError> {
        self.state.urls.lock().push(url.to_string());

        let stalled = url
            .host_str()
            .is_some_and(|host| self.state.stalled_hosts.lock().contains(host));
        if stalled {
            std::future::pending::<()>().await;
        }

        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }

        if self.state.fail_open.load(Ordering::SeqCst) {
            return Err(ConnectError::Handshake {
                url: url.to_string(),
                reason: "host unreachable".into(),
            });
        }

        self.state.opened.fetch_add(1, Ordering::SeqCst);
        let live = self.state.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_live.fetch_max(live, Ordering::SeqCst);

        Ok(MockSource {
            state: Arc::clone(&self.state),
            interval: self.interval,
            frame_limit: self.frame_limit,
            produced: 0,
            open: true,
        })
    }
}

#[derive(Debug)]
pub(crate) struct MockSource {
    state: Arc<MockState>,
    interval: Duration,
    frame_limit: Option<u64>,
    produced: u64,
    open: bool,
}

impl MockSource {
    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.state.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl FrameSource for MockSource {
    async fn read_frame(&mut self) -> Result<Bytes, StreamEnded> {
        if !self.open {
            return Err(StreamEnded::Closed);
        }
        if self.frame_limit.is_some_and(|limit| self.produced >= limit) {
            return Err(StreamEnded::Closed);
        }

        tokio::time::sleep(self.interval).await;
        self.produced += 1;
        Ok(Bytes::from(format!("frame-{}", self.produced)))
    }

    async fn close(&mut self) {
        if self.open {
            self.state.closed.fetch_add(1, Ordering::SeqCst);
        }
        self.release();
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        self.release();
    }
}
