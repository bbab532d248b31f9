//! Source registry implementation
//!
//! The central map from upstream address to the running source session.
//! The first viewer of an address spawns the session; later viewers share
//! it; the last one leaving tears it down.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::{broadcast, Notify, RwLock};

use crate::sdp::Sdp;
use crate::session::source::SourceSession;
use crate::url::Url;

use super::event::{SourceEvent, SourceKey};

/// Shared cell the source session fills once DESCRIBE has been answered,
/// so late joiners can emit their FLV prologue immediately
pub type SdpCell = Arc<RwLock<Option<Arc<Sdp>>>>;

/// Everything a sink needs after attaching to a source
pub struct Attachment {
    /// The key to detach with
    pub key: SourceKey,
    /// Live event feed
    pub events: broadcast::Receiver<SourceEvent>,
    /// The cached SDP, when the source is already described
    pub sdp: Option<Arc<Sdp>>,
}

struct SourceHandle {
    tx: broadcast::Sender<SourceEvent>,
    sdp: SdpCell,
    stop: Arc<Notify>,
    sink_count: u32,
}

/// Central registry of upstream sources, keyed by their address
pub struct SourceRegistry {
    sources: RwLock<HashMap<SourceKey, SourceHandle>>,
    broadcast_capacity: usize,
}

impl SourceRegistry {
    pub fn new(broadcast_capacity: usize) -> Self {
        Self {
            sources: RwLock::new(HashMap::new()),
            broadcast_capacity,
        }
    }

    /// Attach a viewer to the source for `url`, spawning the upstream
    /// session if this is the first viewer of that address.
    pub async fn attach(self: &Arc<Self>, url: &Url) -> Attachment {
        let key = SourceKey::from_url(url);
        let mut sources = self.sources.write().await;

        if let Some(handle) = sources.get_mut(&key) {
            handle.sink_count += 1;
            let events = handle.tx.subscribe();
            let sdp = handle.sdp.read().await.clone();
            tracing::info!(
                source = %key,
                sinks = handle.sink_count,
                described = sdp.is_some(),
                "viewer attached (existing source)"
            );
            return Attachment { key, events, sdp };
        }

        let (tx, events) = broadcast::channel(self.broadcast_capacity);
        let sdp: SdpCell = Arc::new(RwLock::new(None));
        let stop = Arc::new(Notify::new());

        SourceSession::spawn(
            url.clone(),
            key.clone(),
            tx.clone(),
            Arc::clone(&sdp),
            Arc::clone(&stop),
            Arc::downgrade(self),
        );
        sources.insert(
            key.clone(),
            SourceHandle {
                tx,
                sdp,
                stop,
                sink_count: 1,
            },
        );
        tracing::info!(source = %key, "viewer attached (new source)");
        Attachment {
            key,
            events,
            sdp: None,
        }
    }

    /// Detach one viewer. Removing the last one tears the source down:
    /// its entry is dropped and its session told to stop.
    pub async fn detach(&self, key: &SourceKey) {
        let mut sources = self.sources.write().await;
        if let Some(handle) = sources.get_mut(key) {
            handle.sink_count = handle.sink_count.saturating_sub(1);
            if handle.sink_count == 0 {
                if let Some(handle) = sources.remove(key) {
                    handle.stop.notify_one();
                }
                tracing::info!(source = %key, "last viewer left, source torn down");
            } else {
                tracing::debug!(source = %key, sinks = handle.sink_count, "viewer detached");
            }
        }
    }

    /// Drop a source that died on its own; its sinks observe the closed
    /// event channel and hang up.
    pub async fn remove(&self, key: &SourceKey) {
        let mut sources = self.sources.write().await;
        if sources.remove(key).is_some() {
            tracing::info!(source = %key, "source removed");
        }
    }

    /// Number of live upstream sources
    pub async fn source_count(&self) -> usize {
        self.sources.read().await.len()
    }

    /// Whether a source for this key is currently registered
    pub async fn has_source(&self, key: &SourceKey) -> bool {
        self.sources.read().await.contains_key(key)
    }
}

/// Weak handle the source session keeps for removing itself on failure
pub type RegistryRef = Weak<SourceRegistry>;
