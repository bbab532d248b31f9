//! Source registry for one-to-many fan-out
//!
//! The registry owns the upstream sessions and routes their media to the
//! attached viewers over `tokio::sync::broadcast`.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<SourceRegistry>
//!                  ┌───────────────────────────┐
//!                  │ sources: HashMap<Key,     │
//!                  │   SourceHandle {          │
//!                  │     tx: broadcast::Tx,    │
//!                  │     sdp: cached prologue, │
//!                  │     sink_count, stop,     │
//!                  │   }                       │
//!                  │ >                         │
//!                  └────────────┬──────────────┘
//!                               │
//!          ┌────────────────────┼────────────────────┐
//!          │                    │                    │
//!          ▼                    ▼                    ▼
//!     [SourceSession]      [SinkSession]        [SinkSession]
//!     RTSP handshake       events.recv()        events.recv()
//!          │                    │                    │
//!          └──► tx.send(event) ──► FLV tags ──► HTTP socket
//! ```
//!
//! # Zero-Copy Design
//!
//! `bytes::Bytes` uses reference counting, so all viewers share the same
//! frame allocation. The broadcast channel clones the `SourceEvent`, but
//! the inner `Bytes` payload is only reference-counted, not copied.

pub mod event;
pub mod store;

pub use event::{SourceEvent, SourceKey};
pub use store::{Attachment, SourceRegistry};
