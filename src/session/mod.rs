//! Per-connection sessions
//!
//! A [`SourceSession`](source::SourceSession) owns one upstream RTSP
//! connection; a [`SinkSession`](sink::SinkSession) owns one downstream
//! HTTP viewer. Sources fan out to sinks through the registry.

pub mod sink;
pub mod source;

pub use sink::{FlvSink, SinkSession};
pub use source::SourceSession;
