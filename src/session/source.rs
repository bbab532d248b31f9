//! Upstream source session
//!
//! One task per upstream address: connects, drives the RTSP dialog, and
//! once playing runs the byte stream through the interleaved framer and
//! the H.264 depacketizer, fanning complete frames out to every attached
//! viewer through the broadcast channel.
//!
//! The session ends when the registry signals stop (last viewer left),
//! the upstream closes, or a protocol error surfaces; it then removes
//! itself from the registry so viewers observe the closed channel.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Notify};
use tokio::time::{sleep_until, Duration, Instant};

use crate::error::{Error, Result};
use crate::media::aac;
use crate::media::h264::H264Depacketizer;
use crate::registry::event::{SourceEvent, SourceKey};
use crate::registry::store::{RegistryRef, SdpCell};
use crate::rtsp::dialog::{RtspDialog, SourceState};
use crate::rtsp::framer::{Channel, InterleavedFramer};
use crate::stats::{BitrateObserver, FpsObserver};
use crate::url::Url;

/// Period of the observational rate logs
const RATE_LOG_PERIOD_SECS: u64 = 5;

/// Idle fallback while the keepalive interval is still unknown
const IDLE_FALLBACK: Duration = Duration::from_secs(3600);

/// One upstream RTSP session feeding any number of viewers
pub struct SourceSession {
    url: Url,
    key: SourceKey,
    dialog: RtspDialog,
    framer: InterleavedFramer,
    depacketizer: H264Depacketizer,
    events: broadcast::Sender<SourceEvent>,
    sdp_cell: SdpCell,
    stop: Arc<Notify>,
    registry: RegistryRef,
    pending: BytesMut,
    bitrate: BitrateObserver,
    fps: FpsObserver,
}

impl SourceSession {
    /// Spawn the session task for `url`. The task removes itself from the
    /// registry when it ends, however it ends.
    pub fn spawn(
        url: Url,
        key: SourceKey,
        events: broadcast::Sender<SourceEvent>,
        sdp_cell: SdpCell,
        stop: Arc<Notify>,
        registry: RegistryRef,
    ) {
        tokio::spawn(async move {
            let dialog = RtspDialog::new(url.credentials.clone(), &url.content);
            let mut session = SourceSession {
                url,
                key,
                dialog,
                framer: InterleavedFramer::new(),
                depacketizer: H264Depacketizer::new(),
                events,
                sdp_cell,
                stop,
                registry,
                pending: BytesMut::new(),
                bitrate: BitrateObserver::new(RATE_LOG_PERIOD_SECS),
                fps: FpsObserver::new(RATE_LOG_PERIOD_SECS),
            };

            if let Err(e) = session.run().await {
                tracing::error!(source = %session.key, error = %e, "source session failed");
            }
            if let Some(registry) = session.registry.upgrade() {
                registry.remove(&session.key).await;
            }
            tracing::debug!(source = %session.key, "source session ended");
        });
    }

    async fn run(&mut self) -> Result<()> {
        let stream = TcpStream::connect((self.url.host.as_str(), self.url.port)).await?;
        stream.set_nodelay(true)?;
        let (mut upstream_rd, mut upstream_wr) = stream.into_split();

        let request = self.dialog.initial_request(&self.url.host, self.url.port);
        upstream_wr.write_all(&request).await?;
        tracing::info!(source = %self.key, url = %self.dialog.url(), "upstream connected");

        let mut chunk = vec![0u8; 4096];
        let mut last_keepalive = Instant::now();

        loop {
            let idle = self.dialog.keepalive_interval().unwrap_or(IDLE_FALLBACK);
            tokio::select! {
                _ = self.stop.notified() => {
                    tracing::debug!(source = %self.key, "stop requested");
                    return Ok(());
                }
                _ = sleep_until(last_keepalive + idle) => {
                    if self.dialog.state() == SourceState::Playing {
                        upstream_wr.write_all(&self.dialog.keepalive_request()).await?;
                        tracing::debug!(source = %self.key, "keepalive sent");
                    }
                    last_keepalive = Instant::now();
                }
                read = upstream_rd.read(&mut chunk) => {
                    let n = read?;
                    if n == 0 {
                        return Err(Error::EndOfStream);
                    }
                    self.bitrate.on_data(n);
                    if let Some(out) = self.on_data(&chunk[..n]).await? {
                        upstream_wr.write_all(&out).await?;
                    }
                }
            }
        }
    }

    /// Feed one TCP read: into the dialog until it reaches `Playing`,
    /// then into the framer. Returns request bytes to write upstream.
    async fn on_data(&mut self, data: &[u8]) -> Result<Option<Bytes>> {
        if self.dialog.state() == SourceState::Playing {
            self.framer.extend(data);
            self.drain_frames()?;
            return Ok(None);
        }

        self.pending.extend_from_slice(data);
        let progress = self.dialog.on_bytes(&mut self.pending)?;
        if progress.sdp_ready {
            self.publish_sdp().await;
        }
        if self.dialog.state() == SourceState::Playing {
            // whatever follows the PLAY response is already RTP
            let rest = self.pending.split();
            self.framer.extend(&rest);
            self.drain_frames()?;
        }
        Ok(progress.send)
    }

    /// Cache the SDP for late joiners and push it to attached viewers
    async fn publish_sdp(&mut self) {
        if let Some((sps, pps)) = self.dialog.parameter_sets() {
            self.depacketizer.set_parameter_sets(sps, pps);
        }
        if let Some(sdp) = self.dialog.sdp().cloned() {
            *self.sdp_cell.write().await = Some(Arc::clone(&sdp));
            let _ = self.events.send(SourceEvent::Sdp(sdp));
        }
    }

    fn drain_frames(&mut self) -> Result<()> {
        while let Some(packet) = self.framer.next_packet()? {
            match Channel::from_byte(packet.channel) {
                Some(Channel::Video) => {
                    if let Some(frame) = self.depacketizer.push(&packet.payload)? {
                        self.fps.on_frame(&frame);
                        // frames only flow once both parameter sets are known
                        if let Some((sps, pps)) = self.depacketizer.parameter_sets() {
                            let _ = self.events.send(SourceEvent::Video {
                                frame,
                                timestamp: packet.header.timestamp,
                                sps,
                                pps,
                            });
                        }
                    }
                }
                Some(Channel::Audio) => match aac::strip_au_headers(&packet.payload) {
                    Ok(sample) => {
                        let _ = self.events.send(SourceEvent::Audio {
                            sample,
                            timestamp: packet.header.timestamp,
                        });
                    }
                    Err(e) => {
                        tracing::debug!(source = %self.key, error = %e, "malformed audio payload skipped");
                    }
                },
                Some(Channel::VideoRtcp) | Some(Channel::AudioRtcp) => {
                    tracing::trace!(source = %self.key, channel = packet.channel, "rtcp ignored");
                }
                None => {
                    tracing::trace!(source = %self.key, channel = packet.channel, "unknown channel ignored");
                }
            }
        }
        Ok(())
    }
}
