//! Chunked, flow-controlled message exchange over the mailbox slots.
//!
//! Writers split a message into chunks of at most [`CHUNK_SIZE`] bytes. After
//! each chunk the writer waits for the reader to zero the length byte, giving
//! up after the drain timeout and carrying on regardless. Nothing is ever
//! retransmitted: a chunk that is not drained in time may be lost.
//!
//! Readers only take a chunk once its status byte is set (the writer sets it
//! last), then reset the status and zero the length as the acknowledgement.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::charset::{decode_device_bytes, encode_device_bytes};
use crate::error::{BusError, LayoutError};
use crate::mailbox::{Channel, ChunkStatus, MailboxLayout, Slot, CHUNK_SIZE};
use crate::memory::MemoryBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// How long a writer waits for each chunk to be drained.
    pub drain_timeout: Duration,
    /// Interval between drain checks.
    pub drain_poll: Duration,
    /// How long a filled slot with an idle status must stay unchanged before
    /// it is taken as a final chunk.
    pub settle: Duration,
    /// How long a partial message waits for its next chunk.
    pub reassembly_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(1),
            drain_poll: Duration::from_millis(20),
            settle: Duration::from_millis(500),
            reassembly_timeout: Duration::from_secs(3),
        }
    }
}

/// One chunk taken from a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub is_final: bool,
}

/// A reassembled message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalMessage {
    /// Increases by one for every message this engine completes.
    pub seq: u64,
    pub channel: Channel,
    pub text: String,
    pub chunks: usize,
    /// The final chunk never arrived.
    pub truncated: bool,
}

/// Outcome of a chunked send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    pub chunks: usize,
    /// Chunks the reader did not drain before the timeout.
    pub unconfirmed: usize,
}

#[derive(Debug, Default)]
struct ReaderState {
    /// Payload of the last chunk taken, kept until the slot is seen empty.
    last_consumed: Option<Vec<u8>>,
    /// Filled slot with an idle status, and when it was first seen.
    unsettled: Option<(Vec<u8>, Instant)>,
    pending: String,
    pending_chunks: usize,
    last_chunk_at: Option<Instant>,
}

pub struct MailboxEngine<B> {
    bus: B,
    layout: MailboxLayout,
    timing: Timing,
    readers: [ReaderState; 3],
    next_seq: u64,
}

impl<B: MemoryBus> MailboxEngine<B> {
    pub fn new(bus: B, layout: MailboxLayout, timing: Timing) -> Result<Self, LayoutError> {
        layout.validate()?;
        Ok(Self {
            bus,
            layout,
            timing,
            readers: Default::default(),
            next_seq: 1,
        })
    }

    pub fn layout(&self) -> &MailboxLayout {
        &self.layout
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    fn slot(&self, channel: Channel) -> Slot {
        Slot::new(&self.layout, channel)
    }

    /// Send `text` in chunks, waiting for each chunk to be drained.
    ///
    /// Empty text sends nothing. A chunk that is not drained within the drain
    /// timeout is counted in [`SendReport::unconfirmed`] and the next chunk is
    /// written anyway.
    pub async fn send_chunked(&mut self, channel: Channel, text: &str) -> Result<SendReport, BusError> {
        let bytes = encode_device_bytes(text);
        if bytes.is_empty() {
            return Ok(SendReport::default());
        }

        let slot = self.slot(channel);
        let total = bytes.len().div_ceil(CHUNK_SIZE);
        let mut report = SendReport {
            chunks: total,
            unconfirmed: 0,
        };

        for (index, chunk) in bytes.chunks(CHUNK_SIZE).enumerate() {
            let status = if index + 1 == total {
                ChunkStatus::FinalChunk
            } else {
                ChunkStatus::MoreChunks
            };

            slot.set_length(&mut self.bus, chunk.len() as u8)?;
            slot.set_payload(&mut self.bus, chunk)?;
            slot.set_status(&mut self.bus, status)?;
            debug!(%channel, index, len = chunk.len(), ?status, "wrote chunk");

            if !self.wait_for_drain(slot).await? {
                report.unconfirmed += 1;
                warn!(%channel, index, "chunk not drained before timeout, continuing");
            }
        }

        info!(
            %channel,
            chunks = report.chunks,
            unconfirmed = report.unconfirmed,
            bytes = bytes.len(),
            "sent message"
        );
        Ok(report)
    }

    async fn wait_for_drain(&mut self, slot: Slot) -> Result<bool, BusError> {
        let deadline = Instant::now() + self.timing.drain_timeout;
        loop {
            if slot.length(&mut self.bus)? == 0 {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.timing.drain_poll).await;
        }
    }

    /// Take the chunk waiting in `channel`'s slot, if there is a new one.
    ///
    /// A slot still holding the chunk taken last time (because the
    /// acknowledgement did not stick) is reported as empty.
    pub fn poll_receive(&mut self, channel: Channel) -> Result<Option<Chunk>, BusError> {
        let slot = self.slot(channel);
        let settle = self.timing.settle;

        // Status first: once it is set, length and payload are complete.
        let status = slot.status(&mut self.bus)?;
        let length = slot.length(&mut self.bus)?;
        if length == 0 {
            let state = &mut self.readers[channel.index()];
            state.last_consumed = None;
            state.unsettled = None;
            return Ok(None);
        }

        let payload = slot.payload(&mut self.bus, length)?;

        let state = &mut self.readers[channel.index()];
        if state.last_consumed.as_deref() == Some(payload.as_slice()) {
            return Ok(None);
        }

        let is_final = match status {
            ChunkStatus::MoreChunks => false,
            ChunkStatus::FinalChunk => true,
            ChunkStatus::Idle => {
                let settled = match &state.unsettled {
                    Some((seen, since)) if *seen == payload => Some(since.elapsed() >= settle),
                    _ => None,
                };
                match settled {
                    Some(true) => {
                        debug!(%channel, "filled slot never got a status, taking it as final");
                        true
                    }
                    Some(false) => return Ok(None),
                    None => {
                        state.unsettled = Some((payload, Instant::now()));
                        return Ok(None);
                    }
                }
            }
        };
        state.unsettled = None;

        slot.set_status(&mut self.bus, ChunkStatus::Idle)?;
        slot.set_length(&mut self.bus, 0)?;
        let after = slot.length(&mut self.bus)?;

        let text = decode_device_bytes(&payload);
        debug!(%channel, len = length, is_final, "took chunk");

        let state = &mut self.readers[channel.index()];
        state.last_consumed = if after == 0 { None } else { Some(payload) };

        Ok(Some(Chunk { text, is_final }))
    }

    /// Poll `channel` and return a message once its final chunk has arrived.
    ///
    /// A partial message whose next chunk does not arrive within the
    /// reassembly timeout is returned as it stands, marked truncated.
    pub fn receive_message(&mut self, channel: Channel) -> Result<Option<LogicalMessage>, BusError> {
        let reassembly_timeout = self.timing.reassembly_timeout;

        match self.poll_receive(channel)? {
            Some(chunk) => {
                let state = &mut self.readers[channel.index()];
                state.pending.push_str(&chunk.text);
                state.pending_chunks += 1;
                state.last_chunk_at = Some(Instant::now());
                if chunk.is_final {
                    return Ok(Some(self.finish(channel, false)));
                }
                Ok(None)
            }
            None => {
                let state = &self.readers[channel.index()];
                let stalled = state.pending_chunks > 0
                    && state
                        .last_chunk_at
                        .is_some_and(|at| at.elapsed() >= reassembly_timeout);
                if stalled {
                    warn!(
                        %channel,
                        chunks = state.pending_chunks,
                        "final chunk never arrived, delivering truncated message"
                    );
                    return Ok(Some(self.finish(channel, true)));
                }
                Ok(None)
            }
        }
    }

    fn finish(&mut self, channel: Channel, truncated: bool) -> LogicalMessage {
        let state = &mut self.readers[channel.index()];
        let message = LogicalMessage {
            seq: self.next_seq,
            channel,
            text: std::mem::take(&mut state.pending),
            chunks: std::mem::take(&mut state.pending_chunks),
            truncated,
        };
        state.last_chunk_at = None;
        self.next_seq += 1;
        info!(
            %channel,
            seq = message.seq,
            chunks = message.chunks,
            truncated,
            "received message"
        );
        message
    }

    /// Read whatever the slot holds and clear it, ignoring the status byte.
    pub fn take_raw(&mut self, channel: Channel) -> Result<Option<String>, BusError> {
        let slot = self.slot(channel);
        let length = slot.length(&mut self.bus)?;
        if length == 0 {
            return Ok(None);
        }
        let payload = slot.payload(&mut self.bus, length)?;
        slot.clear(&mut self.bus)?;
        Ok(Some(decode_device_bytes(&payload)))
    }

    /// Return one slot to idle and forget any partial message on it.
    pub fn clear(&mut self, channel: Channel) -> Result<(), BusError> {
        self.slot(channel).clear(&mut self.bus)?;
        self.readers[channel.index()] = ReaderState::default();
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<(), BusError> {
        for channel in Channel::all() {
            self.clear(channel)?;
        }
        Ok(())
    }
}
