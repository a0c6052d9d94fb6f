//! Batched line-protocol sink.
//!
//! Records append into the active buffer of a fixed ring. When the next
//! record would not fit, the writer hands the buffer off by advancing the
//! write cursor and signalling the submitter, which sends each pending
//! buffer as one UDP datagram. The sampler never blocks on the network;
//! the ring is the only coupling between the two threads.
//!
//! # Ring discipline
//!
//! Write cursor: sampler only. Read cursor: submitter only. A buffer is
//! readable while it sits between the cursors. Advancing the write cursor
//! onto the read cursor is an overrun: the ring then reads as empty and
//! the oldest unsent batch is lost. Each buffer carries a sequence word
//! (odd while it is the active write target) so a submitter that was
//! lapped mid-read detects the torn batch and discards it instead of
//! sending garbage.

use super::TagBlock;
use crate::detect::Change;
use crossbeam_utils::CachePadded;
use hist_common::config::MAX_BATCH_BYTES;
use hist_common::error::{BridgeError, BridgeResult};
use hist_common::event::{EventSet, EVENT_READY_FOR_SUBMIT, EVENT_SHUTDOWN};
use hist_common::stats::BridgeStats;
use std::cell::UnsafeCell;
use std::fmt::Write as _;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Number of batch buffers in the ring.
pub const RING_BUFFERS: usize = 5;

struct BatchBuf {
    /// Odd while this buffer is the active write target.
    seq: AtomicU64,
    /// Valid bytes in `data`.
    fill: AtomicUsize,
    data: UnsafeCell<Box<[u8]>>,
}

/// Single-producer/single-consumer ring of batch buffers.
pub struct BatchRing {
    bufs: [BatchBuf; RING_BUFFERS],
    write: CachePadded<AtomicUsize>,
    read: CachePadded<AtomicUsize>,
    max_packet: usize,
    overruns: AtomicU64,
    oversize_drops: AtomicU64,
}

// SAFETY: buffer bytes are only written through the active buffer (single
// writer) and only read between the cursors; the per-buffer sequence word
// detects the one overrun case where the writer laps a reader mid-copy.
unsafe impl Send for BatchRing {}
unsafe impl Sync for BatchRing {}

/// Outcome of one append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Append {
    /// The previous active buffer was handed off to the submitter.
    pub handed_off: bool,
    /// The hand-off advanced onto the read cursor.
    pub overrun: bool,
    /// The record exceeded the packet limit and was discarded.
    pub dropped: bool,
}

/// Outcome of one pop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pop {
    /// No pending batch.
    Empty,
    /// A pending batch was overwritten by the writer; skipped.
    Stale,
    /// A batch of this many bytes was copied out.
    Batch(usize),
}

impl BatchRing {
    /// Create a ring whose datagrams never exceed `max_packet` bytes.
    #[must_use]
    pub fn new(max_packet: usize) -> Self {
        let max_packet = max_packet.clamp(1, MAX_BATCH_BYTES);
        Self {
            bufs: std::array::from_fn(|i| BatchBuf {
                // Buffer 0 starts as the active write target
                seq: AtomicU64::new(u64::from(i == 0)),
                fill: AtomicUsize::new(0),
                data: UnsafeCell::new(vec![0u8; MAX_BATCH_BYTES].into_boxed_slice()),
            }),
            write: CachePadded::new(AtomicUsize::new(0)),
            read: CachePadded::new(AtomicUsize::new(0)),
            max_packet,
            overruns: AtomicU64::new(0),
            oversize_drops: AtomicU64::new(0),
        }
    }

    /// Append one record to the active buffer, handing the buffer off
    /// first if the record would not fit. Writer thread only.
    pub fn append(&self, record: &[u8]) -> Append {
        let mut outcome = Append::default();

        if record.len() > self.max_packet {
            self.oversize_drops.fetch_add(1, Ordering::Relaxed);
            outcome.dropped = true;
            return outcome;
        }

        let mut w = self.write.load(Ordering::Relaxed);
        if self.bufs[w].fill.load(Ordering::Relaxed) + record.len() > self.max_packet {
            let next = (w + 1) % RING_BUFFERS;
            if next == self.read.load(Ordering::Acquire) {
                self.overruns.fetch_add(1, Ordering::Relaxed);
                outcome.overrun = true;
            }
            // Close the full buffer, open the next one
            self.bufs[w].seq.fetch_add(1, Ordering::AcqRel);
            self.bufs[next].seq.fetch_add(1, Ordering::AcqRel);
            self.bufs[next].fill.store(0, Ordering::Release);
            self.write.store(next, Ordering::Release);
            outcome.handed_off = true;
            w = next;
        }

        let fill = self.bufs[w].fill.load(Ordering::Relaxed);
        // SAFETY: only the writer thread mutates the active buffer, and
        // fill + record.len() <= max_packet <= capacity.
        unsafe {
            let data = &mut *self.bufs[w].data.get();
            data[fill..fill + record.len()].copy_from_slice(record);
        }
        self.bufs[w].fill.store(fill + record.len(), Ordering::Release);
        outcome
    }

    /// Copy the oldest pending batch into `out` and advance the read
    /// cursor. Reader thread only.
    pub fn pop_into(&self, out: &mut [u8]) -> Pop {
        let r = self.read.load(Ordering::Relaxed);
        if r == self.write.load(Ordering::Acquire) {
            return Pop::Empty;
        }

        let buf = &self.bufs[r];
        let seq_before = buf.seq.load(Ordering::Acquire);
        if seq_before & 1 == 1 {
            // Writer lapped the ring and reopened this buffer
            self.read.store((r + 1) % RING_BUFFERS, Ordering::Release);
            return Pop::Stale;
        }

        let len = buf.fill.load(Ordering::Acquire).min(out.len());
        // SAFETY: the buffer sits between the cursors; a concurrent
        // overwrite is detected by the sequence check below.
        unsafe {
            let data = &*buf.data.get();
            out[..len].copy_from_slice(&data[..len]);
        }
        let seq_after = buf.seq.load(Ordering::Acquire);
        self.read.store((r + 1) % RING_BUFFERS, Ordering::Release);

        if seq_before == seq_after {
            Pop::Batch(len)
        } else {
            Pop::Stale
        }
    }

    /// Bytes in the active (not yet handed off) buffer.
    #[must_use]
    pub fn active_fill(&self) -> usize {
        self.bufs[self.write.load(Ordering::Acquire)]
            .fill
            .load(Ordering::Acquire)
    }

    /// Snapshot of the active buffer's contents. Diagnostic use; only
    /// meaningful when the writer is quiescent.
    #[must_use]
    pub fn active_snapshot(&self) -> Vec<u8> {
        let w = self.write.load(Ordering::Acquire);
        let len = self.bufs[w].fill.load(Ordering::Acquire);
        // SAFETY: callers only snapshot while no writer is appending.
        unsafe { (&(*self.bufs[w].data.get()))[..len].to_vec() }
    }

    /// Current write cursor index.
    #[must_use]
    pub fn write_cursor(&self) -> usize {
        self.write.load(Ordering::Acquire)
    }

    /// Current read cursor index.
    #[must_use]
    pub fn read_cursor(&self) -> usize {
        self.read.load(Ordering::Acquire)
    }

    /// True when no handed-off batch is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read_cursor() == self.write_cursor()
    }

    /// Number of overruns since startup.
    #[must_use]
    pub fn overrun_count(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Number of oversize records discarded since startup.
    #[must_use]
    pub fn oversize_drop_count(&self) -> u64 {
        self.oversize_drops.load(Ordering::Relaxed)
    }

    /// Configured datagram limit.
    #[must_use]
    pub fn max_packet(&self) -> usize {
        self.max_packet
    }
}

/// Render one line-protocol point, newline terminated.
pub(crate) fn encode_point(
    out: &mut String,
    tags: &TagBlock,
    name: &str,
    data_type: &str,
    value: &str,
    timestamp_us: i64,
) {
    let prefix = tags.prefix();
    let _ = write!(
        out,
        "{prefix}{name},DataType={data_type},LineState=0,ReferenceName={prefix}{name},\
         TagDescription={prefix}{name},{fixed} value={value} {timestamp_us}\n",
        fixed = tags.fixed(),
    );
}

/// Writer side of the line-protocol sink. Lives on the sampler thread.
pub struct LineSink {
    ring: Arc<BatchRing>,
    events: Arc<EventSet>,
    tags: Arc<TagBlock>,
    name: String,
    record: String,
}

impl LineSink {
    /// Create the sink around a shared ring and the submitter's event set.
    #[must_use]
    pub fn new(ring: Arc<BatchRing>, events: Arc<EventSet>, tags: Arc<TagBlock>) -> Self {
        Self {
            ring,
            events,
            tags,
            name: String::with_capacity(64),
            record: String::with_capacity(512),
        }
    }

    /// Append one change record.
    pub fn append_change(&mut self, change: &Change) {
        self.name.clear();
        let _ = write!(
            self.name,
            "{}_{}_{}",
            change.kind.tag(),
            change.slot,
            change.element
        );
        let Self {
            name,
            record,
            tags,
            ..
        } = self;
        record.clear();
        encode_point(
            record,
            tags,
            name,
            change.kind.tag(),
            &change.text,
            change.timestamp_us,
        );
        self.push_record();
    }

    /// Append one raw measurement record (self-telemetry).
    pub fn append_raw(&mut self, name: &str, value: &str, timestamp_us: i64) {
        let Self { record, tags, .. } = self;
        record.clear();
        encode_point(record, tags, name, "stats", value, timestamp_us);
        self.push_record();
    }

    fn push_record(&mut self) {
        let outcome = self.ring.append(self.record.as_bytes());
        if outcome.dropped {
            warn!(
                bytes = self.record.len(),
                limit = self.ring.max_packet(),
                "record exceeds packet limit, dropped"
            );
            return;
        }
        if outcome.overrun {
            warn!(
                overruns = self.ring.overrun_count(),
                "batch ring overrun, oldest batch lost"
            );
        }
        if outcome.handed_off {
            self.events.post(EVENT_READY_FOR_SUBMIT);
        }
    }

    /// The shared ring (submitter wiring, diagnostics, tests).
    #[must_use]
    pub fn ring(&self) -> &Arc<BatchRing> {
        &self.ring
    }
}

/// Reader side: drains pending batches into UDP datagrams.
///
/// Runs on its own thread, above the sampler's priority, and blocks only
/// on its event set and on `send`.
pub struct Submitter {
    ring: Arc<BatchRing>,
    events: Arc<EventSet>,
    stats: Arc<BridgeStats>,
    socket: UdpSocket,
    scratch: Box<[u8]>,
}

impl Submitter {
    /// Create a submitter sending to `host:port`.
    ///
    /// # Errors
    ///
    /// Fails when the socket cannot be bound or the target not resolved.
    pub fn new(
        ring: Arc<BatchRing>,
        events: Arc<EventSet>,
        stats: Arc<BridgeStats>,
        host: &str,
        port: u16,
    ) -> BridgeResult<Self> {
        let socket =
            UdpSocket::bind(("0.0.0.0", 0)).map_err(|e| BridgeError::Io(e.to_string()))?;
        socket
            .connect((host, port))
            .map_err(|e| BridgeError::Egress(format!("cannot reach {host}:{port}: {e}")))?;
        Ok(Self {
            ring,
            events,
            stats,
            socket,
            scratch: vec![0u8; MAX_BATCH_BYTES].into_boxed_slice(),
        })
    }

    /// Block on the event set and send batches until shutdown.
    pub fn run(mut self) {
        info!("submitter started");
        loop {
            let flags = self
                .events
                .wait_any(EVENT_READY_FOR_SUBMIT | EVENT_SHUTDOWN);
            self.drain();
            if flags & EVENT_SHUTDOWN != 0 {
                break;
            }
        }
        info!("submitter stopped");
    }

    /// Send every pending batch.
    pub fn drain(&mut self) {
        loop {
            match self.ring.pop_into(&mut self.scratch) {
                Pop::Empty => break,
                Pop::Stale => debug!("stale batch skipped after overrun"),
                Pop::Batch(len) => {
                    let started = Instant::now();
                    if let Err(e) = self.socket.send(&self.scratch[..len]) {
                        // Fire-and-forget transport; the batch is gone either way
                        debug!(error = %e, len, "batch send failed");
                    }
                    self.stats
                        .influx_persist
                        .collect(started.elapsed().as_micros() as u64);
                }
            }
        }
    }
}
