use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::StagingBuffer;
use crate::clock;
use crate::compression::RecordCodec;
use crate::config::Config;
use crate::format::{ExtentHeader, EXTENT_HEADER_SIZE, OUTPUT_BLOCK_ALIGNMENT};
use crate::io::OutputSink;

use super::RuntimeShared;

/// The background compression thread.
///
/// Round-robins the registry, digests committed runs through the codec into
/// a staged output buffer, reaps retired-and-drained buffers, and flushes
/// 512-byte-aligned blocks through the sink's double buffer.
pub(super) struct Worker {
    shared: Arc<RuntimeShared>,
    codec: Box<dyn RecordCodec>,
    sink: OutputSink,
    staged: Vec<u8>,
    output_capacity: usize,
    poll_interval: Duration,
}

impl Worker {
    pub(super) fn new(
        shared: Arc<RuntimeShared>,
        codec: Box<dyn RecordCodec>,
        sink: OutputSink,
        config: &Config,
    ) -> Self {
        Self {
            shared,
            codec,
            sink,
            staged: Vec::with_capacity(config.output_buffer_size),
            output_capacity: config.output_buffer_size,
            poll_interval: config.poll_interval,
        }
    }

    pub(super) fn run(mut self) {
        let mut awake_since = clock::ticks();
        loop {
            // A sync is only satisfied by a pass that started after the
            // request; commits racing the request are caught by the next
            // pass.
            let sync_seen = self.shared.sync_requested.load(Ordering::Acquire);

            let scan_start = clock::ticks();
            let drained = self.scan_once();
            self.shared
                .metrics
                .cycles_scanning_and_compressing
                .fetch_add(clock::ticks().saturating_sub(scan_start), Ordering::Relaxed);

            self.apply_pending_rotation();

            if drained > 0 {
                // Keep scanning while producers are ahead of us.
                continue;
            }

            // Every buffer came up empty: push out staged output, then settle
            // sync waiters before going idle.
            if !self.staged.is_empty() {
                self.flush();
            }
            let io_start = clock::ticks();
            self.sink.wait_idle();
            self.shared
                .metrics
                .cycles_disk_io
                .fetch_add(clock::ticks().saturating_sub(io_start), Ordering::Relaxed);
            if sync_seen {
                self.complete_sync();
            }

            if self.shared.should_exit.load(Ordering::Acquire) {
                break;
            }

            // Producers never signal on the hot path; a bounded wait keeps
            // sporadic logging draining without one.
            self.shared
                .metrics
                .cycles_awake
                .fetch_add(clock::ticks().saturating_sub(awake_since), Ordering::Relaxed);
            {
                let control = self
                    .shared
                    .control
                    .lock()
                    .expect("runtime control mutex poisoned");
                let idle = !self.shared.should_exit.load(Ordering::Acquire)
                    && !self.shared.sync_requested.load(Ordering::Acquire)
                    && control.pending_file.is_none();
                if idle {
                    let _ = self
                        .shared
                        .work_added
                        .wait_timeout(control, self.poll_interval)
                        .expect("runtime control mutex poisoned");
                }
            }
            awake_since = clock::ticks();
        }

        self.shared
            .metrics
            .cycles_awake
            .fetch_add(clock::ticks().saturating_sub(awake_since), Ordering::Relaxed);

        let Self { shared, sink, .. } = self;
        sink.finish();

        // Release anything still waiting on the worker: a sync or rotation
        // that raced shutdown must not hang.
        let mut control = shared.control.lock().expect("runtime control mutex poisoned");
        control.pending_file = None;
        control.rotations_applied = control.rotations_requested;
        shared.sync_requested.store(false, Ordering::Release);
        shared.queue_drained.notify_all();
    }

    /// One pass over the registry; returns the staging bytes consumed.
    fn scan_once(&mut self) -> usize {
        let mut drained = 0usize;
        for buffer in self.shared.registry.snapshot() {
            drained += self.drain_buffer(&buffer);
            if buffer.can_reap() {
                self.shared
                    .metrics
                    .cycles_producer_blocked
                    .fetch_add(buffer.cycles_producer_blocked(), Ordering::Relaxed);
                self.shared.registry.remove(buffer.id());
            }
        }
        drained
    }

    fn drain_buffer(&mut self, buffer: &StagingBuffer) -> usize {
        let mut drained = 0usize;
        loop {
            let run = buffer.peek();
            if run.is_empty() {
                break;
            }

            let budget = self.output_capacity - self.staged.len();
            if budget <= EXTENT_HEADER_SIZE {
                self.flush();
                continue;
            }

            let header_at = self.staged.len();
            self.staged.resize(header_at + EXTENT_HEADER_SIZE, 0);

            let compress_start = clock::ticks();
            let outcome = self.codec.compress(
                buffer.id(),
                run,
                &mut self.staged,
                budget - EXTENT_HEADER_SIZE,
            );
            self.shared
                .metrics
                .cycles_compressing
                .fetch_add(clock::ticks().saturating_sub(compress_start), Ordering::Relaxed);

            if outcome.bytes_in == 0 {
                self.staged.truncate(header_at);
                if header_at == 0 {
                    // The codec contract (one record always fits an empty
                    // output buffer) was violated; leave the bytes in place
                    // rather than corrupt the stream.
                    break;
                }
                self.flush();
                continue;
            }

            debug_assert_eq!(
                self.staged.len(),
                header_at + EXTENT_HEADER_SIZE + outcome.bytes_out
            );
            let payload = &self.staged[header_at + EXTENT_HEADER_SIZE..];
            let header = ExtentHeader {
                buffer_id: buffer.id(),
                payload_len: outcome.bytes_out as u32,
                crc32: crc32fast::hash(payload),
            };
            self.staged[header_at..header_at + EXTENT_HEADER_SIZE]
                .copy_from_slice(&header.to_bytes());

            buffer.consume(outcome.bytes_in);
            drained += outcome.bytes_in;
            self.shared
                .metrics
                .total_bytes_read
                .fetch_add(outcome.bytes_in as u64, Ordering::Relaxed);
            self.shared
                .metrics
                .events_processed
                .fetch_add(outcome.records, Ordering::Relaxed);
        }
        drained
    }

    /// Pads the staged output to the block alignment and submits it,
    /// swapping in the sink's recycled double buffer.
    fn flush(&mut self) {
        if self.staged.is_empty() {
            return;
        }
        let padded_len = self.staged.len().next_multiple_of(OUTPUT_BLOCK_ALIGNMENT);
        let pad = padded_len - self.staged.len();
        self.staged.resize(padded_len, 0);

        let metrics = &self.shared.metrics;
        metrics
            .pad_bytes_written
            .fetch_add(pad as u64, Ordering::Relaxed);
        metrics
            .total_bytes_written
            .fetch_add(padded_len as u64, Ordering::Relaxed);

        let io_start = clock::ticks();
        let recycled = self.sink.submit(std::mem::take(&mut self.staged));
        metrics
            .cycles_disk_io
            .fetch_add(clock::ticks().saturating_sub(io_start), Ordering::Relaxed);
        self.staged = recycled;
    }

    /// Installs a pending log-file rotation once outstanding I/O against the
    /// old file has completed.
    fn apply_pending_rotation(&mut self) {
        let pending = {
            self.shared
                .control
                .lock()
                .expect("runtime control mutex poisoned")
                .pending_file
                .is_some()
        };
        if !pending {
            return;
        }

        if !self.staged.is_empty() {
            self.flush();
        }
        self.sink.wait_idle();

        let mut control = self
            .shared
            .control
            .lock()
            .expect("runtime control mutex poisoned");
        if let Some(file) = control.pending_file.take() {
            self.sink.rotate(file);
            control.rotations_applied += 1;
            self.shared.queue_drained.notify_all();
        }
    }

    /// Clears a satisfied sync request. Called only after a pass that drained
    /// nothing, with staged output flushed and the sink idle.
    fn complete_sync(&self) {
        let _control = self
            .shared
            .control
            .lock()
            .expect("runtime control mutex poisoned");
        if self.shared.sync_requested.swap(false, Ordering::AcqRel) {
            self.shared.queue_drained.notify_all();
        }
    }
}
