use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::stats::WorkerMetrics;
use crate::types::Result;

enum SinkRequest {
    Write(Vec<u8>),
    Rotate(File),
    Close,
}

struct Completion {
    result: std::io::Result<()>,
    data: Vec<u8>,
}

/// Asynchronous file writer with at most one write in flight.
///
/// A dedicated writer thread performs blocking writes; `submit` hands it a
/// filled buffer and immediately returns the recycled spare, giving the
/// caller a double buffer to refill while the write is outstanding. A failed
/// write is retried once with the same buffer; a second failure latches the
/// sink failed and later submissions are dropped with a metric increment.
pub struct OutputSink {
    requests: Sender<SinkRequest>,
    completions: Receiver<Completion>,
    spare: Option<Vec<u8>>,
    outstanding: bool,
    failed: bool,
    metrics: Arc<WorkerMetrics>,
    writer: Option<JoinHandle<()>>,
}

impl OutputSink {
    pub fn new(file: File, buffer_capacity: usize, metrics: Arc<WorkerMetrics>) -> Result<Self> {
        let (requests, request_rx) = bounded(1);
        let (completion_tx, completions) = bounded(1);
        let writer = thread::Builder::new()
            .name("flashlog-writer".to_string())
            .spawn(move || writer_loop(request_rx, completion_tx, file))?;
        Ok(Self {
            requests,
            completions,
            spare: Some(Vec::with_capacity(buffer_capacity)),
            outstanding: false,
            failed: false,
            metrics,
            writer: Some(writer),
        })
    }

    /// Submits `data` for an asynchronous write and returns the recycled
    /// double buffer for the caller to refill.
    pub fn submit(&mut self, data: Vec<u8>) -> Vec<u8> {
        self.wait_idle();
        if self.failed {
            self.metrics.flushes_dropped.fetch_add(1, Ordering::Relaxed);
            return recycled(data);
        }
        if let Err(send_error) = self.requests.send(SinkRequest::Write(data)) {
            self.mark_failed("writer thread is gone");
            if let SinkRequest::Write(data) = send_error.0 {
                return recycled(data);
            }
            return Vec::new();
        }
        self.outstanding = true;
        self.spare.take().unwrap_or_default()
    }

    /// Blocks until no write is in flight, applying the retry-once policy to
    /// any completion that failed.
    pub fn wait_idle(&mut self) {
        if !self.outstanding {
            return;
        }
        self.outstanding = false;
        let Ok(completion) = self.completions.recv() else {
            self.mark_failed("writer thread is gone");
            return;
        };
        match completion.result {
            Ok(()) => {
                self.metrics.writes_completed.fetch_add(1, Ordering::Relaxed);
                self.spare = Some(recycled(completion.data));
            }
            Err(error) => {
                self.metrics.write_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%error, "log write failed; retrying once");
                self.retry(completion.data);
            }
        }
    }

    /// Swaps the destination file. Any outstanding write completes against
    /// the old file first.
    pub fn rotate(&mut self, file: File) {
        self.wait_idle();
        if self.requests.send(SinkRequest::Rotate(file)).is_err() {
            self.mark_failed("writer thread is gone");
        }
    }

    /// True once the sink stopped accepting output after repeated failures.
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Completes any outstanding write, closes the file, and joins the
    /// writer thread.
    pub fn finish(mut self) {
        self.wait_idle();
        let _ = self.requests.send(SinkRequest::Close);
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                tracing::error!("log writer thread panicked");
            }
        }
    }

    fn retry(&mut self, data: Vec<u8>) {
        if self.requests.send(SinkRequest::Write(data)).is_err() {
            self.mark_failed("writer thread is gone");
            return;
        }
        match self.completions.recv() {
            Ok(Completion {
                result: Ok(()),
                data,
            }) => {
                self.metrics.writes_completed.fetch_add(1, Ordering::Relaxed);
                self.spare = Some(recycled(data));
            }
            Ok(Completion {
                result: Err(error),
                data,
            }) => {
                self.metrics.write_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(%error, "log write failed twice; dropping further output");
                self.failed = true;
                self.spare = Some(recycled(data));
            }
            Err(_) => self.mark_failed("writer thread is gone"),
        }
    }

    fn mark_failed(&mut self, reason: &str) {
        if !self.failed {
            tracing::error!(reason, "output sink disabled");
        }
        self.failed = true;
        if self.spare.is_none() {
            self.spare = Some(Vec::new());
        }
    }
}

fn recycled(mut data: Vec<u8>) -> Vec<u8> {
    data.clear();
    data
}

fn writer_loop(requests: Receiver<SinkRequest>, completions: Sender<Completion>, file: File) {
    let mut file = file;
    for request in requests {
        match request {
            SinkRequest::Write(data) => {
                let result = file.write_all(&data);
                if completions.send(Completion { result, data }).is_err() {
                    break;
                }
            }
            SinkRequest::Rotate(next) => {
                let _ = file.sync_all();
                file = next;
            }
            SinkRequest::Close => {
                let _ = file.sync_all();
                break;
            }
        }
    }
}
