mod tls;
mod worker;

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread::JoinHandle;

use crate::buffer::{BufferRegistry, StagingBuffer};
use crate::clock;
use crate::compression::{Lz4RecordCodec, RecordCodec};
use crate::config::Config;
use crate::format::{RecordHeader, RECORD_HEADER_SIZE};
use crate::stats::{StatsSnapshot, WorkerMetrics};
use crate::types::Result;

use worker::Worker;

/// State shared between producers, the facade, and the compression worker.
pub(crate) struct RuntimeShared {
    pub(crate) registry: BufferRegistry,
    pub(crate) metrics: Arc<WorkerMetrics>,
    pub(crate) should_exit: AtomicBool,
    pub(crate) sync_requested: AtomicBool,
    pub(crate) control: Mutex<ControlState>,
    /// Wakes the worker for syncs, rotations, and shutdown.
    pub(crate) work_added: Condvar,
    /// Signalled by the worker after a pass that drained every buffer.
    pub(crate) queue_drained: Condvar,
}

#[derive(Default)]
pub(crate) struct ControlState {
    pub(crate) pending_file: Option<File>,
    pub(crate) rotations_requested: u64,
    pub(crate) rotations_applied: u64,
}

/// The logging runtime: a buffer registry plus one background compression
/// worker writing to one output file.
///
/// Most programs use the process-wide instance through the free functions in
/// this module; tests and embedders can construct isolated runtimes with
/// their own [`Config`] and codec.
pub struct Runtime {
    shared: Arc<RuntimeShared>,
    config: Config,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Runtime {
    /// Builds a runtime with the default LZ4 record codec.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_codec(config, Box::new(Lz4RecordCodec))
    }

    /// Builds a runtime with a caller-provided codec, opens the log file,
    /// and starts the compression worker.
    pub fn with_codec(config: Config, codec: Box<dyn RecordCodec>) -> Result<Self> {
        config.validate()?;
        let file = open_log_file(&config.log_file)?;

        let metrics = Arc::new(WorkerMetrics::default());
        let shared = Arc::new(RuntimeShared {
            registry: BufferRegistry::new(config.staging_buffer_size),
            metrics: Arc::clone(&metrics),
            should_exit: AtomicBool::new(false),
            sync_requested: AtomicBool::new(false),
            control: Mutex::new(ControlState::default()),
            work_added: Condvar::new(),
            queue_drained: Condvar::new(),
        });

        let sink = crate::io::OutputSink::new(file, config.output_buffer_size, metrics)?;
        let worker_shared = Arc::clone(&shared);
        let worker_config = config.clone();
        let handle = std::thread::Builder::new()
            .name("flashlog-compressor".to_string())
            .spawn(move || Worker::new(worker_shared, codec, sink, &worker_config).run())?;

        Ok(Self {
            shared,
            config,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Reserves `nbytes` of contiguous staging space for this thread,
    /// allocating the thread's buffer on first use.
    ///
    /// Blocks while the buffer is full. Panics if the record cannot fit even
    /// an empty staging buffer; that is a call-site bug, not a runtime
    /// condition.
    #[inline]
    pub fn reserve_alloc(&self, nbytes: usize) -> NonNull<u8> {
        let buffer = self.ensure_thread_buffer();
        match buffer.reserve(nbytes) {
            Ok(ptr) => ptr,
            Err(error) => panic!("flashlog: {error}"),
        }
    }

    /// Publishes the bytes of the preceding [`reserve_alloc`](Self::reserve_alloc)
    /// to the compression worker.
    #[inline]
    pub fn finish_alloc(&self, nbytes: usize) {
        let Some(ptr) = tls::current(self.token()) else {
            panic!("flashlog: finish_alloc without a prior reserve_alloc on this thread");
        };
        // SAFETY: the thread's retire guard keeps the buffer alive, and only
        // this thread produces into it.
        unsafe { ptr.as_ref() }.commit(nbytes);
    }

    /// Frames `payload` as one record and commits it to this thread's
    /// staging buffer.
    pub fn write_record(&self, log_id: u32, payload: &[u8]) {
        let total = RECORD_HEADER_SIZE + payload.len();
        let ptr = self.reserve_alloc(total);
        let header = RecordHeader {
            log_id,
            payload_len: payload.len() as u32,
            timestamp: clock::ticks(),
        };
        // SAFETY: `reserve_alloc` returned `total` writable bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(
                header.to_bytes().as_ptr(),
                ptr.as_ptr(),
                RECORD_HEADER_SIZE,
            );
            std::ptr::copy_nonoverlapping(
                payload.as_ptr(),
                ptr.as_ptr().add(RECORD_HEADER_SIZE),
                payload.len(),
            );
        }
        self.finish_alloc(total);
    }

    /// Forces this thread's staging buffer into existence, eliminating the
    /// allocation cost from the first log call.
    pub fn preallocate(&self) {
        self.ensure_thread_buffer();
    }

    /// Blocks until every record committed (on any thread) before this call
    /// has been submitted to the output sink.
    pub fn sync(&self) {
        let mut control = self
            .shared
            .control
            .lock()
            .expect("runtime control mutex poisoned");
        if self.shared.should_exit.load(Ordering::Acquire) {
            return;
        }
        self.shared.sync_requested.store(true, Ordering::Release);
        self.shared.work_added.notify_all();
        while self.shared.sync_requested.load(Ordering::Acquire) {
            control = self
                .shared
                .queue_drained
                .wait(control)
                .expect("runtime control mutex poisoned");
        }
    }

    /// Rotates the output destination.
    ///
    /// The new file is opened here, so an open failure reaches the caller
    /// with no state change; the swap itself is serialized through the
    /// worker, after outstanding I/O against the old file completes.
    pub fn set_log_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = open_log_file(path.as_ref())?;
        let mut control = self
            .shared
            .control
            .lock()
            .expect("runtime control mutex poisoned");
        if self.shared.should_exit.load(Ordering::Acquire) {
            return Err(std::io::Error::other("logging runtime is shut down").into());
        }
        control.rotations_requested += 1;
        let target = control.rotations_requested;
        control.pending_file = Some(file);
        self.shared.work_added.notify_all();
        while control.rotations_applied < target {
            control = self
                .shared
                .queue_drained
                .wait(control)
                .expect("runtime control mutex poisoned");
        }
        Ok(())
    }

    /// Captures the current worker and sink counters.
    pub fn stats(&self) -> StatsSnapshot {
        let buffers = self.shared.registry.snapshot();
        let live_blocked: u64 = buffers
            .iter()
            .map(|buffer| buffer.cycles_producer_blocked())
            .sum();
        self.shared.metrics.snapshot(buffers.len(), live_blocked)
    }

    /// Prints the metric counters to stdout.
    pub fn print_stats(&self) {
        println!("{}", self.stats());
    }

    /// Prints the active configuration to stdout.
    pub fn print_config(&self) {
        print!("{}", self.config.describe());
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Drains every staging buffer, completes outstanding I/O, closes the
    /// file, and joins the worker. Idempotent.
    pub fn shutdown(&self) {
        let handle = self
            .worker
            .lock()
            .expect("worker handle mutex poisoned")
            .take();
        let Some(handle) = handle else {
            return;
        };
        {
            let _control = self
                .shared
                .control
                .lock()
                .expect("runtime control mutex poisoned");
            self.shared.should_exit.store(true, Ordering::Release);
            self.shared.work_added.notify_all();
        }
        if handle.join().is_err() {
            tracing::error!("compression worker panicked during shutdown");
        }
    }

    fn ensure_thread_buffer(&self) -> &StagingBuffer {
        let token = self.token();
        let ptr = match tls::current(token) {
            Some(ptr) => ptr,
            None => tls::install(token, self.shared.registry.register()),
        };
        // SAFETY: the thread's retire guard keeps the buffer alive for the
        // remaining lifetime of this thread.
        unsafe { &*ptr.as_ptr() }
    }

    fn token(&self) -> usize {
        Arc::as_ptr(&self.shared) as usize
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn open_log_file(path: &Path) -> Result<File> {
    Ok(OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?)
}

static GLOBAL: OnceLock<Runtime> = OnceLock::new();

/// The process-wide runtime, created with the default [`Config`] on first
/// use.
///
/// Panics if the default log file cannot be opened; a host that needs a
/// different destination should call [`set_log_file`] before its threads
/// start logging, or construct its own [`Runtime`].
pub fn global() -> &'static Runtime {
    GLOBAL.get_or_init(|| {
        Runtime::new(Config::default()).expect("failed to initialize the flashlog runtime")
    })
}

/// [`Runtime::reserve_alloc`] on the process-wide runtime.
#[inline]
pub fn reserve_alloc(nbytes: usize) -> NonNull<u8> {
    global().reserve_alloc(nbytes)
}

/// [`Runtime::finish_alloc`] on the process-wide runtime.
#[inline]
pub fn finish_alloc(nbytes: usize) {
    global().finish_alloc(nbytes)
}

/// [`Runtime::write_record`] on the process-wide runtime.
#[inline]
pub fn write_record(log_id: u32, payload: &[u8]) {
    global().write_record(log_id, payload)
}

/// [`Runtime::preallocate`] on the process-wide runtime.
pub fn preallocate() {
    global().preallocate()
}

/// [`Runtime::sync`] on the process-wide runtime.
pub fn sync() {
    global().sync()
}

/// [`Runtime::set_log_file`] on the process-wide runtime.
pub fn set_log_file(path: impl AsRef<Path>) -> Result<()> {
    global().set_log_file(path)
}

/// [`Runtime::print_stats`] on the process-wide runtime.
pub fn print_stats() {
    global().print_stats()
}

/// [`Runtime::print_config`] on the process-wide runtime.
pub fn print_config() {
    global().print_config()
}

/// [`Runtime::shutdown`] on the process-wide runtime.
pub fn shutdown() {
    if let Some(runtime) = GLOBAL.get() {
        runtime.shutdown();
    }
}
