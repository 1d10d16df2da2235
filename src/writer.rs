//! The sequential writer service.
//!
//! Any number of producer threads call [`SequentialWriter::submit`]; one
//! worker thread owns the file and performs every write, so writes never
//! interleave within a buffer.
//!
//! ```text
//! producers --submit--> handoff channel --> worker --> BufWriter<File> --flush--> disk
//!                          (rendezvous)        |
//!                                              +--> observers, stats, pending.done()
//! ```

use std::{
    fmt,
    fs::File,
    io::{BufWriter, Write},
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU8, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, select};

use crate::{
    config::{StartPolicy, WriterConfig},
    destination,
    error::{Result, WriteFailure, WriterError},
    observer::{ConsoleObserver, WriteObserver},
    pending::PendingCounter,
};

/// Lifecycle of a writer. Moves forward only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WriterState {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl WriterState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WriterState::Open,
            1 => WriterState::Closing,
            _ => WriterState::Closed,
        }
    }
}

/// What happened to a submitted buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Submission {
    /// A worker took the buffer (or it was queued, with a bounded handoff).
    Accepted,
    /// The writer was no longer open; nothing was written.
    Dropped,
}

/// Point-in-time counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub submitted: u64,
    pub written: u64,
    pub failed: u64,
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> WriterStats {
        // outcomes first: every write they count was already counted as submitted
        let written = self.written.load(Ordering::Acquire);
        let failed = self.failed.load(Ordering::Acquire);
        let dropped = self.dropped.load(Ordering::Acquire);
        WriterStats {
            submitted: self.submitted.load(Ordering::Acquire),
            written,
            failed,
            dropped,
        }
    }
}

pub struct SequentialWriter {
    path: PathBuf,
    config: WriterConfig,
    state: AtomicU8,

    requests_tx: Sender<Vec<u8>>,
    // dropped at the end of close; until then submits can't see a disconnected channel
    requests_rx: Mutex<Option<Receiver<Vec<u8>>>>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,

    destination: Mutex<Option<File>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    observers: Arc<[Arc<dyn WriteObserver>]>,

    pending: Arc<PendingCounter>,
    counters: Arc<Counters>,
}

impl SequentialWriter {
    /// Open `path` for appending (creating it if needed) with the default config.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, WriterConfig::default())
    }

    pub fn open_with(path: impl AsRef<Path>, config: WriterConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (file, created) =
            destination::open_append(&path, config.mode).map_err(|source| WriterError::Open {
                path: path.clone(),
                source,
            })?;

        tracing::info!(
            path = %path.display(),
            created,
            handoff = ?config.handoff,
            "opened destination"
        );

        let (requests_tx, requests_rx) = bounded(config.handoff.capacity());
        let (shutdown_tx, shutdown_rx) = bounded(0);

        Ok(Self {
            path,
            config,
            state: AtomicU8::new(WriterState::Open as u8),
            requests_tx,
            requests_rx: Mutex::new(Some(requests_rx)),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            destination: Mutex::new(Some(file)),
            workers: Mutex::new(Vec::new()),
            observers: Arc::new([Arc::new(ConsoleObserver) as Arc<dyn WriteObserver>]),
            pending: Arc::new(PendingCounter::new()),
            counters: Arc::new(Counters::default()),
        })
    }

    /// Replace the observers. Workers pick up the set that is current when they start.
    pub fn with_observers(mut self, observers: Vec<Arc<dyn WriteObserver>>) -> Self {
        self.observers = observers.into();
        self
    }

    /// Spawn a worker thread.
    pub fn start(&self) -> Result<()> {
        let mut workers = lock(&self.workers);

        // checked under the workers lock so close() either sees this worker or we see Closing
        if self.state() != WriterState::Open {
            return Err(WriterError::Closed);
        }
        if self.config.start_policy == StartPolicy::Once && !workers.is_empty() {
            return Err(WriterError::AlreadyStarted);
        }

        let requests = lock(&self.requests_rx).clone().ok_or(WriterError::Closed)?;
        let file = lock(&self.destination)
            .as_ref()
            .ok_or(WriterError::Closed)?
            .try_clone()
            .map_err(WriterError::Spawn)?;

        let id = workers.len();
        let worker = Worker {
            id,
            requests,
            shutdown: self.shutdown_rx.clone(),
            sink: self.sink(file),
        };

        let handle = thread::Builder::new()
            .name(format!("seqwrite-{id}"))
            .spawn(move || worker.run())
            .map_err(WriterError::Spawn)?;

        workers.push(handle);
        Ok(())
    }

    /// Hand `data` to the worker, blocking until it is taken.
    ///
    /// Returns [`Submission::Dropped`] without writing if the writer is closing
    /// or closed. Write failures are not reported here.
    pub fn submit(&self, data: impl Into<Vec<u8>>) -> Submission {
        if self.state() != WriterState::Open {
            return self.drop_submission();
        }

        self.pending.add();
        // a close() that began after the first check is already waiting on us or about to
        if self.state() != WriterState::Open {
            self.pending.done();
            return self.drop_submission();
        }

        // keeps submitted >= written + failed at every instant
        self.counters.submitted.fetch_add(1, Ordering::AcqRel);
        match self.requests_tx.send(data.into()) {
            Ok(()) => Submission::Accepted,
            Err(_) => {
                self.counters.submitted.fetch_sub(1, Ordering::AcqRel);
                self.pending.done();
                self.drop_submission()
            }
        }
    }

    /// Block until every accepted submission has been written (or has failed).
    pub fn wait_for_pending(&self) {
        self.pending.wait();
    }

    /// Stop the worker and close the file.
    ///
    /// Waits for pending writes first. Safe to call more than once and from
    /// several threads; only the first call does anything.
    pub fn close(&self) {
        if self
            .state
            .compare_exchange(
                WriterState::Open as u8,
                WriterState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        let mut workers = lock(&self.workers);
        if workers.is_empty() {
            // nobody to hand accepted buffers to, write them from here
            self.drain_inline();
        }
        self.pending.wait();

        drop(lock(&self.shutdown_tx).take());
        for handle in workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!(path = %self.path.display(), "writer worker panicked");
            }
        }
        drop(workers);

        drop(lock(&self.requests_rx).take());
        drop(lock(&self.destination).take());
        self.state.store(WriterState::Closed as u8, Ordering::Release);

        tracing::info!(
            path = %self.path.display(),
            stats = ?self.stats(),
            "closed destination"
        );
    }

    pub fn state(&self) -> WriterState {
        WriterState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> WriterStats {
        self.counters.snapshot()
    }

    pub fn pending(&self) -> usize {
        self.pending.get()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    fn drop_submission(&self) -> Submission {
        self.counters.dropped.fetch_add(1, Ordering::AcqRel);
        Submission::Dropped
    }

    fn sink(&self, file: File) -> Sink<File> {
        Sink {
            out: Some(BufWriter::new(file)),
            observers: Arc::clone(&self.observers),
            pending: Arc::clone(&self.pending),
            counters: Arc::clone(&self.counters),
        }
    }

    fn drain_inline(&self) {
        let Some(requests) = lock(&self.requests_rx).clone() else {
            return;
        };
        let Some(file) = lock(&self.destination).take() else {
            return;
        };
        let mut sink = self.sink(file);

        while self.pending.get() > 0 {
            match requests.recv_timeout(Duration::from_millis(10)) {
                Ok(data) => sink.write_one(data),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

impl Drop for SequentialWriter {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for SequentialWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequentialWriter")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("state", &self.state())
            .field("pending", &self.pending.get())
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The write half a worker owns: buffer, flush, report, count down.
struct Sink<W: Write> {
    // None only between a failed attempt and the reset that follows it
    out: Option<BufWriter<W>>,
    observers: Arc<[Arc<dyn WriteObserver>]>,
    pending: Arc<PendingCounter>,
    counters: Arc<Counters>,
}

impl<W: Write> Sink<W> {
    fn write_one(&mut self, data: Vec<u8>) {
        // counts the unit down even if something below unwinds
        let _done = Done(Arc::clone(&self.pending));

        for observer in self.observers.iter() {
            notify(|| observer.on_write(&data));
        }

        let mut failures = Vec::new();
        if let Some(out) = self.out.as_mut() {
            if let Err(e) = out.write_all(&data) {
                failures.push(WriteFailure::Write(e));
            }
            if let Err(e) = out.flush() {
                failures.push(WriteFailure::Flush(e));
            }
        }

        if failures.is_empty() {
            self.counters.written.fetch_add(1, Ordering::AcqRel);
        } else {
            self.discard_buffered();
            for failure in &failures {
                self.report(&data, failure);
            }
            self.counters.failed.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn report(&self, data: &[u8], failure: &WriteFailure) {
        tracing::warn!(
            stage = failure.stage(),
            error = %failure.io_error(),
            bytes = data.len(),
            "write failed"
        );
        for observer in self.observers.iter() {
            notify(|| observer.on_failure(data, failure));
        }
    }

    // bytes left over from a failed flush would otherwise go out with the next buffer
    fn discard_buffered(&mut self) {
        if let Some(out) = self.out.take() {
            let (inner, _unwritten) = out.into_parts();
            self.out = Some(BufWriter::new(inner));
        }
    }
}

struct Done(Arc<PendingCounter>);

impl Drop for Done {
    fn drop(&mut self) {
        self.0.done();
    }
}

/// Run an observer callback; a panicking observer must not take the worker down.
fn notify(callback: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
        tracing::error!("write observer panicked");
    }
}

struct Worker<W: Write> {
    id: usize,
    requests: Receiver<Vec<u8>>,
    shutdown: Receiver<()>,
    sink: Sink<W>,
}

impl<W: Write> Worker<W> {
    fn run(mut self) {
        tracing::debug!(worker = self.id, "writer worker started");
        loop {
            select! {
                recv(self.requests) -> msg => match msg {
                    Ok(data) => self.sink.write_one(data),
                    Err(_) => break,
                },
                recv(self.shutdown) -> _ => break,
            }
        }
        tracing::debug!(worker = self.id, "writer worker stopped");
    }
}
