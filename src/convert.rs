//! Background ETL-to-text conversion
//!
//! The native conversion is a single opaque call, so the only progress that can be reported is
//! "queued", "running" and "done". At most one job is tracked per [`ConversionRunner`]: starting a
//! new one makes the previous one invisible.
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::collector::Converter;
use crate::native::{panic_message, NativeError};

/// Convert module errors
#[derive(Debug)]
pub enum ConversionError {
    /// The conversion delegate could not be invoked or failed. No partial output is promised.
    ConversionAbortError(NativeError),
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionError::ConversionAbortError(err) => write!(f, "conversion aborted: {}", err),
        }
    }
}

impl std::error::Error for ConversionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConversionError::ConversionAbortError(err) => Some(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ConversionStatus {
    Started,
    InProgress,
    Aborted,
    Completed,
}

impl ConversionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConversionStatus::Aborted | ConversionStatus::Completed)
    }
}

/// Snapshot of the tracked job
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ConversionProgress {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub status: ConversionStatus,
    /// Coarse: 0 until the delegate returns successfully, then 100
    pub percent_complete: u8,
}

#[derive(Debug)]
struct Job {
    generation: u64,
    progress: ConversionProgress,
    /// Whether a `status()` call has seen this job as `Started` yet
    start_reported: bool,
    error: Option<ConversionError>,
}

#[derive(Debug, Default)]
struct Slot {
    job: Mutex<Option<Job>>,
    changed: Condvar,
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, Option<Job>> {
        // A panic while holding the lock cannot leave a `Job` half-written, the state stays usable
        self.job.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `f` to the job only if it still is the one started as `generation`
    fn update<F: FnOnce(&mut Job)>(&self, generation: u64, f: F) {
        let mut guard = self.lock();
        if let Some(job) = guard.as_mut().filter(|job| job.generation == generation) {
            f(job);
            self.changed.notify_all();
        }
    }
}

/// Runs conversions on a worker thread and exposes their status
pub struct ConversionRunner {
    converter: Arc<dyn Converter>,
    slot: Arc<Slot>,
    next_generation: u64,
}

impl ConversionRunner {
    pub fn new<T: Converter + 'static>(converter: T) -> Self {
        Self::from_arc(Arc::new(converter))
    }

    pub fn from_arc(converter: Arc<dyn Converter>) -> Self {
        Self {
            converter,
            slot: Arc::new(Slot::default()),
            next_generation: 0,
        }
    }

    /// Queues a conversion and returns immediately
    ///
    /// The caller must not delete `source` (e.g. by starting a new capture) until the job is over.
    pub fn start_convert<P: AsRef<Path>, Q: AsRef<Path>>(&mut self, source: P, destination: Q) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let source = source.as_ref().to_path_buf();
        let destination = destination.as_ref().to_path_buf();

        {
            let mut guard = self.slot.lock();
            *guard = Some(Job {
                generation,
                progress: ConversionProgress {
                    source: source.clone(),
                    destination: destination.clone(),
                    status: ConversionStatus::Started,
                    percent_complete: 0,
                },
                start_reported: false,
                error: None,
            });
            self.slot.changed.notify_all();
        }

        log::debug!("Converting {} into {}", source.display(), destination.display());
        let converter = Arc::clone(&self.converter);
        let slot = Arc::clone(&self.slot);
        std::thread::spawn(move || run_job(converter, slot, generation, source, destination));
    }

    /// Last known status of the tracked job, `None` if nothing was ever started
    ///
    /// A job is always reported as `Started` at least once before any later status.
    pub fn status(&self) -> Option<ConversionProgress> {
        let mut guard = self.slot.lock();
        let job = guard.as_mut()?;

        if !job.start_reported {
            job.start_reported = true;
            return Some(ConversionProgress {
                status: ConversionStatus::Started,
                ..job.progress.clone()
            });
        }

        Some(job.progress.clone())
    }

    /// Whether the tracked job reached `Completed` or `Aborted`
    pub fn is_finished(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .map_or(false, |job| job.progress.status.is_terminal())
    }

    /// Blocks until the tracked job is over and returns its final status
    ///
    /// There is no timeout: the native conversion cannot be cancelled.
    pub fn wait(&self) -> Option<ConversionProgress> {
        let mut guard = self.slot.lock();
        loop {
            let finished = match guard.as_ref() {
                None => return None,
                Some(job) => job.progress.status.is_terminal(),
            };
            if finished {
                break;
            }
            guard = self
                .slot
                .changed
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner);
        }
        guard.as_mut().map(|job| {
            job.start_reported = true;
            job.progress.clone()
        })
    }

    /// Takes the error of an aborted job, if any
    pub fn take_error(&self) -> Option<ConversionError> {
        self.slot.lock().as_mut().and_then(|job| job.error.take())
    }
}

impl fmt::Debug for ConversionRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionRunner")
            .field("job", &*self.slot.lock())
            .finish()
    }
}

fn run_job(
    converter: Arc<dyn Converter>,
    slot: Arc<Slot>,
    generation: u64,
    source: PathBuf,
    destination: PathBuf,
) {
    slot.update(generation, |job| job.progress.status = ConversionStatus::InProgress);

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| converter.convert(&source, &destination)))
        .unwrap_or_else(|payload| Err(NativeError::Panicked(panic_message(payload.as_ref()))));

    match outcome {
        Ok(()) => {
            log::info!("Converted {} into {}", source.display(), destination.display());
            slot.update(generation, |job| {
                job.progress.status = ConversionStatus::Completed;
                job.progress.percent_complete = 100;
            });
        }
        Err(err) => {
            log::error!("Conversion of {} aborted: {}", source.display(), err);
            slot.update(generation, |job| {
                job.progress.status = ConversionStatus::Aborted;
                job.error = Some(ConversionError::ConversionAbortError(err));
            });
        }
    }
}
