//! Background recording of service-call performance samples.
//!
//! Callers hand samples to a [`PerformanceRecorder`]; a dedicated thread
//! writes them in batches so the hot path never waits on SQLite.

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::RecorderConfig;
use crate::db::columns::{self, Metadata};
use crate::db::performance_repo::{self, PerformanceSample};
use crate::db::Database;
use crate::error::RecorderError;

#[derive(Debug, Default)]
struct Counters {
    written: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of what the recorder has done so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecorderStats {
    pub written: u64,
    /// Samples discarded because the queue was full, the sample was
    /// invalid, or its batch failed to write.
    pub dropped: u64,
}

pub struct PerformanceRecorder {
    sender: Option<Sender<PerformanceSample>>,
    writer: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl PerformanceRecorder {
    /// Starts the writer thread.
    pub fn start(db: Database, config: &RecorderConfig) -> Result<Self, RecorderError> {
        let (sender, receiver) = bounded::<PerformanceSample>(config.capacity.max(1));
        let counters = Arc::new(Counters::default());
        let batch_size = config.batch_size.max(1);
        let flush_interval = Duration::from_millis(config.flush_interval_ms.max(1));

        let writer_counters = Arc::clone(&counters);
        let writer = thread::Builder::new()
            .name("docflow-recorder".to_string())
            .spawn(move || run_writer(db, receiver, batch_size, flush_interval, writer_counters))
            .map_err(RecorderError::SpawnFailed)?;

        info!(
            "Performance recorder started (capacity {}, batch {})",
            config.capacity, batch_size
        );

        Ok(Self {
            sender: Some(sender),
            writer: Some(writer),
            counters,
        })
    }

    /// Queues a sample. Returns `false` if it was dropped instead.
    ///
    /// Never blocks: a full queue discards the sample. Samples without a
    /// timestamp are stamped here rather than at write time.
    pub fn record(&self, mut sample: PerformanceSample) -> bool {
        let Some(sender) = self.sender.as_ref() else {
            return false;
        };

        if let Err(e) = sample.validate() {
            warn!("Rejected performance sample for {}: {}", sample.service_name, e);
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        sample.timestamp.get_or_insert_with(columns::now);

        match sender.try_send(sample) {
            Ok(()) => true,
            Err(TrySendError::Full(sample)) => {
                let dropped = self.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "Performance queue full, dropped sample for {} {} ({} dropped so far)",
                    sample.service_name, sample.endpoint, dropped
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn stats(&self) -> RecorderStats {
        RecorderStats {
            written: self.counters.written.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stops accepting samples, writes everything still queued and joins
    /// the writer thread.
    pub fn shutdown(mut self) -> Result<RecorderStats, RecorderError> {
        self.stop()?;
        Ok(self.stats())
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        // Closing the channel lets the writer drain and exit.
        drop(self.sender.take());

        if let Some(writer) = self.writer.take() {
            writer.join().map_err(|_| RecorderError::WorkerPanicked)?;
            debug!("Performance recorder stopped");
        }
        Ok(())
    }
}

impl Drop for PerformanceRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("{}", e);
        }
    }
}

fn run_writer(
    db: Database,
    receiver: Receiver<PerformanceSample>,
    batch_size: usize,
    flush_interval: Duration,
    counters: Arc<Counters>,
) {
    let mut batch: Vec<PerformanceSample> = Vec::with_capacity(batch_size);
    let mut deadline: Option<Instant> = None;

    loop {
        let received = match deadline {
            Some(at) => receiver.recv_deadline(at),
            None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(sample) => {
                if batch.is_empty() {
                    deadline = Some(Instant::now() + flush_interval);
                }
                batch.push(sample);
                if batch.len() >= batch_size {
                    flush(&db, &mut batch, &counters);
                    deadline = None;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                flush(&db, &mut batch, &counters);
                deadline = None;
            }
            Err(RecvTimeoutError::Disconnected) => {
                flush(&db, &mut batch, &counters);
                break;
            }
        }
    }
}

fn flush(db: &Database, batch: &mut Vec<PerformanceSample>, counters: &Counters) {
    if batch.is_empty() {
        return;
    }

    match performance_repo::record_batch(db, batch) {
        Ok(written) => {
            counters.written.fetch_add(written as u64, Ordering::Relaxed);
            debug!("Wrote {} performance samples", written);
        }
        Err(e) => {
            counters
                .dropped
                .fetch_add(batch.len() as u64, Ordering::Relaxed);
            error!("Failed to write {} performance samples: {}", batch.len(), e);
        }
    }
    batch.clear();
}

/// Runs `f`, records how long it took and returns its result unchanged.
///
/// `Ok` is recorded as status 200, `Err` as 500 with the error message
/// under the `error` metadata key.
pub fn measure<T, E, F>(
    recorder: &PerformanceRecorder,
    service_name: &str,
    endpoint: &str,
    f: F,
) -> Result<T, E>
where
    E: Display,
    F: FnOnce() -> Result<T, E>,
{
    let started_at = columns::now();
    let clock = Instant::now();
    let result = f();
    let elapsed = clock.elapsed().as_secs_f64();

    let sample = match &result {
        Ok(_) => PerformanceSample::new(service_name, endpoint, elapsed, 200),
        Err(e) => {
            let mut metadata = Metadata::new();
            metadata.insert("error".to_string(), e.to_string().into());
            PerformanceSample::new(service_name, endpoint, elapsed, 500).metadata(metadata)
        }
    };
    recorder.record(sample.at(started_at));

    result
}
