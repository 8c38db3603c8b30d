//! Progress channel for running operations.
//!
//! Operations report through a bounded channel. `Starting` and `Completed` are
//! always delivered; `Processing` samples are sent with `try_send`, so a
//! consumer that falls behind loses samples instead of stalling the transfer.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use ferry_core::{Operation, OperationResult, ProgressEvent};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Create a progress channel with the given capacity.
pub fn progress_channel(capacity: usize) -> (ProgressSink, mpsc::Receiver<ProgressEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ProgressSink { tx: Some(tx) }, rx)
}

/// Producer side of a progress channel.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressSink {
    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    pub async fn starting(&self, operation: &Operation) {
        if let Some(tx) = &self.tx {
            let _ = tx
                .send(ProgressEvent::Starting {
                    operation: operation.clone(),
                    total_items: operation.total_items(),
                })
                .await;
        }
    }

    /// Offer a sample without waiting. Returns false if it was dropped.
    pub fn sample(&self, event: ProgressEvent) -> bool {
        match &self.tx {
            Some(tx) => match tx.try_send(event) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => false,
            },
            None => false,
        }
    }

    pub async fn completed(&self, result: &OperationResult) {
        if let Some(tx) = &self.tx {
            let _ = tx
                .send(ProgressEvent::Completed {
                    result: result.clone(),
                })
                .await;
        }
    }
}

#[derive(Debug)]
struct CurrentItem {
    name: String,
    index: usize,
    bytes: u64,
    last_sample: Option<Instant>,
}

/// Turns per-file byte counts into throttled `Processing` samples.
///
/// Byte counts are cumulative across the whole operation. Shared by
/// concurrent delete tasks, so all state is behind atomics or a mutex.
#[derive(Debug)]
pub struct TransferMeter {
    sink: ProgressSink,
    total_items: usize,
    total_bytes: u64,
    interval: Duration,
    started: Instant,
    finished_bytes: AtomicU64,
    finished_items: AtomicUsize,
    current: Mutex<CurrentItem>,
}

impl TransferMeter {
    pub fn new(sink: ProgressSink, total_items: usize, total_bytes: u64, interval: Duration) -> Self {
        Self {
            sink,
            total_items,
            total_bytes,
            interval,
            started: Instant::now(),
            finished_bytes: AtomicU64::new(0),
            finished_items: AtomicUsize::new(0),
            current: Mutex::new(CurrentItem {
                name: String::new(),
                index: 0,
                bytes: 0,
                last_sample: None,
            }),
        }
    }

    /// A new item starts; always sampled.
    pub fn begin_item(&self, name: &str, index: usize) {
        if let Ok(mut current) = self.current.lock() {
            current.name = name.to_string();
            current.index = index;
            current.bytes = 0;
            current.last_sample = None;
        }
        self.emit(true);
    }

    /// Cumulative bytes of the current item, never decreasing; sampled at
    /// most once per interval.
    pub fn advance(&self, item_bytes: u64) {
        if let Ok(mut current) = self.current.lock() {
            current.bytes = current.bytes.max(item_bytes);
        }
        self.emit(false);
    }

    /// The current item is done after moving `item_bytes`; always sampled.
    pub fn finish_item(&self, item_bytes: u64) {
        let reported = match self.current.lock() {
            Ok(mut current) => std::mem::take(&mut current.bytes),
            Err(_) => 0,
        };
        self.finished_bytes
            .fetch_add(item_bytes.max(reported), Ordering::Relaxed);
        self.finished_items.fetch_add(1, Ordering::Relaxed);
        self.emit(true);
    }

    /// Items finished so far.
    pub fn finished_items(&self) -> usize {
        self.finished_items.load(Ordering::Relaxed)
    }

    fn emit(&self, force: bool) {
        if !self.sink.is_enabled() {
            return;
        }
        let event = {
            let Ok(mut current) = self.current.lock() else {
                return;
            };
            let now = Instant::now();
            let due = current
                .last_sample
                .is_none_or(|last| now.duration_since(last) >= self.interval);
            if !force && !due {
                return;
            }
            current.last_sample = Some(now);

            let bytes_transferred = self.finished_bytes.load(Ordering::Relaxed) + current.bytes;
            let elapsed = now.duration_since(self.started).as_secs_f64();
            let speed = if elapsed > 0.0 {
                (bytes_transferred as f64 / elapsed) as u64
            } else {
                0
            };
            ProgressEvent::Processing {
                current_item: current.name.clone(),
                index: current.index,
                total: self.total_items,
                bytes_transferred,
                total_bytes: self.total_bytes,
                speed_bytes_per_second: speed,
            }
        };
        self.sink.sample(event);
    }
}
