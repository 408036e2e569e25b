//! C7: the watcher pipeline. Wires an OS filesystem notifier
//! (`notify`) through the ignore filter into the [`crate::debounce`]
//! coalescer, and drains ready batches to a channel the consumer (C8, or a
//! test) reads from: a `notify` callback feeds an `mpsc` channel that a
//! single background thread drains, extended with an explicit phase state
//! machine plus backpressure shedding and memory-threshold checks.

use crate::debounce::Coalescer;
use crate::event::{ChangeEvent, ChangeKind, RawEvent};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use scry_core::config::WatchConfig;
use scry_core::error::WatcherError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::ignore_filter::IgnoreFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherPhase {
    Idle,
    Starting,
    Ready,
    Watching,
    Stopping,
    Stopped,
    Failed,
}

/// One delivered batch: at most `batch_size` events, in deterministic
/// delivery order.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub events: Vec<ChangeEvent>,
}

/// Alerts the consumer can observe without the pipeline tearing itself
/// down outright.
#[derive(Debug, Clone)]
pub enum WatcherAlert {
    Memory(WatcherError),
    QueueOverflow { pending: usize, shed: usize },
}

struct SharedCounters {
    last_event_at_ms: std::sync::atomic::AtomicU64,
    memory_gauge_mb: std::sync::Mutex<f64>,
}

pub struct WatcherPipeline {
    root: PathBuf,
    cfg: WatchConfig,
    phase: WatcherPhase,
    ignore: Arc<IgnoreFilter>,
    batch_rx: Option<mpsc::Receiver<Batch>>,
    alert_rx: Option<mpsc::Receiver<WatcherAlert>>,
    stop_flag: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    fs_watcher: Option<RecommendedWatcher>,
    counters: Arc<SharedCounters>,
}

impl WatcherPipeline {
    pub fn new(root: impl Into<PathBuf>, cfg: WatchConfig, ignore: Arc<IgnoreFilter>) -> Self {
        Self {
            root: root.into(),
            cfg,
            phase: WatcherPhase::Idle,
            ignore,
            batch_rx: None,
            alert_rx: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: None,
            fs_watcher: None,
            counters: Arc::new(SharedCounters {
                last_event_at_ms: std::sync::atomic::AtomicU64::new(0),
                memory_gauge_mb: std::sync::Mutex::new(0.0),
            }),
        }
    }

    pub fn phase(&self) -> WatcherPhase {
        self.phase
    }

    pub fn memory_gauge_mb(&self) -> f64 {
        *self.counters.memory_gauge_mb.lock().expect("memory gauge mutex poisoned")
    }

    /// Starts watching `self.root` recursively. Transitions
    /// `Idle -> Starting -> Ready -> Watching`, or `-> Failed` if the OS
    /// watcher cannot be created.
    pub fn start(&mut self) -> Result<(), WatcherError> {
        self.phase = WatcherPhase::Starting;

        let (raw_tx, raw_rx) = mpsc::channel::<RawEvent>();
        let ignore = Arc::clone(&self.ignore);
        let root_for_cb = self.root.clone();

        let watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                let Ok(event) = res else { return };
                for raw in translate_event(&root_for_cb, &ignore, event) {
                    // Never block the OS notification thread: an unbounded
                    // mpsc send only allocates, it does not wait.
                    let _ = raw_tx.send(raw);
                }
            },
            notify::Config::default(),
        );

        let mut watcher = match watcher {
            Ok(w) => w,
            Err(e) => {
                tracing::error!(root = %self.root.display(), error = %e, "failed to create filesystem watcher");
                self.phase = WatcherPhase::Failed;
                return Err(WatcherError::Timeout {
                    elapsed_ms: 0,
                    budget_ms: self.cfg.watcher_timeout_ms,
                });
            }
        };

        if let Err(e) = Watcher::watch(&mut watcher, &self.root, RecursiveMode::Recursive) {
            tracing::error!(root = %self.root.display(), error = %e, "failed to start filesystem watcher");
            self.phase = WatcherPhase::Failed;
            return Err(WatcherError::Timeout {
                elapsed_ms: 0,
                budget_ms: self.cfg.watcher_timeout_ms,
            });
        }

        self.phase = WatcherPhase::Ready;

        let (batch_tx, batch_rx) = mpsc::channel::<Batch>();
        let (alert_tx, alert_rx) = mpsc::channel::<WatcherAlert>();
        let stop_flag = Arc::clone(&self.stop_flag);
        let cfg = self.cfg.clone();
        let counters = Arc::clone(&self.counters);

        let worker = std::thread::spawn(move || {
            run_worker(cfg, raw_rx, batch_tx, alert_tx, stop_flag, counters);
        });

        self.fs_watcher = Some(watcher);
        self.worker = Some(worker);
        self.batch_rx = Some(batch_rx);
        self.alert_rx = Some(alert_rx);
        self.phase = WatcherPhase::Watching;
        Ok(())
    }

    /// Blocks until the next batch is ready or `timeout` elapses.
    pub fn recv_batch(&self, timeout: Duration) -> Option<Batch> {
        self.batch_rx.as_ref()?.recv_timeout(timeout).ok()
    }

    pub fn try_recv_alert(&self) -> Option<WatcherAlert> {
        self.alert_rx.as_ref()?.try_recv().ok()
    }

    /// Graceful shutdown: signals the worker to drain and stop,
    /// waits for it to join, and drops the OS watcher.
    pub fn stop(&mut self) {
        if self.phase != WatcherPhase::Watching {
            return;
        }
        self.phase = WatcherPhase::Stopping;
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        self.fs_watcher = None;
        self.phase = WatcherPhase::Stopped;
    }
}

fn translate_event(root: &Path, ignore: &IgnoreFilter, event: Event) -> Vec<RawEvent> {
    let now_ms = logical_now_ms();
    let to_relative = |p: &Path| -> Option<String> {
        let rel = p.strip_prefix(root).unwrap_or(p);
        Some(rel.to_string_lossy().replace('\\', "/"))
    };

    match event.kind {
        EventKind::Create(_) => event
            .paths
            .iter()
            .filter_map(|p| to_relative(p))
            .filter(|rel| !ignore.is_ignored(rel, false))
            .map(|path| RawEvent {
                path,
                kind: ChangeKind::Create,
                observed_at_ms: now_ms,
            })
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .filter_map(|p| to_relative(p))
            .filter(|rel| !ignore.is_ignored(rel, false))
            .map(|path| RawEvent {
                path,
                kind: ChangeKind::Delete,
                observed_at_ms: now_ms,
            })
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            let Some(old) = to_relative(&event.paths[0]) else {
                return Vec::new();
            };
            let Some(new) = to_relative(&event.paths[1]) else {
                return Vec::new();
            };
            if ignore.is_ignored(&new, false) {
                return Vec::new();
            }
            vec![RawEvent {
                path: new,
                kind: ChangeKind::Rename { old_path: old },
                observed_at_ms: now_ms,
            }]
        }
        EventKind::Modify(_) => event
            .paths
            .iter()
            .filter_map(|p| to_relative(p))
            .filter(|rel| !ignore.is_ignored(rel, false))
            .map(|path| RawEvent {
                path,
                kind: ChangeKind::Modify,
                observed_at_ms: now_ms,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Monotonic millisecond clock for the coalescer's logical time, derived
/// from a process-local `Instant` epoch rather than wall-clock time (the
/// coalescer only ever compares deltas).
fn logical_now_ms() -> u64 {
    use std::sync::OnceLock;
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_millis() as u64
}

fn run_worker(
    cfg: WatchConfig,
    raw_rx: mpsc::Receiver<RawEvent>,
    batch_tx: mpsc::Sender<Batch>,
    alert_tx: mpsc::Sender<WatcherAlert>,
    stop_flag: Arc<AtomicBool>,
    counters: Arc<SharedCounters>,
) {
    let mut coalescer = Coalescer::new(cfg.debounce_delay_ms);
    let tick = Duration::from_millis((cfg.debounce_delay_ms / 2).max(10));
    let mut last_memory_check = Instant::now();
    let memory_check_interval = Duration::from_secs(cfg.memory_check_interval_secs.max(1));

    loop {
        match raw_rx.recv_timeout(tick) {
            Ok(event) => {
                counters
                    .last_event_at_ms
                    .store(event.observed_at_ms, Ordering::Relaxed);
                coalescer.observe(event);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        if coalescer.pending_count() > cfg.max_queue_size {
            let shed = coalescer.shed_excess(cfg.max_queue_size);
            if shed > 0 {
                tracing::warn!(
                    pending = coalescer.pending_count(),
                    cap = cfg.max_queue_size,
                    shed,
                    "watcher event queue overflow, shedding events"
                );
                let _ = alert_tx.send(WatcherAlert::QueueOverflow {
                    pending: coalescer.pending_count(),
                    shed,
                });
            }
        }

        let now_ms = logical_now_ms();
        let mut ready = coalescer.drain_ready(now_ms);
        while !ready.is_empty() {
            let take = ready.len().min(cfg.batch_size.max(1));
            let chunk: Vec<ChangeEvent> = ready.drain(..take).collect();
            if batch_tx.send(Batch { events: chunk }).is_err() {
                return;
            }
        }

        if last_memory_check.elapsed() >= memory_check_interval {
            last_memory_check = Instant::now();
            let resident_mb = resident_memory_mb();
            *counters.memory_gauge_mb.lock().expect("memory gauge mutex poisoned") = resident_mb;
            if resident_mb > cfg.memory_threshold_mb * 1.5 {
                let _ = alert_tx.send(WatcherAlert::Memory(WatcherError::MemoryFatal {
                    resident_mb,
                    threshold_mb: cfg.memory_threshold_mb,
                }));
                return;
            } else if resident_mb > cfg.memory_threshold_mb {
                let _ = alert_tx.send(WatcherAlert::Memory(WatcherError::MemoryAlert {
                    resident_mb,
                    threshold_mb: cfg.memory_threshold_mb,
                }));
            }
        }

        if stop_flag.load(Ordering::SeqCst) {
            let remaining = coalescer.drain_all();
            if !remaining.is_empty() {
                let _ = batch_tx.send(Batch { events: remaining });
            }
            break;
        }
    }
}

/// Best-effort resident set size in MiB. Reads `/proc/self/status` on
/// Linux (where this workspace's CI and deployment targets run); returns
/// `0.0` elsewhere rather than pulling in a cross-platform process-metrics
/// crate for a single gauge.
fn resident_memory_mb() -> f64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(contents) = std::fs::read_to_string("/proc/self/status") {
            for line in contents.lines() {
                if let Some(rest) = line.strip_prefix("VmRSS:") {
                    let kb: f64 = rest
                        .trim()
                        .trim_end_matches(" kB")
                        .trim()
                        .parse()
                        .unwrap_or(0.0);
                    return kb / 1024.0;
                }
            }
        }
        0.0
    }
    #[cfg(not(target_os = "linux"))]
    {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn start_and_stop_transitions_through_the_state_machine() {
        let dir = tempdir().unwrap();
        let ignore = Arc::new(IgnoreFilter::build(dir.path(), ".scry", &[], 100).unwrap());
        let mut pipeline = WatcherPipeline::new(dir.path(), WatchConfig::default(), ignore);
        assert_eq!(pipeline.phase(), WatcherPhase::Idle);
        pipeline.start().unwrap();
        assert_eq!(pipeline.phase(), WatcherPhase::Watching);
        pipeline.stop();
        assert_eq!(pipeline.phase(), WatcherPhase::Stopped);
    }

    #[test]
    fn file_write_eventually_produces_a_batch() {
        let dir = tempdir().unwrap();
        let ignore = Arc::new(IgnoreFilter::build(dir.path(), ".scry", &[], 100).unwrap());
        let mut cfg = WatchConfig::default();
        cfg.debounce_delay_ms = 50;
        let mut pipeline = WatcherPipeline::new(dir.path(), cfg, ignore);
        pipeline.start().unwrap();

        std::fs::write(dir.path().join("new_file.rs"), b"fn main() {}").unwrap();

        let batch = pipeline.recv_batch(Duration::from_secs(5));
        pipeline.stop();

        let batch = batch.expect("expected a batch within the timeout");
        assert!(batch.events.iter().any(|e| e.path == "new_file.rs"));
    }
}
