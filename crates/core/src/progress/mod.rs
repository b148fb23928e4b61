//! Progress reporting for conversion runs.
//!
//! [`ProgressReporter`] holds the true percentage of the current run and
//! publishes it on a `watch` channel. [`ProgressDisplay`] and
//! [`spawn_smoother`] derive a cosmetic value that walks toward the true one
//! a point per tick.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Configuration for progress reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Display animation tick in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Buffer for engine progress messages.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_tick_ms() -> u64 {
    30
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl ProgressConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// True progress of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Run the percentage belongs to.
    pub run: u64,
    /// Integer percentage in [0, 100].
    pub percent: u8,
}

/// Converts an engine ratio to a whole percentage.
pub fn ratio_to_percent(ratio: f64) -> u8 {
    if !ratio.is_finite() {
        return 0;
    }
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Publishes the true percentage of the current run.
///
/// Within a run the value never decreases. Reports tagged with another run
/// are dropped.
#[derive(Debug)]
pub struct ProgressReporter {
    tx: watch::Sender<ProgressSnapshot>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ProgressSnapshot::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> ProgressSnapshot {
        *self.tx.borrow()
    }

    /// Starts `run` at 0%.
    pub fn begin_run(&self, run: u64) {
        self.tx.send_replace(ProgressSnapshot { run, percent: 0 });
    }

    /// Clears progress. Any run other than `run` becomes stale.
    pub fn clear(&self, run: u64) {
        self.begin_run(run);
    }

    /// Records an engine ratio for `run`. Returns whether the value advanced.
    pub fn record(&self, run: u64, ratio: f64) -> bool {
        let percent = ratio_to_percent(ratio);
        self.tx.send_if_modified(|snapshot| {
            if snapshot.run != run {
                debug!("Dropping progress for stale run {}", run);
                return false;
            }
            if percent <= snapshot.percent {
                return false;
            }
            snapshot.percent = percent;
            true
        })
    }
}

/// Cosmetic display value that advances one point per tick.
#[derive(Debug, Default)]
pub struct ProgressDisplay {
    run: u64,
    shown: u8,
}

impl ProgressDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> u8 {
        self.shown
    }

    /// Advances toward `target` and returns the new display value.
    /// A new run snaps the display back to 0.
    pub fn tick(&mut self, target: ProgressSnapshot) -> u8 {
        if target.run != self.run {
            self.run = target.run;
            self.shown = 0;
        }
        if self.shown < target.percent {
            self.shown += 1;
        }
        self.shown
    }
}

/// Spawns a task that smooths `source` into a display channel.
///
/// The task stops when the source sender is dropped or when every display
/// receiver is gone.
pub fn spawn_smoother(
    mut source: watch::Receiver<ProgressSnapshot>,
    tick: Duration,
) -> (watch::Receiver<u8>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(0u8);

    let handle = tokio::spawn(async move {
        let mut display = ProgressDisplay::new();
        let mut interval = tokio::time::interval(tick);

        loop {
            interval.tick().await;

            if source.has_changed().is_err() || tx.is_closed() {
                break;
            }

            let target = *source.borrow_and_update();
            let shown = display.tick(target);
            tx.send_if_modified(|current| {
                if *current != shown {
                    *current = shown;
                    true
                } else {
                    false
                }
            });
        }
    });

    (rx, handle)
}
