use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::sync::{lock, read, write};

/// Samples kept per pane when no capacity is given
pub const DEFAULT_MAX_SAMPLES: usize = 10;

/// One output-growth measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocitySample {
    pub timestamp: DateTime<Utc>,
    /// Characters added since the previous capture; zero means the capture
    /// happened but nothing new was printed
    pub chars_added: usize,
    /// Characters per second
    pub velocity: f64,
}

#[derive(Debug)]
struct TrackerState {
    samples: VecDeque<VelocitySample>,
    last_capture: String,
    last_capture_at: Option<DateTime<Utc>>,
}

impl TrackerState {
    fn push(&mut self, sample: VelocitySample, max_samples: usize) {
        while self.samples.len() >= max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    fn last_output_sample(&self) -> Option<&VelocitySample> {
        self.samples.iter().rev().find(|s| s.chars_added > 0)
    }

    fn mean_of_last(&self, n: usize) -> f64 {
        let len = self.samples.len();
        if len == 0 {
            return 0.0;
        }

        let n = if n == 0 || n > len { len } else { n };
        let sum: f64 = self.samples.iter().skip(len - n).map(|s| s.velocity).sum();
        sum / n as f64
    }
}

/// Bounded history of output velocity for a single pane.
///
/// Oldest samples are evicted first once the capacity is reached.
#[derive(Debug)]
pub struct VelocityTracker {
    pane_id: String,
    max_samples: usize,
    state: Mutex<TrackerState>,
}

impl VelocityTracker {
    pub fn new(pane_id: impl Into<String>) -> Self {
        Self::with_capacity(pane_id, DEFAULT_MAX_SAMPLES)
    }

    /// A tracker keeping at most `max_samples` samples; zero falls back to
    /// [`DEFAULT_MAX_SAMPLES`].
    pub fn with_capacity(pane_id: impl Into<String>, max_samples: usize) -> Self {
        let max_samples = if max_samples == 0 {
            DEFAULT_MAX_SAMPLES
        } else {
            max_samples
        };

        Self {
            pane_id: pane_id.into(),
            max_samples,
            state: Mutex::new(TrackerState {
                samples: VecDeque::with_capacity(max_samples),
                last_capture: String::new(),
                last_capture_at: None,
            }),
        }
    }

    pub fn pane_id(&self) -> &str {
        &self.pane_id
    }

    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    pub fn add_sample(&self, sample: VelocitySample) {
        lock(&self.state).push(sample, self.max_samples);
    }

    /// Record a fresh capture of the pane's (escape-stripped) text.
    ///
    /// The delta is counted in characters against the previous capture and
    /// never goes negative (scrolls and clears count as no output). The
    /// first capture has no elapsed time and yields zero velocity.
    pub fn record_capture(&self, text: &str, now: DateTime<Utc>) -> VelocitySample {
        let mut state = lock(&self.state);

        let current = text.chars().count();
        let previous = state.last_capture.chars().count();
        let chars_added = current.saturating_sub(previous);

        let velocity = match state.last_capture_at {
            Some(prev) => {
                let elapsed = (now - prev).to_std().map_or(0.0, |d| d.as_secs_f64());
                if elapsed > 0.0 {
                    chars_added as f64 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        let sample = VelocitySample {
            timestamp: now,
            chars_added,
            velocity,
        };
        state.push(sample, self.max_samples);
        state.last_capture = text.to_string();
        state.last_capture_at = Some(now);

        trace!(pane = %self.pane_id, chars_added, velocity, "recorded capture");
        sample
    }

    /// Velocity of the newest sample, 0 when empty
    pub fn current_velocity(&self) -> f64 {
        lock(&self.state)
            .samples
            .back()
            .map_or(0.0, |s| s.velocity)
    }

    /// Mean velocity over the whole window
    pub fn average_velocity(&self) -> f64 {
        lock(&self.state).mean_of_last(0)
    }

    /// Mean velocity over the last `n` samples; zero or an oversized `n`
    /// averages the whole window.
    pub fn recent_velocity(&self, n: usize) -> f64 {
        lock(&self.state).mean_of_last(n)
    }

    pub fn sample_count(&self) -> usize {
        lock(&self.state).samples.len()
    }

    /// Copy of the window, oldest first
    pub fn samples(&self) -> Vec<VelocitySample> {
        lock(&self.state).samples.iter().copied().collect()
    }

    /// Text of the last capture
    pub fn last_capture(&self) -> String {
        lock(&self.state).last_capture.clone()
    }

    pub fn last_capture_at(&self) -> Option<DateTime<Utc>> {
        lock(&self.state).last_capture_at
    }

    /// Time between the newest sample that carried output and the last
    /// capture.
    ///
    /// With no output in the window this measures from the oldest sample
    /// instead; with no samples at all it is zero.
    pub fn last_output_age(&self) -> Duration {
        let state = lock(&self.state);

        let Some(newest) = state.samples.back() else {
            return Duration::ZERO;
        };
        let reference = state.last_capture_at.unwrap_or(newest.timestamp);

        let since = match state.last_output_sample() {
            Some(sample) => sample.timestamp,
            None => state.samples.front().map_or(reference, |s| s.timestamp),
        };

        (reference - since).to_std().unwrap_or(Duration::ZERO)
    }

    /// Timestamp of the newest sample that carried output
    pub fn last_output_time(&self) -> Option<DateTime<Utc>> {
        lock(&self.state).last_output_sample().map(|s| s.timestamp)
    }

    pub fn reset(&self) {
        let mut state = lock(&self.state);
        state.samples.clear();
        state.last_capture.clear();
        state.last_capture_at = None;
    }
}

/// Velocity trackers keyed by pane id
#[derive(Debug)]
pub struct VelocityManager {
    trackers: RwLock<HashMap<String, Arc<VelocityTracker>>>,
    max_samples: usize,
}

impl VelocityManager {
    pub fn new() -> Self {
        Self::with_max_samples(DEFAULT_MAX_SAMPLES)
    }

    /// A manager whose trackers keep `max_samples` samples each
    pub fn with_max_samples(max_samples: usize) -> Self {
        Self {
            trackers: RwLock::new(HashMap::new()),
            max_samples,
        }
    }

    /// The tracker for `pane_id`, created on first use
    pub fn get_or_create(&self, pane_id: &str) -> Arc<VelocityTracker> {
        if let Some(tracker) = read(&self.trackers).get(pane_id) {
            return Arc::clone(tracker);
        }

        let mut trackers = write(&self.trackers);
        let tracker = trackers.entry(pane_id.to_string()).or_insert_with(|| {
            debug!(pane = %pane_id, "creating velocity tracker");
            Arc::new(VelocityTracker::with_capacity(pane_id, self.max_samples))
        });
        Arc::clone(tracker)
    }

    pub fn get(&self, pane_id: &str) -> Option<Arc<VelocityTracker>> {
        read(&self.trackers).get(pane_id).cloned()
    }

    pub fn remove(&self, pane_id: &str) -> Option<Arc<VelocityTracker>> {
        write(&self.trackers).remove(pane_id)
    }

    pub fn clear(&self) {
        write(&self.trackers).clear();
    }

    pub fn tracker_count(&self) -> usize {
        read(&self.trackers).len()
    }

    /// Feed a capture for `pane_id`, creating its tracker if needed
    pub fn record_capture(&self, pane_id: &str, text: &str, now: DateTime<Utc>) -> VelocitySample {
        self.get_or_create(pane_id).record_capture(text, now)
    }

    /// Current velocity of every tracked pane
    pub fn all_velocities(&self) -> HashMap<String, f64> {
        read(&self.trackers)
            .iter()
            .map(|(id, tracker)| (id.clone(), tracker.current_velocity()))
            .collect()
    }
}

impl Default for VelocityManager {
    fn default() -> Self {
        Self::new()
    }
}
