//! Raw per-exercise time series accumulated frame by frame.
//!
//! Samples are stored unsmoothed in normalized [0, 1] image coordinates. Every
//! variance reduction happens later in the static metrics calculator.

use biomech_core::{geometry, names, normalize, AngleName, FrameSize, PoseFrame, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::angles::StaticAngles;

/// Default number of samples kept per series (45 s at 20 Hz)
pub const DEFAULT_HISTORY_CAPACITY: usize = 900;

/// Bounded, append-only sample sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl Series {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Append a sample, evicting the oldest when full
    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + Clone + '_ {
        self.samples.iter().copied()
    }

    pub fn mean(&self) -> Option<f64> {
        geometry::mean(self.iter())
    }

    /// Population standard deviation, 0 below two samples
    pub fn std_dev(&self) -> f64 {
        geometry::std_dev(self.iter())
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// All raw series for the currently selected exercise
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMetricsHistory {
    /// Centre-of-mass proxy (mean of visible shoulders and hips)
    pub com_x: Series,
    pub com_y: Series,
    pub left_hip_y: Series,
    pub right_hip_y: Series,
    pub left_shoulder_y: Series,
    pub right_shoulder_y: Series,
    pub left_knee_x: Series,
    pub right_knee_x: Series,
    pub left_ankle_x: Series,
    pub right_ankle_x: Series,
    pub angles: BTreeMap<AngleName, Series>,
    /// Frames appended since the last reset
    pub frame_count: usize,
    capacity: usize,
}

impl RawMetricsHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            com_x: Series::new(capacity),
            com_y: Series::new(capacity),
            left_hip_y: Series::new(capacity),
            right_hip_y: Series::new(capacity),
            left_shoulder_y: Series::new(capacity),
            right_shoulder_y: Series::new(capacity),
            left_knee_x: Series::new(capacity),
            right_knee_x: Series::new(capacity),
            left_ankle_x: Series::new(capacity),
            right_ankle_x: Series::new(capacity),
            angles: BTreeMap::new(),
            frame_count: 0,
            capacity,
        }
    }

    pub fn angle(&self, name: AngleName) -> Option<&Series> {
        self.angles.get(&name)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count == 0
    }
}

impl Default for RawMetricsHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

/// Appends frame-derived samples to a [`RawMetricsHistory`]
#[derive(Debug, Clone)]
pub struct RawMetricsAggregator {
    history: RawMetricsHistory,
    min_confidence: f64,
}

impl RawMetricsAggregator {
    pub fn new(capacity: usize, min_confidence: f64) -> Self {
        Self {
            history: RawMetricsHistory::new(capacity),
            min_confidence,
        }
    }

    /// Append one sample per available quantity of `frame`
    pub fn push_frame(
        &mut self,
        frame: &PoseFrame,
        size: FrameSize,
        angles: &StaticAngles,
    ) -> Result<()> {
        size.validate()?;
        if !frame.is_valid {
            return Ok(());
        }

        let min_confidence = self.min_confidence;
        let point = |name: &str| {
            frame
                .confident(name, min_confidence)
                .map(|kp| (normalize(kp.x, size.width), normalize(kp.y, size.height)))
        };

        let left_shoulder = point(names::LEFT_SHOULDER);
        let right_shoulder = point(names::RIGHT_SHOULDER);
        let left_hip = point(names::LEFT_HIP);
        let right_hip = point(names::RIGHT_HIP);

        let trunk: Vec<(f64, f64)> = [left_shoulder, right_shoulder, left_hip, right_hip]
            .into_iter()
            .flatten()
            .collect();
        let h = &mut self.history;
        if !trunk.is_empty() {
            let n = trunk.len() as f64;
            h.com_x.push(trunk.iter().map(|p| p.0).sum::<f64>() / n);
            h.com_y.push(trunk.iter().map(|p| p.1).sum::<f64>() / n);
        }

        if let Some(p) = left_hip {
            h.left_hip_y.push(p.1);
        }
        if let Some(p) = right_hip {
            h.right_hip_y.push(p.1);
        }
        if let Some(p) = left_shoulder {
            h.left_shoulder_y.push(p.1);
        }
        if let Some(p) = right_shoulder {
            h.right_shoulder_y.push(p.1);
        }
        if let Some(p) = point(names::LEFT_KNEE) {
            h.left_knee_x.push(p.0);
        }
        if let Some(p) = point(names::RIGHT_KNEE) {
            h.right_knee_x.push(p.0);
        }
        if let Some(p) = point(names::LEFT_ANKLE) {
            h.left_ankle_x.push(p.0);
        }
        if let Some(p) = point(names::RIGHT_ANKLE) {
            h.right_ankle_x.push(p.0);
        }

        let capacity = h.capacity;
        for (name, value) in angles.iter() {
            h.angles
                .entry(name)
                .or_insert_with(|| Series::new(capacity))
                .push(value);
        }

        h.frame_count += 1;
        Ok(())
    }

    pub fn history(&self) -> &RawMetricsHistory {
        &self.history
    }

    /// Discard every series
    pub fn reset(&mut self) {
        self.history = RawMetricsHistory::new(self.history.capacity);
    }
}

impl Default for RawMetricsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, 0.5)
    }
}
