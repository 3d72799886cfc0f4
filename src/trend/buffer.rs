/// Bounded per-gas trend buffers for the short-interval charts
use std::collections::{BTreeMap, VecDeque};

use crate::models::{SensorReading, TrendPoint};

/// Points kept per gas on the device detail page
pub const DETAIL_TREND_CAPACITY: usize = 12;

/// FIFO of the most recent points for one gas
#[derive(Debug, Clone)]
pub struct TrendBuffer {
    capacity: usize,
    points: VecDeque<TrendPoint>,
}

impl TrendBuffer {
    pub fn new(capacity: usize) -> Self {
        TrendBuffer {
            capacity: capacity.max(1),
            points: VecDeque::with_capacity(capacity.max(1) + 1),
        }
    }

    /// Append a point, evicting the oldest once capacity is exceeded
    pub fn push(&mut self, point: TrendPoint) {
        self.points.push_back(point);
        if self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = &TrendPoint> {
        self.points.iter()
    }

    pub fn latest(&self) -> Option<&TrendPoint> {
        self.points.back()
    }
}

/// One lazily created TrendBuffer per gas key
#[derive(Debug, Clone)]
pub struct TrendBuffers {
    capacity: usize,
    buffers: BTreeMap<String, TrendBuffer>,
}

impl TrendBuffers {
    pub fn new(capacity: usize) -> Self {
        TrendBuffers {
            capacity,
            buffers: BTreeMap::new(),
        }
    }

    /// Fold one poll's readings into the buffers under a shared time label
    pub fn record(&mut self, readings: &[SensorReading], time_label: &str) {
        for reading in readings {
            let capacity = self.capacity;
            self.buffers
                .entry(reading.gas_name.clone())
                .or_insert_with(|| TrendBuffer::new(capacity))
                .push(TrendPoint {
                    time: time_label.to_string(),
                    ppm: reading.ppm,
                });
        }
    }

    pub fn get(&self, gas: &str) -> Option<&TrendBuffer> {
        self.buffers.get(gas)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TrendBuffer)> {
        self.buffers.iter()
    }

    pub fn clear(&mut self) {
        self.buffers.clear();
    }
}
