//! In-memory metrics whose values can be read back.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use ordered_float::OrderedFloat;

use super::{valid_counter_delta, Counter, Gauge, Histogram, LabelValues};

const ORDERING: Ordering = Ordering::Relaxed;

fn add_bits(bits: &AtomicU64, delta: f64) {
    let _ = bits.fetch_update(ORDERING, ORDERING, |current| {
        Some((f64::from_bits(current) + delta).to_bits())
    });
}

/// A counter holding its running total.
#[derive(Debug)]
pub struct GenericCounter {
    name: Arc<str>,
    label_values: LabelValues,
    bits: AtomicU64,
}

impl GenericCounter {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            label_values: LabelValues::default(),
            bits: AtomicU64::new(0.0_f64.to_bits()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label_values(&self) -> &LabelValues {
        &self.label_values
    }

    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(ORDERING))
    }

    /// The current value, resetting the counter to 0.
    pub fn value_reset(&self) -> f64 {
        f64::from_bits(self.bits.swap(0.0_f64.to_bits(), ORDERING))
    }

    /// A labelled counter with its concrete type, so tests can read it.
    pub fn labelled(&self, label_values: &[&str]) -> Arc<GenericCounter> {
        Arc::new(Self {
            name: self.name.clone(),
            label_values: self.label_values.with(label_values),
            bits: AtomicU64::new(0.0_f64.to_bits()),
        })
    }
}

impl Counter for GenericCounter {
    fn with(&self, label_values: &[&str]) -> Arc<dyn Counter> {
        self.labelled(label_values)
    }

    fn add(&self, delta: f64) {
        if valid_counter_delta(&self.name, delta) {
            add_bits(&self.bits, delta)
        }
    }
}

/// A gauge holding its current value.
#[derive(Debug)]
pub struct GenericGauge {
    name: Arc<str>,
    label_values: LabelValues,
    bits: AtomicU64,
}

impl GenericGauge {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            label_values: LabelValues::default(),
            bits: AtomicU64::new(0.0_f64.to_bits()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label_values(&self) -> &LabelValues {
        &self.label_values
    }

    pub fn value(&self) -> f64 {
        f64::from_bits(self.bits.load(ORDERING))
    }

    pub fn labelled(&self, label_values: &[&str]) -> Arc<GenericGauge> {
        Arc::new(Self {
            name: self.name.clone(),
            label_values: self.label_values.with(label_values),
            bits: AtomicU64::new(0.0_f64.to_bits()),
        })
    }
}

impl Gauge for GenericGauge {
    fn with(&self, label_values: &[&str]) -> Arc<dyn Gauge> {
        self.labelled(label_values)
    }

    fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), ORDERING)
    }

    fn add(&self, delta: f64) {
        add_bits(&self.bits, delta)
    }
}

/// Min, max, sum and count of a histogram's observations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub count: u64,
}

impl Default for Summary {
    fn default() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            count: 0,
        }
    }
}

impl Summary {
    fn accumulate(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.count += 1;
    }

    pub fn mean(&self) -> Option<f64> {
        (0 < self.count).then(|| self.sum / self.count as f64)
    }
}

#[derive(Debug, Default)]
struct Distribution {
    buckets: BTreeMap<OrderedFloat<f64>, u64>,
    summary: Summary,
}

/// A histogram that keeps 2-significant-figure buckets and answers quantiles.
#[derive(Debug)]
pub struct GenericHistogram {
    name: Arc<str>,
    label_values: LabelValues,
    distribution: Mutex<Distribution>,
}

impl GenericHistogram {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            label_values: LabelValues::default(),
            distribution: Default::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label_values(&self) -> &LabelValues {
        &self.label_values
    }

    pub fn labelled(&self, label_values: &[&str]) -> Arc<GenericHistogram> {
        Arc::new(Self {
            name: self.name.clone(),
            label_values: self.label_values.with(label_values),
            distribution: Default::default(),
        })
    }

    /// The bucket holding the `q`th quantile, `q` in [0, 1].
    /// Accurate to 2 significant figures. `None` before the first observation.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        let distribution = self
            .distribution
            .lock()
            .expect("local mutex should not be poisoned");
        let count = distribution.summary.count;
        if count == 0 {
            return None;
        }
        let rank = ((q.clamp(0.0, 1.0) * count as f64).ceil() as u64).max(1);
        let mut seen = 0;
        for (bucket, bucket_count) in distribution.buckets.iter() {
            seen += bucket_count;
            if rank <= seen {
                return Some(bucket.0);
            }
        }
        distribution.buckets.keys().next_back().map(|bucket| bucket.0)
    }

    pub fn summary(&self) -> Summary {
        self.distribution
            .lock()
            .expect("local mutex should not be poisoned")
            .summary
    }
}

impl Histogram for GenericHistogram {
    fn with(&self, label_values: &[&str]) -> Arc<dyn Histogram> {
        self.labelled(label_values)
    }

    fn observe(&self, value: f64) {
        if !value.is_finite() {
            log::warn!("dropping non-finite observation for histogram {}", self.name);
            return;
        }
        let mut distribution = self
            .distribution
            .lock()
            .expect("local mutex should not be poisoned");
        *distribution
            .buckets
            .entry(OrderedFloat(bucket_2_sigfigs(value)))
            .or_default() += 1;
        distribution.summary.accumulate(value);
    }
}

/// Base 10 significant-figures bucketing - away from 0
fn bucket_10<const FIGURES: i32>(value: f64) -> f64 {
    if value == 0.0 {
        return 0.0;
    }
    let power = value.abs().log10().floor() as i32 - (FIGURES - 1);
    // divide by the inverse for fractional magnitudes: 0.1 has no exact representation
    let scale = |v: f64| {
        if power < 0 {
            v * 10_f64.powi(-power)
        } else {
            v / 10_f64.powi(power)
        }
    };
    let unscale = |v: f64| {
        if power < 0 {
            v / 10_f64.powi(-power)
        } else {
            v * 10_f64.powi(power)
        }
    };

    let scaled = scale(value.abs());
    // a scaled value a rounding error away from a whole bucket belongs to that bucket
    let nearest = scaled.round();
    let units = if (scaled - nearest).abs() < 1e-9 {
        nearest
    } else {
        scaled.ceil()
    };
    value.signum() * unscale(units)
}

pub(crate) fn bucket_2_sigfigs(value: f64) -> f64 {
    bucket_10::<2>(value)
}
