use std::{collections::HashMap, sync::Arc};

use crate::{
    metrics::{LabelValues, Space},
    Hasher,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Counter,
    Gauge,
    Histogram,
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Kind::Counter => "counter",
            Kind::Gauge => "gauge",
            Kind::Histogram => "histogram",
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Update {
    Add(f64),
    Set(f64),
    Observe(f64),
}

/// One producer-side update, as it travels to the owner thread.
#[derive(Debug)]
pub(crate) struct Observation {
    pub name: Arc<str>,
    pub label_values: LabelValues,
    pub update: Update,
    pub sample_rate: f64,
}

/// Everything observed between two [`super::Buffer::get`] calls.
#[derive(Debug, Default)]
pub struct Batch {
    counters: Space,
    gauges: Space,
    histograms: Space,
    sample_rates: HashMap<(Kind, Arc<str>), f64, Hasher>,
}

/// One series of a [`Batch`].
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub kind: Kind,
    pub name: String,
    pub label_values: LabelValues,
    /// The running total for counters, the last value for gauges and every
    /// sample for histograms.
    pub values: Vec<f64>,
    /// The fraction of updates that were kept. Consumers scale by `1 / sample_rate`.
    pub sample_rate: f64,
}

impl Batch {
    pub(crate) fn count(&mut self, observation: Observation) {
        if let Update::Add(delta) = observation.update {
            self.counters
                .add(&observation.name, &observation.label_values, delta);
        }
        self.note_rate(Kind::Counter, observation);
    }

    /// Gauge adds are relative to the last value set in this batch.
    pub(crate) fn gauge(&mut self, observation: Observation) {
        match observation.update {
            Update::Add(delta) => {
                self.gauges
                    .add(&observation.name, &observation.label_values, delta)
            }
            Update::Set(value) | Update::Observe(value) => {
                self.gauges
                    .observe(&observation.name, &observation.label_values, value)
            }
        }
        self.note_rate(Kind::Gauge, observation);
    }

    pub(crate) fn observe(&mut self, observation: Observation) {
        if let Update::Observe(value) = observation.update {
            self.histograms
                .observe(&observation.name, &observation.label_values, value);
        }
        self.note_rate(Kind::Histogram, observation);
    }

    fn note_rate(&mut self, kind: Kind, observation: Observation) {
        if observation.sample_rate < 1.0 {
            self.sample_rates
                .insert((kind, observation.name), observation.sample_rate);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.gauges.is_empty() && self.histograms.is_empty()
    }

    /// Every series in the batch, ordered by kind, name and labels.
    pub fn records(&self) -> Vec<Record> {
        let mut records = Vec::new();
        for (kind, space) in [
            (Kind::Counter, &self.counters),
            (Kind::Gauge, &self.gauges),
            (Kind::Histogram, &self.histograms),
        ] {
            space.walk(|name, label_values, observations| {
                let values = match kind {
                    Kind::Counter | Kind::Gauge => observations.last().copied().into_iter().collect(),
                    Kind::Histogram => observations.to_vec(),
                };
                let sample_rate = self
                    .sample_rates
                    .get(&(kind, Arc::from(name)))
                    .copied()
                    .unwrap_or(1.0);
                records.push(Record {
                    kind,
                    name: name.to_string(),
                    label_values: label_values.clone(),
                    values,
                    sample_rate,
                });
                true
            });
        }
        records.sort_by(|a, b| {
            (a.kind, &a.name, &a.label_values).cmp(&(b.kind, &b.name, &b.label_values))
        });
        records
    }
}
