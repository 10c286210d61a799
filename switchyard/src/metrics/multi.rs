use std::sync::Arc;

use super::{Counter, Gauge, Histogram};

/// Forwards every update to each member counter.
#[derive(Clone, Default)]
pub struct MultiCounter {
    members: Vec<Arc<dyn Counter>>,
}

impl MultiCounter {
    pub fn new(members: impl IntoIterator<Item = Arc<dyn Counter>>) -> Self {
        Self {
            members: members.into_iter().collect(),
        }
    }
}

impl Counter for MultiCounter {
    fn with(&self, label_values: &[&str]) -> Arc<dyn Counter> {
        Arc::new(Self::new(
            self.members.iter().map(|member| member.with(label_values)),
        ))
    }

    fn add(&self, delta: f64) {
        for member in &self.members {
            member.add(delta)
        }
    }
}

/// Forwards every update to each member gauge.
#[derive(Clone, Default)]
pub struct MultiGauge {
    members: Vec<Arc<dyn Gauge>>,
}

impl MultiGauge {
    pub fn new(members: impl IntoIterator<Item = Arc<dyn Gauge>>) -> Self {
        Self {
            members: members.into_iter().collect(),
        }
    }
}

impl Gauge for MultiGauge {
    fn with(&self, label_values: &[&str]) -> Arc<dyn Gauge> {
        Arc::new(Self::new(
            self.members.iter().map(|member| member.with(label_values)),
        ))
    }

    fn set(&self, value: f64) {
        for member in &self.members {
            member.set(value)
        }
    }

    fn add(&self, delta: f64) {
        for member in &self.members {
            member.add(delta)
        }
    }
}

/// Forwards every observation to each member histogram.
#[derive(Clone, Default)]
pub struct MultiHistogram {
    members: Vec<Arc<dyn Histogram>>,
}

impl MultiHistogram {
    pub fn new(members: impl IntoIterator<Item = Arc<dyn Histogram>>) -> Self {
        Self {
            members: members.into_iter().collect(),
        }
    }
}

impl Histogram for MultiHistogram {
    fn with(&self, label_values: &[&str]) -> Arc<dyn Histogram> {
        Arc::new(Self::new(
            self.members.iter().map(|member| member.with(label_values)),
        ))
    }

    fn observe(&self, value: f64) {
        for member in &self.members {
            member.observe(value)
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::metrics::{
        generic::{GenericCounter, GenericGauge, GenericHistogram},
        Counter, Discard, Gauge, Histogram, MultiCounter, MultiGauge, MultiHistogram,
    };

    #[test_log::test]
    fn counter_fans_out_the_same_delta() {
        let first = Arc::new(GenericCounter::new("hits"));
        let second = Arc::new(GenericCounter::new("hits"));
        let multi = MultiCounter::new([
            first.clone() as Arc<dyn Counter>,
            second.clone(),
            Arc::new(Discard),
        ]);

        multi.add(2.0);
        multi.add(3.0);
        assert_eq!(5.0, first.value());
        assert_eq!(5.0, second.value());
    }

    #[test_log::test]
    fn gauge_and_histogram_fan_out() {
        let gauge = Arc::new(GenericGauge::new("depth"));
        let multi_gauge = MultiGauge::new([gauge.clone() as Arc<dyn Gauge>, Arc::new(Discard)]);
        multi_gauge.set(4.0);
        multi_gauge.add(1.0);
        assert_eq!(5.0, gauge.value());

        let histogram = Arc::new(GenericHistogram::new("size"));
        let multi_histogram = MultiHistogram::new([histogram.clone() as Arc<dyn Histogram>]);
        multi_histogram.observe(12.0);
        assert_eq!(1, histogram.summary().count);
    }
}
