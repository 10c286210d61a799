use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crossbeam_channel::{Receiver, Sender};
use rand::Rng;
use tokio::sync::oneshot;

use crate::metrics::{valid_counter_delta, Counter, Gauge, Histogram, LabelValues};

use super::{
    batch::{Observation, Update},
    Batch,
};

/// Settings for a [`Buffer`].
#[derive(Debug, Clone)]
pub struct BufferConfiguration {
    channel_capacity: usize,
    prefix: String,
}

impl Default for BufferConfiguration {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            prefix: String::new(),
        }
    }
}

impl BufferConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many updates each producer channel holds before producers block.
    pub fn channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity.max(1);
        self
    }

    /// Prepended to every metric name created by the buffer.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

enum Control {
    Get(oneshot::Sender<Batch>),
    Stop(oneshot::Sender<Batch>),
}

/// Accumulates metric updates on a dedicated owner thread.
///
/// Counter updates, gauge updates and histogram observations each travel on
/// their own bounded channel. Dropping the buffer stops the owner thread.
pub struct Buffer {
    counts: Sender<Observation>,
    gauges: Sender<Observation>,
    observations: Sender<Observation>,
    control: Sender<Control>,
    prefix: String,
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl Buffer {
    /// Spawn the owner thread.
    pub fn new(configuration: BufferConfiguration) -> Result<Self, std::io::Error> {
        static I: AtomicUsize = AtomicUsize::new(0);

        let capacity = configuration.channel_capacity;
        let (counts, count_receiver) = crossbeam_channel::bounded(capacity);
        let (gauges, gauge_receiver) = crossbeam_channel::bounded(capacity);
        let (observations, observation_receiver) = crossbeam_channel::bounded(capacity);
        let (control, control_receiver) = crossbeam_channel::unbounded();

        let thread_id = I.fetch_add(1, Ordering::Relaxed);
        std::thread::Builder::new()
            .name(format!("forwarder-{thread_id}"))
            .spawn(move || {
                accumulate_forever(
                    count_receiver,
                    gauge_receiver,
                    observation_receiver,
                    control_receiver,
                )
            })?;

        Ok(Self {
            counts,
            gauges,
            observations,
            control,
            prefix: configuration.prefix,
        })
    }

    fn name(&self, name: &str) -> Arc<str> {
        format!("{}{name}", self.prefix).into()
    }

    /// A counter that keeps each update with probability `sample_rate`.
    pub fn counter(&self, name: &str, sample_rate: f64) -> BufferedCounter {
        BufferedCounter {
            name: self.name(name),
            label_values: LabelValues::default(),
            sample_rate: clamp_rate(sample_rate),
            sender: self.counts.clone(),
        }
    }

    /// A gauge. Gauges are never sampled.
    pub fn gauge(&self, name: &str) -> BufferedGauge {
        BufferedGauge {
            name: self.name(name),
            label_values: LabelValues::default(),
            sender: self.gauges.clone(),
        }
    }

    /// A histogram that keeps each observation with probability `sample_rate`.
    pub fn histogram(&self, name: &str, sample_rate: f64) -> BufferedHistogram {
        BufferedHistogram {
            name: self.name(name),
            label_values: LabelValues::default(),
            sample_rate: clamp_rate(sample_rate),
            sender: self.observations.clone(),
        }
    }

    /// Take everything accumulated so far and start a new batch.
    ///
    /// Updates whose send returned before this call are included.
    pub async fn get(&self) -> Batch {
        let (reply, batch) = oneshot::channel();
        if self.control.send(Control::Get(reply)).is_err() {
            log::debug!("metrics buffer is stopped");
            return Batch::default();
        }
        batch.await.unwrap_or_default()
    }

    /// Take the final batch and stop the owner thread.
    /// Later updates are dropped and later [`Buffer::get`] calls return empty batches.
    pub async fn stop(&self) -> Batch {
        let (reply, batch) = oneshot::channel();
        if self.control.send(Control::Stop(reply)).is_err() {
            log::debug!("metrics buffer is already stopped");
            return Batch::default();
        }
        batch.await.unwrap_or_default()
    }
}

fn clamp_rate(sample_rate: f64) -> f64 {
    if sample_rate.is_nan() {
        1.0
    } else {
        sample_rate.clamp(0.0, 1.0)
    }
}

fn sampled(sample_rate: f64) -> bool {
    1.0 <= sample_rate || rand::thread_rng().gen::<f64>() < sample_rate
}

fn send(sender: &Sender<Observation>, observation: Observation) {
    if let Err(e) = sender.send(observation) {
        log::debug!("could not buffer metric update for {}: {e}", e.0.name);
    }
}

fn accumulate_forever(
    counts: Receiver<Observation>,
    gauges: Receiver<Observation>,
    observations: Receiver<Observation>,
    control: Receiver<Control>,
) {
    let mut batch = Batch::default();
    let drain = |batch: &mut Batch| {
        counts.try_iter().for_each(|o| batch.count(o));
        gauges.try_iter().for_each(|o| batch.gauge(o));
        observations.try_iter().for_each(|o| batch.observe(o));
    };
    loop {
        crossbeam_channel::select! {
            recv(counts) -> observation => match observation {
                Ok(observation) => batch.count(observation),
                Err(_) => break,
            },
            recv(gauges) -> observation => match observation {
                Ok(observation) => batch.gauge(observation),
                Err(_) => break,
            },
            recv(observations) -> observation => match observation {
                Ok(observation) => batch.observe(observation),
                Err(_) => break,
            },
            recv(control) -> message => match message {
                Ok(Control::Get(reply)) => {
                    drain(&mut batch);
                    if reply.send(std::mem::take(&mut batch)).is_err() {
                        log::debug!("batch requester went away, dropping batch");
                    }
                }
                Ok(Control::Stop(reply)) => {
                    drain(&mut batch);
                    if reply.send(std::mem::take(&mut batch)).is_err() {
                        log::debug!("stop requester went away, dropping final batch");
                    }
                    break;
                }
                Err(_) => break,
            },
        }
    }
    log::info!("quitting metrics forwarder");
}

/// A counter that forwards into a [`Buffer`].
#[derive(Debug, Clone)]
pub struct BufferedCounter {
    name: Arc<str>,
    label_values: LabelValues,
    sample_rate: f64,
    sender: Sender<Observation>,
}

impl Counter for BufferedCounter {
    fn with(&self, label_values: &[&str]) -> Arc<dyn Counter> {
        Arc::new(Self {
            label_values: self.label_values.with(label_values),
            ..self.clone()
        })
    }

    fn add(&self, delta: f64) {
        if !valid_counter_delta(&self.name, delta) || !sampled(self.sample_rate) {
            return;
        }
        send(
            &self.sender,
            Observation {
                name: self.name.clone(),
                label_values: self.label_values.clone(),
                update: Update::Add(delta),
                sample_rate: self.sample_rate,
            },
        )
    }
}

/// A gauge that forwards into a [`Buffer`].
#[derive(Debug, Clone)]
pub struct BufferedGauge {
    name: Arc<str>,
    label_values: LabelValues,
    sender: Sender<Observation>,
}

impl BufferedGauge {
    fn update(&self, update: Update) {
        send(
            &self.sender,
            Observation {
                name: self.name.clone(),
                label_values: self.label_values.clone(),
                update,
                sample_rate: 1.0,
            },
        )
    }
}

impl Gauge for BufferedGauge {
    fn with(&self, label_values: &[&str]) -> Arc<dyn Gauge> {
        Arc::new(Self {
            label_values: self.label_values.with(label_values),
            ..self.clone()
        })
    }

    fn set(&self, value: f64) {
        self.update(Update::Set(value))
    }

    fn add(&self, delta: f64) {
        self.update(Update::Add(delta))
    }
}

/// A histogram that forwards into a [`Buffer`].
#[derive(Debug, Clone)]
pub struct BufferedHistogram {
    name: Arc<str>,
    label_values: LabelValues,
    sample_rate: f64,
    sender: Sender<Observation>,
}

impl Histogram for BufferedHistogram {
    fn with(&self, label_values: &[&str]) -> Arc<dyn Histogram> {
        Arc::new(Self {
            label_values: self.label_values.with(label_values),
            ..self.clone()
        })
    }

    fn observe(&self, value: f64) {
        if !sampled(self.sample_rate) {
            return;
        }
        send(
            &self.sender,
            Observation {
                name: self.name.clone(),
                label_values: self.label_values.clone(),
                update: Update::Observe(value),
                sample_rate: self.sample_rate,
            },
        )
    }
}
