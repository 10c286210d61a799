use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::Hasher;

use super::LabelValues;

const POISONED: &str = "label space lock should not be poisoned";

/// Observations grouped by metric name, then by label values.
///
/// Each metric name roots a tree whose edges are (key, value) label pairs.
/// Writers lock nodes exclusively on the way down; [`Space::walk`] takes
/// shared locks, so a concurrent observation lands either in this walk or the
/// next one.
#[derive(Debug, Default)]
pub struct Space {
    roots: RwLock<HashMap<String, Arc<Node>, Hasher>>,
}

#[derive(Debug, Default)]
struct Node {
    inner: RwLock<NodeInner>,
}

#[derive(Debug, Default)]
struct NodeInner {
    observations: Vec<f64>,
    children: HashMap<(String, String), Arc<Node>, Hasher>,
}

impl Space {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` under `name` and `label_values`.
    pub fn observe(&self, name: &str, label_values: &LabelValues, value: f64) {
        self.with_root(name, |root| {
            root.update(label_values.as_slice(), &mut |observations: &mut Vec<f64>| {
                observations.push(value)
            })
        })
    }

    /// Record the previous value plus `delta`, so the last observation is always the running total.
    pub fn add(&self, name: &str, label_values: &LabelValues, delta: f64) {
        self.with_root(name, |root| {
            root.update(label_values.as_slice(), &mut |observations: &mut Vec<f64>| {
                let last = observations.last().copied().unwrap_or(0.0);
                observations.push(last + delta)
            })
        })
    }

    /// Visit every (name, labels) that has observations. Return `false` to stop.
    pub fn walk(&self, mut visit: impl FnMut(&str, &LabelValues, &[f64]) -> bool) {
        let roots = self.roots.read().expect(POISONED);
        let mut path = Vec::new();
        for (name, root) in roots.iter() {
            let keep_going = root.walk(&mut path, &mut |label_values: &[String], observations: &[f64]| {
                visit(
                    name,
                    &LabelValues::from_even(label_values.to_vec()),
                    observations,
                )
            });
            if !keep_going {
                return;
            }
        }
    }

    /// Swap in an empty space and hand back everything recorded so far.
    pub fn reset(&self) -> Space {
        let mut roots = self.roots.write().expect(POISONED);
        Space {
            roots: RwLock::new(std::mem::take(&mut *roots)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roots.read().expect(POISONED).is_empty()
    }

    fn with_root(&self, name: &str, update: impl FnOnce(&Node)) {
        {
            let roots = self.roots.read().expect(POISONED);
            if let Some(root) = roots.get(name) {
                return update(root);
            }
        }
        let mut roots = self.roots.write().expect(POISONED);
        let root = roots.entry(name.to_string()).or_default();
        update(root)
    }
}

impl Node {
    fn update(&self, label_values: &[String], update: &mut dyn FnMut(&mut Vec<f64>)) {
        let mut inner = self.inner.write().expect(POISONED);
        match label_values {
            [] => update(&mut inner.observations),
            [key, value, rest @ ..] => {
                let child = inner
                    .children
                    .entry((key.clone(), value.clone()))
                    .or_default();
                child.update(rest, update)
            }
            [key] => {
                log::warn!("label {key} has no value, recording it under the parent");
                update(&mut inner.observations)
            }
        }
    }

    fn walk(
        &self,
        path: &mut Vec<String>,
        visit: &mut dyn FnMut(&[String], &[f64]) -> bool,
    ) -> bool {
        let inner = self.inner.read().expect(POISONED);
        if !inner.observations.is_empty() && !visit(path, &inner.observations) {
            return false;
        }
        for ((key, value), child) in inner.children.iter() {
            path.push(key.clone());
            path.push(value.clone());
            let keep_going = child.walk(path, visit);
            path.truncate(path.len() - 2);
            if !keep_going {
                return false;
            }
        }
        true
    }
}
