use std::fmt::Display;

const UNKNOWN: &str = "unknown";

/// An even-length sequence of alternating label keys and values.
///
/// `LabelValues` are immutable: [`LabelValues::with`] returns a new sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelValues(Vec<String>);

impl LabelValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `label_values`, padding an odd-length input with `"unknown"`.
    pub fn with(&self, label_values: &[&str]) -> Self {
        let mut values = Vec::with_capacity(self.0.len() + label_values.len() + 1);
        values.extend(self.0.iter().cloned());
        values.extend(label_values.iter().map(|value| value.to_string()));
        if values.len() % 2 == 1 {
            values.push(UNKNOWN.to_string());
        }
        Self(values)
    }

    pub(crate) fn from_even(values: Vec<String>) -> Self {
        debug_assert!(values.len() % 2 == 0);
        Self(values)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// (key, value) pairs in insertion order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .chunks_exact(2)
            .map(|pair| (pair[0].as_str(), pair[1].as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for LabelValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (key, value)) in self.pairs().enumerate() {
            if 0 < i {
                f.write_str(",")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}
