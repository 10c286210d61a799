use bytes::{BufMut, BytesMut};

use super::{Batch, Record};

/// Renders a batch into bytes for a [`super::Writer`].
pub trait Format: Send + Sync {
    fn format(&self, batch: &Batch, out: &mut BytesMut);
}

/// One line per series:
/// `name{key="value",...} kind value[,value...][ @rate]`
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormat;

impl TextFormat {
    fn line(record: &Record) -> String {
        let mut line = record.name.clone();
        if !record.label_values.is_empty() {
            line.push('{');
            for (i, (key, value)) in record.label_values.pairs().enumerate() {
                if 0 < i {
                    line.push(',');
                }
                line.push_str(&format!("{key}={value:?}"));
            }
            line.push('}');
        }
        line.push(' ');
        line.push_str(&record.kind.to_string());
        line.push(' ');
        let values: Vec<String> = record.values.iter().map(f64::to_string).collect();
        line.push_str(&values.join(","));
        if record.sample_rate < 1.0 {
            line.push_str(&format!(" @{}", record.sample_rate));
        }
        line.push('\n');
        line
    }
}

impl Format for TextFormat {
    fn format(&self, batch: &Batch, out: &mut BytesMut) {
        for record in batch.records() {
            out.put_slice(Self::line(&record).as_bytes());
        }
    }
}
