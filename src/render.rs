use std::collections::BTreeMap;

use crate::{
    model::{MetricSample, StatisticsTable},
    params::element_id,
    util::pretty,
};

/// Shown in place of a value the payload did not contain.
pub const UNDEFINED: &str = "undefined";

/// Text nodes of a page, addressed by element id.
#[derive(Debug, Clone, Default)]
pub struct TextBoard {
    texts: BTreeMap<String, String>,
}

impl TextBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `value`, or the `undefined` marker when it is missing.
    pub fn set<V: ToString>(&mut self, id: impl Into<String>, value: Option<V>) {
        let text = value
            .map(|v| v.to_string())
            .unwrap_or_else(|| UNDEFINED.to_string());
        self.texts.insert(id.into(), text);
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.texts.get(id).map(String::as_str)
    }

    /// Text of `id` for display; ids never written show as `-`.
    pub fn text(&self, id: &str) -> &str {
        self.get(id).unwrap_or("-")
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

/// One text node per sample, named after the metric with `/` mapped to `-`.
pub fn render_samples(board: &mut TextBoard, samples: &[MetricSample]) {
    for sample in samples {
        let text = sample.reading().map(|v| pretty(&sample.name, v));
        board.set(element_id(&sample.name), text);
    }
}

pub fn render_statistics(board: &mut TextBoard, table: &StatisticsTable) {
    for (id, value) in table.rows().iter() {
        match (*id, value) {
            ("detail_average", Some(avg)) => board.set(*id, Some(format!("{:.2}", avg))),
            _ => board.set(*id, *value),
        }
    }
}
