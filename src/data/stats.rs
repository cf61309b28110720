//! Aggregation primitives and the per-field summary table.

use serde::Serialize;

use super::model::{Measurement, Reading, ReadingSet};

// ---------------------------------------------------------------------------
// MeanAccumulator
// ---------------------------------------------------------------------------

/// Running mean and variance over present values only.
///
/// Updated incrementally (Welford) so large finite inputs never overflow
/// through an intermediate sum.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeanAccumulator {
    count: usize,
    mean: f64,
    diff_2_sum: f64,
}

impl MeanAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in a value; `None` is skipped, it never counts as zero.
    pub fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.count += 1;
            let diff_a = v - self.mean;
            self.mean += diff_a / self.count as f64;
            let diff_b = v - self.mean;
            self.diff_2_sum += diff_a * diff_b;
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// The mean, or `None` when nothing present was added.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Sample standard deviation (N−1); `None` below two values.
    pub fn std(&self) -> Option<f64> {
        (self.count > 1).then(|| (self.diff_2_sum / (self.count - 1) as f64).sqrt())
    }
}

/// One accumulator per requested field, used by resampling and profiles.
#[derive(Debug, Clone)]
pub(crate) struct FieldMeans {
    fields: Vec<Measurement>,
    accs: Vec<MeanAccumulator>,
}

impl FieldMeans {
    pub(crate) fn new(fields: &[Measurement]) -> Self {
        FieldMeans {
            fields: fields.to_vec(),
            accs: vec![MeanAccumulator::new(); fields.len()],
        }
    }

    pub(crate) fn add(&mut self, reading: &Reading) {
        for (acc, &field) in self.accs.iter_mut().zip(&self.fields) {
            acc.add(reading.get(field));
        }
    }

    /// Means in field order.
    pub(crate) fn means(&self) -> Vec<Option<f64>> {
        self.accs.iter().map(MeanAccumulator::mean).collect()
    }
}

// ---------------------------------------------------------------------------
// Summary statistics
// ---------------------------------------------------------------------------

/// Describe-style statistics for one field. Every statistic is `None` when
/// the field has no present values; `std` is also `None` for a single value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSummary {
    pub field: Measurement,
    pub count: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation (normalized by N−1).
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub q1: Option<f64>,
    pub median: Option<f64>,
    pub q3: Option<f64>,
    pub max: Option<f64>,
}

impl FieldSummary {
    fn empty(field: Measurement) -> Self {
        FieldSummary {
            field,
            count: 0,
            mean: None,
            std: None,
            min: None,
            q1: None,
            median: None,
            q3: None,
            max: None,
        }
    }
}

/// Summary statistics for each requested field the set carries.
pub fn summary_statistics(set: &ReadingSet, fields: &[Measurement]) -> Vec<FieldSummary> {
    set.present_fields(fields)
        .into_iter()
        .map(|field| {
            let mut values: Vec<f64> = set.values(field).collect();
            summarize(field, &mut values)
        })
        .collect()
}

fn summarize(field: Measurement, values: &mut [f64]) -> FieldSummary {
    if values.is_empty() {
        return FieldSummary::empty(field);
    }
    values.sort_by(f64::total_cmp);

    let n = values.len();
    let mut acc = MeanAccumulator::new();
    for &v in values.iter() {
        acc.add(Some(v));
    }

    FieldSummary {
        field,
        count: n,
        mean: acc.mean(),
        std: acc.std(),
        min: Some(values[0]),
        q1: Some(quantile(values, 0.25)),
        median: Some(quantile(values, 0.5)),
        q3: Some(quantile(values, 0.75)),
        max: Some(values[n - 1]),
    }
}

/// Linear interpolation between closest ranks on sorted, non-empty input.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
