use crate::config::DashboardConfig;
use crate::record::{CategoryField, NumericField, Record};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize)]
pub struct StatsError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl StatsError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }
}

/// Count/average/max/min over the records that carry a valid value.
///
/// `average`, `max` and `min` are `None` when no record contributed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
    pub count: usize,
    pub average: Option<f64>,
    pub max: Option<f64>,
    pub min: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCounts {
    pub labels: Vec<String>,
    pub counts: Vec<usize>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupAverages {
    pub labels: Vec<String>,
    pub averages: Vec<Option<f64>>,
    pub counts: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramSeries {
    pub group: String,
    pub counts: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Histogram {
    pub labels: Vec<String>,
    pub edges: Vec<f64>,
    pub series: Vec<HistogramSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDensity {
    pub field: String,
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub bin_width: f64,
    pub labels: Vec<String>,
    pub densities: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DensityEstimate {
    pub num_bins: usize,
    pub fields: Vec<FieldDensity>,
}

/// Inclusive score range. An open side is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBand {
    pub label: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ScoreBand {
    pub fn new(label: &str, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            label: label.to_string(),
            min,
            max,
        }
    }

    fn contains(&self, v: f64) -> bool {
        self.min.map(|m| v >= m).unwrap_or(true) && self.max.map(|m| v <= m).unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxStats {
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupValues {
    pub group: String,
    pub values: Vec<f64>,
    pub stats: Option<BoxStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDistribution {
    pub field: String,
    pub groups: Vec<GroupValues>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardModel {
    pub total_records: usize,
    pub test_result: SummaryStats,
    pub ses_histogram: Histogram,
    pub ses_counts: CategoryCounts,
    pub ses_averages: GroupAverages,
    pub performance_bands: CategoryCounts,
    pub density: DensityEstimate,
    pub test_result_by_sex: GroupDistribution,
}

/// Drop repeated labels, keeping the first occurrence.
pub fn dedupe_labels(labels: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(labels.len());
    for l in labels {
        if seen.insert(l.as_str()) {
            out.push(l.clone());
        }
    }
    out
}

/// JS-style `Math.round`: halves go towards +inf.
fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor() + 0.0
}

fn valid_values<'a>(
    records: impl IntoIterator<Item = &'a Record>,
    field: NumericField,
) -> Vec<f64> {
    records
        .into_iter()
        .filter_map(|r| field.value(r))
        .collect()
}

/// Arithmetic mean of a non-empty slice, kept within `[min, max]`.
///
/// The plain sum can overflow for values near `f64::MAX`; in that case each
/// value is scaled by `1/n` before summing, which cannot overflow.
fn mean(values: &[f64], min: f64, max: f64) -> f64 {
    let n = values.len() as f64;
    let sum: f64 = values.iter().sum();
    let m = if sum.is_finite() {
        sum / n
    } else {
        values.iter().map(|v| v / n).sum()
    };
    m.clamp(min, max)
}

fn summarize(values: &[f64]) -> SummaryStats {
    if values.is_empty() {
        return SummaryStats {
            count: 0,
            average: None,
            max: None,
            min: None,
        };
    }
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    SummaryStats {
        count: values.len(),
        average: Some(mean(values, min, max)),
        max: Some(max),
        min: Some(min),
    }
}

pub fn summary_statistics(records: &[Record], field: NumericField) -> SummaryStats {
    summarize(&valid_values(records, field))
}

pub fn categorical_counts(
    records: &[Record],
    field: CategoryField,
    categories: &[String],
) -> CategoryCounts {
    let labels = dedupe_labels(categories);
    let mut counts = vec![0usize; labels.len()];
    for r in records {
        let v = field.value(r);
        if let Some(i) = labels.iter().position(|l| l == v) {
            counts[i] += 1;
        }
    }
    let total = counts.iter().sum();
    CategoryCounts {
        labels,
        counts,
        total,
    }
}

pub fn group_average(
    records: &[Record],
    group: CategoryField,
    value: NumericField,
    categories: &[String],
) -> GroupAverages {
    let labels = dedupe_labels(categories);
    let mut averages = Vec::with_capacity(labels.len());
    let mut counts = Vec::with_capacity(labels.len());
    for label in &labels {
        let values = valid_values(records.iter().filter(|r| group.value(r) == label), value);
        let stats = summarize(&values);
        averages.push(stats.average);
        counts.push(stats.count);
    }
    GroupAverages {
        labels,
        averages,
        counts,
    }
}

pub fn validate_edges(edges: &[f64]) -> Result<(), StatsError> {
    if edges.len() < 2 {
        return Err(StatsError::bad_params("edges must contain at least two values"));
    }
    if edges.iter().any(|e| !e.is_finite()) {
        return Err(StatsError::bad_params("edges must be finite numbers"));
    }
    if edges.windows(2).any(|w| w[0] >= w[1]) {
        return Err(StatsError::bad_params("edges must be strictly ascending"));
    }
    Ok(())
}

pub fn validate_bands(bands: &[ScoreBand]) -> Result<(), StatsError> {
    for b in bands {
        if b.label.trim().is_empty() {
            return Err(StatsError::bad_params("band label must not be empty"));
        }
        if b.min.map(|v| !v.is_finite()).unwrap_or(false)
            || b.max.map(|v| !v.is_finite()).unwrap_or(false)
        {
            return Err(StatsError::bad_params("band bounds must be finite numbers"));
        }
        if let (Some(min), Some(max)) = (b.min, b.max) {
            if min > max {
                let mut e = StatsError::bad_params("band min must be <= max");
                e.details = Some(serde_json::json!({ "label": b.label }));
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Index of the bin holding `v`: half-open `[e_i, e_{i+1})`, except that a
/// value equal to the last edge is clamped into the last bin.
fn bin_index(edges: &[f64], v: f64) -> Option<usize> {
    let bins = edges.len() - 1;
    for i in 0..bins {
        if v >= edges[i] && v < edges[i + 1] {
            return Some(i);
        }
    }
    if v == edges[bins] {
        return Some(bins - 1);
    }
    None
}

pub fn bin_labels(edges: &[f64]) -> Vec<String> {
    edges
        .windows(2)
        .map(|w| format!("{}-{}", w[0], w[1]))
        .collect()
}

pub fn histogram(
    records: &[Record],
    value: NumericField,
    group: CategoryField,
    group_values: &[String],
    edges: &[f64],
) -> Result<Histogram, StatsError> {
    validate_edges(edges)?;
    let groups = dedupe_labels(group_values);
    let bins = edges.len() - 1;

    let series = groups
        .into_iter()
        .map(|g| {
            let mut counts = vec![0usize; bins];
            for v in valid_values(records.iter().filter(|r| group.value(r) == g), value) {
                if let Some(i) = bin_index(edges, v) {
                    counts[i] += 1;
                }
            }
            HistogramSeries { group: g, counts }
        })
        .collect();

    Ok(Histogram {
        labels: bin_labels(edges),
        edges: edges.to_vec(),
        series,
    })
}

fn field_density(records: &[Record], field: NumericField, num_bins: usize) -> FieldDensity {
    let values = valid_values(records, field);
    if values.is_empty() {
        return FieldDensity {
            field: field.as_str().to_string(),
            count: 0,
            min: None,
            max: None,
            bin_width: 0.0,
            labels: vec!["0-0".to_string(); num_bins],
            densities: vec![0.0; num_bins],
        };
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    // A span wider than f64::MAX is binned at half scale so the width stays
    // finite; at unit scale this is the plain (max - min) / numBins.
    let scale = if (max - min).is_finite() { 1.0 } else { 0.5 };
    let scaled_width = (max * scale - min * scale) / num_bins as f64;
    let bin_width = (scaled_width / scale).min(f64::MAX);

    let mut bins = vec![0usize; num_bins];
    for v in &values {
        // Zero variance: everything lands in bin 0.
        let idx = if scaled_width > 0.0 {
            ((v * scale - min * scale) / scaled_width).floor() as usize
        } else {
            0
        };
        bins[idx.min(num_bins - 1)] += 1;
    }

    let edge = |i: usize| {
        let e = (min * scale + i as f64 * scaled_width) / scale;
        if e.is_finite() {
            e
        } else {
            max
        }
    };
    let n = values.len() as f64;
    let labels = (0..num_bins)
        .map(|i| {
            let start = round_half_up(edge(i));
            let end = round_half_up(edge(i + 1));
            format!("{}-{}", start, end)
        })
        .collect();

    FieldDensity {
        field: field.as_str().to_string(),
        count: values.len(),
        min: Some(min),
        max: Some(max),
        bin_width,
        labels,
        densities: bins.iter().map(|c| *c as f64 / n).collect(),
    }
}

/// Normalized per-bin counts (count / total) over equal-width bins spanning
/// each field's observed range. Not a calibrated density.
pub fn density_estimate(
    records: &[Record],
    field_a: NumericField,
    field_b: NumericField,
    num_bins: usize,
) -> Result<DensityEstimate, StatsError> {
    if num_bins == 0 {
        return Err(StatsError::bad_params("numBins must be >= 1"));
    }
    Ok(DensityEstimate {
        num_bins,
        fields: vec![
            field_density(records, field_a, num_bins),
            field_density(records, field_b, num_bins),
        ],
    })
}

pub fn score_bands(
    records: &[Record],
    field: NumericField,
    bands: &[ScoreBand],
) -> Result<CategoryCounts, StatsError> {
    validate_bands(bands)?;
    let mut counts = vec![0usize; bands.len()];
    for v in valid_values(records, field) {
        if let Some(i) = bands.iter().position(|b| b.contains(v)) {
            counts[i] += 1;
        }
    }
    let total = counts.iter().sum();
    Ok(CategoryCounts {
        labels: bands.iter().map(|b| b.label.clone()).collect(),
        counts,
        total,
    })
}

/// Linear interpolation between closest ranks; `sorted` must be non-empty.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = p * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

fn box_stats(sorted: &[f64]) -> Option<BoxStats> {
    let first = *sorted.first()?;
    let last = *sorted.last()?;
    Some(BoxStats {
        count: sorted.len(),
        min: first,
        q1: quantile(sorted, 0.25),
        median: quantile(sorted, 0.5),
        q3: quantile(sorted, 0.75),
        max: last,
        mean: mean(sorted, first, last),
    })
}

pub fn group_distribution(
    records: &[Record],
    group: CategoryField,
    value: NumericField,
    categories: &[String],
) -> GroupDistribution {
    let groups = dedupe_labels(categories)
        .into_iter()
        .map(|g| {
            let mut values = valid_values(records.iter().filter(|r| group.value(r) == g), value);
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            let stats = box_stats(&values);
            GroupValues {
                group: g,
                values,
                stats,
            }
        })
        .collect();
    GroupDistribution {
        field: value.as_str().to_string(),
        groups,
    }
}

pub fn dashboard(records: &[Record], cfg: &DashboardConfig) -> Result<DashboardModel, StatsError> {
    let ses = &cfg.socio_economic_options;
    Ok(DashboardModel {
        total_records: records.len(),
        test_result: summary_statistics(records, NumericField::TestResult),
        ses_histogram: histogram(
            records,
            NumericField::TestResult,
            CategoryField::SocioEconomicStatus,
            ses,
            &cfg.histogram_edges,
        )?,
        ses_counts: categorical_counts(records, CategoryField::SocioEconomicStatus, ses),
        ses_averages: group_average(
            records,
            CategoryField::SocioEconomicStatus,
            NumericField::TestResult,
            ses,
        ),
        performance_bands: score_bands(
            records,
            NumericField::AcademicPerformance,
            &cfg.performance_bands,
        )?,
        density: density_estimate(
            records,
            NumericField::AcademicPerformance,
            NumericField::TestResult,
            cfg.density_bins,
        )?,
        test_result_by_sex: group_distribution(
            records,
            CategoryField::Sex,
            NumericField::TestResult,
            &cfg.sex_options,
        ),
    })
}
