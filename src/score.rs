//! Quintile scoring of RFM metrics
//!
//! Bin edges are the 0, 20, 40, 60, 80 and 100% quantiles of the population,
//! interpolated linearly between neighbouring sorted values. A value `x` falls
//! in bin `k` when `edge[k] < x <= edge[k + 1]`, with the lowest edge
//! inclusive. Edges that collapse onto each other are an error: there is no
//! bin merging.

use crate::error::ScoringError;
use crate::metrics::CustomerMetrics;
use std::fmt;

/// Number of score buckets per metric
pub const QUINTILES: usize = 5;

/// A 1-5 quintile score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Score(u8);

impl Score {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = QUINTILES as u8;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Every score from lowest to highest
    pub fn all() -> impl Iterator<Item = Score> {
        (Self::MIN..=Self::MAX).map(Score)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How bucket positions translate into scores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelOrder {
    /// Lowest bucket scores 1
    Ascending,
    /// Lowest bucket scores 5
    Descending,
}

impl LabelOrder {
    fn score(self, bucket: usize) -> Score {
        let bucket = bucket.min(QUINTILES - 1) as u8;
        match self {
            LabelOrder::Ascending => Score(bucket + 1),
            LabelOrder::Descending => Score(Score::MAX - bucket),
        }
    }
}

/// Combined recency and frequency score, rendered as two digits (`"54"`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RfScore {
    pub recency: Score,
    pub frequency: Score,
}

impl RfScore {
    /// The two digits read as a decimal number, e.g. 54
    pub fn numeric(self) -> u8 {
        self.recency.value() * 10 + self.frequency.value()
    }
}

impl fmt::Display for RfScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.recency, self.frequency)
    }
}

/// The three quintile scores of one customer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RfmScores {
    pub recency: Score,
    pub frequency: Score,
    pub monetary: Score,
}

impl RfmScores {
    /// Monetary is scored but does not take part in the RF score
    pub fn rf_score(&self) -> RfScore {
        RfScore {
            recency: self.recency,
            frequency: self.frequency,
        }
    }
}

/// Linearly interpolated quantile edges over already sorted values
fn quantile_edges(sorted: &[f64], bins: usize) -> Vec<f64> {
    let last = sorted.len() - 1;
    (0..=bins)
        .map(|i| {
            let position = last as f64 * i as f64 / bins as f64;
            let lower = position.floor() as usize;
            let upper = (lower + 1).min(last);
            let fraction = position - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
        })
        .collect()
}

/// Assign each value to one of `bins` quantile buckets (0-based)
///
/// # Errors
/// * `EmptyPopulation` when `values` is empty
/// * `DuplicateBinEdges` when ties leave fewer than `bins` distinct edges
pub fn quantile_bins(values: &[f64], bins: usize, metric: &str) -> Result<Vec<usize>, ScoringError> {
    if values.is_empty() {
        return Err(ScoringError::EmptyPopulation);
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let edges = quantile_edges(&sorted, bins);

    if edges.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(ScoringError::DuplicateBinEdges {
            metric: metric.to_string(),
            edges,
        });
    }

    Ok(values
        .iter()
        .map(|&value| {
            edges[1..]
                .iter()
                .position(|&edge| value <= edge)
                .unwrap_or(bins - 1)
        })
        .collect())
}

/// 1-based ranks where equal values are ordered by position
pub fn rank_first(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    // Stable sort keeps input order among ties
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    for (rank, index) in order.into_iter().enumerate() {
        ranks[index] = (rank + 1) as f64;
    }
    ranks
}

/// Score one metric into quintiles with the given label order
pub fn score_metric(values: &[f64], order: LabelOrder, metric: &str) -> Result<Vec<Score>, ScoringError> {
    Ok(quantile_bins(values, QUINTILES, metric)?
        .into_iter()
        .map(|bucket| order.score(bucket))
        .collect())
}

/// Score every customer on recency, frequency and monetary value
///
/// Recency scores are inverted so the most recent buyers score 5. Frequency
/// is binned on first-occurrence ranks because purchase counts are heavily
/// tied; the input order breaks those ties.
pub fn score_customers(metrics: &[CustomerMetrics]) -> Result<Vec<RfmScores>, ScoringError> {
    let recency: Vec<f64> = metrics.iter().map(|m| m.recency as f64).collect();
    let frequency: Vec<f64> = metrics.iter().map(|m| m.frequency as f64).collect();
    let monetary: Vec<f64> = metrics.iter().map(|m| m.monetary).collect();

    let recency_scores = score_metric(&recency, LabelOrder::Descending, "recency")?;
    let frequency_scores = score_metric(&rank_first(&frequency), LabelOrder::Ascending, "frequency")?;
    let monetary_scores = score_metric(&monetary, LabelOrder::Ascending, "monetary")?;

    Ok(recency_scores
        .into_iter()
        .zip(frequency_scores)
        .zip(monetary_scores)
        .map(|((recency, frequency), monetary)| RfmScores {
            recency,
            frequency,
            monetary,
        })
        .collect())
}
