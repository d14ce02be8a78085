//! The scored and segmented RFM table

use crate::data::{clean_transactions, CleaningReport, RawTransaction};
use crate::error::ScoringError;
use crate::metrics::{compute_rfm_metrics, last_invoice_date, CustomerMetrics};
use crate::score::{score_customers, RfScore, RfmScores};
use crate::segment::{classify, Segment};
use chrono::NaiveDateTime;
use log::{info, warn};
use polars::prelude::*;
use std::collections::BTreeMap;

/// One customer's metrics, scores and segment
#[derive(Debug, Clone, PartialEq)]
pub struct RfmRecord {
    pub customer_id: i64,
    pub recency: i64,
    pub frequency: i64,
    pub monetary: f64,
    pub scores: RfmScores,
    pub segment: Segment,
}

impl RfmRecord {
    pub fn rf_score(&self) -> RfScore {
        self.scores.rf_score()
    }
}

/// Scored customers, one row per customer id, ordered by customer id
#[derive(Debug, Clone, PartialEq)]
pub struct RfmTable {
    records: Vec<RfmRecord>,
}

impl RfmTable {
    pub fn records(&self) -> &[RfmRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records belonging to one segment, in table order
    pub fn members(&self, segment: Segment) -> impl Iterator<Item = &RfmRecord> + '_ {
        self.records.iter().filter(move |record| record.segment == segment)
    }

    /// Number of customers per segment; segments without customers are omitted
    pub fn segment_counts(&self) -> BTreeMap<Segment, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.segment).or_insert(0) += 1;
        }
        counts
    }

    /// Columnar view with the score columns rendered as in reports
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        df!(
            "customer_id" => self.records.iter().map(|r| r.customer_id).collect::<Vec<i64>>(),
            "recency" => self.records.iter().map(|r| r.recency).collect::<Vec<i64>>(),
            "frequency" => self.records.iter().map(|r| r.frequency).collect::<Vec<i64>>(),
            "monetary" => self.records.iter().map(|r| r.monetary).collect::<Vec<f64>>(),
            "recency_score" => self.records.iter().map(|r| r.scores.recency.value() as i64).collect::<Vec<i64>>(),
            "frequency_score" => self.records.iter().map(|r| r.scores.frequency.value() as i64).collect::<Vec<i64>>(),
            "monetary_score" => self.records.iter().map(|r| r.scores.monetary.value() as i64).collect::<Vec<i64>>(),
            "rf_score" => self.records.iter().map(|r| r.rf_score().to_string()).collect::<Vec<String>>(),
            "segment" => self.records.iter().map(|r| r.segment.label()).collect::<Vec<&str>>(),
        )
    }
}

/// Score and classify customers
///
/// # Arguments
/// * `metrics` - Per-customer metrics in the order used to break frequency ties
///
/// # Returns
/// * The RFM table, or a scoring error if any metric cannot be split into quintiles
pub fn build_rfm_table(metrics: Vec<CustomerMetrics>) -> Result<RfmTable, ScoringError> {
    let scores = score_customers(&metrics)?;

    let records = metrics
        .into_iter()
        .zip(scores)
        .map(|(metric, scores)| {
            let rf = scores.rf_score();
            let segment = classify(rf).ok_or(ScoringError::UnmappedScore {
                recency: rf.recency.value(),
                frequency: rf.frequency.value(),
            })?;
            Ok(RfmRecord {
                customer_id: metric.customer_id,
                recency: metric.recency,
                frequency: metric.frequency,
                monetary: metric.monetary,
                scores,
                segment,
            })
        })
        .collect::<Result<Vec<_>, ScoringError>>()?;

    Ok(RfmTable { records })
}

/// Everything produced by one segmentation run
#[derive(Debug, Clone)]
pub struct SegmentationRun {
    pub cleaning: CleaningReport,
    pub last_invoice_date: Option<NaiveDateTime>,
    pub table: RfmTable,
}

/// Run clean → aggregate → score → classify over loaded transactions
pub fn segment_transactions(
    raw: Vec<RawTransaction>,
    reference_date: NaiveDateTime,
) -> crate::Result<SegmentationRun> {
    let (transactions, cleaning) = clean_transactions(raw);

    let last_invoice = last_invoice_date(&transactions);
    if let Some(last) = last_invoice {
        info!("Last invoice date {}, reference date {}", last, reference_date);
        if reference_date < last {
            warn!("Reference date is earlier than the last invoice date");
        }
    }

    let metrics = compute_rfm_metrics(&transactions, reference_date)?;
    drop(transactions);

    let table = build_rfm_table(metrics)?;
    info!(
        "Segmented {} customers into {} segments",
        table.len(),
        table.segment_counts().len()
    );

    Ok(SegmentationRun {
        cleaning,
        last_invoice_date: last_invoice,
        table,
    })
}
