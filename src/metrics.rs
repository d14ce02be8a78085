//! Per-customer Recency, Frequency and Monetary metrics using Polars

use crate::data::Transaction;
use chrono::NaiveDateTime;
use log::{debug, info, warn};
use polars::prelude::*;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Raw RFM metrics for one customer
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerMetrics {
    pub customer_id: i64,
    /// Whole days between the last purchase and the reference date.
    /// Negative when the reference date precedes that purchase.
    pub recency: i64,
    /// Distinct invoices
    pub frequency: i64,
    /// Total spend
    pub monetary: f64,
}

/// Latest invoice timestamp among cleaned transactions
pub fn last_invoice_date(transactions: &[Transaction]) -> Option<NaiveDateTime> {
    transactions.iter().map(|t| t.invoice_date).max()
}

/// Compute RFM metrics per customer from cleaned transactions
///
/// # Arguments
/// * `transactions` - Cleaned transaction lines
/// * `reference_date` - The "today" recency is measured against
///
/// # Returns
/// * One row per customer with positive monetary value, sorted by customer id
pub fn compute_rfm_metrics(
    transactions: &[Transaction],
    reference_date: NaiveDateTime,
) -> crate::Result<Vec<CustomerMetrics>> {
    if transactions.is_empty() {
        anyhow::bail!("No valid transactions left after cleaning");
    }

    let df = df!(
        "customer_id" => transactions.iter().map(|t| t.customer_id).collect::<Vec<i64>>(),
        "invoice" => transactions.iter().map(|t| t.invoice.as_str()).collect::<Vec<&str>>(),
        "invoice_ts" => transactions
            .iter()
            .map(|t| t.invoice_date.and_utc().timestamp_millis())
            .collect::<Vec<i64>>(),
        "total_price" => transactions.iter().map(|t| t.total_price).collect::<Vec<f64>>(),
    )?;

    let grouped = df
        .lazy()
        .group_by([col("customer_id")])
        .agg([
            // Recency is derived from the latest purchase
            col("invoice_ts").max().alias("last_purchase_ts"),
            // Frequency: number of unique invoices
            col("invoice").n_unique().alias("frequency"),
            // Monetary: total spending
            col("total_price").sum().alias("monetary"),
        ])
        .collect()?;

    debug!("Aggregated {} customers", grouped.height());

    let customer_ids = grouped.column("customer_id")?.cast(&DataType::Int64)?;
    let last_purchases = grouped.column("last_purchase_ts")?.cast(&DataType::Int64)?;
    let frequencies = grouped.column("frequency")?.cast(&DataType::Int64)?;
    let monetary = grouped.column("monetary")?.cast(&DataType::Float64)?;

    let reference_ts = reference_date.and_utc().timestamp_millis();
    let mut negative_recency = 0usize;

    let mut metrics: Vec<CustomerMetrics> = customer_ids
        .i64()?
        .into_no_null_iter()
        .zip(last_purchases.i64()?.into_no_null_iter())
        .zip(frequencies.i64()?.into_no_null_iter())
        .zip(monetary.f64()?.into_no_null_iter())
        .filter(|(_, monetary)| *monetary > 0.0)
        .map(|(((customer_id, last_purchase), frequency), monetary)| {
            let recency = days_between(last_purchase, reference_ts);
            if recency < 0 {
                negative_recency += 1;
            }
            CustomerMetrics {
                customer_id,
                recency,
                frequency,
                monetary,
            }
        })
        .collect();
    metrics.sort_by_key(|m| m.customer_id);

    if negative_recency > 0 {
        warn!(
            "Reference date {} precedes the last purchase of {} customers; their recency is negative",
            reference_date, negative_recency
        );
    }

    if metrics.is_empty() {
        anyhow::bail!("No customers with positive monetary value");
    }

    info!(
        "Computed RFM metrics for {} customers ({} dropped with non-positive monetary)",
        metrics.len(),
        grouped.height() - metrics.len()
    );

    Ok(metrics)
}

/// Whole days from `from_ms` to `to_ms`, rounded toward negative infinity
fn days_between(from_ms: i64, to_ms: i64) -> i64 {
    (to_ms - from_ms).div_euclid(MILLIS_PER_DAY)
}
