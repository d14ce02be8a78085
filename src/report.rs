//! Segment summaries and customer list export

use crate::data::NumericSummary;
use crate::model::{RfmRecord, RfmTable};
use crate::segment::Segment;
use anyhow::Context;
use log::info;
use polars::prelude::*;
use rust_xlsxwriter::Workbook;
use std::fs::File;
use std::path::Path;

/// Mean metrics of one segment
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentSummary {
    pub segment: Segment,
    pub count: usize,
    pub recency_mean: f64,
    pub frequency_mean: f64,
    pub monetary_mean: f64,
}

/// Summary of one segment together with its median RF score and first members
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentProfile {
    pub summary: SegmentSummary,
    pub median_rf_score: f64,
    pub sample: Vec<RfmRecord>,
}

/// Count and mean recency, frequency and monetary value per segment
///
/// Every segment with at least one customer is listed, ordered by label;
/// empty segments are omitted.
pub fn summarize_segments(table: &RfmTable) -> crate::Result<Vec<SegmentSummary>> {
    let summary = table
        .to_dataframe()?
        .lazy()
        .group_by([col("segment")])
        .agg([
            col("customer_id").count().alias("count"),
            col("recency").mean().alias("recency_mean"),
            col("frequency").mean().alias("frequency_mean"),
            col("monetary").mean().alias("monetary_mean"),
        ])
        .collect()?;

    let counts = summary.column("count")?.cast(&DataType::Int64)?;
    let recency = summary.column("recency_mean")?.cast(&DataType::Float64)?;
    let frequency = summary.column("frequency_mean")?.cast(&DataType::Float64)?;
    let monetary = summary.column("monetary_mean")?.cast(&DataType::Float64)?;

    let mut summaries = Vec::with_capacity(summary.height());
    for (i, label) in summary.column("segment")?.str()?.into_iter().enumerate() {
        let segment = label
            .unwrap_or_default()
            .parse::<Segment>()
            .map_err(anyhow::Error::msg)?;
        summaries.push(SegmentSummary {
            segment,
            count: counts.i64()?.get(i).unwrap_or(0) as usize,
            recency_mean: recency.f64()?.get(i).unwrap_or(f64::NAN),
            frequency_mean: frequency.f64()?.get(i).unwrap_or(f64::NAN),
            monetary_mean: monetary.f64()?.get(i).unwrap_or(f64::NAN),
        });
    }
    summaries.sort_by_key(|s| s.segment.label());

    Ok(summaries)
}

/// Describe recency, frequency and monetary value over the whole table
///
/// Empty for an empty table.
pub fn describe_metrics(table: &RfmTable) -> Vec<(&'static str, NumericSummary)> {
    let records = table.records();
    let recency: Vec<f64> = records.iter().map(|r| r.recency as f64).collect();
    let frequency: Vec<f64> = records.iter().map(|r| r.frequency as f64).collect();
    let monetary: Vec<f64> = records.iter().map(|r| r.monetary).collect();

    [("recency", recency), ("frequency", frequency), ("monetary", monetary)]
        .into_iter()
        .filter_map(|(name, values)| NumericSummary::from_values(&values).map(|summary| (name, summary)))
        .collect()
}

/// Median of the RF scores in a segment, reading each score as a two-digit number
///
/// Even-sized segments average the two middle scores. `None` for an empty segment.
pub fn median_rf_score(table: &RfmTable, segment: Segment) -> Option<f64> {
    let mut scores: Vec<u8> = table.members(segment).map(|r| r.rf_score().numeric()).collect();
    if scores.is_empty() {
        return None;
    }
    scores.sort_unstable();

    let mid = scores.len() / 2;
    let median = if scores.len() % 2 == 0 {
        (f64::from(scores[mid - 1]) + f64::from(scores[mid])) / 2.0
    } else {
        f64::from(scores[mid])
    };
    Some(median)
}

/// Summary, median RF score and the first `sample_size` members of a segment
pub fn segment_profile(
    table: &RfmTable,
    segment: Segment,
    sample_size: usize,
) -> crate::Result<Option<SegmentProfile>> {
    let Some(summary) = summarize_segments(table)?
        .into_iter()
        .find(|s| s.segment == segment)
    else {
        return Ok(None);
    };
    let Some(median_rf_score) = median_rf_score(table, segment) else {
        return Ok(None);
    };

    Ok(Some(SegmentProfile {
        summary,
        median_rf_score,
        sample: table.members(segment).take(sample_size).cloned().collect(),
    }))
}

/// Customer ids of one segment, in table order
pub fn segment_customer_ids(table: &RfmTable, segment: Segment) -> Vec<i64> {
    table.members(segment).map(|r| r.customer_id).collect()
}

/// Name of the single column in an exported customer list
pub fn export_column_name(segment: Segment) -> String {
    format!("{}_id", segment.label())
}

/// Write a segment's customer ids as a one-column table
///
/// # Arguments
/// * `table` - Segmented customers
/// * `segment` - Segment to export
/// * `path` - `.xlsx` or `.csv` destination
/// * `sheet` - Worksheet name (ignored for CSV)
///
/// # Returns
/// * Number of exported customers
pub fn export_segment(
    table: &RfmTable,
    segment: Segment,
    path: impl AsRef<Path>,
    sheet: &str,
) -> crate::Result<usize> {
    let path = path.as_ref();
    let ids = segment_customer_ids(table, segment);
    let column = export_column_name(segment);

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "xlsx" => write_workbook(&ids, &column, path, sheet)?,
        "csv" => write_csv(&ids, &column, path)?,
        _ => anyhow::bail!("Unsupported output format: {} (expected .xlsx or .csv)", path.display()),
    }

    info!("Exported {} {} customers to {}", ids.len(), segment, path.display());
    Ok(ids.len())
}

fn write_workbook(ids: &[i64], column: &str, path: &Path, sheet: &str) -> crate::Result<()> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(sheet)?;
    worksheet.write_string(0, 0, column)?;
    for (row, &id) in ids.iter().enumerate() {
        worksheet.write_number(row as u32 + 1, 0, id as f64)?;
    }
    workbook
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn write_csv(ids: &[i64], column: &str, path: &Path) -> crate::Result<()> {
    let mut df = df!(column => ids)?;
    let mut file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::CustomerMetrics;
    use crate::model::build_rfm_table;
    use calamine::{open_workbook, Reader, Xlsx};
    use tempfile::tempdir;

    fn create_test_table() -> RfmTable {
        let metrics = (0..25)
            .map(|i| CustomerMetrics {
                customer_id: 13000 + i,
                recency: 1 + (i * 11) % 25,
                frequency: 1 + i % 6,
                monetary: 5.0 + ((i * 7) % 25) as f64 * 12.5,
            })
            .collect();
        build_rfm_table(metrics).unwrap()
    }

    #[test]
    fn test_summarize_segments() {
        let table = create_test_table();
        let summaries = summarize_segments(&table).unwrap();

        assert_eq!(summaries.iter().map(|s| s.count).sum::<usize>(), table.len());
        let labels: Vec<&str> = summaries.iter().map(|s| s.segment.label()).collect();
        let mut sorted = labels.clone();
        sorted.sort();
        assert_eq!(labels, sorted);

        for summary in &summaries {
            let members: Vec<&RfmRecord> = table.members(summary.segment).collect();
            assert_eq!(summary.count, members.len());
            let recency = members.iter().map(|r| r.recency as f64).sum::<f64>() / members.len() as f64;
            let monetary = members.iter().map(|r| r.monetary).sum::<f64>() / members.len() as f64;
            assert!((summary.recency_mean - recency).abs() < 1e-9);
            assert!((summary.monetary_mean - monetary).abs() < 1e-9);
        }
    }

    #[test]
    fn test_median_rf_score() {
        let table = create_test_table();
        for (segment, _) in table.segment_counts() {
            let mut scores: Vec<u8> = table.members(segment).map(|r| r.rf_score().numeric()).collect();
            scores.sort_unstable();
            let median = median_rf_score(&table, segment).unwrap();
            assert!(median >= f64::from(scores[0]));
            assert!(median <= f64::from(*scores.last().unwrap()));
        }
        let absent = Segment::ALL
            .into_iter()
            .find(|s| table.members(*s).next().is_none());
        if let Some(segment) = absent {
            assert_eq!(median_rf_score(&table, segment), None);
        }
    }

    /// Recency `i` and frequency `10 - i`: scores 55, 55, 44, 44, 33, 33, 22, 22, 11, 11
    fn create_diagonal_table() -> RfmTable {
        let metrics = (0..10)
            .map(|i| CustomerMetrics {
                customer_id: i,
                recency: i,
                frequency: 10 - i,
                monetary: 100.0 + i as f64,
            })
            .collect();
        build_rfm_table(metrics).unwrap()
    }

    #[test]
    fn test_median_rf_score_known_segments() {
        let table = create_diagonal_table();
        assert_eq!(segment_customer_ids(&table, Segment::Hibernating), vec![6, 7, 8, 9]);
        assert_eq!(segment_customer_ids(&table, Segment::NeedAttention), vec![4, 5]);

        // {22, 22, 11, 11}
        assert_eq!(median_rf_score(&table, Segment::Hibernating), Some(16.5));
        assert_eq!(median_rf_score(&table, Segment::NeedAttention), Some(33.0));
        assert_eq!(median_rf_score(&table, Segment::Champions), Some(55.0));
        assert_eq!(median_rf_score(&table, Segment::AtRisk), None);
    }

    #[test]
    fn test_summarize_segments_omits_empty_segments() {
        let table = create_diagonal_table();
        let summaries = summarize_segments(&table).unwrap();

        let labels: Vec<&str> = summaries.iter().map(|s| s.segment.label()).collect();
        assert_eq!(labels, vec!["champions", "hibernating", "loyal_customers", "need_attention"]);
        assert_eq!(summaries[1].count, 4);
        assert!((summaries[1].recency_mean - 7.5).abs() < 1e-9);
        assert!((summaries[1].frequency_mean - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_describe_metrics() {
        let table = create_diagonal_table();
        let described = describe_metrics(&table);

        let names: Vec<&str> = described.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["recency", "frequency", "monetary"]);

        let (_, recency) = described[0];
        assert_eq!(recency.count, 10);
        assert!((recency.mean - 4.5).abs() < 1e-9);
        assert!((recency.std - (82.5f64 / 9.0).sqrt()).abs() < 1e-9);
        assert_eq!((recency.min, recency.max), (0.0, 9.0));
        assert!((recency.q25 - 2.25).abs() < 1e-9);
        assert!((recency.median - 4.5).abs() < 1e-9);
        assert!((recency.q75 - 6.75).abs() < 1e-9);

        let (_, frequency) = described[1];
        assert!((frequency.mean - 5.5).abs() < 1e-9);
        assert!((frequency.q25 - 3.25).abs() < 1e-9);

        let (_, monetary) = described[2];
        assert!((monetary.mean - 104.5).abs() < 1e-9);
        assert_eq!(monetary.max, 109.0);
    }

    #[test]
    fn test_segment_profile_sample() {
        let table = create_test_table();
        let (segment, count) = table
            .segment_counts()
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .unwrap();

        let profile = segment_profile(&table, segment, 2).unwrap().unwrap();
        assert_eq!(profile.summary.count, count);
        assert_eq!(profile.sample.len(), count.min(2));
        assert!(profile.sample.iter().all(|r| r.segment == segment));
    }

    #[test]
    fn test_export_segment_csv() {
        let table = create_test_table();
        let (segment, _) = table.segment_counts().into_iter().next().unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.csv");

        let exported = export_segment(&table, segment, &path, "ignored").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some(export_column_name(segment).as_str()));
        let ids: Vec<i64> = lines.map(|line| line.parse().unwrap()).collect();
        assert_eq!(ids.len(), exported);
        assert_eq!(ids, segment_customer_ids(&table, segment));
    }

    #[test]
    fn test_export_segment_xlsx() {
        let table = create_test_table();
        let (segment, _) = table.segment_counts().into_iter().next().unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.xlsx");

        export_segment(&table, segment, &path, "loyal segment").unwrap();

        let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
        let range = workbook.worksheet_range("loyal segment").unwrap();
        let mut rows = range.rows();
        assert_eq!(rows.next().unwrap()[0].to_string(), export_column_name(segment));
        let ids: Vec<i64> = rows.map(|row| row[0].to_string().parse().unwrap()).collect();
        assert_eq!(ids, segment_customer_ids(&table, segment));
    }

    #[test]
    fn test_export_rejects_unknown_format() {
        let table = create_test_table();
        let dir = tempdir().unwrap();
        let result = export_segment(&table, Segment::Champions, dir.path().join("out.json"), "sheet");
        assert!(result.is_err());
    }
}
