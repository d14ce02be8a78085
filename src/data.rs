//! Transaction loading, cleaning and profiling.
//!
//! Spreadsheets are read with calamine, CSV files with Polars. Both sources
//! are normalised into [`RawTransaction`] rows before cleaning.

use crate::error::LoadError;
use anyhow::Context;
use calamine::{open_workbook_auto, Data, DataType as _, Reader};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use log::{debug, info};
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Character marking a cancelled invoice anywhere in its identifier.
pub const CANCELLATION_MARKER: char = 'C';

const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATETIME_FORMATS: [&str; 7] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

/// Source columns of the transaction log, in their canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Invoice,
    StockCode,
    Description,
    Quantity,
    InvoiceDate,
    Price,
    CustomerId,
    Country,
}

impl Column {
    pub const ALL: [Column; 8] = [
        Column::Invoice,
        Column::StockCode,
        Column::Description,
        Column::Quantity,
        Column::InvoiceDate,
        Column::Price,
        Column::CustomerId,
        Column::Country,
    ];

    /// Header name as it appears in the source file
    pub fn header(self) -> &'static str {
        match self {
            Column::Invoice => "Invoice",
            Column::StockCode => "StockCode",
            Column::Description => "Description",
            Column::Quantity => "Quantity",
            Column::InvoiceDate => "InvoiceDate",
            Column::Price => "Price",
            Column::CustomerId => "Customer ID",
            Column::Country => "Country",
        }
    }
}

/// Positions of the required columns within a header row
struct ColumnIndex([usize; 8]);

impl ColumnIndex {
    fn resolve(headers: &[String]) -> Result<Self, LoadError> {
        let mut positions = [0usize; 8];
        for (slot, column) in positions.iter_mut().zip(Column::ALL) {
            *slot = headers
                .iter()
                .position(|h| h.trim() == column.header())
                .ok_or_else(|| LoadError::MissingColumn {
                    column: column.header().to_string(),
                })?;
        }
        Ok(Self(positions))
    }

    fn get(&self, column: Column) -> usize {
        self.0[column as usize]
    }
}

/// A transaction line as loaded, before any validation. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTransaction {
    pub invoice: Option<String>,
    pub stock_code: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<i64>,
    pub invoice_date: Option<NaiveDateTime>,
    pub unit_price: Option<f64>,
    pub customer_id: Option<i64>,
    pub country: Option<String>,
}

impl RawTransaction {
    /// Which source columns are missing, in [`Column::ALL`] order
    fn missing_mask(&self) -> [bool; 8] {
        [
            self.invoice.is_none(),
            self.stock_code.is_none(),
            self.description.is_none(),
            self.quantity.is_none(),
            self.invoice_date.is_none(),
            self.unit_price.is_none(),
            self.customer_id.is_none(),
            self.country.is_none(),
        ]
    }
}

/// A fully populated transaction line that survived cleaning
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub invoice: String,
    pub stock_code: String,
    pub description: String,
    pub quantity: i64,
    pub invoice_date: NaiveDateTime,
    pub unit_price: f64,
    pub customer_id: i64,
    pub country: String,
    /// `quantity * unit_price`
    pub total_price: f64,
}

impl Transaction {
    /// Build a cleaned transaction, returning `None` when any field is missing
    fn from_raw(raw: RawTransaction) -> Option<Self> {
        let quantity = raw.quantity?;
        let unit_price = raw.unit_price?;
        Some(Self {
            invoice: raw.invoice?,
            stock_code: raw.stock_code?,
            description: raw.description?,
            quantity,
            invoice_date: raw.invoice_date?,
            unit_price,
            customer_id: raw.customer_id?,
            country: raw.country?,
            total_price: quantity as f64 * unit_price,
        })
    }
}

/// Whether an invoice identifier carries the cancellation marker
pub fn is_cancelled_invoice(invoice: &str) -> bool {
    invoice.contains(CANCELLATION_MARKER)
}

/// Row counts per cleaning outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleaningReport {
    pub total_rows: usize,
    pub missing_fields: usize,
    pub non_positive_quantity: usize,
    pub cancelled: usize,
    pub retained: usize,
}

/// Load transaction rows from a spreadsheet or CSV file
///
/// # Arguments
/// * `path` - Input file; the extension selects the reader
/// * `sheet` - Worksheet name (ignored for CSV)
///
/// # Returns
/// * All data rows, or an error if the source cannot be read in full
pub fn load_transactions(path: impl AsRef<Path>, sheet: &str) -> crate::Result<Vec<RawTransaction>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let rows = match extension.as_str() {
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => load_workbook(path, sheet)?,
        "csv" => load_csv(path)?,
        _ => {
            return Err(LoadError::UnsupportedFormat {
                path: path.display().to_string(),
            }
            .into())
        }
    };

    if rows.is_empty() {
        return Err(LoadError::Empty.into());
    }

    info!("Loaded {} transaction rows from {}", rows.len(), path.display());
    Ok(rows)
}

fn load_workbook(path: &Path, sheet: &str) -> crate::Result<Vec<RawTransaction>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;

    if !workbook.sheet_names().iter().any(|name| name == sheet) {
        return Err(LoadError::SheetNotFound {
            path: path.display().to_string(),
            sheet: sheet.to_string(),
        }
        .into());
    }

    let range = workbook
        .worksheet_range(sheet)
        .with_context(|| format!("Failed to read sheet '{}' from {}", sheet, path.display()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or(LoadError::Empty)?
        .iter()
        .map(|cell| cell.to_string())
        .collect();
    let index = ColumnIndex::resolve(&headers)?;
    debug!("Resolved sheet columns: {:?}", index.0);

    let mut transactions = Vec::with_capacity(range.height().saturating_sub(1));
    for (offset, row) in rows.enumerate() {
        // Header is row 1 in spreadsheet terms
        let row_number = offset + 2;
        let transaction = parse_row(row_number, |column| {
            row.get(index.get(column)).and_then(cell_text)
        })?;
        transactions.push(transaction);
    }

    Ok(transactions)
}

fn load_csv(path: &Path) -> crate::Result<Vec<RawTransaction>> {
    // Read everything as text; typing happens in parse_row
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .with_context(|| format!("Failed to read CSV {}", path.display()))?;

    let headers: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let index = ColumnIndex::resolve(&headers)?;

    let mut columns = Vec::with_capacity(Column::ALL.len());
    for column in Column::ALL {
        let series = df
            .select_at_idx(index.get(column))
            .ok_or_else(|| LoadError::MissingColumn {
                column: column.header().to_string(),
            })?
            .cast(&DataType::String)?;
        columns.push(series);
    }
    let text_columns = columns
        .iter()
        .map(|series| series.str())
        .collect::<PolarsResult<Vec<_>>>()?;

    let mut transactions = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let transaction = parse_row(i + 2, |column| {
            text_columns[column as usize]
                .get(i)
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string)
        })?;
        transactions.push(transaction);
    }

    Ok(transactions)
}

/// Text form of a spreadsheet cell; empty and error cells count as missing
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(text) | Data::DateTimeIso(text) | Data::DurationIso(text) => {
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
        Data::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            Some(format!("{}", *value as i64))
        }
        Data::DateTime(value) => Some(
            value
                .as_datetime()
                .map(|dt| dt.format(CANONICAL_DATE_FORMAT).to_string())
                .unwrap_or_else(|| cell.to_string()),
        ),
        other => other.as_string(),
    }
}

fn parse_row(
    row: usize,
    field: impl Fn(Column) -> Option<String>,
) -> Result<RawTransaction, LoadError> {
    let invalid = |column: Column, value: &str| LoadError::InvalidCell {
        row,
        column: column.header().to_string(),
        value: value.to_string(),
    };

    let quantity = field(Column::Quantity)
        .map(|text| parse_integer(&text).ok_or_else(|| invalid(Column::Quantity, &text)))
        .transpose()?;
    let unit_price = field(Column::Price)
        .map(|text| {
            text.parse::<f64>()
                .ok()
                .filter(|price| price.is_finite())
                .ok_or_else(|| invalid(Column::Price, &text))
        })
        .transpose()?;
    let customer_id = field(Column::CustomerId)
        .map(|text| parse_integer(&text).ok_or_else(|| invalid(Column::CustomerId, &text)))
        .transpose()?;
    let invoice_date = field(Column::InvoiceDate)
        .map(|text| parse_invoice_date(&text).ok_or_else(|| invalid(Column::InvoiceDate, &text)))
        .transpose()?;

    Ok(RawTransaction {
        invoice: field(Column::Invoice),
        stock_code: field(Column::StockCode),
        description: field(Column::Description),
        quantity,
        invoice_date,
        unit_price,
        customer_id,
        country: field(Column::Country),
    })
}

/// Parse an integer that may have been written as a float (`17850.0`)
fn parse_integer(text: &str) -> Option<i64> {
    if let Ok(value) = text.parse::<i64>() {
        return Some(value);
    }
    let value = text.parse::<f64>().ok()?;
    (value.is_finite() && value.fract() == 0.0).then_some(value as i64)
}

/// Parse an invoice timestamp in any of the accepted layouts
///
/// Plain dates map to midnight; RFC 3339 timestamps are converted to UTC.
pub fn parse_invoice_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
    {
        return Some(dt);
    }
    ["%Y-%m-%d", "%m/%d/%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Drop incomplete, returned and cancelled lines and compute `total_price`
pub fn clean_transactions(raw: Vec<RawTransaction>) -> (Vec<Transaction>, CleaningReport) {
    let mut report = CleaningReport {
        total_rows: raw.len(),
        ..CleaningReport::default()
    };

    let mut cleaned = Vec::with_capacity(raw.len());
    for row in raw {
        let Some(transaction) = Transaction::from_raw(row) else {
            report.missing_fields += 1;
            continue;
        };
        if transaction.quantity <= 0 {
            report.non_positive_quantity += 1;
            continue;
        }
        if is_cancelled_invoice(&transaction.invoice) {
            report.cancelled += 1;
            continue;
        }
        cleaned.push(transaction);
    }
    report.retained = cleaned.len();

    info!(
        "Cleaning kept {} of {} rows (missing: {}, non-positive quantity: {}, cancelled: {})",
        report.retained,
        report.total_rows,
        report.missing_fields,
        report.non_positive_quantity,
        report.cancelled
    );

    (cleaned, report)
}

/// Descriptive overview of a loaded transaction log
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetProfile {
    pub rows: usize,
    /// Missing value count per source column
    pub missing: Vec<(&'static str, usize)>,
    pub complete_rows: usize,
    pub distinct_descriptions: usize,
    /// Products by total quantity over complete rows, largest first
    pub top_products: Vec<(String, i64)>,
    /// Descriptions by number of lines over all rows, most frequent first
    pub top_descriptions: Vec<(String, usize)>,
    /// Over every row with a quantity, including returns
    pub quantity: Option<NumericSummary>,
    /// Over every row with a unit price
    pub price: Option<NumericSummary>,
    pub first_invoice_date: Option<NaiveDateTime>,
    pub last_invoice_date: Option<NaiveDateTime>,
}

/// Count, mean, sample standard deviation, extremes and quartiles of a column
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericSummary {
    pub count: usize,
    pub mean: f64,
    /// `NaN` for a single value
    pub std: f64,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

impl NumericSummary {
    /// Describe `values`; `None` when there are none
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let std = if count > 1 {
            let squares: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
            (squares / (count - 1) as f64).sqrt()
        } else {
            f64::NAN
        };

        Some(Self {
            count,
            mean,
            std,
            min: sorted[0],
            q25: interpolated_quantile(&sorted, 0.25),
            median: interpolated_quantile(&sorted, 0.5),
            q75: interpolated_quantile(&sorted, 0.75),
            max: sorted[count - 1],
        })
    }
}

fn interpolated_quantile(sorted: &[f64], q: f64) -> f64 {
    let position = (sorted.len() - 1) as f64 * q;
    let lower = position.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);
    sorted[lower] + (sorted[upper] - sorted[lower]) * (position - lower as f64)
}

/// Summarise a raw transaction log
///
/// Description and product statistics only consider rows where every field is present.
pub fn profile_transactions(raw: &[RawTransaction], top_n: usize) -> DatasetProfile {
    let mut missing = [0usize; 8];
    let mut quantities: BTreeMap<&str, i64> = BTreeMap::new();
    let mut descriptions = BTreeSet::new();
    let mut line_counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut complete_rows = 0;

    for row in raw {
        if let Some(description) = row.description.as_deref() {
            *line_counts.entry(description).or_default() += 1;
        }
        let mask = row.missing_mask();
        for (count, is_missing) in missing.iter_mut().zip(mask) {
            *count += usize::from(is_missing);
        }
        if mask.iter().any(|&m| m) {
            continue;
        }
        complete_rows += 1;
        if let (Some(description), Some(quantity)) = (row.description.as_deref(), row.quantity) {
            descriptions.insert(description);
            *quantities.entry(description).or_default() += quantity;
        }
    }

    let mut top_products: Vec<(String, i64)> = quantities
        .into_iter()
        .map(|(description, quantity)| (description.to_string(), quantity))
        .collect();
    // BTreeMap order makes ties fall back to description order
    top_products.sort_by(|a, b| b.1.cmp(&a.1));
    top_products.truncate(top_n);

    let mut top_descriptions: Vec<(String, usize)> = line_counts
        .into_iter()
        .map(|(description, lines)| (description.to_string(), lines))
        .collect();
    top_descriptions.sort_by(|a, b| b.1.cmp(&a.1));
    top_descriptions.truncate(top_n);

    let quantities: Vec<f64> = raw.iter().filter_map(|row| row.quantity).map(|q| q as f64).collect();
    let prices: Vec<f64> = raw.iter().filter_map(|row| row.unit_price).collect();
    let dates = raw.iter().filter_map(|row| row.invoice_date);

    DatasetProfile {
        rows: raw.len(),
        missing: Column::ALL
            .iter()
            .map(|column| column.header())
            .zip(missing)
            .collect(),
        complete_rows,
        distinct_descriptions: descriptions.len(),
        top_products,
        top_descriptions,
        quantity: NumericSummary::from_values(&quantities),
        price: NumericSummary::from_values(&prices),
        first_invoice_date: dates.clone().min(),
        last_invoice_date: dates.max(),
    }
}
