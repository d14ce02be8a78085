//! Command-line interface definitions and argument parsing

use crate::data::parse_invoice_date;
use crate::segment::Segment;
use chrono::NaiveDateTime;
use clap::Parser;

/// Customer segmentation CLI using RFM quintile scores
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the transaction log (.xlsx, .xls, .ods or .csv)
    #[arg(short, long, default_value = "datasets/online_retail_II.xlsx")]
    pub input: String,

    /// Worksheet to read from a spreadsheet input
    #[arg(short, long, default_value = "Year 2010-2011")]
    pub sheet: String,

    /// Date recency is measured against, e.g. 2011-12-11 or "2011-12-11 00:00:00"
    #[arg(short = 'd', long, default_value = "2011-12-11")]
    pub reference_date: String,

    /// Output path for the exported customer list (.xlsx or .csv)
    #[arg(short, long, default_value = "loyal_customers.xlsx")]
    pub output: String,

    /// Worksheet name for a spreadsheet export
    #[arg(long, default_value = "loyal segment")]
    pub output_sheet: String,

    /// Segment whose customer ids are exported
    #[arg(short, long, default_value = "loyal_customers")]
    pub export_segment: Segment,

    /// Segments to profile in the report, comma-separated
    #[arg(
        short,
        long,
        value_delimiter = ',',
        default_value = "cant_loose,champions,loyal_customers"
    )]
    pub report_segments: Vec<Segment>,

    /// Write segment charts to this PNG path
    #[arg(long)]
    pub plot: Option<String>,

    /// Print a profile of the raw transaction log before segmenting
    #[arg(long)]
    pub profile: bool,

    /// Number of top products listed in the profile
    #[arg(long, default_value = "5")]
    pub top_products: usize,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse the reference date; a plain date means midnight
    pub fn reference_datetime(&self) -> crate::Result<NaiveDateTime> {
        parse_invoice_date(&self.reference_date)
            .ok_or_else(|| anyhow::anyhow!("Invalid reference date: {}", self.reference_date))
    }

    /// Default log filter for the chosen verbosity
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_defaults_match_reference_run() {
        let args = Args::parse_from(["rfmforge"]);
        assert_eq!(args.sheet, "Year 2010-2011");
        assert_eq!(args.export_segment, Segment::LoyalCustomers);
        assert_eq!(
            args.report_segments,
            vec![Segment::CantLoose, Segment::Champions, Segment::LoyalCustomers]
        );
        assert_eq!(
            args.reference_datetime().unwrap(),
            NaiveDate::from_ymd_opt(2011, 12, 11).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(args.log_filter(), "info");
    }

    #[test]
    fn test_parse_overrides() {
        let mut args = Args::parse_from([
            "rfmforge",
            "--input",
            "retail.csv",
            "-d",
            "2010-12-10 12:00:00",
            "-e",
            "champions",
            "-r",
            "at_risk,hibernating",
            "--verbose",
        ]);
        assert_eq!(args.input, "retail.csv");
        assert_eq!(args.export_segment, Segment::Champions);
        assert_eq!(args.report_segments, vec![Segment::AtRisk, Segment::Hibernating]);
        assert_eq!(args.log_filter(), "debug");
        assert!(args.reference_datetime().is_ok());

        args.reference_date = "not a date".to_string();
        assert!(args.reference_datetime().is_err());
    }

    #[test]
    fn test_unknown_segment_rejected() {
        assert!(Args::try_parse_from(["rfmforge", "-e", "whales"]).is_err());
    }
}
