//! RfmForge: customer segmentation from e-commerce transaction logs
//!
//! Transactions are cleaned, aggregated into Recency, Frequency and Monetary
//! metrics per customer, scored into quintiles and mapped to named marketing
//! segments. One segment's customer ids can then be exported.

pub mod cli;
pub mod data;
pub mod error;
pub mod metrics;
pub mod model;
pub mod report;
pub mod score;
pub mod segment;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{clean_transactions, load_transactions, profile_transactions, RawTransaction, Transaction};
pub use error::{LoadError, ScoringError};
pub use metrics::{compute_rfm_metrics, CustomerMetrics};
pub use model::{build_rfm_table, segment_transactions, RfmRecord, RfmTable, SegmentationRun};
pub use report::{export_segment, median_rf_score, segment_customer_ids, segment_profile, summarize_segments};
pub use score::{RfScore, RfmScores, Score};
pub use segment::{classify, Segment};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
