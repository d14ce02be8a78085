//! RfmForge: Customer segmentation CLI using RFM quintile scores
//!
//! This is the main entrypoint that orchestrates loading, segmentation,
//! reporting, export and optional charts.

use anyhow::Result;
use clap::Parser;
use log::{debug, info};
use rfmforge::data::{DatasetProfile, NumericSummary};
use rfmforge::report::{describe_metrics, segment_profile, SegmentSummary};
use rfmforge::{
    export_segment, load_transactions, profile_transactions, segment_transactions, summarize_segments,
    viz, Args, RfmTable,
};
use std::time::Instant;

/// Customers shown per profiled segment
const SAMPLE_ROWS: usize = 5;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_filter()))
        .init();

    run_full_pipeline(&args)
}

/// Run load → segment → report → export
fn run_full_pipeline(args: &Args) -> Result<()> {
    let start_time = Instant::now();
    let reference_date = args.reference_datetime()?;

    // Step 1: Load data
    info!("Loading transactions from {} (sheet '{}')", args.input, args.sheet);
    let raw = load_transactions(&args.input, &args.sheet)?;

    if args.profile {
        print_dataset_profile(&profile_transactions(&raw, args.top_products));
    }

    // Step 2: Clean, aggregate, score and classify
    let segment_start = Instant::now();
    let run = segment_transactions(raw, reference_date)?;
    debug!("Segmentation time: {:.2}s", segment_start.elapsed().as_secs_f64());

    println!(
        "✓ {} customers segmented from {} of {} transaction rows",
        run.table.len(),
        run.cleaning.retained,
        run.cleaning.total_rows
    );
    match run.last_invoice_date {
        Some(last) => println!("  Last invoice {}, reference date {}", last, reference_date),
        None => println!("  Reference date {}", reference_date),
    }

    if args.profile {
        println!("\n=== RFM Metrics ===");
        print_summary_header();
        for (name, summary) in describe_metrics(&run.table) {
            print_summary_row(name, &summary);
        }
    }

    // Step 3: Report
    print_segment_summaries(&summarize_segments(&run.table)?, run.table.len());
    print_segment_profiles(args, &run.table)?;

    // Step 4: Export
    let exported = export_segment(&run.table, args.export_segment, &args.output, &args.output_sheet)?;
    println!(
        "\n✓ Exported {} {} customer ids to {}",
        exported, args.export_segment, args.output
    );

    // Step 5: Optional charts
    if let Some(plot_path) = &args.plot {
        let grid_path = viz::generate_visualization_report(&run.table, plot_path)?;
        println!("✓ Charts saved to {} and {}", plot_path, grid_path);
    }

    info!("Total processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

fn print_dataset_profile(profile: &DatasetProfile) {
    println!("\n=== Dataset Profile ===");
    println!("Rows: {} ({} complete)", profile.rows, profile.complete_rows);
    if let (Some(first), Some(last)) = (profile.first_invoice_date, profile.last_invoice_date) {
        println!("Invoice dates: {} to {}", first, last);
    }

    println!("\nMissing values:");
    for (column, count) in &profile.missing {
        println!("  {:<12} {}", column, count);
    }

    print_summary_header();
    if let Some(quantity) = &profile.quantity {
        print_summary_row("Quantity", quantity);
    }
    if let Some(price) = &profile.price {
        print_summary_row("Price", price);
    }

    println!("\nDistinct products: {}", profile.distinct_descriptions);
    println!("Most frequent descriptions:");
    for (description, lines) in &profile.top_descriptions {
        println!("  {:>8}  {}", lines, description);
    }
    println!("Top products by quantity:");
    for (description, quantity) in &profile.top_products {
        println!("  {:>8}  {}", quantity, description);
    }
}

fn print_summary_header() {
    println!(
        "\n  {:<10} | {:>8} | {:>10} | {:>10} | {:>10} | {:>10} | {:>10} | {:>10} | {:>10}",
        "", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
    );
}

fn print_summary_row(name: &str, summary: &NumericSummary) {
    println!(
        "  {:<10} | {:>8} | {:>10.2} | {:>10.2} | {:>10.2} | {:>10.2} | {:>10.2} | {:>10.2} | {:>10.2}",
        name,
        summary.count,
        summary.mean,
        summary.std,
        summary.min,
        summary.q25,
        summary.median,
        summary.q75,
        summary.max
    );
}

fn print_segment_summaries(summaries: &[SegmentSummary], total: usize) {
    println!("\n=== Segment Statistics ===");
    println!("  Segment             | Count |   Share | Recency | Frequency |  Monetary");
    println!("  --------------------|-------|---------|---------|-----------|----------");
    for summary in summaries {
        let share = summary.count as f64 / total as f64 * 100.0;
        println!(
            "  {:<19} | {:5} | {:6.1}% | {:7.1} | {:9.2} | {:9.2}",
            summary.segment.label(),
            summary.count,
            share,
            summary.recency_mean,
            summary.frequency_mean,
            summary.monetary_mean
        );
    }
}

fn print_segment_profiles(args: &Args, table: &RfmTable) -> Result<()> {
    for &segment in &args.report_segments {
        println!("\n=== {} ===", segment);
        let Some(profile) = segment_profile(table, segment, SAMPLE_ROWS)? else {
            println!("  No customers");
            continue;
        };

        println!(
            "  {} customers, median RF score {:.1}",
            profile.summary.count, profile.median_rf_score
        );
        println!("  Customer | Recency | Frequency | Monetary | R | F | M | RF");
        for record in &profile.sample {
            println!(
                "  {:8} | {:7} | {:9} | {:8.2} | {} | {} | {} | {}",
                record.customer_id,
                record.recency,
                record.frequency,
                record.monetary,
                record.scores.recency,
                record.scores.frequency,
                record.scores.monetary,
                record.rf_score()
            );
        }
    }
    Ok(())
}
