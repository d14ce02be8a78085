//! Segment charts using Plotters

use crate::model::RfmTable;
use crate::score::QUINTILES;
use crate::segment::Segment;
use ndarray::Array2;
use plotters::prelude::*;

/// Bar colour per segment, in [`Segment::ALL`] order
const SEGMENT_COLORS: [RGBColor; 10] = [
    RGBColor(99, 110, 250),
    RGBColor(239, 85, 59),
    RGBColor(0, 204, 150),
    RGBColor(171, 99, 250),
    RGBColor(255, 161, 90),
    RGBColor(25, 211, 243),
    RGBColor(255, 102, 146),
    RGBColor(182, 232, 128),
    RGBColor(255, 151, 255),
    RGBColor(254, 203, 82),
];

/// Customer counts indexed by `[recency_score - 1, frequency_score - 1]`
pub fn score_grid(table: &RfmTable) -> Array2<usize> {
    let mut grid = Array2::zeros((QUINTILES, QUINTILES));
    for record in table.records() {
        let r = usize::from(record.scores.recency.value()) - 1;
        let f = usize::from(record.scores.frequency.value()) - 1;
        grid[[r, f]] += 1;
    }
    grid
}

/// Bar chart of customers per segment
///
/// # Arguments
/// * `table` - Segmented customers
/// * `output_path` - Path to save the PNG chart
pub fn create_segment_chart(table: &RfmTable, output_path: &str) -> crate::Result<()> {
    let counts = table.segment_counts();
    let max_count = counts.values().copied().max().unwrap_or(1) as u32;

    let root = BitMapBackend::new(output_path, (1000, 500)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Customers per Segment", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d(
            (0u32..Segment::ALL.len() as u32).into_segmented(),
            0u32..(max_count + max_count / 10 + 1),
        )?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(Segment::ALL.len())
        .x_label_formatter(&|value: &SegmentValue<u32>| match value {
            SegmentValue::CenterOf(i) => Segment::ALL
                .get(*i as usize)
                .map(|s| s.label().to_string())
                .unwrap_or_default(),
            _ => String::new(),
        })
        .x_desc("Segment")
        .y_desc("Number of Customers")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for (i, segment) in Segment::ALL.iter().enumerate() {
        let count = counts.get(segment).copied().unwrap_or(0) as u32;
        let color = SEGMENT_COLORS[i];
        chart.draw_series(std::iter::once(Rectangle::new(
            [
                (SegmentValue::Exact(i as u32), 0),
                (SegmentValue::Exact(i as u32 + 1), count),
            ],
            color.filled(),
        )))?;
    }

    root.present()?;
    log::info!("Segment chart saved to: {}", output_path);

    Ok(())
}

/// Heatmap of customer counts over recency (x) and frequency (y) scores
pub fn create_score_grid_chart(table: &RfmTable, output_path: &str) -> crate::Result<()> {
    let grid = score_grid(table);
    let max_count = grid.iter().copied().max().unwrap_or(0).max(1) as f64;

    let root = BitMapBackend::new(output_path, (600, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let upper = QUINTILES as i32 + 1;
    let mut chart = ChartBuilder::on(&root)
        .caption("Customers by RF Score", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(50)
        .build_cartesian_2d(1i32..upper, 1i32..upper)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Recency Score")
        .y_desc("Frequency Score")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    for ((r, f), &count) in grid.indexed_iter() {
        let x = r as i32 + 1;
        let y = f as i32 + 1;
        let intensity = count as f64 / max_count;
        chart.draw_series(std::iter::once(Rectangle::new(
            [(x, y), (x + 1, y + 1)],
            HSLColor(0.6, 0.7, 0.95 - 0.55 * intensity).filled(),
        )))?;
        chart.draw_series(std::iter::once(Text::new(
            count.to_string(),
            (x, y + 1),
            ("sans-serif", 15).into_font(),
        )))?;
    }

    root.present()?;
    log::info!("Score grid chart saved to: {}", output_path);

    Ok(())
}

/// Write both charts; the grid goes next to `base_output_path` with a `_grid` suffix
pub fn generate_visualization_report(table: &RfmTable, base_output_path: &str) -> crate::Result<String> {
    create_segment_chart(table, base_output_path)?;

    let grid_path = grid_chart_path(base_output_path);
    create_score_grid_chart(table, &grid_path)?;

    Ok(grid_path)
}

fn grid_chart_path(base_output_path: &str) -> String {
    match base_output_path.strip_suffix(".png") {
        Some(stem) => format!("{}_grid.png", stem),
        None => format!("{}_grid.png", base_output_path),
    }
}
