use crate::join::JoinedRow;
use crate::normalize::join_key;
use crate::types::{
    BreakdownRow, LongTable, RegionRow, ScoredRecord, ScoredRow, SummaryStats,
};
use crate::util::{format_number, format_optional};
use std::collections::BTreeSet;

/// Bounds for the year selector.
pub fn year_range<T: RegionRow>(rows: &[T]) -> Option<(i32, i32)> {
    let min = rows.iter().map(|r| r.year()).min()?;
    let max = rows.iter().map(|r| r.year()).max()?;
    Some((min, max))
}

pub fn rows_for_year<T: RegionRow + Clone>(rows: &[T], year: i32) -> Vec<T> {
    rows.iter().filter(|r| r.year() == year).cloned().collect()
}

/// Keep rows whose region is one of `selected`, compared as join keys.
/// An empty selection keeps everything.
pub fn filter_regions<T, S>(rows: &[T], selected: &[S]) -> Vec<T>
where
    T: RegionRow + Clone,
    S: AsRef<str>,
{
    if selected.is_empty() {
        return rows.to_vec();
    }
    let wanted: BTreeSet<String> = selected.iter().map(|s| join_key(s.as_ref())).collect();
    rows.iter()
        .filter(|r| wanted.contains(&join_key(r.region())))
        .cloned()
        .collect()
}

/// Color-scale bounds over a joined year, ignoring features with no data.
pub fn metric_range<T: RegionRow>(rows: &[JoinedRow<'_, T>], metric: &str) -> Option<(f64, f64)> {
    let values: Vec<f64> = rows
        .iter()
        .filter_map(|r| r.record.and_then(|rec| rec.metric(metric)))
        .collect();
    let min = values.iter().copied().reduce(f64::min)?;
    let max = values.iter().copied().reduce(f64::max)?;
    Some((min, max))
}

/// The selected year's value for one region; `None` is "no data".
pub fn value_at<T: RegionRow>(rows: &[T], region: &str, year: i32, metric: &str) -> Option<f64> {
    let key = join_key(region);
    rows.iter()
        .find(|r| r.year() == year && join_key(r.region()) == key)
        .and_then(|r| r.metric(metric))
}

/// Per-year series of one metric for one region, oldest first.
pub fn region_breakdown<T: RegionRow>(rows: &[T], region: &str, metric: &str) -> Vec<BreakdownRow> {
    let key = join_key(region);
    let mut series: Vec<(i32, Option<f64>)> = rows
        .iter()
        .filter(|r| join_key(r.region()) == key)
        .map(|r| (r.year(), r.metric(metric)))
        .collect();
    series.sort_by_key(|(year, _)| *year);
    series
        .into_iter()
        .map(|(year, value)| BreakdownRow {
            year,
            value: format_optional(value, 0),
        })
        .collect()
}

/// Sum of a metric over all rows, skipping nulls.
pub fn metric_total<T: RegionRow>(rows: &[T], metric: &str) -> f64 {
    rows.iter().filter_map(|r| r.metric(metric)).sum()
}

pub fn scored_rows(scored: &[ScoredRecord], response: &str) -> Vec<ScoredRow> {
    scored
        .iter()
        .map(|s| ScoredRow {
            region: s.record.region.clone(),
            year: s.record.year,
            actual: format_optional(s.record.metric(response), 2),
            predicted: format_optional(s.fit.map(|f| f.predicted), 2),
            residual: format_optional(s.fit.map(|f| f.residual), 2),
            status: s
                .fit
                .map(|f| f.status.as_str().to_string())
                .unwrap_or_else(|| "no data".to_string()),
        })
        .collect()
}

pub fn generate_summary(table: &LongTable, unmatched: &[String]) -> SummaryStats {
    let regions: BTreeSet<&str> = table.records.iter().map(|r| r.region.as_str()).collect();
    let range = year_range(&table.records);
    SummaryStats {
        total_regions: regions.len(),
        total_records: table.records.len(),
        first_year: range.map(|(lo, _)| lo),
        last_year: range.map(|(_, hi)| hi),
        unparseable_values: table.unparseable_values,
        skipped_rows: table.skipped_rows,
        unmatched_regions: unmatched.to_vec(),
        generated_at: chrono::Utc::now(),
    }
}

/// One-line human summary of a color scale, used in console output.
pub fn describe_range(range: Option<(f64, f64)>) -> String {
    match range {
        Some((lo, hi)) => format!("{} .. {}", format_number(lo, 0), format_number(hi, 0)),
        None => "no data".to_string(),
    }
}
