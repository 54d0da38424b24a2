use crate::error::{PipelineError, Result};
use crate::normalize::{canonical_name, join_key};
use crate::schema::{missing, require_columns};
use crate::types::{LongTable, RawTable, RegionRecord};
use crate::util::{coerce_f64, parse_i32_safe, Coerced};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// One declared `(metric, year) -> column` mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearColumn {
    pub metric: String,
    pub year: i32,
    pub column: String,
}

/// Metric stems followed by a numeric suffix, e.g. `produksi_ton1` or
/// `produksi_ton_2019`. The pattern must have exactly one capture group
/// holding an integer; the calendar year is `base_year + captured`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuffixPattern {
    pub stems: Vec<String>,
    pub pattern: String,
    pub base_year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum YearLayout {
    Explicit(Vec<YearColumn>),
    Suffix(SuffixPattern),
}

impl YearLayout {
    /// Pick a layout from what is configured. An explicit column list wins
    /// over a suffix pattern when both are present.
    pub fn choose(explicit: Vec<YearColumn>, suffix: Option<SuffixPattern>) -> Option<Self> {
        if !explicit.is_empty() {
            if suffix.is_some() {
                debug!("explicit year columns configured; ignoring suffix pattern");
            }
            return Some(YearLayout::Explicit(explicit));
        }
        suffix.map(YearLayout::Suffix)
    }
}

/// Wide table: one row per region, per-year metric columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WideSpec {
    pub region_column: String,
    /// Per-region constants copied onto every year row.
    pub carry_columns: Vec<String>,
    pub layout: YearLayout,
}

/// Table that is already long: one row per (region, year).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongSpec {
    pub region_column: String,
    pub year_column: String,
    pub metric_columns: Vec<String>,
}

/// Column index for each (year, metric) pair, plus the metric order.
struct ResolvedLayout {
    metrics: Vec<String>,
    years: Vec<i32>,
    cells: HashMap<(i32, String), usize>,
}

fn index_of(table: &RawTable, column: &str) -> usize {
    // Only called after presence has been validated.
    table.column_index(column).unwrap_or(usize::MAX)
}

fn resolve_explicit(table: &RawTable, columns: &[YearColumn]) -> Result<ResolvedLayout> {
    let mut metrics: Vec<String> = Vec::new();
    let mut years = BTreeSet::new();
    let mut cells = HashMap::new();
    for yc in columns {
        let metric = canonical_name(&yc.metric);
        let column = canonical_name(&yc.column);
        let Some(idx) = table.column_index(&column) else {
            return Err(missing(&column, Some(metric.as_str()), Some(yc.year), &table.columns));
        };
        if cells.insert((yc.year, metric.clone()), idx).is_some() {
            return Err(PipelineError::AmbiguousColumn {
                role: format!("{} {}", metric, yc.year),
                candidates: vec![column],
            });
        }
        if !metrics.contains(&metric) {
            metrics.push(metric);
        }
        years.insert(yc.year);
    }
    Ok(ResolvedLayout {
        metrics,
        years: years.into_iter().collect(),
        cells,
    })
}

fn resolve_suffix(table: &RawTable, suffix: &SuffixPattern) -> Result<ResolvedLayout> {
    let groups = Regex::new(&suffix.pattern)?.captures_len();
    if groups != 2 {
        return Err(PipelineError::Config(format!(
            "suffix pattern `{}` must have exactly one capture group, found {}",
            suffix.pattern,
            groups - 1
        )));
    }
    let stems: Vec<String> = suffix.stems.iter().map(|s| canonical_name(s)).collect();
    let matchers = stems
        .iter()
        .map(|stem| Regex::new(&format!("^{}(?:{})$", regex::escape(stem), suffix.pattern)))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut cells: HashMap<(i32, String), usize> = HashMap::new();
    let mut years_by_stem: HashMap<String, BTreeSet<i32>> = HashMap::new();
    for (idx, column) in table.columns.iter().enumerate() {
        let hits: Vec<(&String, i32)> = stems
            .iter()
            .zip(&matchers)
            .filter_map(|(stem, re)| {
                let caps = re.captures(column)?;
                let n: i32 = caps.get(1)?.as_str().parse().ok()?;
                Some((stem, suffix.base_year.checked_add(n)?))
            })
            .collect();
        match hits.as_slice() {
            [] => continue,
            [(stem, year)] => {
                if let Some(prev) = cells.insert((*year, stem.to_string()), idx) {
                    return Err(PipelineError::AmbiguousColumn {
                        role: format!("{} {}", stem, year),
                        candidates: vec![table.columns[prev].clone(), column.clone()],
                    });
                }
                years_by_stem.entry(stem.to_string()).or_default().insert(*year);
            }
            many => {
                return Err(PipelineError::AmbiguousColumn {
                    role: column.clone(),
                    candidates: many.iter().map(|(stem, _)| stem.to_string()).collect(),
                })
            }
        }
    }

    if cells.is_empty() {
        return Err(PipelineError::NoYearColumnsFound {
            stems,
            pattern: suffix.pattern.clone(),
        });
    }

    let years: BTreeSet<i32> = years_by_stem.values().flatten().copied().collect();
    for stem in &stems {
        let Some(found) = years_by_stem.get(stem) else {
            return Err(missing(stem, Some(stem.as_str()), None, &table.columns));
        };
        if let Some(year) = years.difference(found).next() {
            return Err(missing(stem, Some(stem.as_str()), Some(*year), &table.columns));
        }
    }

    Ok(ResolvedLayout {
        metrics: stems,
        years: years.into_iter().collect(),
        cells,
    })
}

/// Count-and-null coercion shared by both layouts.
fn coerce_cell(
    raw: Option<&str>,
    column: &str,
    row: usize,
    unparseable: &mut usize,
) -> Option<f64> {
    match coerce_f64(raw.unwrap_or("")) {
        Coerced::Value(v) => Some(v),
        Coerced::Empty => None,
        Coerced::Unparseable => {
            *unparseable += 1;
            debug!(column, row, value = raw.unwrap_or(""), "unparseable value set to null");
            None
        }
    }
}

/// Unpivot a wide table into one record per (region, year).
///
/// Validation runs before any row is produced, so a failure never yields a
/// partial table.
pub fn unpivot_wide(table: &RawTable, spec: &WideSpec) -> Result<LongTable> {
    let region_column = canonical_name(&spec.region_column);
    let carry: Vec<String> = spec.carry_columns.iter().map(|c| canonical_name(c)).collect();
    require_columns(&table.columns, &[&region_column])?;
    require_columns(&table.columns, &carry)?;

    let layout = match &spec.layout {
        YearLayout::Explicit(columns) => resolve_explicit(table, columns)?,
        YearLayout::Suffix(suffix) => resolve_suffix(table, suffix)?,
    };

    let region_idx = index_of(table, &region_column);
    let carry_idx: Vec<(String, usize)> = carry
        .iter()
        .map(|c| (c.clone(), index_of(table, c)))
        .collect();

    let mut out = LongTable {
        attribute_names: carry.clone(),
        metric_names: layout.metrics.clone(),
        ..LongTable::default()
    };
    let mut seen: BTreeSet<(String, i32)> = BTreeSet::new();

    for row in 0..table.rows.len() {
        let region = table.cell(row, region_idx).unwrap_or("").trim().to_string();
        if region.is_empty() {
            warn!(row, "skipping row without region");
            out.skipped_rows += 1;
            continue;
        }
        for &year in &layout.years {
            if !seen.insert((join_key(&region), year)) {
                return Err(PipelineError::DuplicateRecord {
                    region,
                    year,
                    metric: layout.metrics.join(", "),
                });
            }
            let mut record = RegionRecord::new(region.clone(), year);
            for (name, idx) in &carry_idx {
                let value = table.cell(row, *idx).unwrap_or("").trim().to_string();
                record.attributes.insert(name.clone(), value);
            }
            for metric in &layout.metrics {
                let value = match layout.cells.get(&(year, metric.clone())) {
                    Some(&idx) => coerce_cell(
                        table.cell(row, idx),
                        &table.columns[idx],
                        row,
                        &mut out.unparseable_values,
                    ),
                    None => None,
                };
                record.metrics.insert(metric.clone(), value);
            }
            out.records.push(record);
        }
    }

    info!(
        records = out.records.len(),
        years = layout.years.len(),
        metrics = out.metric_names.len(),
        unparseable = out.unparseable_values,
        "unpivoted wide table"
    );
    Ok(out)
}

/// Collect an already-long table. Rows sharing a (region, year) key are
/// merged; a metric filled twice for the same key is an error.
pub fn collect_long(table: &RawTable, spec: &LongSpec) -> Result<LongTable> {
    let region_column = canonical_name(&spec.region_column);
    let year_column = canonical_name(&spec.year_column);
    let metrics: Vec<String> = spec.metric_columns.iter().map(|c| canonical_name(c)).collect();
    require_columns(&table.columns, &[&region_column, &year_column])?;
    require_columns(&table.columns, &metrics)?;

    let region_idx = index_of(table, &region_column);
    let year_idx = index_of(table, &year_column);
    let metric_idx: Vec<(String, usize)> = metrics
        .iter()
        .map(|m| (m.clone(), index_of(table, m)))
        .collect();

    let mut out = LongTable {
        metric_names: metrics,
        ..LongTable::default()
    };
    let mut by_key: HashMap<(String, i32), usize> = HashMap::new();

    for row in 0..table.rows.len() {
        let region = table.cell(row, region_idx).unwrap_or("").trim().to_string();
        let year = parse_i32_safe(table.cell(row, year_idx));
        let year = match (region.is_empty(), year) {
            (false, Some(y)) => y,
            _ => {
                warn!(row, region = %region, "skipping row without usable region/year");
                out.skipped_rows += 1;
                continue;
            }
        };

        // Keyed like the join, so case variants of one region merge.
        let pos = *by_key.entry((join_key(&region), year)).or_insert_with(|| {
            let mut record = RegionRecord::new(region.clone(), year);
            for (name, _) in &metric_idx {
                record.metrics.insert(name.clone(), None);
            }
            out.records.push(record);
            out.records.len() - 1
        });

        for (name, idx) in &metric_idx {
            let Some(value) =
                coerce_cell(table.cell(row, *idx), name, row, &mut out.unparseable_values)
            else {
                continue;
            };
            let slot = out.records[pos].metrics.entry(name.clone()).or_insert(None);
            if slot.is_some() {
                return Err(PipelineError::DuplicateRecord {
                    region: out.records[pos].region.clone(),
                    year,
                    metric: name.clone(),
                });
            }
            *slot = Some(value);
        }
    }

    info!(
        records = out.records.len(),
        skipped = out.skipped_rows,
        unparseable = out.unparseable_values,
        "collected long table"
    );
    Ok(out)
}
