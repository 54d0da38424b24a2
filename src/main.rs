// Entry point and high-level CLI flow.
//
// Subcommands run one step of the pipeline and write their outputs. Without
// a subcommand the binary drops into a menu that mirrors the dashboard:
// pick a year, export the map layer, drill into one province. The source
// table is reshaped once and reused until the file changes.
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gapmap::config::PipelineConfig;
use gapmap::join::join_by_region;
use gapmap::pipeline::Pipeline;
use gapmap::types::{FeatureTable, LongTable, RegionRow};
use gapmap::{output, reports, util};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Reshape regional crop statistics for the supply-demand map", long_about = None)]
struct Cli {
    /// Pipeline configuration (TOML)
    #[arg(long, short, default_value = "gapmap.toml")]
    config: PathBuf,

    /// Directory for written outputs
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the source and boundary columns after normalization
    Inspect,
    /// Write the canonical long table as CSV
    Reshape,
    /// Join one year to the boundaries and write GeoJSON for the map
    Map {
        #[arg(long)]
        year: Option<i32>,
        /// Metric used for the color scale; defaults to the first metric
        #[arg(long)]
        metric: Option<String>,
    },
    /// Show one province's series and its value for a year
    Breakdown {
        #[arg(long)]
        region: String,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        metric: Option<String>,
    },
    /// Score rows against the configured model and write the flagged table
    Score {
        /// Restrict to these provinces (repeatable)
        #[arg(long = "region")]
        regions: Vec<String>,
        #[arg(long)]
        year: Option<i32>,
    },
    /// Write summary.json
    Summary,
}

/// Read a single line of input after printing the given prompt. `None` once
/// stdin is closed or unreadable.
fn read_line(prompt: &str) -> Option<String> {
    print!("{}", prompt);
    let _ = io::stdout().flush();
    read_line_from(&mut io::stdin().lock())
}

fn read_line_from<R: BufRead>(input: &mut R) -> Option<String> {
    let mut buf = String::new();
    match input.read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

fn pick_metric(table: &LongTable, requested: Option<&str>) -> Result<String> {
    match requested {
        Some(m) => {
            let m = gapmap::normalize::canonical_name(m);
            if !table.metric_names.contains(&m) {
                bail!(
                    "metric `{}` not in table (available: {})",
                    m,
                    table.metric_names.join(", ")
                );
            }
            Ok(m)
        }
        None => table
            .metric_names
            .first()
            .cloned()
            .context("table has no metric columns"),
    }
}

fn pick_year(table: &LongTable, requested: Option<i32>) -> Result<i32> {
    let (lo, hi) = reports::year_range(&table.records).context("table has no records")?;
    let year = requested.unwrap_or(lo);
    if !(lo..=hi).contains(&year) {
        bail!("year {} outside data range {}..={}", year, lo, hi);
    }
    Ok(year)
}

fn handle_inspect(pipeline: &Pipeline) -> Result<()> {
    let table = pipeline.records()?;
    println!("Source: {}", pipeline.config().source.path.display());
    println!("Metrics: {}", table.metric_names.join(", "));
    if !table.attribute_names.is_empty() {
        println!("Attributes: {}", table.attribute_names.join(", "));
    }
    println!(
        "{} records, {} unparseable values, {} skipped rows\n",
        util::format_int(table.records.len()),
        util::format_int(table.unparseable_values),
        util::format_int(table.skipped_rows)
    );
    output::preview_long(&table, 5);
    if pipeline.config().boundary.is_some() {
        let (features, key) = pipeline.boundaries()?;
        println!("Boundary properties: {}", features.columns.join(", "));
        println!("Join property: {}\n", key);
    }
    Ok(())
}

fn handle_reshape(pipeline: &Pipeline, out_dir: &Path) -> Result<()> {
    let table = pipeline.records()?;
    let path = out_dir.join("long_table.csv");
    output::write_long_csv(&path, &table)
        .with_context(|| format!("writing {}", path.display()))?;
    println!(
        "{} records written to {}",
        util::format_int(table.records.len()),
        path.display()
    );
    Ok(())
}

/// Join one year's rows to the boundaries, print the color scale and write
/// the GeoJSON layer. Returns how many features have no data.
fn export_layer<T: RegionRow>(
    features: &FeatureTable,
    key: &str,
    rows: &[T],
    metric: &str,
    table: &LongTable,
    path: &Path,
) -> Result<usize> {
    let joined = join_by_region(features, key, rows, |r| r.region())?;
    println!(
        "Color scale ({}): {}",
        metric,
        reports::describe_range(reports::metric_range(&joined.rows, metric))
    );
    output::write_geojson(path, output::joined_feature_collection(&joined.rows, table))?;
    Ok(joined.rows.iter().filter(|r| r.record.is_none()).count())
}

fn handle_map(
    pipeline: &Pipeline,
    out_dir: &Path,
    year: Option<i32>,
    metric: Option<&str>,
) -> Result<()> {
    let table = pipeline.records()?;
    let year = pick_year(&table, year)?;
    let metric = pick_metric(&table, metric)?;
    let (features, key) = pipeline.boundaries()?;
    let year_table = LongTable {
        attribute_names: table.attribute_names.clone(),
        metric_names: table.metric_names.clone(),
        records: reports::rows_for_year(&table.records, year),
        ..LongTable::default()
    };

    let path = out_dir.join(format!("map_{}.geojson", year));
    let no_data = if pipeline.config().model.is_some() {
        let scored = pipeline.score(&year_table)?;
        export_layer(&features, &key, &scored, &metric, &year_table, &path)?
    } else {
        export_layer(&features, &key, &year_table.records, &metric, &year_table, &path)?
    };
    if no_data > 0 {
        warn!(no_data, year, "provinces without data on the map");
    }
    println!("Map layer for {} written to {}", year, path.display());
    Ok(())
}

fn handle_breakdown(
    pipeline: &Pipeline,
    region: &str,
    year: Option<i32>,
    metric: Option<&str>,
) -> Result<()> {
    let table = pipeline.records()?;
    let year = pick_year(&table, year)?;
    let metric = pick_metric(&table, metric)?;
    let series = reports::region_breakdown(&table.records, region, &metric);
    if series.is_empty() {
        println!("No records for province {}\n", region);
        return Ok(());
    }
    println!("Province: {}", region);
    println!(
        "{} in {}: {}\n",
        metric,
        year,
        util::format_optional(reports::value_at(&table.records, region, year, &metric), 0)
    );
    output::preview_table_rows(&series, series.len());
    Ok(())
}

fn handle_score(
    pipeline: &Pipeline,
    out_dir: &Path,
    regions: &[String],
    year: Option<i32>,
) -> Result<()> {
    let table = pipeline.records()?;
    let mut scored = pipeline.score(&table)?;
    if let Some(year) = year {
        scored = reports::rows_for_year(&scored, year);
    }
    let scored = reports::filter_regions(&scored, regions);
    let response = pipeline
        .config()
        .model()
        .map(|(columns, _)| columns.response)
        .unwrap_or_default();
    let rows = reports::scored_rows(&scored, &response);
    let path = out_dir.join("scored.csv");
    output::write_csv(&path, &rows)?;
    println!("Rows flagged against the model prediction:\n");
    output::preview_table_rows(&rows, 10);
    println!("(Full table exported to {})\n", path.display());
    Ok(())
}

fn handle_summary(pipeline: &Pipeline, out_dir: &Path) -> Result<()> {
    let table = pipeline.records()?;
    let unmatched = if pipeline.config().boundary.is_some() {
        let (features, key) = pipeline.boundaries()?;
        join_by_region(&features, &key, &table.records, |r| r.region.as_str())?.unmatched
    } else {
        Vec::new()
    };
    let summary = reports::generate_summary(&table, &unmatched);
    let path = out_dir.join("summary.json");
    output::write_json(&path, &summary)?;
    println!("Summary Stats ({}):", path.display());
    println!("{}\n", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Interactive loop. Errors are reported and the menu continues, so a bad
/// year or a missing file never ends the session. End of input exits.
fn run_menu(pipeline: &Pipeline, out_dir: &Path) {
    loop {
        println!("Select an action:");
        println!("[1] Load / inspect data");
        println!("[2] Export map layer for a year");
        println!("[3] Province breakdown");
        println!("[4] Score against model");
        println!("[5] Reload source file");
        println!("[0] Exit\n");
        let Some(choice) = read_line("Enter choice: ") else {
            println!();
            break;
        };
        let result = match choice.as_str() {
            "1" => handle_inspect(pipeline),
            "2" => {
                let Some(year) = read_line("Year: ") else { break };
                handle_map(pipeline, out_dir, year.parse().ok(), None)
            }
            "3" => {
                let Some(region) = read_line("Province: ") else { break };
                let Some(year) = read_line("Year (blank for first): ") else { break };
                handle_breakdown(pipeline, &region, year.parse().ok(), None)
            }
            "4" => handle_score(pipeline, out_dir, &[], None),
            "5" => {
                let dropped = pipeline.invalidate();
                info!(dropped, "source cache invalidated");
                Ok(())
            }
            "0" => {
                println!("Exiting the program.");
                break;
            }
            _ => {
                println!("Invalid choice.\n");
                Ok(())
            }
        };
        if let Err(e) = result {
            eprintln!("Error: {:#}\n", e);
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::from_file(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    let pipeline = Pipeline::new(config);

    match cli.command {
        Some(Command::Inspect) => handle_inspect(&pipeline),
        Some(Command::Reshape) => handle_reshape(&pipeline, &cli.out_dir),
        Some(Command::Map { year, metric }) => {
            handle_map(&pipeline, &cli.out_dir, year, metric.as_deref())
        }
        Some(Command::Breakdown {
            region,
            year,
            metric,
        }) => handle_breakdown(&pipeline, &region, year, metric.as_deref()),
        Some(Command::Score { regions, year }) => {
            handle_score(&pipeline, &cli.out_dir, &regions, year)
        }
        Some(Command::Summary) => handle_summary(&pipeline, &cli.out_dir),
        None => {
            run_menu(&pipeline, &cli.out_dir);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_input_reads_as_none() {
        let mut input = io::Cursor::new("2\n 2019 \n");
        assert_eq!(read_line_from(&mut input).as_deref(), Some("2"));
        assert_eq!(read_line_from(&mut input).as_deref(), Some("2019"));
        assert_eq!(read_line_from(&mut input), None);
        assert_eq!(read_line_from(&mut io::empty()), None);
    }

    #[test]
    fn blank_line_is_not_end_of_input() {
        let mut input = io::Cursor::new("\n");
        assert_eq!(read_line_from(&mut input).as_deref(), Some(""));
        assert_eq!(read_line_from(&mut input), None);
    }
}
