use crate::error::{PipelineError, Result};
use crate::normalize::normalize_columns;
use crate::types::{BoundaryFeature, FeatureTable, RawTable};
use csv::ReaderBuilder;
use geojson::GeoJson;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Read a delimited table. Header names are kept as written; short rows are
/// padded by the caller's lookups rather than rejected.
pub fn read_raw_table_from<R: Read>(reader: R) -> Result<RawTable> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);
    let columns: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(RawTable { columns, rows })
}

/// Return a copy of the table with canonical column names.
pub fn normalize_table(mut table: RawTable) -> Result<RawTable> {
    table.columns = normalize_columns(&table.columns)?;
    Ok(table)
}

/// Read boundary features from a GeoJSON `FeatureCollection` (or a single
/// `Feature`), normalizing property names the same way table columns are.
pub fn read_boundaries(path: &Path) -> Result<FeatureTable> {
    let text = std::fs::read_to_string(path)?;
    let table = parse_boundaries(&text)?;
    info!(
        path = %path.display(),
        features = table.features.len(),
        "loaded boundaries"
    );
    Ok(table)
}

pub fn parse_boundaries(text: &str) -> Result<FeatureTable> {
    let features = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(_) => {
            return Err(PipelineError::Config(
                "boundary file must contain features, found a bare geometry".to_string(),
            ))
        }
    };

    let mut table = FeatureTable::default();
    for feature in features {
        let raw = feature.properties.unwrap_or_default();
        let keys: Vec<&String> = raw.keys().collect();
        let canonical = normalize_columns(&keys)?;
        let mut properties = serde_json::Map::new();
        for ((_, value), name) in raw.iter().zip(canonical) {
            if !table.columns.contains(&name) {
                table.columns.push(name.clone());
            }
            properties.insert(name, value.clone());
        }
        if feature.geometry.is_none() {
            debug!(id = ?feature.id, "boundary feature without geometry");
        }
        table.features.push(BoundaryFeature {
            id: feature.id,
            properties,
            geometry: feature.geometry,
        });
    }
    Ok(table)
}
