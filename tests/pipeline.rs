use std::fs;
use std::path::Path;
use std::sync::Arc;

use gapmap::config::PipelineConfig;
use gapmap::error::PipelineError;
use gapmap::join::join_by_region;
use gapmap::output::{joined_feature_collection, write_geojson, write_long_csv};
use gapmap::pipeline::Pipeline;
use gapmap::reports;
use gapmap::types::{RegionRow, Status};
use tempfile::TempDir;

const WIDE_CONFIG: &str = r#"
[source]
path = "data_nasional.csv"
layout = "wide"

[roles]
region = ["^provinsi$"]

[wide]
carry = ["kode"]
stems = ["luas_panen_ha", "produktivitaskuha", "produksi_ton"]
suffix_pattern = "(\\d+)"
base_year = 2017

[boundary]
path = "indonesia.geojson"
key_property = "State"

[model]
response = "produksi_ton"
predictors = ["luas_panen_ha", "produktivitaskuha"]
intercept = 0.0
coefficients = [5.0, 0.0]
"#;

const WIDE_CSV: &str = "\
Provinsi,Kode,luas_panen_ha1,produktivitaskuha1,produksi_ton1,luas_panen_ha2,produktivitaskuha2,produksi_ton2
Aceh,11,100,50,600,100,50,400
Bali,51,20,60,100,n/a,60,90
Papua Tengah,94,10,30,50,10,30,50
";

const GEOJSON: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "properties": {"State": "ACEH"},
     "geometry": {"type": "Point", "coordinates": [95.3, 5.5]}},
    {"type": "Feature", "properties": {"State": "BALI"},
     "geometry": {"type": "Point", "coordinates": [115.2, -8.6]}},
    {"type": "Feature", "properties": {"State": "JAMBI"},
     "geometry": {"type": "Point", "coordinates": [103.6, -1.6]}}
  ]
}"#;

fn workspace(config: &str, csv: &str) -> (TempDir, Pipeline) {
    let dir = TempDir::new().expect("tempdir");
    fs::write(dir.path().join("gapmap.toml"), config).unwrap();
    fs::write(dir.path().join("data_nasional.csv"), csv).unwrap();
    fs::write(dir.path().join("indonesia.geojson"), GEOJSON).unwrap();
    let config = PipelineConfig::from_file(&dir.path().join("gapmap.toml")).expect("config");
    (dir, Pipeline::new(config))
}

fn source_path(dir: &Path) -> std::path::PathBuf {
    dir.join("data_nasional.csv")
}

#[test]
fn suffix_years_use_configured_base_year() {
    let (_dir, pipeline) = workspace(WIDE_CONFIG, WIDE_CSV);
    let table = pipeline.records().unwrap();

    assert_eq!(table.records.len(), 6);
    assert_eq!(reports::year_range(&table.records), Some((2018, 2019)));
    assert_eq!(table.attribute_names, vec!["kode"]);
    assert_eq!(table.unparseable_values, 1);
    let bali_2019 = table
        .records
        .iter()
        .find(|r| r.region == "Bali" && r.year == 2019)
        .unwrap();
    assert_eq!(bali_2019.metric("luas_panen_ha"), None);
    assert_eq!(bali_2019.attributes.get("kode").map(String::as_str), Some("51"));
    assert_eq!(reports::metric_total(&table.records, "produksi_ton"), 1290.0);
}

#[test]
fn unchanged_source_is_served_from_cache() {
    let (dir, pipeline) = workspace(WIDE_CONFIG, WIDE_CSV);
    let first = pipeline.records().unwrap();
    let second = pipeline.records().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let changed = WIDE_CSV.replace("Papua Tengah,94,10,30,50,10,30,50\n", "");
    fs::write(source_path(dir.path()), changed).unwrap();
    let third = pipeline.records().unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(third.records.len(), 4);

    assert_eq!(pipeline.invalidate(), 1);
    let fourth = pipeline.records().unwrap();
    assert!(!Arc::ptr_eq(&third, &fourth));
    assert_eq!(*third, *fourth);
}

#[test]
fn joined_year_keeps_every_boundary_and_flags_rows() {
    let (dir, pipeline) = workspace(WIDE_CONFIG, WIDE_CSV);
    let table = pipeline.records().unwrap();
    let (features, key) = pipeline.boundaries().unwrap();
    assert_eq!(key, "state");

    let scored = pipeline.score(&table).unwrap();
    let year = reports::rows_for_year(&scored, 2018);
    let joined = join_by_region(&features, &key, &year, |r| r.region()).unwrap();

    assert_eq!(joined.rows.len(), 3);
    assert_eq!(joined.unmatched, vec!["PAPUA TENGAH"]);
    let aceh = joined.rows[0].record.unwrap();
    // 5 * 100 = 500 predicted, 600 actual.
    assert_eq!(aceh.fit.unwrap().status, Status::AtOrAbovePrediction);
    let bali = joined.rows[1].record.unwrap();
    // 5 * 20 = 100 predicted, 100 actual: residual exactly zero.
    assert_eq!(bali.fit.unwrap().residual, 0.0);
    assert_eq!(bali.fit.unwrap().status, Status::AtOrAbovePrediction);
    assert!(joined.rows[2].record.is_none());

    let aceh_2019 = scored
        .iter()
        .find(|s| s.record.region == "Aceh" && s.record.year == 2019)
        .unwrap();
    assert_eq!(aceh_2019.fit.unwrap().status, Status::BelowPrediction);

    let path = dir.path().join("map_2018.geojson");
    write_geojson(&path, joined_feature_collection(&joined.rows, &table)).unwrap();
    let written: geojson::GeoJson = fs::read_to_string(&path).unwrap().parse().unwrap();
    let geojson::GeoJson::FeatureCollection(fc) = written else {
        panic!("expected a feature collection");
    };
    assert_eq!(fc.features.len(), 3);
    let jambi = fc.features[2].properties.as_ref().unwrap();
    assert_eq!(jambi.get("produksi_ton"), Some(&serde_json::Value::Null));
    assert!(fc.features[2].geometry.is_some());
}

#[test]
fn long_source_round_trips_through_csv() {
    let config = r#"
[source]
path = "data_nasional.csv"
layout = "long"

[roles]
region = ["^state$"]
year = ["^tahun$"]

[long]
metrics = ["Gap_ton"]

[boundary]
path = "indonesia.geojson"
key_property = "state"
"#;
    let csv = "state,Tahun,Gap_ton\nAceh,2019,-120.5\nBali,2019,300\nAceh,2020,\n";
    let (dir, pipeline) = workspace(config, csv);
    let table = pipeline.records().unwrap();
    assert_eq!(table.records.len(), 3);

    let out = dir.path().join("long_table.csv");
    write_long_csv(&out, &table).unwrap();
    let text = fs::read_to_string(&out).unwrap();
    assert_eq!(
        text,
        "region,year,gap_ton\nAceh,2019,-120.5\nBali,2019,300\nAceh,2020,\n"
    );

    let summary = reports::generate_summary(&table, &[]);
    assert_eq!(summary.total_regions, 2);
    assert_eq!(summary.last_year, Some(2020));
}

#[test]
fn missing_role_column_halts_the_run() {
    let csv = "Region,Kode,luas_panen_ha1\nAceh,11,1\n";
    let (_dir, pipeline) = workspace(WIDE_CONFIG, csv);
    match pipeline.records() {
        Err(PipelineError::MissingColumn { column, .. }) => assert_eq!(column, "region"),
        other => panic!("expected missing region column, got {other:?}"),
    }
}
