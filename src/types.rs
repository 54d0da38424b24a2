use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tabled::Tabled;

/// A CSV file as read from disk: header names plus string cells, untouched.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell lookup that tolerates short rows from flexible CSV readers.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col).map(String::as_str)
    }
}

/// One (region, year) row of the canonical long table.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionRecord {
    pub region: String,
    pub year: i32,
    pub attributes: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, Option<f64>>,
}

impl RegionRecord {
    pub fn new(region: impl Into<String>, year: i32) -> Self {
        Self {
            region: region.into(),
            year,
            attributes: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }
    }

    /// `None` both for an unknown metric and for a null cell.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied().flatten()
    }
}

/// Canonical long-format output of the pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LongTable {
    pub attribute_names: Vec<String>,
    pub metric_names: Vec<String>,
    pub records: Vec<RegionRecord>,
    /// Non-empty cells that could not be coerced to a number and became null.
    pub unparseable_values: usize,
    /// Input rows dropped because their region or year key was unusable.
    pub skipped_rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    BelowPrediction,
    AtOrAbovePrediction,
}

impl Status {
    pub fn from_residual(residual: f64) -> Self {
        if residual < 0.0 {
            Status::BelowPrediction
        } else {
            Status::AtOrAbovePrediction
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::BelowPrediction => "BelowPrediction",
            Status::AtOrAbovePrediction => "AtOrAbovePrediction",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fit {
    pub predicted: f64,
    pub residual: f64,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: RegionRecord,
    /// Absent when a predictor or the response is null for this row.
    pub fit: Option<Fit>,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ScoredRow {
    #[serde(rename = "Region")]
    #[tabled(rename = "Region")]
    pub region: String,
    #[serde(rename = "Year")]
    #[tabled(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Actual")]
    #[tabled(rename = "Actual")]
    pub actual: String,
    #[serde(rename = "Predicted")]
    #[tabled(rename = "Predicted")]
    pub predicted: String,
    #[serde(rename = "Residual")]
    #[tabled(rename = "Residual")]
    pub residual: String,
    #[serde(rename = "Status")]
    #[tabled(rename = "Status")]
    pub status: String,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct BreakdownRow {
    #[serde(rename = "Year")]
    #[tabled(rename = "Year")]
    pub year: i32,
    #[serde(rename = "Value")]
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub total_regions: usize,
    pub total_records: usize,
    pub first_year: Option<i32>,
    pub last_year: Option<i32>,
    pub unparseable_values: usize,
    pub skipped_rows: usize,
    pub unmatched_regions: Vec<String>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

/// A boundary feature with canonical property names. The geometry is opaque
/// to the pipeline and handed back to the renderer untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryFeature {
    pub id: Option<geojson::feature::Id>,
    pub properties: serde_json::Map<String, serde_json::Value>,
    pub geometry: Option<geojson::Geometry>,
}

impl BoundaryFeature {
    /// Property rendered as text; numbers are accepted as region codes.
    pub fn property_text(&self, name: &str) -> Option<String> {
        match self.properties.get(name)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    /// Union of property names across features, in first-seen order.
    pub columns: Vec<String>,
    pub features: Vec<BoundaryFeature>,
}

/// Common view over plain and scored records, used by the dashboard views
/// and the GeoJSON hand-off.
pub trait RegionRow {
    fn region(&self) -> &str;
    fn year(&self) -> i32;
    fn metric(&self, name: &str) -> Option<f64>;
    /// Values merged into a boundary feature's properties.
    fn properties(&self) -> serde_json::Map<String, serde_json::Value>;
    /// Every key `properties` can produce for rows drawn from `table`.
    fn property_names(table: &LongTable) -> Vec<String>
    where
        Self: Sized;
}

impl RegionRow for RegionRecord {
    fn region(&self) -> &str {
        &self.region
    }

    fn year(&self) -> i32 {
        self.year
    }

    fn metric(&self, name: &str) -> Option<f64> {
        RegionRecord::metric(self, name)
    }

    fn properties(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut props = serde_json::Map::new();
        props.insert("year".to_string(), self.year.into());
        for (name, value) in &self.attributes {
            props.insert(name.clone(), value.clone().into());
        }
        for (name, value) in &self.metrics {
            props.insert(name.clone(), serde_json::to_value(value).unwrap_or_default());
        }
        props
    }

    fn property_names(table: &LongTable) -> Vec<String> {
        let mut names = vec!["year".to_string()];
        names.extend(table.attribute_names.iter().cloned());
        names.extend(table.metric_names.iter().cloned());
        names
    }
}

impl RegionRow for ScoredRecord {
    fn region(&self) -> &str {
        &self.record.region
    }

    fn year(&self) -> i32 {
        self.record.year
    }

    /// Also exposes `predicted` and `residual` as metrics.
    fn metric(&self, name: &str) -> Option<f64> {
        match name {
            "predicted" => self.fit.map(|f| f.predicted),
            "residual" => self.fit.map(|f| f.residual),
            _ => self.record.metric(name),
        }
    }

    fn properties(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut props = self.record.properties();
        let (predicted, residual, status) = match self.fit {
            Some(f) => (
                Value::from(f.predicted),
                Value::from(f.residual),
                Value::from(f.status.as_str()),
            ),
            None => (Value::Null, Value::Null, Value::Null),
        };
        props.insert("predicted".to_string(), predicted);
        props.insert("residual".to_string(), residual);
        props.insert("status".to_string(), status);
        props
    }

    fn property_names(table: &LongTable) -> Vec<String> {
        let mut names = RegionRecord::property_names(table);
        names.extend(["predicted", "residual", "status"].map(String::from));
        names
    }
}
