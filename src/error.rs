use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("missing column `{column}`{} (present: {})", detail(.metric, .year), .present.join(", "))]
    MissingColumn {
        column: String,
        metric: Option<String>,
        year: Option<i32>,
        present: Vec<String>,
    },

    #[error("columns `{first}` and `{second}` both normalize to `{canonical}`")]
    SchemaConflict {
        first: String,
        second: String,
        canonical: String,
    },

    #[error("no year columns matched stems [{}] with pattern `{pattern}`", .stems.join(", "))]
    NoYearColumnsFound { stems: Vec<String>, pattern: String },

    #[error("`{role}` is ambiguous between: {}", .candidates.join(", "))]
    AmbiguousColumn { role: String, candidates: Vec<String> },

    #[error("metric `{metric}` appears twice for region `{region}` in {year}")]
    DuplicateRecord {
        region: String,
        year: i32,
        metric: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid pattern: {0}")]
    Regex(#[from] regex::Error),
}

fn detail(metric: &Option<String>, year: &Option<i32>) -> String {
    match (metric, year) {
        (Some(m), Some(y)) => format!(" for metric `{}` in {}", m, y),
        (Some(m), None) => format!(" for metric `{}`", m),
        (None, Some(y)) => format!(" for year {}", y),
        (None, None) => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
