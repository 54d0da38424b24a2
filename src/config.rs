use crate::error::{PipelineError, Result};
use crate::regression::{LinearModel, ModelColumns};
use crate::schema::ColumnRoles;
use crate::unpivot::{LongSpec, SuffixPattern, WideSpec, YearColumn, YearLayout};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const REGION_ROLE: &str = "region";
pub const YEAR_ROLE: &str = "year";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Wide,
    Long,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub path: PathBuf,
    pub layout: Layout,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WideConfig {
    #[serde(default)]
    pub carry: Vec<String>,
    #[serde(default)]
    pub stems: Vec<String>,
    pub suffix_pattern: Option<String>,
    /// No default on purpose: sources disagree on whether suffix `1` is 2018
    /// or 2019.
    pub base_year: Option<i32>,
    #[serde(default)]
    pub columns: Vec<YearColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongConfig {
    pub metrics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryConfig {
    pub path: PathBuf,
    pub key_property: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub response: String,
    pub predictors: Vec<String>,
    #[serde(default)]
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    /// Role name -> regex patterns over canonical column names.
    #[serde(default)]
    pub roles: BTreeMap<String, Vec<String>>,
    pub wide: Option<WideConfig>,
    pub long: Option<LongConfig>,
    pub boundary: Option<BoundaryConfig>,
    pub model: Option<ModelConfig>,
}

/// How the source table is turned into records, once roles are resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SourcePlan {
    Wide(WideSpec),
    Long(LongSpec),
}

fn config_err(msg: impl Into<String>) -> PipelineError {
    PipelineError::Config(msg.into())
}

impl PipelineConfig {
    /// Load and validate a TOML config. Relative data paths are taken
    /// relative to the config file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(dir) = path.parent() {
            config.rebase(dir);
        }
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn rebase(&mut self, dir: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = dir.join(&*p);
            }
        };
        rebase(&mut self.source.path);
        if let Some(boundary) = self.boundary.as_mut() {
            rebase(&mut boundary.path);
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.source.layout {
            Layout::Wide => {
                let wide = self
                    .wide
                    .as_ref()
                    .ok_or_else(|| config_err("layout `wide` needs a [wide] section"))?;
                if wide.columns.is_empty() {
                    if wide.stems.is_empty() {
                        return Err(config_err(
                            "[wide] needs either `columns` or `stems` with a suffix pattern",
                        ));
                    }
                    if wide.base_year.is_none() {
                        return Err(config_err(
                            "[wide] `base_year` must be set explicitly for suffixed year columns",
                        ));
                    }
                    if let Some(pattern) = &wide.suffix_pattern {
                        if regex::Regex::new(pattern)?.captures_len() != 2 {
                            return Err(config_err(format!(
                                "[wide] suffix pattern `{}` must have exactly one capture group",
                                pattern
                            )));
                        }
                    }
                }
            }
            Layout::Long => {
                let long = self
                    .long
                    .as_ref()
                    .ok_or_else(|| config_err("layout `long` needs a [long] section"))?;
                if long.metrics.is_empty() {
                    return Err(config_err("[long] `metrics` must not be empty"));
                }
            }
        }
        if let Some(model) = &self.model {
            if model.predictors.len() != 2 || model.coefficients.len() != 2 {
                return Err(config_err(
                    "[model] needs exactly two predictors and two coefficients",
                ));
            }
        }
        // Compiling here surfaces bad patterns before any data is read.
        self.roles()?;
        Ok(())
    }

    pub fn roles(&self) -> Result<ColumnRoles> {
        let mut roles = ColumnRoles::new();
        for (role, patterns) in &self.roles {
            roles.insert(role, patterns)?;
        }
        Ok(roles)
    }

    /// Resolve roles against the canonical columns of the source table.
    pub fn plan(&self, columns: &[String]) -> Result<SourcePlan> {
        let roles = self.roles()?;
        let region_column = roles.resolve(REGION_ROLE, columns)?;
        match self.source.layout {
            Layout::Wide => {
                let wide = self.wide.clone().unwrap_or_default();
                let suffix = match (wide.stems.is_empty(), wide.base_year) {
                    (false, Some(base_year)) => Some(SuffixPattern {
                        stems: wide.stems,
                        pattern: wide
                            .suffix_pattern
                            .unwrap_or_else(|| r"(\d+)".to_string()),
                        base_year,
                    }),
                    _ => None,
                };
                let layout = YearLayout::choose(wide.columns, suffix)
                    .ok_or_else(|| config_err("no year layout configured for wide source"))?;
                Ok(SourcePlan::Wide(WideSpec {
                    region_column,
                    carry_columns: wide.carry,
                    layout,
                }))
            }
            Layout::Long => {
                let year_column = roles.resolve(YEAR_ROLE, columns)?;
                let metric_columns = self
                    .long
                    .as_ref()
                    .map(|l| l.metrics.clone())
                    .unwrap_or_default();
                Ok(SourcePlan::Long(LongSpec {
                    region_column,
                    year_column,
                    metric_columns,
                }))
            }
        }
    }

    /// Bytes identifying every setting that shapes the reshaped table.
    pub fn reshape_settings(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&(
            &self.source.layout,
            &self.roles,
            &self.wide,
            &self.long,
        ))?)
    }

    pub fn model(&self) -> Option<(ModelColumns, LinearModel)> {
        let model = self.model.as_ref()?;
        let columns = ModelColumns {
            response: crate::normalize::canonical_name(&model.response),
            predictors: [
                crate::normalize::canonical_name(model.predictors.first()?),
                crate::normalize::canonical_name(model.predictors.get(1)?),
            ],
        };
        let linear = LinearModel {
            intercept: model.intercept,
            coefficients: [*model.coefficients.first()?, *model.coefficients.get(1)?],
        };
        Some((columns, linear))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDE: &str = r#"
[source]
path = "data_nasional.csv"
layout = "wide"

[roles]
region = ["^provinsi$", "^state$"]

[wide]
stems = ["luas_panen_ha", "produktivitaskuha", "produksi_ton"]
suffix_pattern = "_(\\d{4})"
base_year = 0

[boundary]
path = "indonesia.geojson"
key_property = "state"

[model]
response = "produksi_ton"
predictors = ["luas_panen_ha", "produktivitaskuha"]
intercept = 1.5
coefficients = [2.0, 3.0]
"#;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn wide_config_plans_suffix_layout() {
        let config = PipelineConfig::from_toml_str(WIDE).unwrap();
        let plan = config
            .plan(&cols(&["provinsi", "luas_panen_ha_2018"]))
            .unwrap();
        match plan {
            SourcePlan::Wide(spec) => {
                assert_eq!(spec.region_column, "provinsi");
                assert!(matches!(spec.layout, YearLayout::Suffix(ref s) if s.base_year == 0));
            }
            other => panic!("unexpected plan: {other:?}"),
        }
        let (columns, model) = config.model().unwrap();
        assert_eq!(columns.response, "produksi_ton");
        assert_eq!(model.coefficients, [2.0, 3.0]);
    }

    #[test]
    fn suffix_layout_without_base_year_is_rejected() {
        let text = WIDE.replace("base_year = 0\n", "");
        let err = PipelineConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, PipelineError::Config(msg) if msg.contains("base_year")));
    }

    #[test]
    fn explicit_columns_need_no_base_year() {
        let text = r#"
[source]
path = "d.csv"
layout = "wide"

[[wide.columns]]
metric = "produksi_ton"
year = 2018
column = "Produksi 1"
"#;
        let config = PipelineConfig::from_toml_str(text).unwrap();
        let plan = config.plan(&cols(&["region", "produksi_1"])).unwrap();
        assert!(matches!(plan, SourcePlan::Wide(WideSpec { layout: YearLayout::Explicit(_), .. })));
    }

    #[test]
    fn long_config_resolves_year_role() {
        let text = r#"
[source]
path = "gap_per_provinsi.csv"
layout = "long"

[roles]
region = ["^state$"]
year = ["^tahun$", "^year$"]

[long]
metrics = ["Gap_ton"]
"#;
        let config = PipelineConfig::from_toml_str(text).unwrap();
        match config.plan(&cols(&["state", "tahun", "gap_ton"])).unwrap() {
            SourcePlan::Long(spec) => {
                assert_eq!(spec.region_column, "state");
                assert_eq!(spec.year_column, "tahun");
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[test]
    fn suffix_pattern_needs_one_capture_group() {
        let text = WIDE.replace(r#"suffix_pattern = "_(\\d{4})""#, r#"suffix_pattern = "_\\d{4}""#);
        let err = PipelineConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, PipelineError::Config(msg) if msg.contains("capture group")));
    }

    #[test]
    fn bad_model_shape_is_rejected() {
        let text = WIDE.replace("coefficients = [2.0, 3.0]", "coefficients = [2.0]");
        assert!(PipelineConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn relative_paths_follow_config_dir() {
        let mut config = PipelineConfig::from_toml_str(WIDE).unwrap();
        config.rebase(Path::new("/data"));
        assert_eq!(config.source.path, PathBuf::from("/data/data_nasional.csv"));
        assert_eq!(
            config.boundary.unwrap().path,
            PathBuf::from("/data/indonesia.geojson")
        );
    }
}
