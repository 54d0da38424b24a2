use crate::cache::PipelineCache;
use crate::config::{PipelineConfig, SourcePlan};
use crate::error::{PipelineError, Result};
use crate::loader::{normalize_table, read_boundaries, read_raw_table_from};
use crate::normalize::canonical_name;
use crate::regression::score_records;
use crate::schema::require_columns;
use crate::types::{FeatureTable, LongTable, RawTable, ScoredRecord};
use crate::unpivot::{collect_long, unpivot_wide};
use std::sync::Arc;
use tracing::info;

/// Normalize column names, resolve roles and reshape into the canonical long
/// table. Pure: the same table and config always give the same output.
pub fn reshape(raw: RawTable, config: &PipelineConfig) -> Result<LongTable> {
    let table = normalize_table(raw)?;
    match config.plan(&table.columns)? {
        SourcePlan::Wide(spec) => unpivot_wide(&table, &spec),
        SourcePlan::Long(spec) => collect_long(&table, &spec),
    }
}

/// A configured pipeline plus its memo of reshaped source tables.
pub struct Pipeline {
    config: PipelineConfig,
    cache: PipelineCache<LongTable>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            cache: PipelineCache::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Reshaped source table, recomputed only when the file contents or the
    /// reshaping settings change.
    pub fn records(&self) -> Result<Arc<LongTable>> {
        let settings = self.config.reshape_settings()?;
        let path = &self.config.source.path;
        self.cache.load(path, &settings, |bytes| {
            info!(path = %path.display(), "reshaping source table");
            reshape(read_raw_table_from(bytes)?, &self.config)
        })
    }

    /// Drop the memoized table so the next call re-reads the source.
    pub fn invalidate(&self) -> usize {
        self.cache.invalidate(&self.config.source.path)
    }

    /// Boundary features and the canonical name of their join property.
    pub fn boundaries(&self) -> Result<(FeatureTable, String)> {
        let boundary = self
            .config
            .boundary
            .as_ref()
            .ok_or_else(|| PipelineError::Config("no [boundary] section configured".into()))?;
        let features = read_boundaries(&boundary.path)?;
        let key = canonical_name(&boundary.key_property);
        require_columns(&features.columns, &[&key])?;
        Ok((features, key))
    }

    /// Score every record with the configured linear model.
    pub fn score(&self, table: &LongTable) -> Result<Vec<ScoredRecord>> {
        let (columns, model) = self
            .config
            .model()
            .ok_or_else(|| PipelineError::Config("no [model] section configured".into()))?;
        require_columns(&table.metric_names, &[&columns.response])?;
        require_columns(&table.metric_names, &columns.predictors)?;
        Ok(score_records(&table.records, &columns, &model))
    }
}
