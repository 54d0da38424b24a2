use crate::types::{Fit, RegionRecord, ScoredRecord, Status};
use serde::{Deserialize, Serialize};
use tracing::info;

/// A fitted model with two predictors. Fitting happens elsewhere; the
/// pipeline only asks for predictions.
pub trait Predict {
    fn predict(&self, predictors: [f64; 2]) -> f64;
}

/// `intercept + coefficients[0] * x1 + coefficients[1] * x2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub intercept: f64,
    pub coefficients: [f64; 2],
}

impl Predict for LinearModel {
    fn predict(&self, predictors: [f64; 2]) -> f64 {
        self.intercept
            + self.coefficients[0] * predictors[0]
            + self.coefficients[1] * predictors[1]
    }
}

impl<F> Predict for F
where
    F: Fn([f64; 2]) -> f64,
{
    fn predict(&self, predictors: [f64; 2]) -> f64 {
        self(predictors)
    }
}

/// Which metrics feed the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelColumns {
    pub response: String,
    pub predictors: [String; 2],
}

pub fn fit_for(actual: f64, predicted: f64) -> Fit {
    let residual = actual - predicted;
    Fit {
        predicted,
        residual,
        status: Status::from_residual(residual),
    }
}

/// Attach prediction, residual and status to each record. Records with a
/// null predictor or response get no fit rather than a made-up one.
pub fn score_records<M: Predict + ?Sized>(
    records: &[RegionRecord],
    columns: &ModelColumns,
    model: &M,
) -> Vec<ScoredRecord> {
    let scored: Vec<ScoredRecord> = records
        .iter()
        .map(|record| {
            let fit = match (
                record.metric(&columns.predictors[0]),
                record.metric(&columns.predictors[1]),
                record.metric(&columns.response),
            ) {
                (Some(x1), Some(x2), Some(actual)) => {
                    Some(fit_for(actual, model.predict([x1, x2])))
                }
                _ => None,
            };
            ScoredRecord {
                record: record.clone(),
                fit,
            }
        })
        .collect();
    let below = scored
        .iter()
        .filter(|s| matches!(s.fit, Some(f) if f.status == Status::BelowPrediction))
        .count();
    let unscored = scored.iter().filter(|s| s.fit.is_none()).count();
    info!(rows = scored.len(), below, unscored, "scored records");
    scored
}
