use crate::error::Result;
use crate::normalize::join_key;
use crate::schema::require_columns;
use crate::types::{BoundaryFeature, FeatureTable};
use std::collections::{BTreeSet, HashMap};
use tracing::{info, warn};

/// One output row of a left join: a boundary feature and, when the region
/// had data, one matching record.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRow<'a, T> {
    pub feature: &'a BoundaryFeature,
    pub key: String,
    pub record: Option<&'a T>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome<'a, T> {
    pub rows: Vec<JoinedRow<'a, T>>,
    /// Right-side keys with no boundary feature; their records are dropped.
    pub unmatched: Vec<String>,
}

/// Left-join boundary features with records on a region key.
///
/// Every feature appears once per matching record, or once with no record.
/// Both keys pass through `normalize` before comparison. Records whose key
/// has no feature are dropped and reported in `unmatched`.
pub fn join_features<'a, T, F>(
    left: &'a FeatureTable,
    left_key: &str,
    right: &'a [T],
    right_key: F,
    normalize: fn(&str) -> String,
) -> Result<JoinOutcome<'a, T>>
where
    F: Fn(&T) -> &str,
{
    require_columns(&left.columns, &[left_key])?;

    let mut by_key: HashMap<String, Vec<&'a T>> = HashMap::new();
    for record in right {
        by_key
            .entry(normalize(right_key(record)))
            .or_default()
            .push(record);
    }

    let mut rows = Vec::with_capacity(left.features.len());
    let mut matched: BTreeSet<&str> = BTreeSet::new();
    for feature in &left.features {
        let key = normalize(&feature.property_text(left_key).unwrap_or_default());
        match by_key.get_key_value(&key) {
            Some((stored, records)) => {
                matched.insert(stored.as_str());
                for record in records {
                    rows.push(JoinedRow {
                        feature,
                        key: key.clone(),
                        record: Some(*record),
                    });
                }
            }
            None => rows.push(JoinedRow {
                feature,
                key,
                record: None,
            }),
        }
    }

    let unmatched: Vec<String> = by_key
        .keys()
        .filter(|k| !matched.contains(k.as_str()))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if !unmatched.is_empty() {
        warn!(
            count = unmatched.len(),
            keys = %unmatched.join(", "),
            "regions without a boundary feature were dropped"
        );
    }
    let no_data = rows.iter().filter(|r| r.record.is_none()).count();
    info!(rows = rows.len(), no_data, "joined records to boundaries");

    Ok(JoinOutcome { rows, unmatched })
}

/// The usual join: canonical uppercase + trim keys on both sides.
pub fn join_by_region<'a, T, F>(
    left: &'a FeatureTable,
    left_key: &str,
    right: &'a [T],
    right_key: F,
) -> Result<JoinOutcome<'a, T>>
where
    F: Fn(&T) -> &str,
{
    join_features(left, left_key, right, right_key, join_key)
}
