use crate::error::{PipelineError, Result};
use regex::Regex;
use std::collections::BTreeMap;

/// Fail with `MissingColumn` on the first required name absent from `columns`.
pub fn require_columns<S: AsRef<str>>(columns: &[String], required: &[S]) -> Result<()> {
    for name in required {
        let name = name.as_ref();
        if !columns.iter().any(|c| c == name) {
            return Err(missing(name, None, None, columns));
        }
    }
    Ok(())
}

pub(crate) fn missing(
    column: &str,
    metric: Option<&str>,
    year: Option<i32>,
    present: &[String],
) -> PipelineError {
    PipelineError::MissingColumn {
        column: column.to_string(),
        metric: metric.map(str::to_string),
        year,
        present: present.to_vec(),
    }
}

/// Declared mapping from a column role (`region`, `year`, ...) to the
/// patterns a canonical column name may match to fill it.
#[derive(Debug, Clone, Default)]
pub struct ColumnRoles {
    roles: BTreeMap<String, Vec<Regex>>,
}

impl ColumnRoles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role<S: AsRef<str>>(mut self, role: &str, patterns: &[S]) -> Result<Self> {
        self.insert(role, patterns)?;
        Ok(self)
    }

    pub fn insert<S: AsRef<str>>(&mut self, role: &str, patterns: &[S]) -> Result<()> {
        let compiled = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.roles.insert(role.to_string(), compiled);
        Ok(())
    }

    /// Resolve one role to exactly one column.
    pub fn resolve(&self, role: &str, columns: &[String]) -> Result<String> {
        let Some(patterns) = self.roles.get(role) else {
            // Undeclared role: the role name itself must be a column.
            require_columns(columns, &[role])?;
            return Ok(role.to_string());
        };
        let candidates: Vec<&String> = columns
            .iter()
            .filter(|c| patterns.iter().any(|p| p.is_match(c)))
            .collect();
        match candidates.as_slice() {
            [] => Err(missing(role, None, None, columns)),
            [only] => Ok((*only).clone()),
            many => Err(PipelineError::AmbiguousColumn {
                role: role.to_string(),
                candidates: many.iter().map(|c| c.to_string()).collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn missing_column_lists_present_columns() {
        let present = cols(&["provinsi", "luas_panen_ha"]);
        let err = require_columns(&present, &["provinsi", "produksi_ton"]).unwrap_err();
        match err {
            PipelineError::MissingColumn {
                column,
                year,
                present: listed,
                ..
            } => {
                assert_eq!(column, "produksi_ton");
                assert_eq!(year, None);
                assert_eq!(listed, present);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn require_columns_accepts_complete_table() {
        let present = cols(&["state", "tahun", "gap_ton"]);
        assert!(require_columns(&present, &["state", "gap_ton"]).is_ok());
    }

    #[test]
    fn role_resolves_single_match() {
        let roles = ColumnRoles::new()
            .with_role("region", &["^provinsi$", "^state$"])
            .unwrap();
        let found = roles.resolve("region", &cols(&["state", "tahun"])).unwrap();
        assert_eq!(found, "state");
    }

    #[test]
    fn role_with_two_matches_is_ambiguous() {
        let roles = ColumnRoles::new().with_role("area", &["^luas"]).unwrap();
        let err = roles
            .resolve("area", &cols(&["provinsi", "luas_panen_ha", "luas_baku_ha"]))
            .unwrap_err();
        match err {
            PipelineError::AmbiguousColumn { role, candidates } => {
                assert_eq!(role, "area");
                assert_eq!(candidates, vec!["luas_panen_ha", "luas_baku_ha"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn role_without_match_is_missing() {
        let roles = ColumnRoles::new().with_role("year", &["^tahun$"]).unwrap();
        let err = roles.resolve("year", &cols(&["state"])).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { column, .. } if column == "year"));
    }

    #[test]
    fn undeclared_role_falls_back_to_its_own_name() {
        let roles = ColumnRoles::new();
        assert_eq!(roles.resolve("region", &cols(&["region"])).unwrap(), "region");
        assert!(roles.resolve("region", &cols(&["state"])).is_err());
    }
}
