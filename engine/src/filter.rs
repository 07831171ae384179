//! Label filters applied to report rows before aggregation

use crate::error::AlertError;
use regex::{Regex, RegexBuilder};
use vigil_shared::types::report::ReportTable;
use vigil_shared::types::rule::FilterCondition;
use vigil_shared::utils::unsanitize_input_value;

/// A compiled label pattern. `invert` keeps the rows that do NOT match.
#[derive(Debug, Clone)]
pub struct LabelPattern {
    pub pattern: String,
    pub invert: bool,
}

impl LabelPattern {
    /// Derive the pattern for `condition` from a stored match value.
    ///
    /// Returns `Ok(None)` for [`FilterCondition::MatchesAny`], which applies no
    /// filter. Outside the two regex conditions, `?`, `+` and `*` in the value
    /// are escaped; other metacharacters pass through as typed.
    pub fn derive(condition: &FilterCondition, raw_value: &str) -> Result<Option<Self>, AlertError> {
        let mut value = unsanitize_input_value(raw_value);
        if !matches!(
            condition,
            FilterCondition::MatchesRegex | FilterCondition::DoesNotMatchRegex
        ) {
            value = value
                .replace('?', "\\?")
                .replace('+', "\\+")
                .replace('*', "\\*");
        }

        let (pattern, invert) = match condition {
            FilterCondition::MatchesAny => return Ok(None),
            FilterCondition::MatchesExactly => (format!("^{value}$"), false),
            FilterCondition::DoesNotMatchExactly => (format!("^{value}$"), true),
            FilterCondition::MatchesRegex => (value, false),
            FilterCondition::DoesNotMatchRegex => (value, true),
            FilterCondition::Contains => (value, false),
            FilterCondition::DoesNotContain => (value, true),
            FilterCondition::StartsWith => (format!("^{value}"), false),
            FilterCondition::DoesNotStartWith => (format!("^{value}"), true),
            FilterCondition::EndsWith => (format!("{value}$"), false),
            FilterCondition::DoesNotEndWith => (format!("{value}$"), true),
            FilterCondition::Unsupported(kind) => {
                return Err(AlertError::UnsupportedCondition { kind: kind.clone() })
            }
        };

        Ok(Some(Self { pattern, invert }))
    }

    /// Labels are matched case-insensitively.
    pub fn compile(&self) -> Result<Regex, AlertError> {
        RegexBuilder::new(&self.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| AlertError::InvalidFilterPattern {
                pattern: self.pattern.clone(),
                source,
            })
    }
}

/// Drop rows whose label does not satisfy `condition`/`value`.
pub fn filter_table(
    table: &mut ReportTable,
    condition: &FilterCondition,
    value: &str,
) -> Result<(), AlertError> {
    let Some(pattern) = LabelPattern::derive(condition, value)? else {
        return Ok(());
    };
    let regex = pattern.compile()?;
    table.retain_rows(|row| regex.is_match(&row.label()) != pattern.invert);
    Ok(())
}
