//! Trigger condition evaluation.
//!
//! Pure functions deciding whether a rule fires for a (new, old) value pair.
//! An absent value and zero are both "empty": they read as 0 in arithmetic,
//! and when both values are empty the history-based conditions never fire.

use crate::error::AlertError;
use vigil_shared::types::rule::MetricCondition;

fn is_empty(value: Option<f64>) -> bool {
    value.map_or(true, |v| v == 0.0)
}

/// Relative change of `new` against `old`, in percent.
///
/// With no usable baseline the new value itself is returned, not a ratio.
pub fn percentage_change(new_value: Option<f64>, old_value: Option<f64>) -> f64 {
    let new = new_value.unwrap_or(0.0);
    match old_value {
        Some(old) if old != 0.0 => ((new / old) * 100.0) - 100.0,
        _ => new,
    }
}

/// Decide whether a rule with `condition` and `threshold` fires.
pub fn should_trigger(
    condition: &MetricCondition,
    threshold: f64,
    new_value: Option<f64>,
    old_value: Option<f64>,
) -> Result<bool, AlertError> {
    if condition.needs_both_values() && is_empty(old_value) && is_empty(new_value) {
        return Ok(false);
    }

    let new = new_value.unwrap_or(0.0);
    let old = old_value.unwrap_or(0.0);
    let percentage = percentage_change(new_value, old_value);

    let fired = match condition {
        MetricCondition::GreaterThan => new > threshold,
        MetricCondition::LessThan => new < threshold,
        MetricCondition::DecreaseMoreThan => (old - new) > threshold,
        MetricCondition::IncreaseMoreThan => (new - old) > threshold,
        MetricCondition::PercentageDecreaseMoreThan => -threshold > percentage && percentage < 0.0,
        MetricCondition::PercentageIncreaseMoreThan => threshold < percentage && percentage >= 0.0,
        MetricCondition::Unsupported(kind) => {
            return Err(AlertError::UnsupportedCondition { kind: kind.clone() })
        }
    };

    Ok(fired)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fires(cond: &str, threshold: f64, new: Option<f64>, old: Option<f64>) -> bool {
        should_trigger(&MetricCondition::from(cond), threshold, new, old).unwrap()
    }

    #[test]
    fn test_greater_than() {
        assert!(fires("greater_than", 20.0, Some(30.0), None));
        assert!(fires("greater_than", 20.0, Some(30.0), Some(30.0)));
        assert!(fires("greater_than", 20.0, Some(30.0), Some(15.0)));

        assert!(!fires("greater_than", 20.0, Some(10.0), None));
        assert!(!fires("greater_than", 20.0, Some(10.0), Some(30.0)));
        assert!(!fires("greater_than", 20.0, Some(10.0), Some(15.0)));
    }

    #[test]
    fn test_less_than_ignores_empty_guard() {
        assert!(fires("less_than", 20.0, Some(10.0), None));
        assert!(fires("less_than", 20.0, Some(10.0), Some(15.0)));
        assert!(fires("less_than", 20.0, Some(10.0), Some(30.0)));
        assert!(fires("less_than", 20.0, Some(0.0), Some(0.0)));
        assert!(fires("less_than", 20.0, None, None));

        assert!(!fires("less_than", 20.0, Some(30.0), None));
        assert!(!fires("less_than", 20.0, Some(30.0), Some(30.0)));
        assert!(!fires("less_than", 20.0, Some(30.0), Some(15.0)));
    }

    #[test]
    fn test_decrease_more_than() {
        assert!(fires("decrease_more_than", 29.0, Some(70.0), Some(100.0)));
        assert!(fires("decrease_more_than", 1.0, Some(70.0), Some(200.0)));
        assert!(fires("decrease_more_than", 1.0, None, Some(200.0)));

        assert!(!fires("decrease_more_than", 30.0, Some(70.0), Some(100.0)));
        assert!(!fires("decrease_more_than", 31.0, Some(70.0), Some(100.0)));
        assert!(!fires("decrease_more_than", 29.0, Some(70.0), None));
        assert!(!fires("decrease_more_than", 29.0, Some(70.0), Some(70.0)));
        assert!(!fires("decrease_more_than", 29.0, Some(100.0), Some(70.0)));
    }

    #[test]
    fn test_increase_more_than() {
        assert!(fires("increase_more_than", 29.0, Some(100.0), Some(70.0)));
        assert!(fires("increase_more_than", 1.0, Some(200.0), Some(70.0)));
        assert!(fires("increase_more_than", 1.0, Some(200.0), None));

        assert!(!fires("increase_more_than", 30.0, Some(100.0), Some(70.0)));
        assert!(!fires("increase_more_than", 29.0, None, Some(70.0)));
        assert!(!fires("increase_more_than", 29.0, Some(70.0), Some(70.0)));
        assert!(!fires("increase_more_than", 31.0, Some(70.0), Some(100.0)));
    }

    #[test]
    fn test_percentage_decrease_more_than() {
        assert!(fires("percentage_decrease_more_than", 15.0, Some(70.0), Some(100.0)));
        assert!(fires("percentage_decrease_more_than", 29.0, Some(70.0), Some(100.0)));
        assert!(fires("percentage_decrease_more_than", 29.0, None, Some(30.0)));

        assert!(!fires("percentage_decrease_more_than", 30.0, Some(70.0), Some(100.0)));
        assert!(!fires("percentage_decrease_more_than", 31.0, Some(70.0), Some(100.0)));
        assert!(!fires("percentage_decrease_more_than", 31.0, Some(100.0), Some(70.0)));
        assert!(!fires("percentage_decrease_more_than", 31.0, None, None));
    }

    #[test]
    fn test_percentage_increase_more_than() {
        assert!(fires("percentage_increase_more_than", 30.0, Some(100.0), Some(70.0)));
        assert!(fires("percentage_increase_more_than", 42.0, Some(100.0), Some(70.0)));
        // no baseline: the raw new value stands in for the percentage
        assert!(fires("percentage_increase_more_than", 43.0, Some(44.0), None));

        assert!(!fires("percentage_increase_more_than", 43.0, Some(100.0), Some(70.0)));
        assert!(!fires("percentage_increase_more_than", 43.0, None, None));
    }

    #[test]
    fn test_both_empty_never_fires_history_conditions() {
        for cond in [
            "decrease_more_than",
            "increase_more_than",
            "percentage_decrease_more_than",
            "percentage_increase_more_than",
        ] {
            for threshold in [-100.0, -1.0, 0.0, 1.0, 100.0] {
                assert!(!fires(cond, threshold, None, None));
                assert!(!fires(cond, threshold, Some(0.0), None));
                assert!(!fires(cond, threshold, Some(0.0), Some(0.0)));
            }
        }
    }

    #[test]
    fn test_percentage_change_baselines() {
        assert!((percentage_change(Some(100.0), Some(70.0)) - 42.857).abs() < 0.001);
        assert_eq!(percentage_change(Some(25.0), Some(0.0)), 25.0);
        assert_eq!(percentage_change(Some(25.0), None), 25.0);
        assert_eq!(percentage_change(Some(15.0), Some(30.0)), -50.0);
    }

    #[test]
    fn test_unsupported_condition_fails() {
        let err = should_trigger(
            &MetricCondition::Unsupported("NotExistInG".into()),
            30.0,
            Some(100.0),
            Some(70.0),
        )
        .unwrap_err();
        assert!(matches!(err, AlertError::UnsupportedCondition { ref kind } if kind == "NotExistInG"));
    }
}
