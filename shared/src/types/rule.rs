//! Alert rule definitions
//!
//! These types mirror what the rule store persists. Condition kinds are
//! closed enums with an `Unsupported` fallback so that unknown values coming
//! out of storage still decode and are rejected only when evaluated.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::utils::parse_lenient_float;

pub type RuleId = u64;
pub type SiteId = u32;

/// Calendar granularity a rule is evaluated over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    Day,
    Week,
    Month,
}

impl PeriodKind {
    pub const ALL: [PeriodKind; 3] = [PeriodKind::Day, PeriodKind::Week, PeriodKind::Month];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

impl fmt::Display for PeriodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid period: {0}")]
pub struct ParsePeriodError(pub String);

impl FromStr for PeriodKind {
    type Err = ParsePeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" => Ok(PeriodKind::Day),
            "week" => Ok(PeriodKind::Week),
            "month" => Ok(PeriodKind::Month),
            _ => Err(ParsePeriodError(s.to_string())),
        }
    }
}

/// A valid (period, compared_to) pairing together with its display label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparableDate {
    pub period: PeriodKind,
    pub compared_to: u32,
    pub label: &'static str,
}

/// Every comparison a rule may be configured with.
pub const COMPARABLE_DATES: &[ComparableDate] = &[
    ComparableDate {
        period: PeriodKind::Day,
        compared_to: 7,
        label: "Day compared to same day previous week",
    },
    ComparableDate {
        period: PeriodKind::Day,
        compared_to: 1,
        label: "Day compared to previous day",
    },
    ComparableDate {
        period: PeriodKind::Day,
        compared_to: 365,
        label: "Day compared to same day previous year",
    },
    ComparableDate {
        period: PeriodKind::Week,
        compared_to: 1,
        label: "Week compared to previous week",
    },
    ComparableDate {
        period: PeriodKind::Month,
        compared_to: 1,
        label: "Month compared to previous month",
    },
    ComparableDate {
        period: PeriodKind::Month,
        compared_to: 12,
        label: "Month compared to same month previous year",
    },
];

/// Comparison offsets (in periods) for one period kind.
pub fn comparables_for(period: PeriodKind) -> impl Iterator<Item = &'static ComparableDate> {
    COMPARABLE_DATES.iter().filter(move |c| c.period == period)
}

macro_rules! string_keyed_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident => ($key:literal, $label:literal),)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
            /// A stored value this version does not recognise.
            Unsupported(String),
        }

        impl $name {
            pub const KNOWN: &'static [$name] = &[$($name::$variant,)+];

            /// Stable storage key.
            pub fn key(&self) -> &str {
                match self {
                    $(Self::$variant => $key,)+
                    Self::Unsupported(raw) => raw.as_str(),
                }
            }

            /// Human-readable label, `None` for unsupported values.
            pub fn label(&self) -> Option<&'static str> {
                match self {
                    $(Self::$variant => Some($label),)+
                    Self::Unsupported(_) => None,
                }
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                match s {
                    $($key => Self::$variant,)+
                    other => Self::Unsupported(other.to_string()),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.key())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.key())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Ok(Self::from(raw.as_str()))
            }
        }
    };
}

string_keyed_enum! {
    /// How the new value is compared against the threshold and the old value.
    pub enum MetricCondition {
        LessThan => ("less_than", "Is less than"),
        GreaterThan => ("greater_than", "Is greater than"),
        DecreaseMoreThan => ("decrease_more_than", "Decreases more than"),
        IncreaseMoreThan => ("increase_more_than", "Increases more than"),
        PercentageDecreaseMoreThan => ("percentage_decrease_more_than", "% decreases more than"),
        PercentageIncreaseMoreThan => ("percentage_increase_more_than", "% increases more than"),
    }
}

string_keyed_enum! {
    /// How report rows are selected by label before aggregation.
    pub enum FilterCondition {
        MatchesAny => ("matches_any", "Matches any expression"),
        MatchesExactly => ("matches_exactly", "Is"),
        DoesNotMatchExactly => ("does_not_match_exactly", "Is not"),
        MatchesRegex => ("matches_regex", "Matches the regular expression"),
        DoesNotMatchRegex => ("does_not_match_regex", "Does not match the regular expression"),
        Contains => ("contains", "Contains"),
        DoesNotContain => ("does_not_contain", "Does not contain"),
        StartsWith => ("starts_with", "Starts with"),
        DoesNotStartWith => ("does_not_start_with", "Does not start with"),
        EndsWith => ("ends_with", "Ends with"),
        DoesNotEndWith => ("does_not_end_with", "Does not end with"),
    }
}

impl MetricCondition {
    /// Conditions that compare against history and therefore never fire
    /// when both values are empty.
    pub fn needs_both_values(&self) -> bool {
        matches!(
            self,
            Self::DecreaseMoreThan
                | Self::IncreaseMoreThan
                | Self::PercentageDecreaseMoreThan
                | Self::PercentageIncreaseMoreThan
        )
    }
}

/// Trigger threshold. Stored either as a number or as a string; strings are
/// read leniently (leading numeric prefix, otherwise 0).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Threshold(pub f64);

impl Threshold {
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl From<f64> for Threshold {
    fn from(v: f64) -> Self {
        Threshold(v)
    }
}

impl From<&str> for Threshold {
    fn from(s: &str) -> Self {
        Threshold(parse_lenient_float(s))
    }
}

impl Serialize for Threshold {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0)
    }
}

impl<'de> Deserialize<'de> for Threshold {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Threshold(n),
            Raw::Text(s) => Threshold::from(s.as_str()),
        })
    }
}

/// A stored alert rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: RuleId,
    pub name: String,
    pub login: String,

    /// Sites the rule applies to. Empty means the rule is never evaluated.
    #[serde(default)]
    pub id_sites: Vec<SiteId>,

    pub period: PeriodKind,

    /// Number of periods back used as the baseline.
    pub compared_to: u32,

    #[serde(default)]
    pub email_me: bool,
    #[serde(default)]
    pub additional_emails: Vec<String>,
    #[serde(default)]
    pub phone_numbers: Vec<String>,

    /// Report unique id, e.g. `MultiSites_getAll`.
    pub report: String,
    pub metric: String,

    pub metric_condition: MetricCondition,
    pub metric_matched: Threshold,

    #[serde(default)]
    pub report_condition: Option<FilterCondition>,
    /// Stored HTML-escaped, as entered through the UI.
    #[serde(default)]
    pub report_matched: Option<String>,
}

impl AlertRule {
    pub fn applies_to_site(&self, site_id: SiteId) -> bool {
        self.id_sites.contains(&site_id)
    }

    /// The configured label filter, if both a condition and a non-empty
    /// match value are present.
    pub fn label_filter(&self) -> Option<(&FilterCondition, &str)> {
        match (&self.report_condition, self.report_matched.as_deref()) {
            (Some(cond), Some(value)) if !value.is_empty() => Some((cond, value)),
            _ => None,
        }
    }
}
