//! Domain keys
//!
//! Every independently cached data set on the dashboard is addressed by a
//! [`DomainKey`]. Fixed domains render as their camel-case name; monthly
//! snapshots are parameterized by a canonical `YYYY-MM` string and render as
//! `monthlySnapshot:<yearMonth>`.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

static YEAR_MONTH_PATTERN: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"^[0-9]{4}-[0-9]{2}$").expect("year-month pattern is valid"));

const MONTHLY_SNAPSHOT_PREFIX: &str = "monthlySnapshot:";

/// Errors produced while parsing keys
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// Not one of the known domain names
    #[error("unknown domain: '{0}'")]
    UnknownDomain(String),

    /// Month parameter does not match `YYYY-MM`
    #[error("invalid year-month '{0}': expected YYYY-MM")]
    InvalidYearMonth(String),
}

/// Canonical `YYYY-MM` month identifier.
///
/// Only the shape is validated here. Whether the month actually exists
/// upstream (or is even a calendar month, e.g. `2025-13`) is decided by the
/// monthly collaborator, which answers unknown months with a 404.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth(String);

impl YearMonth {
    /// Parse a `YYYY-MM` string
    ///
    /// # Errors
    /// `KeyError::InvalidYearMonth` unless the input is four ASCII digits, a\n    /// dash and two ASCII digits
    pub fn parse(raw: &str) -> Result<Self, KeyError> {
        if YEAR_MONTH_PATTERN.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(KeyError::InvalidYearMonth(raw.to_string()))
        }
    }

    /// Borrow the canonical string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Four-digit year
    #[must_use]
    pub fn year(&self) -> u16 {
        self.0.get(..4).and_then(|y| y.parse().ok()).unwrap_or_default()
    }

    /// Two-digit month as written (may be outside 1..=12)
    #[must_use]
    pub fn month(&self) -> u8 {
        self.0.get(5..).and_then(|m| m.parse().ok()).unwrap_or_default()
    }

    /// Whether the month component is 01 through 12
    #[inline]
    #[must_use]
    pub fn is_calendar_month(&self) -> bool {
        (1..=12).contains(&self.month())
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for YearMonth {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.0
    }
}

/// Identifier of a logically independent, independently cached data set
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DomainKey {
    /// Project progress rows
    Progress,
    /// Manpower allocation rows
    Manpower,
    /// Generated summary insights
    AiInsights,
    /// Risk register rows
    Risk,
    /// Index of months with stored snapshots
    MonthlyIndex,
    /// Snapshot for one month
    MonthlySnapshot(YearMonth),
}

impl DomainKey {
    /// The non-parameterized domains, in display order
    #[must_use]
    pub fn fixed() -> [DomainKey; 5] {
        [
            DomainKey::Progress,
            DomainKey::Manpower,
            DomainKey::AiInsights,
            DomainKey::Risk,
            DomainKey::MonthlyIndex,
        ]
    }

    /// Key for a monthly snapshot
    ///
    /// # Errors
    /// `KeyError::InvalidYearMonth` for a malformed month
    pub fn monthly_snapshot(year_month: &str) -> Result<Self, KeyError> {
        YearMonth::parse(year_month).map(DomainKey::MonthlySnapshot)
    }

    /// Whether this key addresses monthly data (index or snapshot)
    #[inline]
    #[must_use]
    pub fn is_monthly(&self) -> bool {
        matches!(self, DomainKey::MonthlyIndex | DomainKey::MonthlySnapshot(_))
    }

    /// Month parameter, if any
    #[inline]
    #[must_use]
    pub fn year_month(&self) -> Option<&YearMonth> {
        match self {
            DomainKey::MonthlySnapshot(ym) => Some(ym),
            _ => None,
        }
    }

    fn fixed_name(&self) -> Option<&'static str> {
        match self {
            DomainKey::Progress => Some("progress"),
            DomainKey::Manpower => Some("manpower"),
            DomainKey::AiInsights => Some("aiInsights"),
            DomainKey::Risk => Some("risk"),
            DomainKey::MonthlyIndex => Some("monthlyIndex"),
            DomainKey::MonthlySnapshot(_) => None,
        }
    }
}

impl fmt::Display for DomainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainKey::MonthlySnapshot(ym) => write!(f, "{MONTHLY_SNAPSHOT_PREFIX}{ym}"),
            other => f.write_str(other.fixed_name().unwrap_or_default()),
        }
    }
}

impl FromStr for DomainKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(month) = s.strip_prefix(MONTHLY_SNAPSHOT_PREFIX) {
            return DomainKey::monthly_snapshot(month);
        }

        DomainKey::fixed()
            .into_iter()
            .find(|key| key.fixed_name() == Some(s))
            .ok_or_else(|| KeyError::UnknownDomain(s.to_string()))
    }
}

impl TryFrom<String> for DomainKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DomainKey> for String {
    fn from(value: DomainKey) -> Self {
        value.to_string()
    }
}
