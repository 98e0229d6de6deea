//! Period value object - a duration counted in one calendar unit.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::ValidationError;

/// Calendar unit of a [`Period`].
///
/// The numeric codes are the persisted representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodUnit {
    Days,
    Weeks,
    Months,
    Years,
}

impl PeriodUnit {
    /// Persisted code (days=1, weeks=2, months=3, years=4).
    pub fn code(&self) -> i16 {
        match self {
            PeriodUnit::Days => 1,
            PeriodUnit::Weeks => 2,
            PeriodUnit::Months => 3,
            PeriodUnit::Years => 4,
        }
    }

    /// Parses a persisted code.
    pub fn from_code(code: i16) -> Result<Self, ValidationError> {
        match code {
            1 => Ok(PeriodUnit::Days),
            2 => Ok(PeriodUnit::Weeks),
            3 => Ok(PeriodUnit::Months),
            4 => Ok(PeriodUnit::Years),
            other => Err(ValidationError::out_of_range("period_unit", 1, 4, i64::from(other))),
        }
    }

    /// Single letter used by PayPal (`D`, `W`, `M`, `Y`).
    pub fn letter(&self) -> char {
        match self {
            PeriodUnit::Days => 'D',
            PeriodUnit::Weeks => 'W',
            PeriodUnit::Months => 'M',
            PeriodUnit::Years => 'Y',
        }
    }

    /// Parses a PayPal unit letter.
    pub fn from_letter(letter: &str) -> Result<Self, ValidationError> {
        match letter {
            "D" => Ok(PeriodUnit::Days),
            "W" => Ok(PeriodUnit::Weeks),
            "M" => Ok(PeriodUnit::Months),
            "Y" => Ok(PeriodUnit::Years),
            other => Err(ValidationError::invalid_format(
                "period_unit",
                format!("unknown unit letter '{}'", other),
            )),
        }
    }

    fn plural(&self) -> &'static str {
        match self {
            PeriodUnit::Days => "Days",
            PeriodUnit::Weeks => "Weeks",
            PeriodUnit::Months => "Months",
            PeriodUnit::Years => "Years",
        }
    }

    fn adverb(&self) -> &'static str {
        match self {
            PeriodUnit::Days => "Daily",
            PeriodUnit::Weeks => "Weekly",
            PeriodUnit::Months => "Monthly",
            PeriodUnit::Years => "Yearly",
        }
    }
}

/// A duration in a single unit.
///
/// `count` may be zero ("no period", e.g. no trial) or negative (used to
/// reverse a prolongation on refund).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub unit: PeriodUnit,
    pub count: i32,
}

impl Period {
    pub const fn new(unit: PeriodUnit, count: i32) -> Self {
        Self { unit, count }
    }

    pub const fn days(count: i32) -> Self {
        Self::new(PeriodUnit::Days, count)
    }

    pub const fn weeks(count: i32) -> Self {
        Self::new(PeriodUnit::Weeks, count)
    }

    pub const fn months(count: i32) -> Self {
        Self::new(PeriodUnit::Months, count)
    }

    pub const fn years(count: i32) -> Self {
        Self::new(PeriodUnit::Years, count)
    }

    /// True for a zero-length period.
    pub fn is_zero(&self) -> bool {
        self.count == 0
    }

    /// The same period pointing backwards in time.
    pub fn negated(&self) -> Self {
        Self::new(self.unit, self.count.saturating_neg())
    }

    /// PayPal subscription notation, e.g. `"3 M"`.
    pub fn to_ipn(&self) -> String {
        format!("{} {}", self.count, self.unit.letter())
    }

    /// Parses PayPal subscription notation (`"<count> <letter>"`).
    pub fn parse_ipn(value: &str) -> Result<Self, ValidationError> {
        let mut parts = value.split_whitespace();
        let (Some(count), Some(letter), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ValidationError::invalid_format(
                "period",
                format!("expected '<count> <unit>', got '{}'", value),
            ));
        };
        let count = count.parse::<i32>().map_err(|e| {
            ValidationError::invalid_format("period", format!("bad count '{}': {}", count, e))
        })?;
        Ok(Self::new(PeriodUnit::from_letter(letter)?, count))
    }

    /// Every spelling PayPal uses for this billing cycle in recurring payment
    /// notifications: `"every N Months"` always, plus `"Monthly"` when N is 1.
    pub fn payment_cycles(&self) -> Vec<String> {
        let mut cycles = vec![format!("every {} {}", self.count, self.unit.plural())];
        if self.count == 1 {
            cycles.push(self.unit.adverb().to_string());
        }
        cycles
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.count, self.unit.plural().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_codes_round_trip() {
        for unit in [PeriodUnit::Days, PeriodUnit::Weeks, PeriodUnit::Months, PeriodUnit::Years] {
            assert_eq!(PeriodUnit::from_code(unit.code()), Ok(unit));
        }
        assert!(PeriodUnit::from_code(0).is_err());
        assert!(PeriodUnit::from_code(5).is_err());
    }

    #[test]
    fn ipn_notation_uses_unit_letters() {
        assert_eq!(Period::months(1).to_ipn(), "1 M");
        assert_eq!(Period::days(14).to_ipn(), "14 D");
        assert_eq!(Period::parse_ipn("2 W"), Ok(Period::weeks(2)));
    }

    #[test]
    fn ipn_notation_rejects_garbage() {
        assert!(Period::parse_ipn("M 1").is_err());
        assert!(Period::parse_ipn("1").is_err());
        assert!(Period::parse_ipn("1 M extra").is_err());
        assert!(Period::parse_ipn("1 Q").is_err());
    }

    #[test]
    fn monthly_cycle_has_two_spellings() {
        assert_eq!(
            Period::months(1).payment_cycles(),
            vec!["every 1 Months".to_string(), "Monthly".to_string()]
        );
    }

    #[test]
    fn multi_unit_cycle_has_one_spelling() {
        assert_eq!(Period::weeks(2).payment_cycles(), vec!["every 2 Weeks".to_string()]);
    }

    #[test]
    fn negated_flips_sign_only() {
        assert_eq!(Period::years(2).negated(), Period::years(-2));
        assert!(Period::months(0).negated().is_zero());
    }
}
