use {
    super::error::WebhookError,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Non-negative monetary amount in minor currency units (cents).
///
/// All internal arithmetic is integer arithmetic; decimal gateway values are
/// converted once at the boundary with [`MinorUnits::from_decimal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MinorUnits(i64);

impl MinorUnits {
    pub const ZERO: MinorUnits = MinorUnits(0);

    pub fn new(cents: i64) -> Result<Self, WebhookError> {
        if cents < 0 {
            return Err(WebhookError::Validation(format!(
                "MinorUnits cannot be negative, got: {cents}"
            )));
        }
        Ok(Self(cents))
    }

    /// Converts a decimal major-unit value (e.g. `90.0` meaning 90.00) into
    /// cents, rounding to the nearest unit.
    pub fn from_decimal(value: f64) -> Result<Self, WebhookError> {
        if !value.is_finite() || value < 0.0 {
            return Err(WebhookError::Validation(format!(
                "invalid monetary value: {value}"
            )));
        }
        let cents = (value * 100.0).round();
        if cents > i64::MAX as f64 {
            return Err(WebhookError::Validation(format!(
                "monetary value out of range: {value}"
            )));
        }
        Ok(Self(cents as i64))
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: MinorUnits) -> Option<MinorUnits> {
        self.0.checked_add(other.0).map(MinorUnits)
    }

    pub fn checked_sub(self, other: MinorUnits) -> Option<MinorUnits> {
        self.0
            .checked_sub(other.0)
            .filter(|&v| v >= 0)
            .map(MinorUnits)
    }

    /// Addition that pins at `i64::MAX` instead of wrapping. Amounts in this
    /// system are far below the pin in practice.
    pub fn saturating_add(self, other: MinorUnits) -> MinorUnits {
        MinorUnits(self.0.saturating_add(other.0))
    }

    /// Subtraction floored at zero.
    pub fn saturating_sub(self, other: MinorUnits) -> MinorUnits {
        MinorUnits((self.0 - other.0).max(0))
    }
}

impl fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
