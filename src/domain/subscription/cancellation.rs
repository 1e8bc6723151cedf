//! Cancellation modes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// How a cancellation takes effect.
///
/// - `EndOfPeriod`: active → cancelling; benefits run to period end, no money moves.
/// - `WithRefund`: prorated refund, then expired and replaced by the free tier.
/// - `Immediate`: expired now and replaced by the free tier, no refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationMode {
    EndOfPeriod,
    WithRefund,
    Immediate,
}

impl CancellationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationMode::EndOfPeriod => "end_of_period",
            CancellationMode::WithRefund => "with_refund",
            CancellationMode::Immediate => "immediate",
        }
    }

    /// Whether this mode ends benefits right away.
    pub fn ends_immediately(&self) -> bool {
        !matches!(self, CancellationMode::EndOfPeriod)
    }
}

impl fmt::Display for CancellationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CancellationMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "end_of_period" => Ok(CancellationMode::EndOfPeriod),
            "with_refund" => Ok(CancellationMode::WithRefund),
            "immediate" => Ok(CancellationMode::Immediate),
            other => Err(ValidationError::invalid_format(
                "cancellation_mode",
                format!("unknown mode '{}'", other),
            )),
        }
    }
}
