//! Billing frequency and period arithmetic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{Timestamp, ValidationError};

/// How often a mandate is charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingFrequency {
    Monthly,
    Yearly,
}

impl BillingFrequency {
    /// Length of one billing period in days.
    pub fn period_days(&self) -> i64 {
        match self {
            BillingFrequency::Monthly => 30,
            BillingFrequency::Yearly => 365,
        }
    }

    /// End of a period that starts at `start`.
    pub fn period_end(&self, start: Timestamp) -> Timestamp {
        start.add_days(self.period_days())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingFrequency::Monthly => "MONTHLY",
            BillingFrequency::Yearly => "YEARLY",
        }
    }
}

impl fmt::Display for BillingFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingFrequency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MONTHLY" => Ok(BillingFrequency::Monthly),
            "YEARLY" => Ok(BillingFrequency::Yearly),
            other => Err(ValidationError::invalid_format(
                "frequency",
                format!("unknown billing frequency '{}'", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn monthly_period_is_thirty_days() {
        assert_eq!(BillingFrequency::Monthly.period_days(), 30);
    }

    #[test]
    fn yearly_period_is_365_days() {
        assert_eq!(BillingFrequency::Yearly.period_days(), 365);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("monthly".parse::<BillingFrequency>(), Ok(BillingFrequency::Monthly));
        assert_eq!("YEARLY".parse::<BillingFrequency>(), Ok(BillingFrequency::Yearly));
        assert!("weekly".parse::<BillingFrequency>().is_err());
    }

    #[test]
    fn serializes_in_upper_case() {
        let json = serde_json::to_string(&BillingFrequency::Yearly).unwrap();
        assert_eq!(json, "\"YEARLY\"");
    }

    proptest! {
        #[test]
        fn period_end_is_start_plus_period(secs in 0i64..4_000_000_000, yearly in any::<bool>()) {
            let frequency = if yearly { BillingFrequency::Yearly } else { BillingFrequency::Monthly };
            let start = Timestamp::from_unix_secs(secs).unwrap();
            let end = frequency.period_end(start);
            prop_assert_eq!(end.duration_since(&start).num_days(), frequency.period_days());
        }
    }
}
