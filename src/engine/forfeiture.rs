//! Forfeiture splits between charity, the platform and group winners.
//!
//! Charity and platform shares are rounded to cents; the last non-zero
//! bucket takes whatever remains, so the parts always add back to the input.

use crate::domain::{Decimal, OwnershipClass};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Split rates for one ownership class. Must each lie in [0, 1] and sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForfeitureRates {
    pub charity: Decimal,
    pub platform: Decimal,
    pub winners: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RatesError {
    #[error("expected three comma-separated rates (charity,platform,winners), got {0:?}")]
    Malformed(String),
    #[error("rate {0} is outside [0, 1]")]
    OutOfRange(Decimal),
    #[error("rates sum to {0}, expected 1")]
    BadSum(Decimal),
}

impl ForfeitureRates {
    pub fn new(charity: Decimal, platform: Decimal, winners: Decimal) -> Result<Self, RatesError> {
        for rate in [charity, platform, winners] {
            if !rate.is_unit_rate() {
                return Err(RatesError::OutOfRange(rate));
            }
        }
        let sum = charity + platform + winners;
        if sum != Decimal::one() {
            return Err(RatesError::BadSum(sum));
        }
        Ok(Self {
            charity,
            platform,
            winners,
        })
    }

    /// Parse `"charity,platform,winners"`, e.g. `"0.3,0.2,0.5"`.
    pub fn parse(s: &str) -> Result<Self, RatesError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [charity, platform, winners] = parts.as_slice() else {
            return Err(RatesError::Malformed(s.to_string()));
        };
        let parse = |p: &str| Decimal::from_str(p).map_err(|_| RatesError::Malformed(s.to_string()));
        Self::new(parse(*charity)?, parse(*platform)?, parse(*winners)?)
    }

    fn fallback(charity: &str, platform: &str, winners: &str) -> Self {
        let d = |v: &str| Decimal::from_str(v).unwrap_or_default();
        Self {
            charity: d(charity),
            platform: d(platform),
            winners: d(winners),
        }
    }
}

/// Split rates per ownership class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForfeitureConfig {
    pub individual: ForfeitureRates,
    pub corporate: ForfeitureRates,
    pub group: ForfeitureRates,
}

impl Default for ForfeitureConfig {
    fn default() -> Self {
        Self {
            individual: ForfeitureRates::fallback("0.5", "0.5", "0"),
            corporate: ForfeitureRates::fallback("0.5", "0.5", "0"),
            group: ForfeitureRates::fallback("0.3", "0.2", "0.5"),
        }
    }
}

impl ForfeitureConfig {
    pub fn rates_for(&self, class: OwnershipClass) -> ForfeitureRates {
        match class {
            OwnershipClass::Individual => self.individual,
            OwnershipClass::Corporate => self.corporate,
            OwnershipClass::Group => self.group,
        }
    }
}

/// Result of splitting one forfeited amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForfeitureSplit {
    pub charity: Decimal,
    pub platform: Decimal,
    pub winners: Decimal,
}

impl ForfeitureSplit {
    pub fn total(&self) -> Decimal {
        self.charity + self.platform + self.winners
    }
}

#[derive(Debug, Clone, Default)]
pub struct ForfeitureDistributor {
    config: ForfeitureConfig,
}

impl ForfeitureDistributor {
    pub fn new(config: ForfeitureConfig) -> Self {
        Self { config }
    }

    /// Split a forfeited net amount (principal + accrual - creation fee).
    ///
    /// A group with no winners falls back to the individual rates, since
    /// there is nobody to receive a winners' share.
    pub fn split(&self, net: Decimal, class: OwnershipClass, winner_count: usize) -> ForfeitureSplit {
        let net = net.non_negative();
        let rates = match (class, winner_count) {
            (OwnershipClass::Group, 0) => self.config.individual,
            _ => self.config.rates_for(class),
        };

        let charity = (net * rates.charity).round_money().min(net);
        let (platform, winners) = if rates.winners.is_zero() {
            (net - charity, Decimal::zero())
        } else {
            let platform = (net * rates.platform).round_money().min(net - charity);
            (platform, net - charity - platform)
        };

        ForfeitureSplit {
            charity,
            platform,
            winners,
        }
    }

    /// Divide `pool` evenly among `n` recipients at cent precision.
    ///
    /// The rounding remainder goes to the first recipient. Empty for `n == 0`.
    pub fn divide_evenly(pool: Decimal, n: usize) -> Vec<Decimal> {
        if n == 0 {
            return Vec::new();
        }
        let count = Decimal::from_i64(n as i64);
        let each = (pool.non_negative() / count).floor_money();
        let remainder = pool.non_negative() - each * count;

        let mut shares = vec![each; n];
        shares[0] += remainder;
        shares
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_group_scenario_190() {
        let distributor = ForfeitureDistributor::default();
        let split = distributor.split(dec("190"), OwnershipClass::Group, 1);
        assert_eq!(split.charity, dec("57"));
        assert_eq!(split.platform, dec("38"));
        assert_eq!(split.winners, dec("95"));
        assert_eq!(split.total(), dec("190"));
    }

    #[test]
    fn test_individual_and_corporate_split_half() {
        let distributor = ForfeitureDistributor::default();
        for class in [OwnershipClass::Individual, OwnershipClass::Corporate] {
            let split = distributor.split(dec("101"), class, 0);
            assert_eq!(split.charity, dec("50.5"));
            assert_eq!(split.platform, dec("50.5"));
            assert_eq!(split.winners, Decimal::zero());
        }
    }

    #[test]
    fn test_split_always_sums_to_input() {
        let distributor = ForfeitureDistributor::default();
        let inputs = ["0", "0.01", "0.03", "1", "33.33", "99.99", "190", "1234567.89", "0.005"];
        for input in inputs {
            for class in [
                OwnershipClass::Individual,
                OwnershipClass::Corporate,
                OwnershipClass::Group,
            ] {
                for winners in [0usize, 1, 3] {
                    let split = distributor.split(dec(input), class, winners);
                    assert_eq!(split.total(), dec(input), "input={} class={:?}", input, class);
                    assert!(!split.charity.is_negative());
                    assert!(!split.platform.is_negative());
                    assert!(!split.winners.is_negative());
                }
            }
        }
    }

    #[test]
    fn test_group_without_winners_uses_individual_rates() {
        let distributor = ForfeitureDistributor::default();
        let split = distributor.split(dec("100"), OwnershipClass::Group, 0);
        assert_eq!(split.charity, dec("50"));
        assert_eq!(split.platform, dec("50"));
        assert_eq!(split.winners, Decimal::zero());
    }

    #[test]
    fn test_divide_evenly_remainder_to_first() {
        let shares = ForfeitureDistributor::divide_evenly(dec("100"), 3);
        assert_eq!(shares, vec![dec("33.34"), dec("33.33"), dec("33.33")]);
        let total: Decimal = shares.iter().sum();
        assert_eq!(total, dec("100"));

        assert!(ForfeitureDistributor::divide_evenly(dec("5"), 0).is_empty());
        assert_eq!(ForfeitureDistributor::divide_evenly(dec("95"), 1), vec![dec("95")]);
    }

    #[test]
    fn test_injected_rates() {
        let config = ForfeitureConfig {
            individual: ForfeitureRates::parse("1,0,0").unwrap(),
            ..ForfeitureConfig::default()
        };
        let split = ForfeitureDistributor::new(config).split(dec("80"), OwnershipClass::Individual, 0);
        assert_eq!(split.charity, dec("80"));
        assert_eq!(split.platform, Decimal::zero());
    }

    #[test]
    fn test_rates_parse_errors() {
        assert!(matches!(ForfeitureRates::parse("0.5,0.5"), Err(RatesError::Malformed(_))));
        assert!(matches!(ForfeitureRates::parse("a,b,c"), Err(RatesError::Malformed(_))));
        assert!(matches!(ForfeitureRates::parse("0.6,0.6,0"), Err(RatesError::BadSum(_))));
        assert!(matches!(ForfeitureRates::parse("1.5,-0.5,0"), Err(RatesError::OutOfRange(_))));
        assert_eq!(
            ForfeitureRates::parse(" 0.3, 0.2 ,0.5").unwrap(),
            ForfeitureConfig::default().group
        );
    }
}
