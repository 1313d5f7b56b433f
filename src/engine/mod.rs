//! Pure computation engines: accrual, fees and forfeiture splits.
//!
//! Nothing in here touches storage or the network.

pub mod accrual;
pub mod fees;
pub mod forfeiture;

pub use accrual::{AccrualCalculator, DAYS_PER_YEAR, MS_PER_YEAR};
pub use fees::{FeeBreakdown, FeeCalculator};
pub use forfeiture::{
    ForfeitureConfig, ForfeitureDistributor, ForfeitureRates, ForfeitureSplit, RatesError,
};
