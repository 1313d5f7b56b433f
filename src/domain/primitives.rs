//! Domain primitives: TimeMs and the string identifiers.

use serde::{Deserialize, Serialize};

/// Milliseconds in one day.
pub const MS_PER_DAY: i64 = 86_400_000;

/// Time in milliseconds since Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// Shift by a whole number of days.
    pub fn plus_days(&self, days: i64) -> Self {
        TimeMs(self.0.saturating_add(days.saturating_mul(MS_PER_DAY)))
    }

    /// Milliseconds elapsed from `earlier` to `self` (negative if `earlier` is later).
    pub fn millis_since(&self, earlier: TimeMs) -> i64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl std::fmt::Display for TimeMs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declares a string-backed identifier newtype.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            /// Fresh random identifier.
            pub fn generate() -> Self {
                $name(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a single stake.
    StakeId
);
string_id!(
    /// Identifier of a goal; one escrow exists per goal.
    GoalId
);
string_id!(
    /// Identifier of a user (stakeholder, wallet owner).
    UserId
);
string_id!(
    /// Identifier of an escrow record.
    EscrowId
);
string_id!(DisputeId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timems_ordering() {
        assert!(TimeMs::new(1000) < TimeMs::new(2000));
    }

    #[test]
    fn test_plus_days_and_millis_since() {
        let start = TimeMs::new(0);
        let later = start.plus_days(365);
        assert_eq!(later.as_ms(), 365 * MS_PER_DAY);
        assert_eq!(later.millis_since(start), 365 * MS_PER_DAY);
        assert_eq!(start.millis_since(later), -365 * MS_PER_DAY);
    }

    #[test]
    fn test_id_display_and_serde() {
        let goal = GoalId::new("goal-1");
        assert_eq!(goal.to_string(), "goal-1");
        assert_eq!(serde_json::to_string(&goal).unwrap(), "\"goal-1\"");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(StakeId::generate(), StakeId::generate());
    }
}
