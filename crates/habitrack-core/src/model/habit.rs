//! Habit and goal records.
//!
//! A habit owns at most one *active* goal. Editing the cadence of a goal
//! either rewrites it in place (same frequency) or retires it in favour of a
//! new goal generation that remembers its predecessors, so execution logs
//! recorded against the old id still count.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Cadence of a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyType {
    /// Unset cadence. Period math treats it as a zero-length period.
    #[default]
    Undefined,
    Daily,
    Weekly,
    /// A fixed 31-day bucket, not a calendar month.
    Monthly,
}

impl FrequencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrequencyType::Undefined => "undefined",
            FrequencyType::Daily => "daily",
            FrequencyType::Weekly => "weekly",
            FrequencyType::Monthly => "monthly",
        }
    }

    /// Lenient parse used when reading rows back; unknown names become
    /// `Undefined` instead of failing the whole query.
    pub fn from_db(value: &str) -> Self {
        value.parse().unwrap_or(FrequencyType::Undefined)
    }
}

impl fmt::Display for FrequencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrequencyType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(FrequencyType::Daily),
            "weekly" => Ok(FrequencyType::Weekly),
            "monthly" => Ok(FrequencyType::Monthly),
            other => Err(ValidationError::UnknownFrequency(other.to_string())),
        }
    }
}

/// The cadence rules a user chooses for a habit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalRules {
    pub frequency: FrequencyType,
    /// Completions required inside one period.
    pub times_per_frequency: u32,
    /// Completed periods after which the goal is done.
    pub total_tracking_periods: u32,
}

impl GoalRules {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.frequency == FrequencyType::Undefined {
            return Err(ValidationError::InvalidValue {
                field: "frequency".into(),
                message: "frequency must be daily, weekly or monthly".into(),
            });
        }
        if self.times_per_frequency == 0 {
            return Err(ValidationError::InvalidValue {
                field: "times_per_frequency".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.total_tracking_periods == 0 {
            return Err(ValidationError::InvalidValue {
                field: "total_tracking_periods".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// One generation of a habit's tracking rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub id: i64,
    pub habit_id: i64,
    /// Owner of the habit; the goals checker resolves snapshots under it.
    pub username: String,
    pub frequency: FrequencyType,
    pub times_per_frequency: u32,
    pub total_tracking_periods: u32,
    pub is_active: bool,
    /// Once set, the goal is never mutated again.
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    /// Anchor of every period computation.
    pub start_tracking_at: DateTime<Utc>,
    pub next_check_at: DateTime<Utc>,
    /// Goals this one superseded, oldest first.
    pub predecessor_ids: Vec<i64>,
}

impl Goal {
    pub fn rules(&self) -> GoalRules {
        GoalRules {
            frequency: self.frequency,
            times_per_frequency: self.times_per_frequency,
            total_tracking_periods: self.total_tracking_periods,
        }
    }

    /// Same goal identity with different rules applied.
    pub fn with_rules(&self, rules: GoalRules) -> Goal {
        Goal {
            frequency: rules.frequency,
            times_per_frequency: rules.times_per_frequency,
            total_tracking_periods: rules.total_tracking_periods,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub description: String,
    /// Active goal, if the habit is tracked at all.
    pub goal: Option<Goal>,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a habit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHabit {
    pub name: String,
    pub description: String,
    pub goal: Option<GoalRules>,
}

/// Full-replacement update of a habit's editable fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HabitUpdate {
    pub habit_id: i64,
    pub name: String,
    pub description: String,
    pub goal: Option<GoalRules>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_parses_case_insensitively() {
        assert_eq!("Weekly".parse::<FrequencyType>().unwrap(), FrequencyType::Weekly);
        assert!("yearly".parse::<FrequencyType>().is_err());
        assert_eq!(FrequencyType::from_db("bogus"), FrequencyType::Undefined);
    }

    #[test]
    fn rules_reject_zero_targets() {
        let rules = GoalRules {
            frequency: FrequencyType::Daily,
            times_per_frequency: 0,
            total_tracking_periods: 3,
        };
        assert!(rules.validate().is_err());

        let rules = GoalRules {
            frequency: FrequencyType::Undefined,
            times_per_frequency: 1,
            total_tracking_periods: 3,
        };
        assert!(rules.validate().is_err());
    }
}
