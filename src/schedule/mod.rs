//! Monitoring schedule domain types and pure time math.

pub mod calc;
pub mod window;

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Maximum number of notification recipients per schedule.
pub const MAX_RECIPIENTS: usize = 5;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("unknown frequency '{0}' (expected 'weekly' or 'biweekly')")]
    InvalidFrequency(String),
    #[error("day of week must be 0-6 (0 = Sunday), got {0}")]
    InvalidDayOfWeek(u8),
    #[error("invalid time of day '{0}' (expected HH:MM)")]
    InvalidTimeOfDay(String),
    #[error("unknown timezone '{0}'")]
    InvalidTimezone(String),
    #[error("too many recipients: {0} (max {MAX_RECIPIENTS})")]
    TooManyRecipients(usize),
    #[error("end bound {ends_at} is not after start bound {starts_at}")]
    InvertedBounds {
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    },
}

/// How often a schedule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Weekly,
    Biweekly,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frequency::Weekly => write!(f, "weekly"),
            Frequency::Biweekly => write!(f, "biweekly"),
        }
    }
}

impl FromStr for Frequency {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "weekly" => Ok(Frequency::Weekly),
            "biweekly" => Ok(Frequency::Biweekly),
            other => Err(ScheduleError::InvalidFrequency(other.to_string())),
        }
    }
}

/// A website monitored for accessibility regressions on a fixed cadence.
#[derive(Debug, Clone, Serialize)]
pub struct MonitoredSchedule {
    pub id: Uuid,
    pub url: String,
    pub frequency: Frequency,
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: u8,
    pub time_of_day: NaiveTime,
    #[serde(with = "tz_name")]
    pub timezone: Tz,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub score_threshold: f64,
    pub recipients: Vec<String>,
    pub enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

/// Validated input for creating a schedule.
#[derive(Debug, Clone)]
pub struct ScheduleSpec {
    pub url: String,
    pub frequency: Frequency,
    pub day_of_week: u8,
    pub time_of_day: NaiveTime,
    pub timezone: Tz,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub score_threshold: f64,
    pub recipients: Vec<String>,
}

impl MonitoredSchedule {
    /// Build a new enabled schedule from a validated spec, with `next_run_at`
    /// computed from "now".
    pub fn from_spec(spec: ScheduleSpec, now: DateTime<Utc>) -> Result<Self, ScheduleError> {
        if spec.day_of_week > 6 {
            return Err(ScheduleError::InvalidDayOfWeek(spec.day_of_week));
        }
        if spec.recipients.len() > MAX_RECIPIENTS {
            return Err(ScheduleError::TooManyRecipients(spec.recipients.len()));
        }
        if let (Some(starts_at), Some(ends_at)) = (spec.starts_at, spec.ends_at) {
            if ends_at <= starts_at {
                return Err(ScheduleError::InvertedBounds { starts_at, ends_at });
            }
        }

        let base = spec.starts_at.map_or(now, |s| s.max(now));
        let next_run_at = match calc::next_run(
            spec.frequency,
            spec.day_of_week,
            spec.time_of_day,
            spec.timezone,
            spec.ends_at,
            base,
        ) {
            calc::NextRun::At(t) => Some(t),
            calc::NextRun::PastEndBound => None,
        };

        Ok(Self {
            id: Uuid::new_v4(),
            url: spec.url,
            frequency: spec.frequency,
            day_of_week: spec.day_of_week,
            time_of_day: spec.time_of_day,
            timezone: spec.timezone,
            starts_at: spec.starts_at,
            ends_at: spec.ends_at,
            score_threshold: spec.score_threshold,
            recipients: spec.recipients,
            enabled: next_run_at.is_some(),
            last_run_at: None,
            next_run_at,
            consecutive_failures: 0,
        })
    }

    /// Compute the run after `now` for this schedule's configuration.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> calc::NextRun {
        calc::next_run(
            self.frequency,
            self.day_of_week,
            self.time_of_day,
            self.timezone,
            self.ends_at,
            now,
        )
    }
}

mod tz_name {
    use chrono_tz::Tz;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(tz: &Tz, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(tz.name())
    }
}
