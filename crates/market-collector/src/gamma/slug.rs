//! Hourly event slug computation
//!
//! Hourly up/down events are keyed by the Eastern-time hour their trading window
//! starts in, e.g. `bitcoin-up-or-down-november-28-9am-et` covers 9am-10am ET and
//! settles at 10am ET. So offset 0 from "now" names the market settling at the
//! next top of the hour.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use chrono_tz::Tz;

/// Maximum number of consecutive hours probed during discovery
pub const MAX_CANDIDATE_HOURS: u32 = 2;

/// Maps wall-clock time to hourly event slugs. Pure, no I/O.
#[derive(Clone, Debug)]
pub struct ClockSlugResolver {
    prefix: String,
    timezone: Tz,
    look_ahead_hours: i64,
    candidate_hours: u32,
}

impl ClockSlugResolver {
    pub fn new(prefix: &str, timezone: Tz, look_ahead_hours: i64, candidate_hours: u32) -> Self {
        Self {
            prefix: prefix.to_string(),
            timezone,
            look_ahead_hours,
            candidate_hours: candidate_hours.clamp(1, MAX_CANDIDATE_HOURS),
        }
    }

    /// Slug for the hour containing `now` shifted by the configured look-ahead
    pub fn identifier(&self, now: DateTime<Utc>) -> String {
        self.identifier_at_offset(now, 0)
    }

    /// Candidate slugs in probe order: look-ahead hour first, then the following one
    pub fn candidates(&self, now: DateTime<Utc>) -> Vec<String> {
        (0..self.candidate_hours as i64)
            .map(|i| self.identifier_at_offset(now, i))
            .collect()
    }

    fn identifier_at_offset(&self, now: DateTime<Utc>, extra_hours: i64) -> String {
        let target = now.with_timezone(&self.timezone) + Duration::hours(self.look_ahead_hours + extra_hours);
        let month = target.format("%B").to_string().to_lowercase();
        let (is_pm, hour) = target.hour12();
        let meridiem = if is_pm { "pm" } else { "am" };

        format!("{}-{}-{}-{}{}-et", self.prefix, month, target.day(), hour, meridiem)
    }

    /// `HHMM` of the settlement time in the resolver's timezone, used as folder prefix
    pub fn settlement_folder_prefix(&self, settlement: DateTime<Utc>) -> String {
        settlement.with_timezone(&self.timezone).format("%H%M").to_string()
    }
}
