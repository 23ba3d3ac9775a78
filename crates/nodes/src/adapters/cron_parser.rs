//! Real `CronParser` implementation backed by the `cron` crate.

use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use cron::Schedule;

use super::{AdapterError, CronParser};

/// Standard 5-field cron (`cron` crate parses 6-field "sec min hour dom mon
/// dow" expressions, so a bare 5-field string is prefixed with `0 ` for
/// seconds).
pub struct SystemCronParser;

impl CronParser for SystemCronParser {
    fn next(
        &self,
        expression: &str,
        from: DateTime<Utc>,
        timezone: Option<&str>,
    ) -> Result<DateTime<Utc>, AdapterError> {
        let six_field = if expression.split_whitespace().count() == 5 {
            format!("0 {expression}")
        } else {
            expression.to_string()
        };

        let schedule = Schedule::from_str(&six_field)
            .map_err(|e| AdapterError::Failed(format!("invalid cron expression '{expression}': {e}")))?;

        match timezone {
            Some(tz_name) => {
                let tz: chrono_tz::Tz = tz_name
                    .parse()
                    .map_err(|_| AdapterError::Failed(format!("unknown timezone '{tz_name}'")))?;
                let from_tz = from.with_timezone(&tz);
                schedule
                    .after(&from_tz)
                    .next()
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok_or_else(|| AdapterError::Failed("cron schedule has no future occurrence".into()))
            }
            None => schedule
                .after(&from)
                .next()
                .ok_or_else(|| AdapterError::Failed("cron schedule has no future occurrence".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn daily_cron_advances_by_one_day() {
        let parser = SystemCronParser;
        let from = Utc.with_ymd_and_hms(2026, 1, 1, 7, 0, 0).unwrap();
        let next = parser.next("0 7 * * *", from, None).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 2, 7, 0, 0).unwrap());
    }

    #[test]
    fn invalid_expression_errors() {
        let parser = SystemCronParser;
        assert!(parser.next("not a cron", Utc::now(), None).is_err());
    }
}
