//! Business-hours arithmetic for SLA deadlines.

use std::collections::HashSet;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
    Weekday,
};

use crate::domain::models::BusinessHoursConfig;

/// Upper bound on days scanned for the next business period.
const MAX_SCAN_DAYS: u32 = 3_660;

#[derive(Debug, Clone)]
pub struct BusinessCalendar {
    enabled: bool,
    open_hour: u32,
    close_hour: u32,
    offset: FixedOffset,
    workdays: HashSet<Weekday>,
}

pub fn parse_weekday(name: &str) -> Option<Weekday> {
    match name.to_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

impl BusinessCalendar {
    pub fn from_config(config: &BusinessHoursConfig) -> Self {
        let workdays: HashSet<Weekday> =
            config.workdays.iter().filter_map(|d| parse_weekday(d)).collect();
        let usable = !workdays.is_empty() && config.open_hour < config.close_hour.min(24);
        Self {
            enabled: config.enabled && usable,
            open_hour: config.open_hour,
            close_hour: config.close_hour.min(24),
            offset: FixedOffset::east_opt(config.utc_offset_minutes * 60)
                .unwrap_or_else(|| Utc.fix()),
            workdays,
        }
    }

    pub fn always_open() -> Self {
        Self::from_config(&BusinessHoursConfig::always_open())
    }

    pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
        if !self.enabled {
            return true;
        }
        let local = self.to_local(at);
        self.workdays.contains(&local.weekday())
            && local >= self.opening(local)
            && local < self.closing(local)
    }

    /// Wall-clock instant at which `business` worth of open time has
    /// elapsed after `start`.
    pub fn deadline_after(&self, start: DateTime<Utc>, business: Duration) -> DateTime<Utc> {
        if !self.enabled || business <= Duration::zero() {
            return start + business.max(Duration::zero());
        }

        let mut cursor = self.to_local(start);
        let mut remaining = business;

        for _ in 0..MAX_SCAN_DAYS {
            if self.workdays.contains(&cursor.weekday()) {
                let open = self.opening(cursor);
                let close = self.closing(cursor);
                if cursor < open {
                    cursor = open;
                }
                if cursor < close {
                    let available = close - cursor;
                    if remaining <= available {
                        return self.to_utc(cursor + remaining);
                    }
                    remaining -= available;
                }
            }
            cursor = self.next_midnight(cursor);
        }

        start + business
    }

    fn to_local(&self, at: DateTime<Utc>) -> NaiveDateTime {
        at.with_timezone(&self.offset).naive_local()
    }

    fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let utc = local - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&utc)
    }

    fn opening(&self, day: NaiveDateTime) -> NaiveDateTime {
        day.date().and_time(NaiveTime::MIN) + Duration::hours(i64::from(self.open_hour))
    }

    fn closing(&self, day: NaiveDateTime) -> NaiveDateTime {
        day.date().and_time(NaiveTime::MIN) + Duration::hours(i64::from(self.close_hour))
    }

    fn next_midnight(&self, day: NaiveDateTime) -> NaiveDateTime {
        day.date().and_time(NaiveTime::MIN) + Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn office() -> BusinessCalendar {
        BusinessCalendar::from_config(&BusinessHoursConfig::default())
    }

    #[test]
    fn test_within_same_day() {
        let start = at(2026, 10, 12, 10, 0);
        assert_eq!(start.weekday(), Weekday::Mon);
        assert_eq!(
            office().deadline_after(start, Duration::minutes(120)),
            at(2026, 10, 12, 12, 0)
        );
    }

    #[test]
    fn test_one_business_day_spans_overnight() {
        let start = at(2026, 10, 12, 13, 0);
        assert_eq!(
            office().deadline_after(start, Duration::minutes(480)),
            at(2026, 10, 13, 13, 0)
        );
    }

    #[test]
    fn test_weekend_does_not_count() {
        let friday = at(2026, 10, 16, 16, 0);
        assert_eq!(friday.weekday(), Weekday::Fri);
        assert_eq!(
            office().deadline_after(friday, Duration::minutes(120)),
            at(2026, 10, 19, 10, 0)
        );
    }

    #[test]
    fn test_start_before_opening() {
        let early = at(2026, 10, 12, 6, 30);
        assert_eq!(
            office().deadline_after(early, Duration::minutes(30)),
            at(2026, 10, 12, 9, 30)
        );
    }

    #[test]
    fn test_utc_offset_applies() {
        let calendar = BusinessCalendar::from_config(&BusinessHoursConfig {
            utc_offset_minutes: -300,
            ..BusinessHoursConfig::default()
        });
        // 13:00 UTC is 08:00 local; opening is 09:00 local = 14:00 UTC
        let start = at(2026, 10, 12, 13, 0);
        assert!(!calendar.is_open_at(start));
        assert_eq!(
            calendar.deadline_after(start, Duration::minutes(60)),
            at(2026, 10, 12, 15, 0)
        );
    }

    #[test]
    fn test_always_open_is_wall_clock() {
        let start = at(2026, 10, 17, 23, 0);
        assert_eq!(
            BusinessCalendar::always_open().deadline_after(start, Duration::minutes(480)),
            at(2026, 10, 18, 7, 0)
        );
    }

    #[test]
    fn test_empty_workdays_disables_calendar() {
        let calendar = BusinessCalendar::from_config(&BusinessHoursConfig {
            workdays: vec![],
            ..BusinessHoursConfig::default()
        });
        assert!(calendar.is_open_at(at(2026, 10, 18, 3, 0)));
    }
}
