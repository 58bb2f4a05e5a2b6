use anyhow::Context;
use chrono::{Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Timelike, Utc, Weekday};
use serde::{Deserialize, de::DeserializeOwned};

/// Hourly court rate in RM before the evening boundary.
pub const DAY_RATE: u32 = 10;
/// Hourly court rate in RM from the evening boundary onwards.
pub const NIGHT_RATE: u32 = 15;
const NIGHT_START_HOUR: u32 = 19;

/// The portal releases slots this far ahead of "now".
pub const RELEASE_WINDOW_WEEKS: i64 = 8;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: String,
    pub password: String,
}

/// One of the portal's fixed slot boundaries, e.g. 19:00:00-21:00:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn parse(start: &str, end: &str) -> anyhow::Result<Self> {
        let start = NaiveTime::parse_from_str(start, "%H:%M:%S")
            .with_context(|| format!("bad start time: {start}"))?;
        let end = NaiveTime::parse_from_str(end, "%H:%M:%S")
            .with_context(|| format!("bad end time: {end}"))?;
        Ok(TimeWindow { start, end })
    }

    pub fn start_field(&self) -> String {
        self.start.format("%H:%M:%S").to_string()
    }

    pub fn end_field(&self) -> String {
        self.end.format("%H:%M:%S").to_string()
    }

    pub fn hours(&self) -> u32 {
        let hours = (self.end - self.start).num_hours();
        if hours <= 0 { 1 } else { hours as u32 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BookingPrice {
    pub hours: u32,
    pub rate: u32,
    pub total: u32,
}

/// Hours x hourly rate, with the rate picked by the slot's start hour.
pub fn booking_price(window: &TimeWindow) -> BookingPrice {
    let hours = window.hours();
    let rate = if window.start.hour() < NIGHT_START_HOUR {
        DAY_RATE
    } else {
        NIGHT_RATE
    };
    BookingPrice {
        hours,
        rate,
        total: hours * rate,
    }
}

/// One facility/slot-type identifier set as the booking handler expects it.
#[derive(Debug, Clone)]
pub struct ResourceIds {
    pub facility_encoded: String,
    pub facility_num: u32,
    pub tjk_id: u32,
    pub label: String,
}

/// A facility row discovered on the venue listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Facility {
    pub venue_encoded: String,
    pub facility_encoded: String,
    pub region: String,
}

/// Immutable, caller-supplied description of one slot to acquire.
#[derive(Debug, Clone)]
pub struct BookingTarget {
    pub date: NaiveDate,
    pub window: TimeWindow,
    pub venue_encoded: String,
    pub venue_num: u32,
    pub region: String,
    pub facility_index: usize,
    pub primary: ResourceIds,
    pub alternate: Option<ResourceIds>,
    pub num_users: String,
    pub purpose: String,
}

impl BookingTarget {
    pub fn date_field(&self) -> String {
        self.date.format("%d/%m/%Y").to_string()
    }

    pub fn day_name(&self) -> String {
        self.date.format("%A").to_string()
    }
}

/// Everything a target needs except the date and window, so one CLI parse can
/// stamp out per-day targets in weekly mode.
#[derive(Debug, Clone)]
pub struct TargetSpec {
    pub venue_encoded: String,
    pub venue_num: u32,
    pub region: String,
    pub facility_index: usize,
    pub primary: ResourceIds,
    pub alternate: Option<ResourceIds>,
    pub num_users: String,
    pub purpose: String,
}

impl TargetSpec {
    pub fn target_for(&self, date: NaiveDate, window: TimeWindow) -> BookingTarget {
        BookingTarget {
            date,
            window,
            venue_encoded: self.venue_encoded.clone(),
            venue_num: self.venue_num,
            region: self.region.clone(),
            facility_index: self.facility_index,
            primary: self.primary.clone(),
            alternate: self.alternate.clone(),
            num_users: self.num_users.clone(),
            purpose: self.purpose.clone(),
        }
    }
}

/// The portal operates on Malaysian time regardless of where the run executes.
pub fn myt_today() -> NaiveDate {
    let offset = FixedOffset::east_opt(8 * 3600).expect("static utc offset");
    Utc::now().with_timezone(&offset).date_naive()
}

/// Standard slot for a weekday: Mon-Thu 19:00-21:00, Fri 20:00-22:00.
/// Weekends have no default and return None.
pub fn default_window(day: Weekday) -> Option<TimeWindow> {
    let (start, end) = match day {
        Weekday::Mon | Weekday::Tue | Weekday::Wed | Weekday::Thu => ((19, 0), (21, 0)),
        Weekday::Fri => ((20, 0), (22, 0)),
        Weekday::Sat | Weekday::Sun => return None,
    };
    Some(TimeWindow {
        start: NaiveTime::from_hms_opt(start.0, start.1, 0)?,
        end: NaiveTime::from_hms_opt(end.0, end.1, 0)?,
    })
}

/// Monday of the week at the far edge of the release window.
pub fn release_monday(today: NaiveDate) -> NaiveDate {
    let future = today + Duration::weeks(RELEASE_WINDOW_WEEKS);
    future - Duration::days(future.weekday().num_days_from_monday() as i64)
}

/// Targets for all five weekdays of the release week, in order.
pub fn weekly_targets(spec: &TargetSpec, today: NaiveDate) -> Vec<BookingTarget> {
    let monday = release_monday(today);
    (0..5)
        .map(|offset| {
            let date = monday + Duration::days(offset);
            let window = default_window(date.weekday()).expect("release week offset is a weekday");
            spec.target_for(date, window)
        })
        .collect()
}

/// Target for one weekday (0 = Monday .. 4 = Friday) of the release week.
pub fn single_day_target(
    spec: &TargetSpec,
    today: NaiveDate,
    day_offset: u8,
) -> anyhow::Result<BookingTarget> {
    if day_offset > 4 {
        anyhow::bail!("day offset must be 0-4, got {day_offset}");
    }
    let date = release_monday(today) + Duration::days(day_offset as i64);
    let window = default_window(date.weekday()).expect("release week offset is a weekday");
    Ok(spec.target_for(date, window))
}

/// Target for exactly RELEASE_WINDOW_WEEKS from today. None when that date
/// lands on a weekend.
pub fn auto_target(spec: &TargetSpec, today: NaiveDate) -> Option<BookingTarget> {
    let date = today + Duration::weeks(RELEASE_WINDOW_WEEKS);
    let window = default_window(date.weekday())?;
    Some(spec.target_for(date, window))
}

/// Extension trait: deserialize a config struct straight out of env vars.
pub trait LoadFromEnv: DeserializeOwned {
    fn load_from_env() -> anyhow::Result<Self> {
        // Don't throw an error if .env file doesn't exist.
        let _ = dotenv::dotenv();
        let config =
            envy::from_env::<Self>().context("failed to load env variables into config struct")?;
        Ok(config)
    }
}

impl<T: DeserializeOwned> LoadFromEnv for T {}

/// Credential fallbacks for when the CLI flags are omitted.
#[derive(Debug, Default, Deserialize)]
pub struct CredentialsEnv {
    pub kbs_username: Option<String>,
    pub kbs_password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_spec;

    #[test]
    fn weekday_windows_match_portal_boundaries() {
        let monday = default_window(Weekday::Mon).unwrap();
        assert_eq!(monday.start_field(), "19:00:00");
        assert_eq!(monday.end_field(), "21:00:00");

        let friday = default_window(Weekday::Fri).unwrap();
        assert_eq!(friday.start_field(), "20:00:00");
        assert_eq!(friday.end_field(), "22:00:00");

        assert!(default_window(Weekday::Sat).is_none());
        assert!(default_window(Weekday::Sun).is_none());
    }

    #[test]
    fn release_monday_is_eight_weeks_out() {
        // 2026-08-25 is a Tuesday; eight weeks later is Tue 2026-10-20.
        let today = NaiveDate::from_ymd_opt(2026, 8, 25).unwrap();
        let monday = release_monday(today);
        assert_eq!(monday, NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert_eq!(monday.weekday(), Weekday::Mon);
    }

    #[test]
    fn weekly_targets_cover_monday_to_friday() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 25).unwrap();
        let targets = weekly_targets(&test_spec(true), today);
        assert_eq!(targets.len(), 5);
        let days: Vec<Weekday> = targets.iter().map(|t| t.date.weekday()).collect();
        assert_eq!(
            days,
            vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri
            ]
        );
        // Friday carries its special window.
        assert_eq!(targets[4].window.start_field(), "20:00:00");
    }

    #[test]
    fn single_day_target_rejects_bad_offsets() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 25).unwrap();
        assert!(single_day_target(&test_spec(true), today, 5).is_err());
        let friday = single_day_target(&test_spec(true), today, 4).unwrap();
        assert_eq!(friday.date.weekday(), Weekday::Fri);
    }

    #[test]
    fn auto_target_is_none_on_weekends() {
        // Eight weeks from Sat 2026-08-29 is Sat 2026-10-24.
        let saturday = NaiveDate::from_ymd_opt(2026, 8, 29).unwrap();
        assert!(auto_target(&test_spec(true), saturday).is_none());

        let tuesday = NaiveDate::from_ymd_opt(2026, 8, 25).unwrap();
        let target = auto_target(&test_spec(true), tuesday).unwrap();
        assert_eq!(target.date, NaiveDate::from_ymd_opt(2026, 10, 20).unwrap());
    }

    #[test]
    fn daytime_slots_use_the_day_rate() {
        let window = TimeWindow::parse("10:00:00", "12:00:00").unwrap();
        let price = booking_price(&window);
        assert_eq!((price.hours, price.rate, price.total), (2, 10, 20));
    }

    #[test]
    fn evening_rate_starts_at_seven_pm() {
        let boundary = TimeWindow::parse("18:00:00", "19:00:00").unwrap();
        assert_eq!(booking_price(&boundary).rate, 10);

        let evening = TimeWindow::parse("19:00:00", "21:00:00").unwrap();
        let price = booking_price(&evening);
        assert_eq!((price.hours, price.rate, price.total), (2, 15, 30));
    }

    #[test]
    fn degenerate_window_still_bills_one_hour() {
        let window = TimeWindow::parse("21:00:00", "21:00:00").unwrap();
        assert_eq!(booking_price(&window).hours, 1);
    }

    #[test]
    fn date_field_uses_portal_format() {
        let spec = test_spec(false);
        let target = spec.target_for(
            NaiveDate::from_ymd_opt(2026, 1, 7).unwrap(),
            TimeWindow::parse("19:00:00", "21:00:00").unwrap(),
        );
        assert_eq!(target.date_field(), "07/01/2026");
    }
}
