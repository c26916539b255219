//! US equity trading calendar
//!
//! A day is open when it is a weekday, is not marked closed by a stored
//! override and is not an observed market holiday. The holiday set of a year
//! is computed from the year alone; overrides only record exceptions.

use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::entities::tracking::CalendarDay;
use crate::domain::errors::CalendarError;
use crate::domain::repositories::CalendarOverrides;

/// How far back `last_trading_day` looks before giving up.
pub const MAX_LOOKBACK_DAYS: u32 = 10;

/// A year with fewer stored holidays than this is (re)populated by
/// `initialize_year`.
pub const MIN_HOLIDAYS_PER_YEAR: usize = 8;

pub struct TradingCalendar {
    overrides: Arc<dyn CalendarOverrides>,
}

impl TradingCalendar {
    pub fn new(overrides: Arc<dyn CalendarOverrides>) -> Self {
        TradingCalendar { overrides }
    }

    /// Whether the market is open on `date`.
    ///
    /// Weekends are closed regardless of overrides.
    pub async fn is_open(&self, date: NaiveDate) -> Result<bool, CalendarError> {
        if is_weekend(date) {
            return Ok(false);
        }

        if let Some(day) = self.overrides.get(date).await? {
            return Ok(day.is_market_open);
        }

        Ok(!is_observed_holiday(date))
    }

    /// Most recent trading day strictly before today.
    pub async fn last_trading_day(&self) -> Result<NaiveDate, CalendarError> {
        self.previous_trading_day(Utc::now().date_naive()).await
    }

    /// Most recent trading day strictly before `date`, looking back at most
    /// ten days.
    pub async fn previous_trading_day(&self, date: NaiveDate) -> Result<NaiveDate, CalendarError> {
        for back in 1..=MAX_LOOKBACK_DAYS {
            let candidate = date - Duration::days(back as i64);
            if self.is_open(candidate).await? {
                return Ok(candidate);
            }
        }

        warn!(date = %date, lookback_days = MAX_LOOKBACK_DAYS, "No trading day found");
        Err(CalendarError::NoTradingDay(MAX_LOOKBACK_DAYS, date))
    }

    /// Whether the market was open yesterday, together with that date.
    pub async fn was_open_yesterday(&self) -> Result<(bool, NaiveDate), CalendarError> {
        let yesterday = Utc::now().date_naive() - Duration::days(1);
        Ok((self.is_open(yesterday).await?, yesterday))
    }

    /// Number of trading days in `[start, end]`; 0 when `start > end`.
    pub async fn trading_days_between(&self, start: NaiveDate, end: NaiveDate) -> Result<u32, CalendarError> {
        let mut count = 0;
        let mut current = start;
        while current <= end {
            if self.is_open(current).await? {
                count += 1;
            }
            current += Duration::days(1);
        }
        Ok(count)
    }

    /// Records `date` as a closed holiday.
    pub async fn add_holiday(&self, date: NaiveDate, name: &str) -> Result<(), CalendarError> {
        self.overrides.upsert(&CalendarDay::holiday(date, name)).await?;
        info!(date = %date, holiday = name, "Added holiday to market calendar");
        Ok(())
    }

    /// Stores the observed holidays of `year` as overrides.
    ///
    /// A failed insert is logged and skipped.
    pub async fn populate_holidays(&self, year: i32) -> Result<usize, CalendarError> {
        let mut added = 0;
        for (date, name) in us_market_holidays(year) {
            match self.add_holiday(date, name).await {
                Ok(()) => added += 1,
                Err(e) => warn!(date = %date, holiday = name, error = %e, "Failed to add holiday"),
            }
        }

        info!(year, holidays = added, "Populated US market holidays");
        Ok(added)
    }

    /// Populates `year` unless it already holds enough stored holidays.
    pub async fn initialize_year(&self, year: i32) -> Result<(), CalendarError> {
        let (start, end) = match (
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year, 12, 31),
        ) {
            (Some(start), Some(end)) => (start, end),
            _ => return Ok(()),
        };

        let existing = self.overrides.range(start, end).await?;
        if existing.len() < MIN_HOLIDAYS_PER_YEAR {
            self.populate_holidays(year).await?;
        } else {
            debug!(year, stored = existing.len(), "Market calendar already initialized");
        }
        Ok(())
    }

    /// Stored overrides in `[start, end]`.
    pub async fn calendar_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<CalendarDay>, CalendarError> {
        self.overrides.range(start, end).await
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Whether `date` is an observed holiday. The following year is consulted
/// too, since a Saturday New Year's Day is observed on December 31.
pub fn is_observed_holiday(date: NaiveDate) -> bool {
    us_market_holidays(date.year()).contains_key(&date)
        || us_market_holidays(date.year() + 1).contains_key(&date)
}

/// Observed US market holidays of `year`, keyed by the observed date.
pub fn us_market_holidays(year: i32) -> BTreeMap<NaiveDate, &'static str> {
    let mut holidays: Vec<(Option<NaiveDate>, &'static str)> = vec![
        (NaiveDate::from_ymd_opt(year, 1, 1), "New Year's Day"),
        (NaiveDate::from_ymd_opt(year, 7, 4), "Independence Day"),
        (NaiveDate::from_ymd_opt(year, 12, 25), "Christmas Day"),
        (nth_weekday_of_month(year, 1, Weekday::Mon, 3), "Martin Luther King Jr. Day"),
        (nth_weekday_of_month(year, 2, Weekday::Mon, 3), "Presidents' Day"),
        (last_weekday_of_month(year, 5, Weekday::Mon), "Memorial Day"),
        (nth_weekday_of_month(year, 9, Weekday::Mon, 1), "Labor Day"),
        (nth_weekday_of_month(year, 11, Weekday::Thu, 4), "Thanksgiving Day"),
        (easter_sunday(year).map(|easter| easter - Duration::days(2)), "Good Friday"),
    ];

    if year >= 2021 {
        holidays.push((NaiveDate::from_ymd_opt(year, 6, 19), "Juneteenth"));
    }

    holidays
        .into_iter()
        .filter_map(|(date, name)| date.map(|d| (observed(d), name)))
        .collect()
}

/// Saturday holidays are observed on Friday, Sunday holidays on Monday.
fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

fn nth_weekday_of_month(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last_day = first_of_next.pred_opt()?;

    let days_back = (7 + last_day.weekday().num_days_from_monday() - weekday.num_days_from_monday()) % 7;
    Some(last_day - Duration::days(days_back as i64))
}

/// Western Easter Sunday (anonymous Gregorian algorithm).
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;

    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}
