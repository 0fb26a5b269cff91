//! Conversions between the `YYYY-MM-DD HH:MM` timestamps a run is driven by and
//! the `YYYYMM/YYYYMMDD/YYYYMMDDHH` keys the THREDDS server files datasets under.

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::{America::New_York, Tz};

use crate::error::{Error, Result};

/// Format of every timestamp the user supplies and the ledger records.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Path components of a dataset on the server.
pub struct RequestKey {
    pub year_month: String,
    pub year_month_day: String,
    pub year_month_day_hour: String,
}

impl RequestKey {
    /// Splits a UTC `YYYY-MM-DD HH:MM` string into the server's date keys.
    ///
    /// No calendar validation is done: the components are only checked for
    /// shape and concatenated.
    pub fn resolve(datetime_uct_str: &str) -> Result<Self> {
        let invalid = || Error::InvalidFormat(datetime_uct_str.to_string());

        let [date, time] = split_exact::<2>(datetime_uct_str, ' ').ok_or_else(invalid)?;
        let [year, month, day] = split_exact::<3>(date, '-').ok_or_else(invalid)?;
        let [hour, minute] = split_exact::<2>(time, ':').ok_or_else(invalid)?;

        let widths = [(year, 4), (month, 2), (day, 2), (hour, 2), (minute, 2)];
        if !widths.iter().all(|(part, width)| is_digits(part, *width)) {
            return Err(invalid());
        }

        let year_month = format!("{}{}", year, month);
        let year_month_day = format!("{}{}", year_month, day);
        let year_month_day_hour = format!("{}{}", year_month_day, hour);

        Ok(RequestKey {
            year_month,
            year_month_day,
            year_month_day_hour,
        })
    }

    /// `YYYYMM/YYYYMMDD/YYYYMMDDHH`, the part of the dataset url between the
    /// server base and the product suffix.
    pub fn date_path(&self) -> String {
        format!(
            "{}/{}/{}",
            self.year_month, self.year_month_day, self.year_month_day_hour
        )
    }
}

fn split_exact<const N: usize>(s: &str, sep: char) -> Option<[&str; N]> {
    let parts: Vec<&str> = s.split(sep).collect();
    parts.try_into().ok()
}

fn is_digits(s: &str, width: usize) -> bool {
    s.len() == width && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parses a `YYYY-MM-DD HH:MM` string as a UTC instant.
pub fn parse_utc(datetime_uct_str: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(datetime_uct_str, DATETIME_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| Error::InvalidFormat(datetime_uct_str.to_string()))
}

pub fn format_utc(datetime: DateTime<Utc>) -> String {
    datetime.format(DATETIME_FORMAT).to_string()
}

/// The start timestamp followed by `days` more, one day apart.
pub fn daily_series(start: &str, days: u32) -> Result<Vec<String>> {
    let first = parse_utc(start)?;
    first
        .checked_add_signed(Duration::days(i64::from(days)))
        .ok_or_else(|| Error::InvalidFormat(format!("{} plus {} days", start, days)))?;

    Ok((0..=i64::from(days))
        .map(|day| format_utc(first + Duration::days(day)))
        .collect())
}

/// Issuance time of the most recent forecast for `now`.
///
/// `now` is rounded to the nearest hour (half past rounds up); anything from
/// midnight up to before noon maps to that day's 00:00 run, the rest to the
/// 12:00 run.
pub fn nearest_synoptic(now: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    let seconds = (now - midnight).num_seconds();
    let rounded = midnight + Duration::hours((seconds + 1800) / 3600);

    let day = rounded.date_naive().and_time(NaiveTime::MIN).and_utc();
    if rounded.hour() < 12 {
        day
    } else {
        day + Duration::hours(12)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// A query instant in UTC along with its North Carolina civil time.
pub struct QueryTime {
    pub utc: DateTime<Utc>,
    pub local: DateTime<Tz>,
}

impl QueryTime {
    pub fn new(utc: DateTime<Utc>) -> Self {
        QueryTime {
            utc,
            local: utc.with_timezone(&New_York),
        }
    }

    pub fn parse(datetime_uct_str: &str) -> Result<Self> {
        parse_utc(datetime_uct_str).map(QueryTime::new)
    }

    /// Naive UTC wall time, `2016-01-01 00:00:00`.
    pub fn time(&self) -> String {
        self.utc.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    pub fn time_uct_long(&self) -> String {
        self.utc.format("%Y-%m-%d %H:%M:%S%:z").to_string()
    }

    pub fn time_uct(&self) -> String {
        self.utc.format(DATETIME_FORMAT).to_string()
    }

    pub fn time_nyc_long(&self) -> String {
        self.local.format("%Y-%m-%d %H:%M:%S%:z").to_string()
    }

    pub fn time_nyc(&self) -> String {
        self.local.format(DATETIME_FORMAT).to_string()
    }

    /// The five time columns of an output row, in output order.
    pub fn columns(&self) -> [String; 5] {
        [
            self.time(),
            self.time_uct_long(),
            self.time_uct(),
            self.time_nyc_long(),
            self.time_nyc(),
        ]
    }
}

// -- Tests -------------------------------------------------------------------
