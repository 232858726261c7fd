//! Composable filters over cleaned tornado reports.

use chrono::{Datelike, Duration, NaiveDateTime, Timelike};

use super::TornadoReport;

/// Sentinel magnitude for reports with an unknown E/F scale.
pub const UNKNOWN_SCALE_ID: i64 = -9;

/// SPC timezone code for Central Standard Time.
pub const CST_TIMEZONE_ID: i64 = 3;

/// Drops observations with unknown E/F scale values.
pub fn drop_unknown_scales(reports: Vec<TornadoReport>) -> Vec<TornadoReport> {
    reports
        .into_iter()
        .filter(|r| r.f_or_ef_scale != UNKNOWN_SCALE_ID)
        .collect()
}

/// Keeps only reports that were logged in CST.
pub fn keep_central_time(reports: Vec<TornadoReport>) -> Vec<TornadoReport> {
    reports
        .into_iter()
        .filter(|r| r.timezone == CST_TIMEZONE_ID)
        .collect()
}

/// Keeps only reports observed at or after `earliest_year`.
pub fn keep_from_year(reports: Vec<TornadoReport>, earliest_year: i32) -> Vec<TornadoReport> {
    reports
        .into_iter()
        .filter(|r| r.observation_datetime.year() >= earliest_year)
        .collect()
}

/// Attaches the 12Z-to-12Z valid time to every report.
pub fn assign_valid_times(reports: Vec<TornadoReport>) -> Vec<TornadoReport> {
    reports
        .into_iter()
        .map(|mut r| {
            r.observation_valid_time = Some(valid_time_for(r.observation_datetime));
            r
        })
        .collect()
}

/// The valid time of an observation: the end of the 12Z-to-12Z forecast
/// period it falls into. A tornado at 2016-05-18 05:00Z verifies at
/// 2016-05-18 12:00Z; one at 2016-05-18 15:00Z verifies at 2016-05-19 12:00Z.
pub fn valid_time_for(observed: NaiveDateTime) -> NaiveDateTime {
    let rounded = ceil_to_half_day(observed + Duration::hours(6));
    if rounded.hour() == 0 {
        rounded + Duration::hours(12)
    } else {
        rounded
    }
}

fn ceil_to_half_day(t: NaiveDateTime) -> NaiveDateTime {
    const HALF_DAY_SECS: i64 = 12 * 3600;
    let into_day = i64::from(t.time().num_seconds_from_midnight());
    let remainder = into_day % HALF_DAY_SECS;
    if remainder == 0 {
        t
    } else {
        t + Duration::seconds(HALF_DAY_SECS - remainder)
    }
}

// -- Tests -------------------------------------------------------------------
