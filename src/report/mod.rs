//! SPC tornado report records.

pub mod filters;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::download;

/// The raw SPC columns of interest. The source file carries many more, which
/// the csv reader ignores.
#[derive(Debug, Deserialize)]
struct RawReport {
    yr: i32,
    mo: u32,
    dy: u32,
    date: String,
    time: String,
    tz: i64,
    st: String,
    mag: i64,
    slat: f64,
    slon: f64,
    elat: f64,
    elon: f64,
}

/// One cleaned tornado report.
#[derive(Debug, Clone, Serialize)]
pub struct TornadoReport {
    pub observation_year: i32,
    pub observation_month: u32,
    pub observation_date: u32,
    pub timezone: i64,
    pub observation_state: String,
    pub f_or_ef_scale: i64,
    pub starting_latitude_deg: f64,
    pub starting_longitude_deg: f64,
    pub ending_latitude_deg: f64,
    pub ending_longitude_deg: f64,
    pub observation_datetime: NaiveDateTime,
    pub observation_valid_time: Option<NaiveDateTime>,
}

impl TornadoReport {
    fn from_raw(raw: RawReport) -> Result<Self> {
        let stamp = format!("{} {}", raw.date, raw.time);
        let observation_datetime = NaiveDateTime::parse_from_str(&stamp, "%Y-%m-%d %H:%M:%S")
            .with_context(|| format!("unparseable observation time '{}'", stamp))?;

        Ok(TornadoReport {
            observation_year: raw.yr,
            observation_month: raw.mo,
            observation_date: raw.dy,
            timezone: raw.tz,
            observation_state: raw.st,
            f_or_ef_scale: raw.mag,
            starting_latitude_deg: raw.slat,
            starting_longitude_deg: raw.slon,
            ending_latitude_deg: raw.elat,
            ending_longitude_deg: raw.elon,
            observation_datetime,
            observation_valid_time: None,
        })
    }
}

/// Loads and renames the SPC storm report columns from a URL or local path,
/// combining the date and time columns into one observation timestamp.
pub async fn load_reports(url_or_path: &str) -> Result<Vec<TornadoReport>> {
    let text = download::fetch_text(url_or_path).await?;
    parse_reports(&text)
}

pub fn parse_reports(text: &str) -> Result<Vec<TornadoReport>> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let mut reports = Vec::new();

    for record in reader.deserialize::<RawReport>() {
        reports.push(TornadoReport::from_raw(record?)?);
    }

    Ok(reports)
}

/// Persists cleaned reports as a delimited file.
pub fn save_reports(reports: &[TornadoReport], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for report in reports {
        writer.serialize(report)?;
    }
    writer.flush()?;

    Ok(())
}

// -- Tests -------------------------------------------------------------------
