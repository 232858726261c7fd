//! Remote object keys for the reforecast archive.

use std::path::Path;

use chrono::{Datelike, Duration, NaiveDate};

use crate::grid::transform::Reduction;

/// Forecast-horizon bucket encoded in the object key template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HorizonBucket {
    Days1To10,
    Days10To16,
}

impl HorizonBucket {
    /// Picks the bucket from the upper forecast-day bound.
    pub fn from_forecast_days(forecast_days_bounds: (f64, f64)) -> Self {
        let (day_a, day_b) = forecast_days_bounds;
        if day_a.max(day_b) < 10.0 {
            HorizonBucket::Days1To10
        } else {
            HorizonBucket::Days10To16
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            HorizonBucket::Days1To10 => "Days:1-10",
            HorizonBucket::Days10To16 => "Days:10-16",
        }
    }
}

/// A deterministically constructed key naming one remote gridded-data object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectKey {
    key: String,
}

impl ObjectKey {
    pub fn new(
        base_prefix: &str,
        date: NaiveDate,
        member: &str,
        bucket: HorizonBucket,
        var_name: &str,
    ) -> Self {
        let stamp = format!("{}{:02}{:02}00", date.year(), date.month(), date.day());
        let key = format!(
            "{}/{}/{}/{}/{}/{}_{}_{}.grib2",
            base_prefix,
            date.year(),
            stamp,
            member,
            bucket.prefix(),
            var_name,
            stamp,
            member
        );

        ObjectKey { key }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The file-name component of the key.
    pub fn base_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Local output file name: the base name with its extension replaced.
    pub fn output_file_name(&self) -> String {
        let base = self.base_name();
        let stem = base.split('.').next().unwrap_or(base);
        format!("{}.nc", stem)
    }

    /// Anonymous-read HTTPS endpoint for this object.
    pub fn url(&self, bucket: &str) -> String {
        format!("https://{}.s3.amazonaws.com/{}", bucket, self.key)
    }

    /// Accumulated fields are summed over the step axis, the rest averaged.
    pub fn reduction(&self) -> Reduction {
        if self.base_name().contains("pcp") {
            Reduction::Sum
        } else {
            Reduction::Mean
        }
    }
}

/// Enumerates the full ordered work list: dates outermost (at `stride_days`),
/// then variables, then members.
pub fn enumerate_keys(
    start_date: NaiveDate,
    end_date: NaiveDate,
    stride_days: u32,
    var_names: &[String],
    members: &[String],
    bucket: HorizonBucket,
    base_prefix: &str,
) -> Vec<ObjectKey> {
    let mut keys = Vec::new();
    let stride = Duration::days(i64::from(stride_days.max(1)));

    let mut date = start_date;
    while date <= end_date {
        for var_name in var_names {
            for member in members {
                keys.push(ObjectKey::new(base_prefix, date, member, bucket, var_name));
            }
        }
        date += stride;
    }

    keys
}

/// Path of the local output file corresponding to `key`.
pub fn output_path(key: &ObjectKey, save_dir: &Path) -> std::path::PathBuf {
    save_dir.join(key.output_file_name())
}

// -- Tests -------------------------------------------------------------------
