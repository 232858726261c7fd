//! Command line interface.

pub mod command;

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use clap::{command, Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

pub const SPC_TORNADO_URL: &str =
    "https://www.spc.noaa.gov/wcm/data/1950-2018_actual_tornadoes.csv";

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Contains the commands
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download and clean SPC tornado reports
    Tornadoes {
        /// Directory to save the cleaned report file in (defaults to the home directory)
        #[arg(long)]
        save_dir: Option<PathBuf>,
        /// Name of the saved tornado reports csv file
        #[arg(long, default_value = "cleaned_tornado_reports.csv")]
        csv_save_name: String,
        /// URL or local path of SPC's tornado reports data
        #[arg(long, default_value = SPC_TORNADO_URL)]
        spc_tor_url: String,
        /// Drop reports observed before this year
        #[arg(long, default_value_t = 1990)]
        earliest_year: i32,
    },
    /// Bulk-download GEFSv12 reanalysis grib files over FTP
    Reanalysis {
        /// First date (YYYY-MM-DD) of the reanalysis range
        #[arg(long, default_value = "2004-01-01")]
        start_date: NaiveDate,
        /// Last date (YYYY-MM-DD) of the reanalysis range
        #[arg(long, default_value = "2009-12-31")]
        end_date: NaiveDate,
        /// FTP host serving the reanalysis archive
        #[arg(long, default_value = "ftp.emc.ncep.noaa.gov")]
        host: String,
        /// Local directory to mirror the archive into
        #[arg(long, default_value = ".")]
        save_dir: PathBuf,
    },
    /// Download and process GEFSv12 reforecast grib objects
    Reforecast(ReforecastArgs),
}

#[derive(Args)]
pub struct ReforecastArgs {
    /// First date (YYYY-MM-DD) for downloading reforecast data
    pub start_date: NaiveDate,
    /// Last date (YYYY-MM-DD) for downloading reforecast data
    pub end_date: NaiveDate,
    /// The S3 bucket that contains the Reforecast V3 data
    pub s3_bucket: String,
    /// The part of the S3 prefix that doesn't change with member, variable, or date
    pub s3_base_prefix: String,
    /// Date stride in days, e.g. 1 for daily, 7 for weekly
    #[arg(long, default_value_t = 1)]
    pub date_frequency: u32,
    /// Ensemble members to download
    #[arg(long = "members", default_values_t = [String::from("c00")])]
    pub members: Vec<String>,
    /// Gridded fields to download
    #[arg(
        long = "var-names",
        default_values_t = [
            String::from("cape_sfc"),
            String::from("cin_sfc"),
            String::from("hlcy_hgt"),
        ]
    )]
    pub var_names: Vec<String>,
    /// Latitude range to keep when processing data, in degrees
    #[arg(
        long,
        num_args = 2,
        value_names = ["MIN", "MAX"],
        default_values_t = [22.0, 55.0],
        allow_negative_numbers = true
    )]
    pub latitude_bounds: Vec<f64>,
    /// Longitude range to keep when processing data, assumes values between 0-360
    #[arg(
        long,
        num_args = 2,
        value_names = ["MIN", "MAX"],
        default_values_t = [230.0, 291.0],
        allow_negative_numbers = true
    )]
    pub longitude_bounds: Vec<f64>,
    /// Forecast-day range, where 5.5 means 5 days 12 hours
    #[arg(
        long,
        num_args = 2,
        value_names = ["MIN", "MAX"],
        default_values_t = [5.5, 6.5],
        allow_negative_numbers = true
    )]
    pub forecast_days_bounds: Vec<f64>,
    /// Location to save processed per-object files
    #[arg(long, default_value = "./reforecast_v3")]
    pub local_save_dir: PathBuf,
    /// Saved name of the combined netCDF file
    #[arg(long, default_value = "./combined_reforecast_data.nc")]
    pub final_save_path: PathBuf,
}

/// Creates a spinner.
pub fn create_spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));

    bar
}

/// Creates a progress bar.
pub fn create_progress_bar(size: u64, message: String) -> ProgressBar {
    ProgressBar::new(size).with_message(message).with_style(
        ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {msg}")
            .unwrap()
            .progress_chars("##-"),
    )
}
