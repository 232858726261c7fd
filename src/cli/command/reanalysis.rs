//! Sequential bulk download of reanalysis grib files with a reconnect loop.

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use chrono::NaiveDate;

use crate::ftp::{self, DownloadLog, SweepOutcome};

const SESSION_TIMEOUT: Duration = Duration::from_secs(1200);

pub async fn reanalysis(
    start_date: NaiveDate,
    end_date: NaiveDate,
    host: String,
    save_dir: PathBuf,
) -> Result<String> {
    std::fs::create_dir_all(&save_dir)?;
    let log = DownloadLog::create(&save_dir);
    log.record("Downloading ...")?;

    // the resume point is threaded through explicitly: each pass reports the
    // file it died on, and the next session starts by re-fetching it
    let mut resume: Option<String> = None;
    loop {
        let mut session = ftp::connect(&host, SESSION_TIMEOUT)?;
        let outcome = ftp::download_range(
            &mut session,
            start_date,
            end_date,
            &save_dir,
            resume.as_deref(),
            &log,
        )?;

        match outcome {
            SweepOutcome::Complete => {
                session.quit().ok();
                break;
            }
            SweepOutcome::Interrupted(file) => {
                resume = Some(file);
                log.record("Reconnecting ...")?;
            }
        }
    }

    Ok(save_dir.to_string_lossy().to_string())
}
