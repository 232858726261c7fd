//! Resumable bulk transfer of reanalysis grib files over FTP.

use std::{
    fs::{self, File, OpenOptions},
    io,
    net::ToSocketAddrs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{anyhow, Result};
use chrono::{Datelike, Local, NaiveDate};
use suppaftp::{FtpError, FtpStream};

pub const SYNOPTIC_HOURS: [u32; 4] = [0, 6, 12, 18];

pub const REANALYSIS_PREFIX: &str = "GEFSv12/reanalysis/FV3_reanalysis";

/// Outcome of one sweep over the date range.
#[derive(Debug, PartialEq, Eq)]
pub enum SweepOutcome {
    Complete,
    /// The session dropped while this file was in flight.
    Interrupted(String),
}

/// Console reporting that also appends timestamped lines to a log file.
pub struct DownloadLog {
    path: PathBuf,
}

impl DownloadLog {
    pub fn create(dir: &Path) -> Self {
        let stamp = Local::now().format("%Y-%m-%d-%H-%M-%S");
        DownloadLog {
            path: dir.join(format!("download-GEFSv12-{}.log", stamp)),
        }
    }

    pub fn record(&self, message: &str) -> Result<()> {
        use std::io::Write;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(
            file,
            "{} {}",
            Local::now().format("[%Y-%m-%d %H:%M:%S]"),
            message
        )?;
        println!("{}", message);

        Ok(())
    }
}

/// Remote directory for one reanalysis date.
pub fn remote_dir(date: NaiveDate) -> String {
    format!(
        "{}/{}/{:02}/{:02}",
        REANALYSIS_PREFIX,
        date.year(),
        date.month(),
        date.day()
    )
}

/// Fixed file name for one date and synoptic hour.
pub fn file_name(date: NaiveDate, hour: u32) -> String {
    format!(
        "gec00.t{:02}z.pgrb2.{}{:02}{:02}.0p25.f000",
        hour,
        date.year(),
        date.month(),
        date.day()
    )
}

/// Relative paths of every file in the inclusive range, date-major then by
/// synoptic hour.
pub fn sweep_files(start_date: NaiveDate, end_date: NaiveDate) -> Vec<String> {
    let mut files = Vec::new();
    let mut date = start_date;
    while date <= end_date {
        for hour in SYNOPTIC_HOURS {
            files.push(format!("{}/{}", remote_dir(date), file_name(date, hour)));
        }
        date += chrono::Duration::days(1);
    }

    files
}

/// Opens an anonymous session with an explicit timeout on both the connect
/// and every subsequent read.
pub fn connect(host: &str, timeout: Duration) -> Result<FtpStream> {
    let addr = (host, 21)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow!("could not resolve {}", host))?;
    let mut ftp = FtpStream::connect_timeout(addr, timeout)?;
    ftp.get_ref().set_read_timeout(Some(timeout))?;
    ftp.login("anonymous", "anonymous")?;

    Ok(ftp)
}

/// One sweep over the range. Existing local files are skipped, except the
/// `resume` file a previous session dropped on, which may be truncated and is
/// deleted and fetched again. Returns the interrupted file on a transport
/// failure so the caller can reconnect and resume there.
pub fn download_range(
    ftp: &mut FtpStream,
    start_date: NaiveDate,
    end_date: NaiveDate,
    local_root: &Path,
    resume: Option<&str>,
    log: &DownloadLog,
) -> Result<SweepOutcome> {
    for relative in sweep_files(start_date, end_date) {
        let local = local_root.join(&relative);
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }

        if local.exists() {
            if resume == Some(relative.as_str()) {
                fs::remove_file(&local)?;
            } else {
                continue;
            }
        }

        let started = Instant::now();
        match fetch_one(ftp, &relative, &local) {
            Ok(bytes) => {
                let elapsed = started.elapsed().as_secs_f64();
                let speed = bytes as f64 / 1e6 / elapsed.max(f64::EPSILON);
                log.record(&format!("{} downloaded at {:.3} MB/s", relative, speed))?;
            }
            Err(e) if is_disconnect(&e) => {
                log.record(&format!("FTP server disconnected: {}", relative))?;
                return Ok(SweepOutcome::Interrupted(relative));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(SweepOutcome::Complete)
}

fn fetch_one(ftp: &mut FtpStream, remote: &str, local: &Path) -> Result<u64> {
    let mut reader = ftp.retr_as_stream(remote)?;
    let mut file = File::create(local)?;
    let bytes = io::copy(&mut reader, &mut file)?;
    ftp.finalize_retr_stream(reader)?;

    Ok(bytes)
}

/// True for transport-level failures worth a reconnect; protocol and
/// filesystem errors stay fatal.
pub fn is_disconnect(error: &anyhow::Error) -> bool {
    if let Some(ftp_error) = error.downcast_ref::<FtpError>() {
        return matches!(ftp_error, FtpError::ConnectionError(_));
    }
    if let Some(io_error) = error.downcast_ref::<io::Error>() {
        return matches!(
            io_error.kind(),
            io::ErrorKind::UnexpectedEof
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::TimedOut
        );
    }

    false
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn should_format_remote_paths() {
        let d = date(2004, 1, 5);
        assert_eq!(
            remote_dir(d),
            "GEFSv12/reanalysis/FV3_reanalysis/2004/01/05"
        );
        assert_eq!(file_name(d, 6), "gec00.t06z.pgrb2.20040105.0p25.f000");
    }

    #[test]
    fn should_sweep_dates_and_hours_in_order() {
        let files = sweep_files(date(2004, 1, 1), date(2004, 1, 2));

        assert_eq!(files.len(), 8);
        assert_eq!(
            files[0],
            "GEFSv12/reanalysis/FV3_reanalysis/2004/01/01/gec00.t00z.pgrb2.20040101.0p25.f000"
        );
        assert_eq!(
            files[3],
            "GEFSv12/reanalysis/FV3_reanalysis/2004/01/01/gec00.t18z.pgrb2.20040101.0p25.f000"
        );
        assert!(files[4].contains("2004/01/02"));
    }

    #[test]
    fn should_classify_transport_errors_as_disconnects() {
        let eof = anyhow::Error::from(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        let reset = anyhow::Error::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        let missing = anyhow::Error::from(io::Error::new(io::ErrorKind::NotFound, "missing"));
        let other = anyhow::anyhow!("550 No such file");

        assert!(is_disconnect(&eof));
        assert!(is_disconnect(&reset));
        assert!(!is_disconnect(&missing));
        assert!(!is_disconnect(&other));
    }

    #[test]
    fn should_append_timestamped_lines() {
        let dir = TempDir::new().unwrap();
        let log = DownloadLog::create(dir.path());

        log.record("Downloading ...").unwrap();
        log.record("Reconnecting ...").unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let content =
            std::fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("Downloading ..."));
    }
}
