//! Reforecast download-and-process pipeline.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::Result;
use futures::{stream, StreamExt};
use tempfile::TempDir;

use crate::{
    cli::{create_progress_bar, ReforecastArgs},
    download,
    grid::{decode, netcdf_out},
    keys::{self, HorizonBucket, ObjectKey},
    selection::{self, SelectionWindow},
};

pub async fn reforecast(args: ReforecastArgs) -> Result<String> {
    let latitude_bounds = (args.latitude_bounds[0], args.latitude_bounds[1]);
    let longitude_bounds = (args.longitude_bounds[0], args.longitude_bounds[1]);
    let forecast_days_bounds = (args.forecast_days_bounds[0], args.forecast_days_bounds[1]);

    // fail before any network access on out-of-range bounds
    selection::validate_bounds(latitude_bounds, longitude_bounds, forecast_days_bounds)?;

    let window = SelectionWindow::new(latitude_bounds, longitude_bounds, forecast_days_bounds);
    let bucket = HorizonBucket::from_forecast_days(forecast_days_bounds);
    let work_list = keys::enumerate_keys(
        args.start_date,
        args.end_date,
        args.date_frequency,
        &args.var_names,
        &args.members,
        bucket,
        &args.s3_base_prefix,
    );

    std::fs::create_dir_all(&args.local_save_dir)?;

    let workers = thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
    let total = work_list.len() as u64;
    let pb = create_progress_bar(total, "Processing reforecast objects...".to_string());

    let results: Vec<Option<PathBuf>> = stream::iter(work_list)
        .map(|key| {
            let bucket_name = args.s3_bucket.clone();
            let window = &window;
            let save_dir = &args.local_save_dir;
            let pb = &pb;
            async move {
                let saved = fetch_and_process(&key, window, save_dir, |key, dest| async move {
                    download::download_file(&key.url(&bucket_name), &dest).await
                })
                .await;
                pb.inc(1);
                saved
            }
        })
        .buffer_unordered(workers)
        .collect()
        .await;

    pb.finish_with_message("Reforecast objects processed");

    let succeeded = results.iter().flatten().count();
    println!("Processed {} of {} objects", succeeded, results.len());

    let final_path = netcdf_out::merge_outputs(&args.local_save_dir, &args.final_save_path)?;

    Ok(final_path.to_string_lossy().to_string())
}

/// Fetches, transforms, and saves one object. An existing output short-circuits
/// the whole pipeline without invoking `fetch`; any failure after that is
/// reported and swallowed so one bad object never aborts the batch.
pub async fn fetch_and_process<F, Fut>(
    key: &ObjectKey,
    window: &SelectionWindow,
    save_dir: &Path,
    fetch: F,
) -> Option<PathBuf>
where
    F: FnOnce(ObjectKey, PathBuf) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let saved_path = keys::output_path(key, save_dir);
    if saved_path.exists() {
        return Some(saved_path);
    }

    match fetch_transform_save(key, window, &saved_path, fetch).await {
        Ok(path) => Some(path),
        Err(e) => {
            eprintln!("Problem processing {}: {:#}", key.key(), e);
            None
        }
    }
}

async fn fetch_transform_save<F, Fut>(
    key: &ObjectKey,
    window: &SelectionWindow,
    saved_path: &Path,
    fetch: F,
) -> Result<PathBuf>
where
    F: FnOnce(ObjectKey, PathBuf) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    // the temp dir and the fetched grib inside it are cleaned up on every exit
    let tmp_dir = TempDir::new()?;
    let grib_path = tmp_dir.path().join(key.base_name());

    fetch(key.clone(), grib_path.clone()).await?;

    let dataset = decode::open_dataset(&grib_path)?
        .select(window)?
        .normalize_longitudes()
        .shift_time_to_verification()
        .reduce_steps(key.reduction())
        .into_output_layout()
        .drop_redundant_coords();

    netcdf_out::write_dataset(&dataset, saved_path)?;

    Ok(saved_path.to_path_buf())
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use anyhow::anyhow;
    use chrono::NaiveDate;

    use super::*;

    fn key_fixture() -> ObjectKey {
        ObjectKey::new(
            "GEFSv12/reforecast",
            NaiveDate::from_ymd_opt(2016, 5, 18).unwrap(),
            "c00",
            HorizonBucket::Days1To10,
            "cape_sfc",
        )
    }

    fn window_fixture() -> SelectionWindow {
        SelectionWindow::new((22.0, 55.0), (230.0, 291.0), (5.5, 6.5))
    }

    #[tokio::test]
    async fn should_not_fetch_when_output_exists() {
        let dir = TempDir::new().unwrap();
        let key = key_fixture();
        let existing = dir.path().join(key.output_file_name());
        std::fs::write(&existing, b"already processed").unwrap();

        let fetched = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fetched);

        let result = fetch_and_process(&key, &window_fixture(), dir.path(), move |_, _| {
            flag.store(true, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;

        assert_eq!(result, Some(existing));
        assert!(!fetched.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn should_swallow_a_failing_fetch() {
        let dir = TempDir::new().unwrap();
        let key = key_fixture();

        let result = fetch_and_process(&key, &window_fixture(), dir.path(), |_, _| async {
            Err(anyhow!("remote object does not exist"))
        })
        .await;

        assert_eq!(result, None);
        assert!(!dir.path().join(key.output_file_name()).exists());
    }
}
