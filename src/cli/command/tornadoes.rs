//! Download, clean, and save SPC tornado reports.

use std::path::PathBuf;

use anyhow::Result;

use crate::{
    cli::{command::resolve_save_dir, create_spinner},
    report::{self, filters},
};

pub async fn tornadoes(
    save_dir: Option<PathBuf>,
    csv_save_name: String,
    spc_tor_url: String,
    earliest_year: i32,
) -> Result<String> {
    let bar = create_spinner("Downloading tornado reports...".to_string());
    let reports = report::load_reports(&spc_tor_url).await?;
    bar.finish_with_message("Tornado reports downloaded");

    let reports = filters::drop_unknown_scales(reports);
    let reports = filters::keep_central_time(reports);
    let reports = filters::keep_from_year(reports, earliest_year);
    let reports = filters::assign_valid_times(reports);

    let save_path = resolve_save_dir(save_dir).join(csv_save_name);
    report::save_reports(&reports, &save_path)?;

    Ok(save_path.to_string_lossy().to_string())
}
