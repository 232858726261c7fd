pub mod reanalysis;
pub mod reforecast;
pub mod tornadoes;

use std::path::PathBuf;

pub use reanalysis::reanalysis;
pub use reforecast::reforecast;
pub use tornadoes::tornadoes;

/// Resolves the directory cleaned report files are saved to.
pub fn resolve_save_dir(save_dir: Option<PathBuf>) -> PathBuf {
    save_dir
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

// -- Tests -------------------------------------------------------------------
