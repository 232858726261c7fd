mod cli;
mod download;
mod ftp;
mod grid;
mod keys;
mod report;
mod selection;

use anyhow::{Error, Result};
use clap::Parser;
use cli::{command, Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Tornadoes {
            save_dir,
            csv_save_name,
            spc_tor_url,
            earliest_year,
        } => match command::tornadoes(save_dir, csv_save_name, spc_tor_url, earliest_year).await {
            Ok(filename) => println!("File saved to `{}`", filename),
            Err(e) => eprintln!("Error: {}", e),
        },
        Commands::Reanalysis {
            start_date,
            end_date,
            host,
            save_dir,
        } => match command::reanalysis(start_date, end_date, host, save_dir).await {
            Ok(dirname) => println!("Files saved under `{}`", dirname),
            Err(e) => eprintln!("Error: {}", e),
        },
        Commands::Reforecast(args) => match command::reforecast(args).await {
            Ok(filename) => println!("File saved to `{}`", filename),
            Err(e) => eprintln!("Error: {}", e),
        },
    }

    Ok(())
}
