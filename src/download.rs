//! Streams remote objects to local files.

use std::{fs::File, io::Write, path::Path};

use anyhow::{bail, Error, Result};
use futures::StreamExt;

/// Downloads the object at `url` and saves it to the specified file path.
pub async fn download_file(url: &str, file_path: &Path) -> Result<(), Error> {
    let response = reqwest::get(url).await?;

    if !response.status().is_success() {
        bail!("failed to download {}: {}", url, response.status());
    }

    let mut file = File::create(file_path)?;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?)?;
    }

    Ok(())
}

/// Fetches a text resource from a URL, or reads it from a local path.
pub async fn fetch_text(url_or_path: &str) -> Result<String> {
    if url_or_path.starts_with("http://") || url_or_path.starts_with("https://") {
        let response = reqwest::get(url_or_path).await?;
        if !response.status().is_success() {
            bail!("failed to download {}: {}", url_or_path, response.status());
        }
        Ok(response.text().await?)
    } else {
        Ok(std::fs::read_to_string(url_or_path)?)
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn should_read_local_path_as_text() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "yr,mo,dy").unwrap();

        let text = fetch_text(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(text, "yr,mo,dy\n");
    }

    #[tokio::test]
    async fn should_reject_missing_local_path() {
        let result = fetch_text("/no/such/file.csv").await;
        assert!(result.is_err());
    }
}
