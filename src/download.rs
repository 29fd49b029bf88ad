//! Granule asset download over HTTPS.
//!
//! Files are named after the last URL path segment and existing files are left
//! untouched. There is no retry: the first failing URL aborts the batch.
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Environment variable holding an Earthdata Login bearer token
pub const TOKEN_ENV: &str = "EARTHDATA_TOKEN";

#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    /// Bearer token; falls back to `EARTHDATA_TOKEN`
    pub token: Option<String>,
    /// Whole-request timeout; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl DownloadOptions {
    fn resolved_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV).ok())
            .filter(|t| !t.is_empty())
    }
}

/// Last path segment of a URL, without query string
pub fn asset_file_name(url: &str) -> Result<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(Error::InvalidArgument {
            arg: "url",
            value: url.to_string(),
        }),
    }
}

/// Download every URL into `output_dir`; returns the local paths in input order
pub fn download_granules<S: AsRef<str>>(
    urls: &[S],
    output_dir: &Path,
    options: &DownloadOptions,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)?;
    let client = reqwest::blocking::Client::builder()
        .timeout(options.timeout)
        .user_agent(concat!("emitwater/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let token = options.resolved_token();

    let mut paths = Vec::with_capacity(urls.len());
    for url in urls {
        let url = url.as_ref();
        let target = output_dir.join(asset_file_name(url)?);
        if target.is_file() {
            debug!("Skipping existing {:?}", target);
            paths.push(target);
            continue;
        }
        info!("Downloading {}", url);
        download_one(&client, url, token.as_deref(), &target)?;
        paths.push(target);
    }
    Ok(paths)
}

fn download_one(
    client: &reqwest::blocking::Client,
    url: &str,
    token: Option<&str>,
    target: &Path,
) -> Result<()> {
    let mut request = client.get(url);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    let mut response = request.send()?.error_for_status()?;

    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    let bytes = response.copy_to(staged.as_file_mut())?;
    staged.persist(target).map_err(|e| Error::Io(e.error))?;
    debug!("Wrote {} bytes to {:?}", bytes, target);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_asset_file_name() {
        assert_eq!(
            asset_file_name("https://data.example/a/b/EMIT_L2A_RFL_001.nc?x=1").unwrap(),
            "EMIT_L2A_RFL_001.nc"
        );
        assert!(asset_file_name("https://data.example/dir/").is_err());
    }

    #[test]
    fn test_existing_files_are_skipped() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("granule.nc"), b"cached").unwrap();
        // Unroutable host: a request would fail, so success proves no request was made
        let urls = ["https://invalid.invalid/granule.nc"];
        let paths = download_granules(&urls, dir.path(), &DownloadOptions::default()).unwrap();
        assert_eq!(paths, vec![dir.path().join("granule.nc")]);
        assert_eq!(std::fs::read(&paths[0]).unwrap(), b"cached");
    }
}
