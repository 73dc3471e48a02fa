use crate::host::Host;
use clawstrap_core::AppError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checksum {
    Verified,
    /// No `<url>.sha256` was published next to the artifact.
    Unpublished,
}

/// Download `url` to `dest`, checking it against `<url>.sha256` when one exists.
///
/// A mismatch, or a checksum that exists but can't be fetched, removes the
/// downloaded file and fails.
pub async fn fetch_verified(host: &dyn Host, url: &str, dest: &Path) -> Result<Checksum, AppError> {
    host.download(url, dest).await?;

    let sum_path = checksum_path(dest);
    let sum_url = format!("{url}.sha256");
    match host.download(&sum_url, &sum_path).await {
        Ok(()) => {}
        Err(AppError::NotPublished(_)) => return Ok(Checksum::Unpublished),
        Err(e) => {
            let _ = std::fs::remove_file(dest);
            return Err(e);
        }
    }

    let expected = std::fs::read_to_string(&sum_path)?;
    let _ = std::fs::remove_file(&sum_path);
    let expected = expected
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    let actual = sha256_file(dest)?;
    if expected != actual {
        let _ = std::fs::remove_file(dest);
        return Err(AppError::Download(format!(
            "checksum mismatch for {url}: expected {expected}, got {actual}"
        )));
    }
    Ok(Checksum::Verified)
}

pub fn sha256_file(path: &Path) -> Result<String, AppError> {
    let bytes = std::fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn checksum_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".sha256");
    PathBuf::from(name)
}
