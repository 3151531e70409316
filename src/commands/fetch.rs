//! Fetch command - download model files for an engine
//!
//! Files land in `<models_dir>/<engine>/`. Downloads are verified
//! against the registry's SHA-256 digest when one is present.

use anyhow::{anyhow, bail, Context, Result};
use semsift::Config;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

/// Download model (and tokenizer, for text engines) files
pub fn execute(config: &Config, name: &str, force: bool) -> Result<()> {
    let registry = config.registry()?;
    let descriptor = registry.get(name)?;

    let model_url = descriptor
        .model_url
        .as_deref()
        .ok_or_else(|| anyhow!("No download URL for engine '{}'", name))?;

    let engine_dir = config.models.models_dir().join(name);
    let model_path = engine_dir.join("model.onnx");

    if model_path.exists() && !force {
        println!("Engine '{}' already fetched.", name);
        println!("  Location: {}", engine_dir.display());
        println!("  Use --force to re-download.");
        return Ok(());
    }

    println!("Fetching '{}'", name);
    download_and_verify(model_url, &model_path, descriptor.sha256_model.as_deref())?;

    if let Some(tokenizer_url) = descriptor.tokenizer_url.as_deref() {
        download_and_verify(
            tokenizer_url,
            &engine_dir.join("tokenizer.json"),
            descriptor.sha256_tokenizer.as_deref(),
        )?;
    }

    println!("✓ Fetched '{}' to {}", name, engine_dir.display());
    Ok(())
}

/// Download a file from URL to destination path
fn download_file(url: &str, dest: &Path) -> Result<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let mut response = client
        .get(url)
        .send()
        .with_context(|| format!("Failed to GET {}", url))?;

    if !response.status().is_success() {
        bail!("HTTP {}: {}", response.status(), url);
    }

    let total_size = response.content_length();
    let mut downloaded: u64 = 0;
    let mut file = File::create(dest)?;

    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = response.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])?;
        downloaded += bytes_read as u64;

        if let Some(total) = total_size {
            print!(
                "\r  {}/{} MB",
                downloaded / (1024 * 1024),
                total / (1024 * 1024)
            );
        } else {
            print!("\r  {} MB", downloaded / (1024 * 1024));
        }
        std::io::stdout().flush().ok();
    }

    println!();
    Ok(downloaded)
}

/// Download and verify a file; returns the computed SHA-256
fn download_and_verify(url: &str, dest: &Path, expected_sha256: Option<&str>) -> Result<String> {
    println!("  {}", url);
    download_file(url, dest)?;

    print!("  Verifying...");
    std::io::stdout().flush().ok();

    let hash = sha256_file(dest)?;

    if let Some(expected) = expected_sha256 {
        if hash != expected.to_lowercase() {
            fs::remove_file(dest).ok();
            bail!(
                "Checksum mismatch!\n  Expected: {}\n  Got: {}",
                expected,
                hash
            );
        }
        println!(" ✓");
    } else {
        println!(" {}", &hash[..12]);
    }

    Ok(hash)
}

/// Compute the SHA-256 hash of a file, streaming
fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {} for hashing", path.display()))?;
    let mut hasher = Sha256::new();

    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    let digest = hasher.finalize();
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_sha256_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let hash = sha256_file(file.path()).unwrap();
        // SHA-256 of empty input is well-known
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha256_known_content() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"test").unwrap();
        let hash = sha256_file(file.path()).unwrap();
        assert_eq!(
            hash,
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }
}
