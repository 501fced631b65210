use std::fs;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::get;

use crate::models::SeedFile;

pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Reads a seed file from disk or, for `http(s)://` sources, over the network.
pub async fn read_seed(source: &str) -> Result<SeedFile> {
    let raw = if is_remote(source) {
        get(source)
            .await
            .and_then(|response| response.error_for_status())
            .with_context(|| format!("Failed to fetch {source}"))?
            .text()
            .await
            .with_context(|| format!("Failed to read body of {source}"))?
    } else {
        fs::read_to_string(source).with_context(|| format!("Failed to read {source}"))?
    };

    serde_json::from_str(&raw).with_context(|| format!("{source} is not a valid seed file"))
}

pub fn progress(len: usize, message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);

    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    ) {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_message(message);

    pb
}

#[cfg(test)]
mod tests {
    use std::env::temp_dir;

    use super::*;

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://example.com/seed.json"));
        assert!(is_remote("http://localhost/seed.json"));
        assert!(!is_remote("data/seed.json"));
        assert!(!is_remote("/tmp/https.json"));
    }

    #[tokio::test]
    async fn test_read_seed_from_disk() {
        let path = temp_dir().join(format!("seed-{}.json", uuid::Uuid::new_v4()));
        fs::write(
            &path,
            r#"{"users": [{"name": "a", "email": "a@b.co", "password": "x"}]}"#,
        )
        .unwrap();

        let seed = read_seed(path.to_str().unwrap()).await.unwrap();
        assert_eq!(seed.users.len(), 1);

        fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_read_seed_rejects_garbage() {
        let path = temp_dir().join(format!("seed-{}.json", uuid::Uuid::new_v4()));
        fs::write(&path, "not json").unwrap();

        let err = read_seed(path.to_str().unwrap()).await.unwrap_err();
        assert!(err.to_string().ends_with("is not a valid seed file"));

        fs::remove_file(&path).unwrap();
    }
}
