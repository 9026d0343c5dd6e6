//! Image reference resolution: hosted reference → raw bytes.
//!
//! Photos reach the pipeline as references produced by an upstream upload
//! service. Three shapes are understood:
//!
//! - `http://` / `https://` URLs, downloaded with `reqwest`
//! - `data:<mime>;base64,<payload>` URIs, decoded in place
//! - anything else, read as a local file path
//!
//! Every failure is per-image: the result map holds an
//! [`ArtifactError::RenderFailure`] for that reference and the renderer draws
//! a placeholder in its slot.

use crate::error::ArtifactError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fetched bytes (or the reason they could not be fetched) keyed by reference.
pub type ResolvedImages = HashMap<String, Result<Vec<u8>, ArtifactError>>;

/// What kind of reference a string is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageReference<'a> {
    Url(&'a str),
    DataUri(&'a str),
    Local(PathBuf),
}

impl<'a> ImageReference<'a> {
    pub fn parse(reference: &'a str) -> Self {
        let trimmed = reference.trim();
        if is_url(trimmed) {
            ImageReference::Url(trimmed)
        } else if trimmed.starts_with("data:") {
            ImageReference::DataUri(trimmed)
        } else {
            ImageReference::Local(PathBuf::from(trimmed))
        }
    }
}

/// Check if the reference looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve every reference, fetching remote ones concurrently.
///
/// At most `concurrency` downloads are in flight at once. The returned map is
/// keyed by reference, so completion order never affects the caller.
pub async fn resolve_images(
    references: &[String],
    timeout_secs: u64,
    concurrency: usize,
) -> ResolvedImages {
    if references.is_empty() {
        return ResolvedImages::new();
    }
    info!("Resolving {} image references", references.len());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build();

    let client = match client {
        Ok(c) => Some(c),
        Err(e) => {
            warn!("HTTP client unavailable, remote images will be placeholders: {}", e);
            None
        }
    };

    let resolved: Vec<(String, Result<Vec<u8>, ArtifactError>)> =
        stream::iter(references.iter().cloned().map(|reference| {
            let client = client.clone();
            async move {
                let result = resolve_one(&reference, client.as_ref(), timeout_secs).await;
                if let Err(ref e) = result {
                    warn!("{}", e);
                }
                (reference, result)
            }
        }))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    resolved.into_iter().collect()
}

/// Resolve one reference to bytes.
pub async fn resolve_one(
    reference: &str,
    client: Option<&reqwest::Client>,
    timeout_secs: u64,
) -> Result<Vec<u8>, ArtifactError> {
    let fail = |detail: String| ArtifactError::RenderFailure {
        reference: reference.to_string(),
        detail,
    };

    match ImageReference::parse(reference) {
        ImageReference::Url(url) => {
            let client = client.ok_or_else(|| fail("no HTTP client available".into()))?;
            download(client, url, timeout_secs).await.map_err(fail)
        }
        ImageReference::DataUri(uri) => decode_data_uri(uri).map_err(fail),
        ImageReference::Local(path) => {
            let bytes = tokio::fs::read(&path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    fail(format!("file not found: {}", path.display()))
                } else {
                    fail(format!("cannot read {}: {}", path.display(), e))
                }
            })?;
            debug!("Read local image {} ({} bytes)", path.display(), bytes.len());
            Ok(bytes)
        }
    }
}

async fn download(
    client: &reqwest::Client,
    url: &str,
    timeout_secs: u64,
) -> Result<Vec<u8>, String> {
    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            format!("download timed out after {timeout_secs}s")
        } else {
            format!("download failed: {e}")
        }
    })?;

    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status()));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| format!("download failed: {e}"))?;
    debug!("Downloaded {} ({} bytes)", url, bytes.len());
    Ok(bytes.to_vec())
}

/// Decode a base64 `data:` URI.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, String> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| "not a data URI".to_string())?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| "data URI has no payload".to_string())?;
    if !meta.ends_with(";base64") {
        return Err(format!("unsupported data URI encoding '{meta}'"));
    }
    let payload: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(payload.as_bytes())
        .map_err(|e| format!("invalid base64 payload: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/team.jpg"));
        assert!(is_url("http://example.com/team.jpg"));
        assert!(!is_url("/tmp/team.jpg"));
        assert!(!is_url("team.jpg"));
        assert!(!is_url(""));
    }

    #[test]
    fn parse_reference_kinds() {
        assert_eq!(
            ImageReference::parse(" https://cdn/x.png "),
            ImageReference::Url("https://cdn/x.png")
        );
        assert!(matches!(
            ImageReference::parse("data:image/png;base64,AAAA"),
            ImageReference::DataUri(_)
        ));
        assert_eq!(
            ImageReference::parse("photos/a.jpg"),
            ImageReference::Local(PathBuf::from("photos/a.jpg"))
        );
    }

    #[test]
    fn data_uri_decodes() {
        assert_eq!(decode_data_uri("data:image/png;base64,AQID").unwrap(), vec![1, 2, 3]);
        assert!(decode_data_uri("data:image/png,raw").is_err());
        assert!(decode_data_uri("data:image/png;base64").is_err());
        assert!(decode_data_uri("data:image/png;base64,@@@").is_err());
    }

    #[tokio::test]
    async fn missing_local_file_is_render_failure() {
        let result = resolve_one("/definitely/not/here.jpg", None, 5).await;
        match result {
            Err(ArtifactError::RenderFailure { reference, detail }) => {
                assert_eq!(reference, "/definitely/not/here.jpg");
                assert!(detail.contains("not found"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn resolves_local_and_data_uri_together() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, [9u8, 9, 9]).unwrap();
        let refs = vec![
            path.to_string_lossy().into_owned(),
            "data:image/png;base64,AQID".to_string(),
            "/missing.png".to_string(),
        ];
        let resolved = resolve_images(&refs, 5, 2).await;
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[&refs[0]].as_ref().unwrap(), &vec![9u8, 9, 9]);
        assert_eq!(resolved[&refs[1]].as_ref().unwrap(), &vec![1u8, 2, 3]);
        assert!(resolved[&refs[2]].is_err());
    }
}
