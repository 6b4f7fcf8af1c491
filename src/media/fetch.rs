//! Download seam for remote media.
//!
//! Platform adapters know how to turn a file handle into bytes (Telegram needs
//! a `getFile` round trip, QQ usually hands out a direct URL). The conversion
//! pipeline only sees this trait.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::MediaError;
use crate::media::source::RemoteMedia;

/// Fetches the bytes behind a [`RemoteMedia`] handle.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, media: &RemoteMedia) -> Result<Bytes, MediaError>;
}

/// Fetcher for media that carries a direct download URL.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(max_bytes: usize) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| MediaError::DownloadFailed {
                reason: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client, max_bytes })
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, media: &RemoteMedia) -> Result<Bytes, MediaError> {
        let raw = media.url.as_deref().ok_or_else(|| MediaError::DownloadFailed {
            reason: format!("No download URL for {}", media.stable_id()),
        })?;
        let url = download_url(raw)?;

        tracing::debug!(url = %url, "Downloading remote media");

        let response =
            self.client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| MediaError::DownloadFailed {
                    reason: format!("HTTP request failed: {}", e),
                })?;

        if !response.status().is_success() {
            return Err(MediaError::DownloadFailed {
                reason: format!("HTTP {} for {}", response.status(), url),
            });
        }

        if let Some(len) = response.content_length()
            && len as usize > self.max_bytes
        {
            return Err(MediaError::TooLarge {
                size: len as usize,
                max: self.max_bytes,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MediaError::DownloadFailed {
                reason: format!("Failed to read response body: {}", e),
            })?;

        if bytes.len() > self.max_bytes {
            return Err(MediaError::TooLarge {
                size: bytes.len(),
                max: self.max_bytes,
            });
        }

        Ok(bytes)
    }
}

/// Parse a download URL, accepting only http(s).
///
/// Loopback hosts stay allowed: OneBot implementations commonly serve cached
/// files from a local HTTP server.
fn download_url(raw: &str) -> Result<url::Url, MediaError> {
    let url = url::Url::parse(raw).map_err(|e| MediaError::DownloadFailed {
        reason: format!("Invalid URL: {}", e),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(MediaError::DownloadFailed {
            reason: format!("Unsupported URL scheme: {}", scheme),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Platform;

    #[tokio::test]
    async fn test_missing_url_rejected() {
        let fetcher = HttpFetcher::new(1024).unwrap();
        let media = RemoteMedia::new(Platform::Telegram, "AgAD");
        let err = fetcher.fetch(&media).await.unwrap_err();
        assert!(err.to_string().contains("No download URL"));
    }

    #[tokio::test]
    async fn test_non_http_url_rejected() {
        let fetcher = HttpFetcher::new(1024).unwrap();
        let media = RemoteMedia::new(Platform::Qq, "abc").with_url("ftp://example.com/a");
        let err = fetcher.fetch(&media).await.unwrap_err();
        assert!(err.to_string().contains("Unsupported URL scheme"));
    }

    #[test]
    fn test_download_url() {
        assert!(download_url("http://127.0.0.1:5700/cache/a.jpg").is_ok());
        assert!(download_url("https://gchat.qpic.cn/gchatpic_new/0/abc/0").is_ok());
        assert!(download_url("not a url").is_err());
        assert!(download_url("file:///etc/passwd").is_err());
    }
}
