use crate::core::{StagerError, StagerResult};
use crate::di::AssetFetcher;
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Downloads submission assets over HTTP
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a new fetcher whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> StagerResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Download `url` into `dest_dir`, named after the last URL segment
    pub async fn download(&self, url: &str, dest_dir: &Path) -> StagerResult<PathBuf> {
        let file_name = file_name_from_url(url)?;
        tracing::info!(url = %url, "downloading asset");

        let response = self.client.get(url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;

        fs::create_dir_all(dest_dir).await?;
        let path = dest_dir.join(file_name);
        fs::write(&path, &bytes).await?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "asset saved");
        Ok(path)
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest_dir: &Path) -> StagerResult<PathBuf> {
        self.download(url, dest_dir).await
    }
}

/// Decoded last path segment of `url`, without query or fragment
fn file_name_from_url(url: &str) -> StagerResult<String> {
    let without_suffix = url.split(['?', '#']).next().unwrap_or(url);
    let segment = without_suffix
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let decoded = urlencoding::decode(segment)
        .map_err(|e| StagerError::Package(format!("Bad asset url {}: {}", url, e)))?;

    if decoded.is_empty()
        || decoded == "."
        || decoded == ".."
        || decoded.contains(['/', '\\'])
        || !without_suffix.contains("://")
    {
        return Err(StagerError::Package(format!(
            "Cannot derive a file name from asset url {}",
            url
        )));
    }
    Ok(decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://example.com/dl/foo_1.0.0__linux.zip").unwrap(),
            "foo_1.0.0__linux.zip"
        );
        assert_eq!(
            file_name_from_url("https://example.com/dl/my%20pkg__all.zip?token=abc").unwrap(),
            "my pkg__all.zip"
        );
        assert!(file_name_from_url("https://example.com/dl/%2E%2E").is_err());
        assert!(file_name_from_url("https://example.com/a%2Fb.zip").is_err());
        assert!(file_name_from_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/assets/foo__linux.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"zipdata".to_vec()))
            .mount(&mock_server)
            .await;

        let temp = TempDir::new().unwrap();
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let url = format!("{}/assets/foo__linux.zip", mock_server.uri());
        let written = fetcher.fetch(&url, temp.path()).await.unwrap();

        assert_eq!(written, temp.path().join("foo__linux.zip"));
        assert_eq!(std::fs::read(&written).unwrap(), b"zipdata");
    }

    #[tokio::test]
    async fn test_download_http_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.zip"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let temp = TempDir::new().unwrap();
        let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
        let url = format!("{}/missing.zip", mock_server.uri());
        let result = fetcher.fetch(&url, temp.path()).await;

        assert!(matches!(result, Err(StagerError::Http(_))));
        assert!(!temp.path().join("missing.zip").exists());
    }
}
