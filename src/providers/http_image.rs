use async_trait::async_trait;
use reqwest::Client;

use super::{CollaboratorResult, ImageFetcher};
use crate::CollaboratorError;

/// Plain HTTP GET image fetcher
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> CollaboratorResult<Vec<u8>> {
        tracing::debug!("Fetching image: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CollaboratorError::Image(format!("failed to fetch {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(CollaboratorError::Image(format!(
                "failed to fetch {}: HTTP {}",
                url,
                response.status()
            )));
        }

        let content = response
            .bytes()
            .await
            .map_err(|e| CollaboratorError::Image(format!("failed to read {}: {}", url, e)))?;

        if content.is_empty() {
            return Err(CollaboratorError::Image(format!("{} returned an empty body", url)));
        }

        Ok(content.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/vi/abc123/maxresdefault.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
            .mount(&mock_server)
            .await;

        let fetcher = HttpImageFetcher::new(Client::new());
        let bytes = fetcher
            .fetch(&format!("{}/vi/abc123/maxresdefault.jpg", mock_server.uri()))
            .await
            .unwrap();

        assert_eq!(bytes, vec![0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn test_fetch_not_found_is_image_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let fetcher = HttpImageFetcher::new(Client::new());
        let err = fetcher
            .fetch(&format!("{}/missing.jpg", mock_server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, CollaboratorError::Image(_)));
    }
}
