use anyhow::Context;
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use super::{CollaboratorResult, DraftPost, DraftReceipt, Publisher};
use crate::config::GhostConfig;
use crate::CollaboratorError;

const ACCEPT_VERSION: &str = "v5.0";
const TOKEN_AUDIENCE: &str = "/admin/";
const TOKEN_LIFETIME_SECS: i64 = 5 * 60;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iat: i64,
    exp: i64,
    aud: String,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    images: Vec<UploadedImage>,
}

#[derive(Debug, Deserialize)]
struct UploadedImage {
    url: String,
}

#[derive(Debug, Serialize)]
struct PostsRequest<'a> {
    posts: [NewPost<'a>; 1],
}

#[derive(Debug, Serialize)]
struct NewPost<'a> {
    title: &'a str,
    html: &'a str,
    status: &'a str,
    feature_image: &'a str,
    codeinjection_head: &'a str,
}

#[derive(Debug, Deserialize)]
struct PostsResponse {
    posts: Vec<CreatedPost>,
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Ghost Admin API client
pub struct GhostPublisher {
    client: Client,
    admin_url: String,
    key_id: String,
    secret: Vec<u8>,
}

impl GhostPublisher {
    pub fn new(client: Client, config: &GhostConfig) -> anyhow::Result<Self> {
        let (key_id, secret) = config
            .key
            .split_once(':')
            .context("Ghost admin key must look like '<id>:<secret>'")?;
        let secret = hex::decode(secret).context("Ghost admin key secret is not valid hex")?;

        Ok(Self {
            client,
            admin_url: format!("{}/ghost/api/admin", config.url.trim_end_matches('/')),
            key_id: key_id.to_string(),
            secret,
        })
    }

    /// Short-lived admin token signed with the key secret
    fn token(&self) -> CollaboratorResult<String> {
        let iat = chrono::Utc::now().timestamp();
        let claims = Claims {
            iat,
            exp: iat + TOKEN_LIFETIME_SECS,
            aud: TOKEN_AUDIENCE.to_string(),
        };

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.key_id.clone());

        encode(&header, &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|e| CollaboratorError::Publish(format!("cannot sign admin token: {}", e)))
    }

    fn authorized(&self, request: RequestBuilder) -> CollaboratorResult<RequestBuilder> {
        Ok(request
            .header("Authorization", format!("Ghost {}", self.token()?))
            .header("Accept-Version", ACCEPT_VERSION))
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> CollaboratorResult<T> {
        let response = self
            .authorized(request)?
            .send()
            .await
            .map_err(|e| CollaboratorError::Publish(format!("{} request failed: {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Publish(format!(
                "{} returned HTTP {}: {}",
                what,
                status,
                body.trim()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| CollaboratorError::Publish(format!("unreadable {} response: {}", what, e)))
    }
}

#[async_trait]
impl Publisher for GhostPublisher {
    async fn upload_image(&self, data: Vec<u8>, filename: &str) -> CollaboratorResult<String> {
        let part = Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str("image/jpeg")
            .map_err(|e| CollaboratorError::Publish(format!("invalid image part: {}", e)))?;
        let form = Form::new().part("file", part).text("purpose", "image");

        let request = self
            .client
            .post(format!("{}/images/upload/", self.admin_url))
            .multipart(form);

        let uploaded: ImagesResponse = self.send(request, "image upload").await?;
        let url = uploaded
            .images
            .into_iter()
            .next()
            .map(|image| image.url)
            .ok_or_else(|| CollaboratorError::Publish("image upload returned no image".to_string()))?;

        tracing::info!("Image uploaded successfully: {}", url);
        Ok(url)
    }

    async fn create_draft(&self, post: &DraftPost) -> CollaboratorResult<DraftReceipt> {
        let body = PostsRequest {
            posts: [NewPost {
                title: &post.title,
                html: &post.html,
                status: "draft",
                feature_image: &post.feature_image,
                codeinjection_head: &post.codeinjection_head,
            }],
        };

        let request = self
            .client
            .post(format!("{}/posts/", self.admin_url))
            .query(&[("source", "html")])
            .json(&body);

        let created: PostsResponse = self.send(request, "post creation").await?;
        let created = created
            .posts
            .into_iter()
            .next()
            .ok_or_else(|| CollaboratorError::Publish("post creation returned no post".to_string()))?;

        tracing::info!("Draft post created successfully: {}", created.id);
        Ok(DraftReceipt {
            id: created.id,
            url: created.url,
            status: created.status.unwrap_or_else(|| "draft".to_string()),
        })
    }
}
