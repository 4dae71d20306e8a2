//! Ghost Admin API adapter
//!
//! Requests carry a short-lived HS256 JWT signed with the admin API key.
//! Content goes up as one HTML card inside a minimal Mobiledoc document:
//! it renders correctly but reopens in Ghost's editor as a single HTML card.

use super::{NativePost, PostSummary, PublishAdapter, PublishedPost};
use crate::config::Platform;
use crate::error::AppError;
use crate::http::{expect_success, read_json, transport_error};
use crate::post::{ContentFormat, PostPayload, PostStatus};
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

const ERROR_POINTERS: &[&str] = &["/errors/0/message"];
const TOKEN_LIFETIME_SECS: i64 = 5 * 60;

/// Admin API key of the form `id:secret`, secret hex encoded
#[derive(Clone)]
pub struct GhostAdminKey {
    id: String,
    secret: Vec<u8>,
}

#[derive(Debug, Serialize)]
struct Claims {
    iat: i64,
    exp: i64,
    aud: &'static str,
}

impl GhostAdminKey {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let invalid = || {
            AppError::InvalidInput(
                "Invalid Ghost API key format. Expected format: id:secret".to_string(),
            )
        };
        let (id, secret) = raw.trim().split_once(':').ok_or_else(invalid)?;
        if id.is_empty() || secret.is_empty() {
            return Err(invalid());
        }
        let secret = hex::decode(secret).map_err(|_| invalid())?;
        Ok(Self {
            id: id.to_string(),
            secret,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sign a token valid for five minutes
    pub fn token(&self) -> Result<String, AppError> {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.id.clone());

        let iat = Utc::now().timestamp();
        let claims = Claims {
            iat,
            exp: iat + TOKEN_LIFETIME_SECS,
            aud: "/admin/",
        };
        encode(&header, &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|e| AppError::Authentication(format!("Failed to sign Ghost token: {}", e)))
    }
}

/// Ghost's own status vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GhostStatus {
    #[default]
    Draft,
    Published,
    Scheduled,
}

impl GhostStatus {
    /// `publish` becomes `scheduled` when a publish date is set
    pub fn for_post(status: PostStatus, has_publish_date: bool) -> Self {
        match status {
            PostStatus::Publish if has_publish_date => GhostStatus::Scheduled,
            PostStatus::Publish => GhostStatus::Published,
            _ => GhostStatus::Draft,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GhostOptions {
    pub status: GhostStatus,
    pub tags: Vec<String>,
    pub excerpt: Option<String>,
    pub published_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct TagRef<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct PostBody<'a> {
    title: &'a str,
    mobiledoc: String,
    status: GhostStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<TagRef<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_excerpt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    published_at: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Envelope<T> {
    posts: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct PostsResponse {
    #[serde(default)]
    posts: Vec<GhostPost>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GhostTag {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GhostPost {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub custom_excerpt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub tags: Vec<GhostTag>,
}

impl NativePost for GhostPost {
    fn summary(&self) -> PostSummary {
        PostSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            published_at: self.published_at.clone(),
        }
    }

    fn into_payload(self) -> PostPayload {
        let status = match self.status.as_deref() {
            Some("draft") => PostStatus::Draft,
            _ => PostStatus::Publish,
        };
        PostPayload {
            title: self.title,
            content: self.html.unwrap_or_default(),
            content_format: ContentFormat::Html,
            status,
            publish_date: self.published_at,
            tags: self.tags.into_iter().map(|t| t.name).collect(),
            categories: Vec::new(),
            excerpt: self.custom_excerpt,
            published_post_id: Some(self.id),
            is_edit_draft: true,
        }
    }
}

/// Wrap HTML in a single-card Mobiledoc document, serialized as a string
pub fn html_to_mobiledoc(html: &str) -> String {
    json!({
        "version": "0.3.1",
        "atoms": [],
        "cards": [["html", {"cardName": "html", "html": html}]],
        "markups": [],
        "sections": [[10, 0]]
    })
    .to_string()
}

pub struct GhostAdapter {
    http: Client,
    api_base: String,
    key: GhostAdminKey,
}

impl GhostAdapter {
    pub fn new(http: Client, site_url: &str, admin_key: &str) -> Result<Self, AppError> {
        Ok(Self {
            http,
            api_base: format!("{}/ghost/api/admin", site_url.trim_end_matches('/')),
            key: GhostAdminKey::parse(admin_key)?,
        })
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Vec<GhostPost>, AppError> {
        let resp = builder
            .header("Authorization", format!("Ghost {}", self.key.token()?))
            .send()
            .await
            .map_err(transport_error)?;
        let resp = expect_success(Platform::Ghost, resp, ERROR_POINTERS).await?;
        let body: PostsResponse = read_json(Platform::Ghost, resp).await?;
        Ok(body.posts)
    }

    async fn send_one(&self, builder: RequestBuilder) -> Result<GhostPost, AppError> {
        self.send(builder).await?.into_iter().next().ok_or_else(|| {
            AppError::Parse("Ghost response contained no posts".to_string())
        })
    }

    fn body<'a>(
        &self,
        title: &'a str,
        content: &str,
        options: &'a GhostOptions,
        updated_at: Option<&'a str>,
    ) -> Envelope<PostBody<'a>> {
        Envelope {
            posts: vec![PostBody {
                title,
                mobiledoc: html_to_mobiledoc(content),
                status: options.status,
                tags: options.tags.iter().map(|name| TagRef { name }).collect(),
                custom_excerpt: options.excerpt.as_deref(),
                published_at: options.published_at.as_deref(),
                updated_at,
            }],
        }
    }
}

fn published(post: GhostPost) -> PublishedPost {
    PublishedPost {
        id: post.id,
        url: post.url,
    }
}

#[async_trait]
impl PublishAdapter for GhostAdapter {
    type PostId = String;
    type Options = GhostOptions;
    type Post = GhostPost;

    fn platform(&self) -> Platform {
        Platform::Ghost
    }

    async fn create_post(&self, title: &str, content: &str, options: &GhostOptions) -> Result<PublishedPost, AppError> {
        debug!("Creating Ghost post ({:?})", options.status);
        let post = self
            .send_one(
                self.http
                    .post(format!("{}/posts/", self.api_base))
                    .json(&self.body(title, content, options, None)),
            )
            .await?;
        Ok(published(post))
    }

    /// Ghost rejects updates without the post's current `updated_at`
    async fn update_post(
        &self,
        id: &String,
        title: &str,
        content: &str,
        options: &GhostOptions,
    ) -> Result<PublishedPost, AppError> {
        let current = self.get_post(id).await?;
        let updated_at = current.updated_at.ok_or_else(|| {
            AppError::platform_api(
                Platform::Ghost,
                None,
                "Failed to get current post timestamp. Ghost requires it to prevent conflicting edits.",
            )
        })?;

        debug!("Updating Ghost post {} (updated_at {})", id, updated_at);
        let post = self
            .send_one(
                self.http
                    .put(format!("{}/posts/{}/", self.api_base, id))
                    .json(&self.body(title, content, options, Some(updated_at.as_str()))),
            )
            .await?;
        Ok(published(post))
    }

    async fn get_post(&self, id: &String) -> Result<GhostPost, AppError> {
        self.send_one(
            self.http
                .get(format!("{}/posts/{}/", self.api_base, id))
                .query(&[("formats", "html")]),
        )
        .await
    }

    async fn get_posts(&self, count: usize) -> Result<Vec<GhostPost>, AppError> {
        let limit = count.to_string();
        self.send(
            self.http
                .get(format!("{}/posts/", self.api_base))
                .query(&[("limit", limit.as_str()), ("formats", "html")]),
        )
        .await
    }
}
