//! Publishing platform adapters
//!
//! Every platform implements [`PublishAdapter`]: the same four operations
//! with the platform's own id type, option set and native post shape. The
//! [`Connector`] builds adapters from resolved blog credentials so the
//! router never constructs HTTP clients itself.

pub mod blogger;
pub mod devto;
pub mod ghost;
pub mod substack;
pub mod wordpress;

use crate::config::Platform;
use crate::credentials::SubstackAuth;
use crate::error::AppError;
use crate::post::PostPayload;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};

pub use blogger::{BloggerAdapter, BloggerOptions, BloggerPost};
pub use devto::{DevToAdapter, DevToArticle, DevToOptions};
pub use ghost::{GhostAdapter, GhostOptions, GhostPost, GhostStatus};
pub use substack::{SubstackAdapter, SubstackOptions, SubstackPost};
pub use wordpress::{WordPressAdapter, WordPressOptions, WordPressPost};

/// Identity of a created or updated post
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedPost {
    pub id: String,
    pub url: Option<String>,
}

/// One line of a post listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostSummary {
    pub id: String,
    pub title: String,
    pub published_at: Option<String>,
}

/// A post as returned by its platform
pub trait NativePost: Send + Sync {
    fn summary(&self) -> PostSummary;

    /// Convert into an edit draft bound to this post
    fn into_payload(self) -> PostPayload;
}

/// Uniform create/update/fetch contract of one platform
#[async_trait]
pub trait PublishAdapter: Send + Sync {
    type PostId: Send + Sync;
    type Options: Send + Sync;
    type Post: NativePost;

    fn platform(&self) -> Platform;

    async fn create_post(&self, title: &str, content: &str, options: &Self::Options) -> Result<PublishedPost, AppError>;

    async fn update_post(
        &self,
        id: &Self::PostId,
        title: &str,
        content: &str,
        options: &Self::Options,
    ) -> Result<PublishedPost, AppError>;

    async fn get_post(&self, id: &Self::PostId) -> Result<Self::Post, AppError>;

    async fn get_posts(&self, count: usize) -> Result<Vec<Self::Post>, AppError>;
}

/// WordPress additionally reverse-maps taxonomy ids for the edit flow
#[async_trait]
pub trait WordPressApi:
    PublishAdapter<PostId = u64, Options = WordPressOptions, Post = WordPressPost>
{
    async fn tag_names(&self, ids: &[u64]) -> Vec<String>;

    async fn category_names(&self, ids: &[u64]) -> Vec<String>;
}

pub type BloggerApi = dyn PublishAdapter<PostId = String, Options = BloggerOptions, Post = BloggerPost>;
pub type GhostApi = dyn PublishAdapter<PostId = String, Options = GhostOptions, Post = GhostPost>;
pub type SubstackApi = dyn PublishAdapter<PostId = String, Options = SubstackOptions, Post = SubstackPost>;
pub type DevToApi = dyn PublishAdapter<PostId = u64, Options = DevToOptions, Post = DevToArticle>;

/// Builds adapters for resolved blog targets
pub trait Connector: Send + Sync {
    fn wordpress(&self, site_url: &str, username: &str, password: &str) -> Result<Box<dyn WordPressApi>, AppError>;

    fn blogger(&self, blog_id: &str, access_token: &str) -> Result<Box<BloggerApi>, AppError>;

    fn ghost(&self, site_url: &str, admin_key: &str) -> Result<Box<GhostApi>, AppError>;

    fn substack(&self, hostname: &str, auth: SubstackAuth) -> Result<Box<SubstackApi>, AppError>;

    fn devto(&self, api_key: &str) -> Result<Box<DevToApi>, AppError>;
}

/// Connector producing the real HTTP adapters, sharing one client
#[derive(Clone)]
pub struct HttpConnector {
    http: Client,
}

impl HttpConnector {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

impl Connector for HttpConnector {
    fn wordpress(&self, site_url: &str, username: &str, password: &str) -> Result<Box<dyn WordPressApi>, AppError> {
        Ok(Box::new(WordPressAdapter::new(
            self.http.clone(),
            site_url,
            username,
            password,
        )))
    }

    fn blogger(&self, blog_id: &str, access_token: &str) -> Result<Box<BloggerApi>, AppError> {
        Ok(Box::new(BloggerAdapter::new(
            self.http.clone(),
            blog_id,
            access_token,
        )))
    }

    fn ghost(&self, site_url: &str, admin_key: &str) -> Result<Box<GhostApi>, AppError> {
        Ok(Box::new(GhostAdapter::new(self.http.clone(), site_url, admin_key)?))
    }

    fn substack(&self, hostname: &str, auth: SubstackAuth) -> Result<Box<SubstackApi>, AppError> {
        Ok(Box::new(SubstackAdapter::new(self.http.clone(), hostname, auth)))
    }

    fn devto(&self, api_key: &str) -> Result<Box<DevToApi>, AppError> {
        Ok(Box::new(DevToAdapter::new(self.http.clone(), api_key)?))
    }
}

/// Accept a JSON number or string as an id
pub(crate) fn flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

/// Parse a numeric post id, rejecting anything else locally
pub fn numeric_id(platform: Platform, raw: &str) -> Result<u64, AppError> {
    raw.trim().parse::<u64>().map_err(|_| {
        AppError::InvalidInput(format!(
            "{} post IDs are numeric, got \"{}\"",
            platform, raw
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct WithId {
        #[serde(deserialize_with = "flexible_id")]
        id: String,
    }

    #[test]
    fn test_flexible_id_accepts_numbers_and_strings() {
        let a: WithId = serde_json::from_str(r#"{"id": 17}"#).unwrap();
        let b: WithId = serde_json::from_str(r#"{"id": "5f3a"}"#).unwrap();
        assert_eq!(a.id, "17");
        assert_eq!(b.id, "5f3a");
    }

    #[test]
    fn test_numeric_id_rejects_text() {
        assert_eq!(numeric_id(Platform::WordPress, " 42 ").unwrap(), 42);
        let err = numeric_id(Platform::DevTo, "abc").unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
