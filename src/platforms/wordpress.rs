//! WordPress REST API v2 adapter (HTTP Basic with an application password)

use super::{NativePost, PostSummary, PublishAdapter, PublishedPost, WordPressApi};
use crate::config::Platform;
use crate::error::AppError;
use crate::http::{expect_success, read_json, transport_error};
use crate::post::{ContentFormat, PostPayload, PostStatus};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const ERROR_POINTERS: &[&str] = &["/message"];

/// Options for create/update
///
/// The API only takes numeric term ids. Tags and categories that parse as
/// ids are sent; names are not created and are left out.
#[derive(Debug, Clone, Default)]
pub struct WordPressOptions {
    pub status: Option<PostStatus>,
    pub date: Option<String>,
    pub excerpt: Option<String>,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PostBody<'a> {
    title: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    excerpt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    categories: Option<Vec<u64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Rendered {
    #[serde(default)]
    pub rendered: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WordPressPost {
    pub id: u64,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub title: Rendered,
    #[serde(default)]
    pub content: Rendered,
    #[serde(default)]
    pub excerpt: Rendered,
    #[serde(default)]
    pub tags: Vec<u64>,
    #[serde(default)]
    pub categories: Vec<u64>,
}

impl NativePost for WordPressPost {
    fn summary(&self) -> PostSummary {
        PostSummary {
            id: self.id.to_string(),
            title: self.title.rendered.clone(),
            published_at: self.date.clone(),
        }
    }

    fn into_payload(self) -> PostPayload {
        let status = match self.status.as_deref() {
            Some("draft") => PostStatus::Draft,
            Some("pending") => PostStatus::Pending,
            Some("private") => PostStatus::Private,
            _ => PostStatus::Publish,
        };
        let excerpt = Some(self.excerpt.rendered).filter(|e| !e.is_empty());

        PostPayload {
            title: self.title.rendered,
            content: self.content.rendered,
            content_format: ContentFormat::Html,
            status,
            publish_date: self.date,
            tags: Vec::new(),
            categories: Vec::new(),
            excerpt,
            published_post_id: Some(self.id.to_string()),
            is_edit_draft: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Term {
    name: String,
}

pub struct WordPressAdapter {
    http: Client,
    api_base: String,
    username: String,
    password: String,
}

impl WordPressAdapter {
    pub fn new(http: Client, site_url: &str, username: &str, password: &str) -> Self {
        Self {
            http,
            api_base: format!("{}/wp-json/wp/v2", site_url.trim_end_matches('/')),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth(&self.username, Some(&self.password))
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, AppError> {
        let resp = self.authed(builder).send().await.map_err(transport_error)?;
        let resp = expect_success(Platform::WordPress, resp, ERROR_POINTERS).await?;
        read_json(Platform::WordPress, resp).await
    }

    async fn term_names(&self, taxonomy: &str, ids: &[u64]) -> Vec<String> {
        if ids.is_empty() {
            return Vec::new();
        }
        let include = ids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let request = self
            .http
            .get(format!("{}/{}", self.api_base, taxonomy))
            .query(&[("include", include.as_str()), ("per_page", "100")]);

        match self.send::<Vec<Term>>(request).await {
            Ok(terms) => terms.into_iter().map(|t| t.name).collect(),
            Err(e) => {
                warn!("Failed to fetch WordPress {} names: {}", taxonomy, e);
                Vec::new()
            }
        }
    }

    /// Keep the values that are numeric term ids
    fn term_ids(kind: &str, values: &[String]) -> Option<Vec<u64>> {
        let ids: Vec<u64> = values
            .iter()
            .filter_map(|v| v.trim().parse().ok())
            .collect();
        let skipped = values.len() - ids.len();
        if skipped > 0 {
            debug!("WordPress needs numeric {} ids; {} name(s) not sent", kind, skipped);
        }
        Some(ids).filter(|ids| !ids.is_empty())
    }

    fn body<'a>(title: &'a str, content: &'a str, status: Option<String>, options: &'a WordPressOptions) -> PostBody<'a> {
        PostBody {
            title,
            content,
            status,
            date: options.date.as_deref(),
            excerpt: options.excerpt.as_deref(),
            tags: Self::term_ids("tag", &options.tags),
            categories: Self::term_ids("category", &options.categories),
        }
    }
}

fn published(post: WordPressPost) -> PublishedPost {
    PublishedPost {
        id: post.id.to_string(),
        url: post.link,
    }
}

#[async_trait]
impl PublishAdapter for WordPressAdapter {
    type PostId = u64;
    type Options = WordPressOptions;
    type Post = WordPressPost;

    fn platform(&self) -> Platform {
        Platform::WordPress
    }

    async fn create_post(&self, title: &str, content: &str, options: &WordPressOptions) -> Result<PublishedPost, AppError> {
        let body = Self::body(title, content, Some(options.status.unwrap_or_default().to_string()), options);
        debug!("Creating WordPress post at {}", self.api_base);
        let post: WordPressPost = self
            .send(self.http.post(format!("{}/posts", self.api_base)).json(&body))
            .await?;
        Ok(published(post))
    }

    async fn update_post(
        &self,
        id: &u64,
        title: &str,
        content: &str,
        options: &WordPressOptions,
    ) -> Result<PublishedPost, AppError> {
        let body = Self::body(title, content, options.status.map(|s| s.to_string()), options);
        debug!("Updating WordPress post {}", id);
        let post: WordPressPost = self
            .send(self.http.put(format!("{}/posts/{}", self.api_base, id)).json(&body))
            .await?;
        Ok(published(post))
    }

    async fn get_post(&self, id: &u64) -> Result<WordPressPost, AppError> {
        self.send(self.http.get(format!("{}/posts/{}", self.api_base, id)))
            .await
    }

    async fn get_posts(&self, count: usize) -> Result<Vec<WordPressPost>, AppError> {
        let per_page = count.to_string();
        self.send(
            self.http
                .get(format!("{}/posts", self.api_base))
                .query(&[("page", "1"), ("per_page", per_page.as_str()), ("status", "publish")]),
        )
        .await
    }
}

#[async_trait]
impl WordPressApi for WordPressAdapter {
    async fn tag_names(&self, ids: &[u64]) -> Vec<String> {
        self.term_names("tags", ids).await
    }

    async fn category_names(&self, ids: &[u64]) -> Vec<String> {
        self.term_names("categories", ids).await
    }
}
