//! Dev.to (Forem) adapter, API-key header auth, Markdown bodies

use super::{NativePost, PostSummary, PublishAdapter, PublishedPost};
use crate::config::Platform;
use crate::error::AppError;
use crate::http::{expect_success, read_json, transport_error};
use crate::post::{ContentFormat, PostPayload, PostStatus};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

pub const DEVTO_API_BASE: &str = "https://dev.to/api";
const ERROR_POINTERS: &[&str] = &["/error", "/message"];

/// Dev.to rejects articles with more tags than this
pub const MAX_TAGS: usize = 4;

/// Trim, strip one leading `#`, drop empties and exact duplicates, keep the first four
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        let tag = tag.strip_prefix('#').unwrap_or(tag);
        if tag.is_empty() || out.iter().any(|seen| seen == tag) {
            continue;
        }
        out.push(tag.to_string());
        if out.len() == MAX_TAGS {
            break;
        }
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct DevToOptions {
    pub published: bool,
    pub tags: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
struct ArticleBody<'a> {
    title: &'a str,
    published: bool,
    body_markdown: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ArticleEnvelope<'a> {
    article: ArticleBody<'a>,
}

/// `tag_list` is a comma-separated string on single articles, an array in listings
fn tag_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTags {
        List(Vec<String>),
        Joined(String),
        Missing(()),
    }

    Ok(match RawTags::deserialize(deserializer)? {
        RawTags::List(tags) => tags,
        RawTags::Joined(joined) => joined
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        RawTags::Missing(()) => Vec::new(),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct DevToArticle {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub canonical_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub body_markdown: Option<String>,
    #[serde(default, deserialize_with = "tag_list")]
    pub tag_list: Vec<String>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub published_at: Option<String>,
}

impl NativePost for DevToArticle {
    fn summary(&self) -> PostSummary {
        PostSummary {
            id: self.id.to_string(),
            title: self.title.clone(),
            published_at: self.published_at.clone(),
        }
    }

    fn into_payload(self) -> PostPayload {
        PostPayload {
            title: self.title,
            content: self.body_markdown.unwrap_or_default(),
            content_format: ContentFormat::Markdown,
            status: if self.published {
                PostStatus::Publish
            } else {
                PostStatus::Draft
            },
            publish_date: self.published_at,
            tags: self.tag_list,
            categories: Vec::new(),
            excerpt: self.description,
            published_post_id: Some(self.id.to_string()),
            is_edit_draft: true,
        }
    }
}

pub struct DevToAdapter {
    http: Client,
    api_base: String,
    api_key: String,
}

impl DevToAdapter {
    pub fn new(http: Client, api_key: &str) -> Result<Self, AppError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(AppError::Configuration("Dev.to API key is required".to_string()));
        }
        Ok(Self {
            http,
            api_base: DEVTO_API_BASE.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn with_base_url(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, AppError> {
        let resp = builder
            .header("api-key", &self.api_key)
            .send()
            .await
            .map_err(transport_error)?;
        let resp = expect_success(Platform::DevTo, resp, ERROR_POINTERS).await?;
        read_json(Platform::DevTo, resp).await
    }

    fn envelope<'a>(title: &'a str, markdown: &'a str, options: &'a DevToOptions) -> ArticleEnvelope<'a> {
        ArticleEnvelope {
            article: ArticleBody {
                title,
                published: options.published,
                body_markdown: markdown,
                tags: (!options.tags.is_empty()).then_some(options.tags.as_slice()),
                description: options.description.as_deref(),
            },
        }
    }
}

fn published(article: DevToArticle) -> PublishedPost {
    PublishedPost {
        id: article.id.to_string(),
        url: article.url.or(article.canonical_url),
    }
}

#[async_trait]
impl PublishAdapter for DevToAdapter {
    type PostId = u64;
    type Options = DevToOptions;
    type Post = DevToArticle;

    fn platform(&self) -> Platform {
        Platform::DevTo
    }

    async fn create_post(&self, title: &str, content: &str, options: &DevToOptions) -> Result<PublishedPost, AppError> {
        debug!("Creating Dev.to article (published: {})", options.published);
        let article: DevToArticle = self
            .send(
                self.http
                    .post(format!("{}/articles", self.api_base))
                    .json(&Self::envelope(title, content, options)),
            )
            .await?;
        Ok(published(article))
    }

    async fn update_post(
        &self,
        id: &u64,
        title: &str,
        content: &str,
        options: &DevToOptions,
    ) -> Result<PublishedPost, AppError> {
        debug!("Updating Dev.to article {}", id);
        let article: DevToArticle = self
            .send(
                self.http
                    .put(format!("{}/articles/{}", self.api_base, id))
                    .json(&Self::envelope(title, content, options)),
            )
            .await?;
        Ok(published(article))
    }

    async fn get_post(&self, id: &u64) -> Result<DevToArticle, AppError> {
        self.send(self.http.get(format!("{}/articles/{}", self.api_base, id)))
            .await
    }

    async fn get_posts(&self, count: usize) -> Result<Vec<DevToArticle>, AppError> {
        let per_page = count.to_string();
        self.send(
            self.http
                .get(format!("{}/articles/me/all", self.api_base))
                .query(&[("page", "1"), ("per_page", per_page.as_str())]),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{spawn_stub, Recorder};
    use axum::extract::{RawQuery, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post, put};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    #[test]
    fn test_normalize_tags() {
        let tags = ["#Go", "go", " Rust ", "rust", "a", "b", "c", "d", "e"];
        assert_eq!(normalize_tags(&tags), vec!["Go", "go", "Rust", "rust"]);
        assert_eq!(normalize_tags(&["#go", "go", "a"]), vec!["go", "a"]);
        assert!(normalize_tags(&["#", "  "]).is_empty());
    }

    #[test]
    fn test_empty_key_is_rejected() {
        assert!(matches!(
            DevToAdapter::new(Client::new(), "  "),
            Err(AppError::Configuration(_))
        ));
    }

    #[test]
    fn test_tag_list_shapes() {
        let single: DevToArticle =
            serde_json::from_value(json!({"id": 1, "tag_list": "rust, webdev"})).unwrap();
        let listed: DevToArticle =
            serde_json::from_value(json!({"id": 2, "tag_list": ["go"]})).unwrap();
        let missing: DevToArticle = serde_json::from_value(json!({"id": 3})).unwrap();
        assert_eq!(single.tag_list, vec!["rust", "webdev"]);
        assert_eq!(listed.tag_list, vec!["go"]);
        assert!(missing.tag_list.is_empty());
    }

    async fn stub() -> (String, Recorder) {
        let recorder = Recorder::new();
        let router = Router::new()
            .route(
                "/articles",
                post(|State(r): State<Recorder>, h: HeaderMap, Json(body): Json<Value>| async move {
                    r.record("create", None, &h, body);
                    (
                        StatusCode::CREATED,
                        Json(json!({"id": 31, "title": "T", "url": "https://dev.to/me/t-1"})),
                    )
                }),
            )
            .route(
                "/articles/31",
                put(|State(r): State<Recorder>, h: HeaderMap, Json(body): Json<Value>| async move {
                    r.record("update", None, &h, body);
                    Json(json!({"id": 31, "url": "https://dev.to/me/t-1"}))
                }),
            )
            .route(
                "/articles/me/all",
                get(|State(r): State<Recorder>, RawQuery(q): RawQuery, h: HeaderMap| async move {
                    r.record("list", q, &h, Value::Null);
                    Json(json!([{"id": 31, "title": "T", "published": true, "published_at": "2024-01-01T00:00:00Z", "tag_list": ["rust"]}]))
                }),
            )
            .route(
                "/articles/99",
                get(|| async {
                    (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        Json(json!({"error": "Tag list exceed the maximum of 4 tags", "status": 422})),
                    )
                }),
            )
            .with_state(recorder.clone());
        (spawn_stub(router).await, recorder)
    }

    fn adapter(base: &str) -> DevToAdapter {
        DevToAdapter::new(Client::new(), "key-1").unwrap().with_base_url(base)
    }

    #[tokio::test]
    async fn test_create_sends_article_envelope() {
        let (base, recorder) = stub().await;
        let options = DevToOptions {
            published: true,
            tags: vec!["rust".into()],
            description: Some("About".into()),
        };
        let result = adapter(&base).create_post("T", "# Hi", &options).await.unwrap();
        assert_eq!(result.id, "31");
        assert_eq!(result.url.as_deref(), Some("https://dev.to/me/t-1"));

        let req = recorder.find("create").unwrap();
        assert_eq!(req.header("api-key"), Some("key-1"));
        assert_eq!(
            req.body,
            json!({"article": {
                "title": "T", "published": true, "body_markdown": "# Hi",
                "tags": ["rust"], "description": "About"
            }})
        );
    }

    #[tokio::test]
    async fn test_update_omits_empty_optionals() {
        let (base, recorder) = stub().await;
        adapter(&base)
            .update_post(&31, "T", "body", &DevToOptions::default())
            .await
            .unwrap();
        let body = recorder.find("update").unwrap().body;
        assert_eq!(body["article"]["published"], false);
        assert!(body["article"].get("tags").is_none());
        assert!(body["article"].get("description").is_none());
    }

    #[tokio::test]
    async fn test_list_uses_my_articles() {
        let (base, recorder) = stub().await;
        let posts = adapter(&base).get_posts(5).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].summary().published_at.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(
            recorder.find("list").unwrap().query.as_deref(),
            Some("page=1&per_page=5")
        );
    }

    #[tokio::test]
    async fn test_error_field_is_surfaced() {
        let (base, _) = stub().await;
        let err = adapter(&base).get_post(&99).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Dev.to API error: Tag list exceed the maximum of 4 tags"
        );
    }

    #[test]
    fn test_into_payload_is_markdown() {
        let article: DevToArticle = serde_json::from_value(json!({
            "id": 8, "title": "T", "body_markdown": "*x*", "published": false,
            "description": "d", "tag_list": "a, b"
        }))
        .unwrap();
        let payload = article.into_payload();
        assert_eq!(payload.content_format, ContentFormat::Markdown);
        assert_eq!(payload.status, PostStatus::Draft);
        assert_eq!(payload.tags, vec!["a", "b"]);
        assert_eq!(payload.edit_target(), Some("8"));
    }
}
