//! Blogger v3 API adapter (OAuth bearer token)

use super::{flexible_id, NativePost, PostSummary, PublishAdapter, PublishedPost};
use crate::config::Platform;
use crate::error::AppError;
use crate::http::{expect_success, read_json, transport_error};
use crate::post::{ContentFormat, PostPayload, PostStatus};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const BLOGGER_API_BASE: &str = "https://www.googleapis.com/blogger/v3";
const ERROR_POINTERS: &[&str] = &["/error/message"];

#[derive(Debug, Clone, Default)]
pub struct BloggerOptions {
    /// Create as draft (`isDraft` query parameter); ignored on update
    pub is_draft: bool,
    /// RFC 3339 publish time
    pub published: Option<String>,
    pub labels: Vec<String>,
}

#[derive(Debug, Serialize)]
struct BlogRef<'a> {
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct PostBody<'a> {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    blog: BlogRef<'a>,
    title: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    published: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BloggerPost {
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    /// LIVE, DRAFT or SCHEDULED
    #[serde(default)]
    pub status: Option<String>,
}

impl NativePost for BloggerPost {
    fn summary(&self) -> PostSummary {
        PostSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            published_at: self.published.clone(),
        }
    }

    fn into_payload(self) -> PostPayload {
        let status = if self.status.as_deref() == Some("DRAFT") {
            PostStatus::Draft
        } else {
            PostStatus::Publish
        };
        PostPayload {
            title: self.title,
            content: self.content,
            content_format: ContentFormat::Html,
            status,
            publish_date: self.published,
            tags: self.labels,
            categories: Vec::new(),
            excerpt: None,
            published_post_id: Some(self.id),
            is_edit_draft: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostList {
    #[serde(default)]
    items: Vec<BloggerPost>,
}

pub struct BloggerAdapter {
    http: Client,
    api_base: String,
    blog_id: String,
    access_token: String,
}

impl BloggerAdapter {
    pub fn new(http: Client, blog_id: &str, access_token: &str) -> Self {
        Self {
            http,
            api_base: BLOGGER_API_BASE.to_string(),
            blog_id: blog_id.to_string(),
            access_token: access_token.to_string(),
        }
    }

    pub fn with_base_url(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    fn posts_url(&self) -> String {
        format!("{}/blogs/{}/posts", self.api_base, self.blog_id)
    }

    async fn send<T: serde::de::DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, AppError> {
        let resp = builder
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(transport_error)?;
        let resp = expect_success(Platform::Blogger, resp, ERROR_POINTERS).await?;
        read_json(Platform::Blogger, resp).await
    }

    fn body<'a>(&'a self, id: Option<&'a str>, title: &'a str, content: &'a str, options: &'a BloggerOptions) -> PostBody<'a> {
        PostBody {
            kind: "blogger#post",
            id,
            blog: BlogRef { id: &self.blog_id },
            title,
            content,
            labels: (!options.labels.is_empty()).then_some(options.labels.as_slice()),
            published: options.published.as_deref(),
        }
    }
}

fn published(post: BloggerPost) -> PublishedPost {
    PublishedPost {
        id: post.id,
        url: post.url,
    }
}

#[async_trait]
impl PublishAdapter for BloggerAdapter {
    type PostId = String;
    type Options = BloggerOptions;
    type Post = BloggerPost;

    fn platform(&self) -> Platform {
        Platform::Blogger
    }

    async fn create_post(&self, title: &str, content: &str, options: &BloggerOptions) -> Result<PublishedPost, AppError> {
        let mut request = self
            .http
            .post(self.posts_url())
            .json(&self.body(None, title, content, options));
        if options.is_draft {
            request = request.query(&[("isDraft", "true")]);
        }
        debug!("Creating Blogger post in blog {} (draft: {})", self.blog_id, options.is_draft);
        let post: BloggerPost = self.send(request).await?;
        Ok(published(post))
    }

    async fn update_post(
        &self,
        id: &String,
        title: &str,
        content: &str,
        options: &BloggerOptions,
    ) -> Result<PublishedPost, AppError> {
        debug!("Updating Blogger post {}", id);
        let post: BloggerPost = self
            .send(
                self.http
                    .put(format!("{}/{}", self.posts_url(), id))
                    .json(&self.body(Some(id.as_str()), title, content, options)),
            )
            .await?;
        Ok(published(post))
    }

    async fn get_post(&self, id: &String) -> Result<BloggerPost, AppError> {
        self.send(self.http.get(format!("{}/{}", self.posts_url(), id)))
            .await
    }

    async fn get_posts(&self, count: usize) -> Result<Vec<BloggerPost>, AppError> {
        let max = count.to_string();
        let list: PostList = self
            .send(
                self.http
                    .get(self.posts_url())
                    .query(&[("maxResults", max.as_str()), ("status", "live")]),
            )
            .await?;
        Ok(list.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{spawn_stub, Recorder};
    use axum::extract::{RawQuery, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, put};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn stub() -> (String, Recorder) {
        let recorder = Recorder::new();
        let router = Router::new()
            .route(
                "/blogs/123/posts",
                get(|State(r): State<Recorder>, RawQuery(q): RawQuery, h: HeaderMap| async move {
                    r.record("list", q, &h, Value::Null);
                    Json(json!({"kind": "blogger#postList"}))
                })
                .post(
                    |State(r): State<Recorder>, RawQuery(q): RawQuery, h: HeaderMap, Json(body): Json<Value>| async move {
                        r.record("create", q, &h, body);
                        Json(json!({"id": "555", "url": "https://b.example/p/555.html", "title": "T"}))
                    },
                ),
            )
            .route(
                "/blogs/123/posts/555",
                put(|State(r): State<Recorder>, h: HeaderMap, Json(body): Json<Value>| async move {
                    r.record("update", None, &h, body);
                    Json(json!({"id": "555"}))
                }),
            )
            .route(
                "/blogs/123/posts/missing",
                get(|| async {
                    (
                        StatusCode::NOT_FOUND,
                        Json(json!({"error": {"code": 404, "message": "Not Found"}})),
                    )
                }),
            )
            .with_state(recorder.clone());
        (spawn_stub(router).await, recorder)
    }

    fn adapter(base: &str) -> BloggerAdapter {
        BloggerAdapter::new(Client::new(), "123", "tok").with_base_url(base)
    }

    #[tokio::test]
    async fn test_draft_create_uses_query_flag() {
        let (base, recorder) = stub().await;
        let options = BloggerOptions {
            is_draft: true,
            labels: vec!["rust".into()],
            ..Default::default()
        };
        let result = adapter(&base).create_post("T", "C", &options).await.unwrap();
        assert_eq!(result.id, "555");

        let req = recorder.find("create").unwrap();
        assert_eq!(req.query.as_deref(), Some("isDraft=true"));
        assert_eq!(req.body["kind"], "blogger#post");
        assert_eq!(req.body["blog"]["id"], "123");
        assert_eq!(req.body["labels"], json!(["rust"]));
        assert!(req.body.get("published").is_none());
        assert_eq!(req.header("authorization"), Some("Bearer tok"));
    }

    #[tokio::test]
    async fn test_live_create_has_no_draft_flag() {
        let (base, recorder) = stub().await;
        let options = BloggerOptions {
            published: Some("2024-05-01T08:00:00.000Z".into()),
            ..Default::default()
        };
        adapter(&base).create_post("T", "C", &options).await.unwrap();
        let req = recorder.find("create").unwrap();
        assert_eq!(req.query, None);
        assert_eq!(req.body["published"], "2024-05-01T08:00:00.000Z");
        assert!(req.body.get("labels").is_none());
    }

    #[tokio::test]
    async fn test_update_carries_post_id() {
        let (base, recorder) = stub().await;
        adapter(&base)
            .update_post(&"555".to_string(), "T", "C", &BloggerOptions::default())
            .await
            .unwrap();
        assert_eq!(recorder.find("update").unwrap().body["id"], "555");
    }

    #[tokio::test]
    async fn test_list_without_items_is_empty() {
        let (base, recorder) = stub().await;
        assert!(adapter(&base).get_posts(10).await.unwrap().is_empty());
        assert_eq!(
            recorder.find("list").unwrap().query.as_deref(),
            Some("maxResults=10&status=live")
        );
    }

    #[tokio::test]
    async fn test_structured_error() {
        let (base, _) = stub().await;
        let err = adapter(&base)
            .get_post(&"missing".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Blogger API error: Not Found");
    }

    #[test]
    fn test_into_payload_maps_labels_and_draft_status() {
        let post: BloggerPost = serde_json::from_value(json!({
            "id": "9", "title": "T", "content": "<p>x</p>",
            "labels": ["a", "b"], "status": "DRAFT"
        }))
        .unwrap();
        let payload = post.into_payload();
        assert_eq!(payload.tags, vec!["a", "b"]);
        assert_eq!(payload.status, PostStatus::Draft);
        assert_eq!(payload.edit_target(), Some("9"));
    }
}
