//! Substack adapter
//!
//! Substack has no public write API; this talks to the endpoints its web
//! editor uses. Auth is a `connect.sid` cookie, either supplied directly or
//! obtained by logging in with email and password. The cookie goes on both
//! the global (`substack.com`) and publication-scoped API bases.
//!
//! Publishing is two-step: a draft is created with a structured document
//! body, then validated (`prepublish`) and published unless kept as a draft.

use super::{flexible_id, NativePost, PostSummary, PublishAdapter, PublishedPost};
use crate::config::Platform;
use crate::credentials::SubstackAuth;
use crate::error::AppError;
use crate::http::{expect_success, read_json, transport_error};
use crate::post::{ContentFormat, PostPayload, PostStatus};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::LazyLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const SUBSTACK_API_BASE: &str = "https://substack.com/api/v1";
const ERROR_POINTERS: &[&str] = &["/message", "/error"];
const SESSION_COOKIE: &str = "connect.sid";

static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</p>|<br\s*/?>").unwrap());
static PARAGRAPH_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<p[^>]*>").unwrap());
static HEADING_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<h([1-3])").unwrap());
static HEADING_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</h([1-3])>").unwrap());
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static HEADINGS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").unwrap(),
        Regex::new(r"(?is)<h2[^>]*>(.*?)</h2>").unwrap(),
        Regex::new(r"(?is)<h3[^>]*>(.*?)</h3>").unwrap(),
    ]
});

fn text_node(text: &str) -> Value {
    json!([{"type": "text", "text": text}])
}

/// Convert HTML into Substack's ProseMirror-style document
///
/// Blocks are split on `</p>`, `<br>` and around `h1`-`h3`. Those headings
/// become heading nodes, anything else a plain-text paragraph. Inline
/// formatting, lists and images are lost.
pub fn html_to_document(html: &str) -> Value {
    let mut content = Vec::new();

    let html = HEADING_OPEN.replace_all(html, "</p><h$1");
    let html = HEADING_CLOSE.replace_all(&html, "</h$1></p>");

    for block in BLOCK_BREAK.split(&html) {
        let block = PARAGRAPH_OPEN.replace_all(block, "");
        let block = block.trim();
        if block.is_empty() {
            continue;
        }

        let heading = HEADINGS
            .iter()
            .zip(1u8..)
            .find_map(|(re, level)| re.captures(block).map(|c| (level, c[1].to_string())));

        match heading {
            Some((level, inner)) => content.push(json!({
                "type": "heading",
                "attrs": {"level": level},
                "content": text_node(&ANY_TAG.replace_all(&inner, "")),
            })),
            None => {
                let text = ANY_TAG.replace_all(block, "");
                if !text.trim().is_empty() {
                    content.push(json!({"type": "paragraph", "content": text_node(&text)}));
                }
            }
        }
    }

    if content.is_empty() {
        content.push(json!({"type": "paragraph", "content": text_node("")}));
    }
    json!({"type": "doc", "content": content})
}

#[derive(Debug, Clone, Default)]
pub struct SubstackOptions {
    pub is_draft: bool,
    pub subtitle: Option<String>,
    /// Accepted for parity with the other platforms; Substack schedules from its own UI
    pub published_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct Byline {
    id: u64,
    is_guest: bool,
}

#[derive(Debug, Serialize)]
struct DraftBody<'a> {
    draft_title: &'a str,
    draft_subtitle: &'a str,
    draft_body: String,
    draft_bylines: Vec<Byline>,
    audience: &'static str,
    write_comment_permissions: &'static str,
    section_chosen: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubstackPost {
    #[serde(deserialize_with = "flexible_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub draft_title: Option<String>,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub draft_subtitle: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub canonical_url: Option<String>,
    #[serde(default)]
    pub body_html: Option<String>,
    #[serde(default)]
    pub post_date: Option<String>,
    #[serde(default)]
    pub is_published: bool,
}

impl SubstackPost {
    fn display_title(&self) -> String {
        self.title
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| self.draft_title.clone())
            .unwrap_or_default()
    }
}

impl NativePost for SubstackPost {
    fn summary(&self) -> PostSummary {
        PostSummary {
            id: self.id.clone(),
            title: self.display_title(),
            published_at: self.post_date.clone(),
        }
    }

    fn into_payload(self) -> PostPayload {
        let title = self.display_title();
        let status = if self.is_published {
            PostStatus::Publish
        } else {
            PostStatus::Draft
        };
        PostPayload {
            title,
            content: self.body_html.unwrap_or_default(),
            content_format: ContentFormat::Html,
            status,
            publish_date: self.post_date,
            tags: Vec::new(),
            categories: Vec::new(),
            excerpt: self.subtitle.or(self.draft_subtitle),
            published_post_id: Some(self.id),
            is_edit_draft: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(default)]
    id: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing {
    Wrapped { posts: Vec<SubstackPost> },
    Bare(Vec<SubstackPost>),
}

#[derive(Default)]
struct Session {
    cookie: Option<String>,
    user_id: Option<u64>,
}

pub struct SubstackAdapter {
    http: Client,
    global_base: String,
    publication_base: String,
    hostname: String,
    auth: SubstackAuth,
    session: Mutex<Session>,
}

impl SubstackAdapter {
    pub fn new(http: Client, hostname: &str, auth: SubstackAuth) -> Self {
        let cookie = match &auth {
            SubstackAuth::Cookie(value) => Some(value.clone()),
            SubstackAuth::Login { .. } => None,
        };
        Self {
            http,
            global_base: SUBSTACK_API_BASE.to_string(),
            publication_base: format!("https://{}/api/v1", hostname),
            hostname: hostname.to_string(),
            auth,
            session: Mutex::new(Session {
                cookie,
                user_id: None,
            }),
        }
    }

    pub fn with_base_urls(mut self, global: &str, publication: &str) -> Self {
        self.global_base = global.trim_end_matches('/').to_string();
        self.publication_base = publication.trim_end_matches('/').to_string();
        self
    }

    fn auth_hint(&self) -> &'static str {
        match self.auth {
            SubstackAuth::Login { .. } => "Please check your email/password credentials.",
            SubstackAuth::Cookie(_) => {
                "You may need to obtain a fresh connect.sid cookie from your browser."
            }
        }
    }

    /// Append the auth-method hint to platform errors
    fn hinted(&self, err: AppError) -> AppError {
        match err {
            AppError::PlatformApi {
                platform,
                status,
                message,
            } => AppError::PlatformApi {
                platform,
                status,
                message: format!("{}. {}", message.trim_end_matches('.'), self.auth_hint()),
            },
            other => other,
        }
    }

    async fn login(&self, email: &str, password: &str) -> Result<String, AppError> {
        info!("Logging in to Substack with email and password");
        let resp = self
            .http
            .post(format!("{}/login", self.global_base))
            .json(&json!({
                "captcha_response": null,
                "email": email,
                "for_pub": "",
                "password": password,
                "redirect": "/",
            }))
            .send()
            .await
            .map_err(transport_error)?;

        let resp = expect_success(Platform::Substack, resp, ERROR_POINTERS)
            .await
            .map_err(|e| match e {
                AppError::PlatformApi { message, .. } => {
                    AppError::Authentication(format!("Failed to login to Substack: {}", message))
                }
                other => other,
            })?;

        session_cookie(&resp).ok_or_else(|| {
            AppError::Authentication(
                "Failed to login to Substack: no session cookie in the response".to_string(),
            )
        })
    }

    /// Cookie and user id, logging in and resolving the profile at most once
    async fn session(&self) -> Result<(String, u64), AppError> {
        let mut session = self.session.lock().await;

        let cookie = match (&session.cookie, &self.auth) {
            (Some(cookie), _) => cookie.clone(),
            (None, SubstackAuth::Login { email, password }) => {
                let cookie = self.login(email, password).await?;
                session.cookie = Some(cookie.clone());
                cookie
            }
            (None, SubstackAuth::Cookie(cookie)) => cookie.clone(),
        };

        let user_id = match session.user_id {
            Some(id) => id,
            None => {
                let profile: Profile = self
                    .send(
                        self.http.get(format!("{}/user/profile/self", self.global_base)),
                        &cookie,
                    )
                    .await?;
                let id = profile.id.ok_or_else(|| {
                    AppError::Parse("Failed to retrieve user ID from Substack profile".to_string())
                })?;
                debug!("Substack user id {}", id);
                session.user_id = Some(id);
                id
            }
        };

        Ok((cookie, user_id))
    }

    async fn execute(&self, builder: RequestBuilder, cookie: &str) -> Result<Response, AppError> {
        let resp = builder
            .header(COOKIE, format!("{}={}", SESSION_COOKIE, cookie))
            .send()
            .await
            .map_err(transport_error)?;
        expect_success(Platform::Substack, resp, ERROR_POINTERS)
            .await
            .map_err(|e| self.hinted(e))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, cookie: &str) -> Result<T, AppError> {
        let resp = self.execute(builder, cookie).await?;
        read_json(Platform::Substack, resp).await
    }

    fn draft_body<'a>(&self, title: &'a str, content: &str, options: &'a SubstackOptions, user_id: u64) -> DraftBody<'a> {
        DraftBody {
            draft_title: title,
            draft_subtitle: options.subtitle.as_deref().unwrap_or(""),
            draft_body: html_to_document(content).to_string(),
            draft_bylines: vec![Byline {
                id: user_id,
                is_guest: false,
            }],
            audience: "everyone",
            write_comment_permissions: "everyone",
            section_chosen: true,
        }
    }

    /// Validate and publish an existing draft
    async fn publish_draft(&self, draft_id: &str, cookie: &str, send_email: bool) -> Result<SubstackPost, AppError> {
        self.execute(
            self.http
                .get(format!("{}/drafts/{}/prepublish", self.publication_base, draft_id)),
            cookie,
        )
        .await?;

        self.send(
            self.http
                .post(format!("{}/drafts/{}/publish", self.publication_base, draft_id))
                .json(&json!({"send": send_email, "share_automatically": false})),
            cookie,
        )
        .await
    }

    fn post_url(&self, post: &SubstackPost) -> Option<String> {
        post.canonical_url
            .clone()
            .filter(|u| !u.is_empty())
            .or_else(|| {
                post.slug
                    .as_ref()
                    .map(|slug| format!("https://{}/p/{}", self.hostname, slug))
            })
    }

    fn published(&self, post: SubstackPost) -> PublishedPost {
        PublishedPost {
            url: self.post_url(&post),
            id: post.id,
        }
    }
}

/// Pull the `connect.sid` value out of the response's `Set-Cookie` headers
fn session_cookie(resp: &Response) -> Option<String> {
    resp.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.trim().strip_prefix("connect.sid="))
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl PublishAdapter for SubstackAdapter {
    type PostId = String;
    type Options = SubstackOptions;
    type Post = SubstackPost;

    fn platform(&self) -> Platform {
        Platform::Substack
    }

    async fn create_post(&self, title: &str, content: &str, options: &SubstackOptions) -> Result<PublishedPost, AppError> {
        let (cookie, user_id) = self.session().await?;

        let draft: SubstackPost = self
            .send(
                self.http
                    .post(format!("{}/drafts", self.publication_base))
                    .json(&self.draft_body(title, content, options, user_id)),
                &cookie,
            )
            .await?;
        debug!("Created Substack draft {}", draft.id);

        if options.is_draft {
            return Ok(self.published(draft));
        }
        let post = self.publish_draft(&draft.id, &cookie, true).await?;
        Ok(self.published(post))
    }

    /// Re-publishing an update never emails subscribers again
    async fn update_post(
        &self,
        id: &String,
        title: &str,
        content: &str,
        options: &SubstackOptions,
    ) -> Result<PublishedPost, AppError> {
        let (cookie, user_id) = self.session().await?;

        let draft: SubstackPost = self
            .send(
                self.http
                    .put(format!("{}/drafts/{}", self.publication_base, id))
                    .json(&self.draft_body(title, content, options, user_id)),
                &cookie,
            )
            .await?;
        debug!("Updated Substack draft {}", draft.id);

        if options.is_draft {
            return Ok(self.published(draft));
        }
        let post = self.publish_draft(id, &cookie, false).await?;
        Ok(self.published(post))
    }

    async fn get_post(&self, id: &String) -> Result<SubstackPost, AppError> {
        let (cookie, _) = self.session().await?;
        self.send(
            self.http
                .get(format!("{}/drafts/{}", self.publication_base, id)),
            &cookie,
        )
        .await
    }

    async fn get_posts(&self, count: usize) -> Result<Vec<SubstackPost>, AppError> {
        let (cookie, _) = self.session().await?;
        let limit = count.to_string();
        let listing: Listing = self
            .send(
                self.http
                    .get(format!("{}/post_management/published", self.publication_base))
                    .query(&[
                        ("offset", "0"),
                        ("limit", limit.as_str()),
                        ("order_by", "post_date"),
                        ("order_direction", "desc"),
                    ]),
                &cookie,
            )
            .await?;
        Ok(match listing {
            Listing::Wrapped { posts } | Listing::Bare(posts) => posts,
        })
    }
}
