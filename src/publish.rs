//! Publish router
//!
//! Resolves a blog's credentials, builds the matching adapter through the
//! [`Connector`], converts the post for the platform and dispatches create or
//! update. Nothing here retries: publishing is not idempotent server-side.

use crate::config::{BlogConfig, BlogTarget, Platform};
use crate::credentials::{BlogCredential, CredentialVault};
use crate::error::AppError;
use crate::format::markdown_to_html;
use crate::oauth::AccessTokenSource;
use crate::platforms::devto::normalize_tags;
use crate::platforms::{
    numeric_id, BloggerApi, BloggerOptions, Connector, DevToApi, DevToOptions, GhostApi,
    GhostOptions, GhostStatus, NativePost, PostSummary, PublishAdapter, PublishedPost,
    SubstackApi, SubstackOptions, WordPressApi, WordPressOptions,
};
use crate::post::{parse_publish_date, to_rfc3339, ContentFormat, PostPayload, PostStatus};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_LIST_COUNT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishAction {
    Created,
    Updated,
}

/// Where the post ended up on the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishState {
    Draft,
    Published,
    Scheduled,
    Pending,
    Private,
}

impl From<PostStatus> for PublishState {
    fn from(status: PostStatus) -> Self {
        match status {
            PostStatus::Draft => PublishState::Draft,
            PostStatus::Publish => PublishState::Published,
            PostStatus::Pending => PublishState::Pending,
            PostStatus::Private => PublishState::Private,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    pub blog_name: String,
    pub platform: Platform,
    pub post: PublishedPost,
    pub action: PublishAction,
    pub state: PublishState,
}

impl PublishOutcome {
    /// Human-readable status line, with the URL on a second line when known
    pub fn summary(&self) -> String {
        let blog = &self.blog_name;
        let mut line = match (self.action, self.state) {
            (PublishAction::Updated, _) => format!("Post updated successfully on \"{}\"!", blog),
            (PublishAction::Created, state) => {
                let what = match state {
                    PublishState::Draft => format!("saved as draft successfully to \"{}\"", blog),
                    PublishState::Published => format!("published successfully to \"{}\"", blog),
                    PublishState::Scheduled => format!("scheduled successfully on \"{}\"", blog),
                    PublishState::Pending => format!("submitted for review on \"{}\"", blog),
                    PublishState::Private => format!("published privately to \"{}\"", blog),
                };
                format!("Post {}! Post ID: {}", what, self.post.id)
            }
        };
        if let Some(url) = &self.post.url {
            line.push_str("\nURL: ");
            line.push_str(url);
        }
        line
    }
}

impl fmt::Display for PublishOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Result of a local configuration check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlogCheck {
    pub ok: bool,
    pub message: String,
}

/// Content converted into the format a platform accepts
///
/// Dev.to takes Markdown only and rejects HTML-authored posts; every other
/// platform takes HTML, converting Markdown when needed.
pub fn prepare_for_platform(payload: &PostPayload, platform: Platform) -> Result<String, AppError> {
    match (platform, payload.content_format) {
        (Platform::DevTo, ContentFormat::Markdown) => Ok(payload.content.clone()),
        (Platform::DevTo, ContentFormat::Html) => Err(AppError::FormatMismatch(
            "Dev.to publishing requires Markdown content. Switch \"Content format\" to Markdown and try again."
                .to_string(),
        )),
        (_, ContentFormat::Markdown) => Ok(markdown_to_html(&payload.content)),
        (_, ContentFormat::Html) => Ok(payload.content.clone()),
    }
}

fn missing_credential(blog: &BlogConfig) -> AppError {
    let name = &blog.name;
    let what = match blog.platform {
        Platform::WordPress => "No WordPress application password",
        Platform::Ghost => "No Ghost Admin API key",
        Platform::Substack => "No Substack cookie or email/password",
        Platform::DevTo => "No Dev.to API key",
        Platform::Blogger => {
            return AppError::Configuration(
                "Not signed in to Google. Run `liveblog login`.".to_string(),
            )
        }
    };
    AppError::Configuration(format!(
        "{} stored for \"{}\". Run `liveblog credential set --blog \"{}\"`.",
        what, name, name
    ))
}

/// A connected adapter for one configured blog
enum Connected {
    WordPress(Box<dyn WordPressApi>),
    Blogger(Box<BloggerApi>),
    Ghost(Box<GhostApi>),
    Substack(Box<SubstackApi>),
    DevTo(Box<DevToApi>),
}

async fn dispatch<A>(
    api: &A,
    id: Option<A::PostId>,
    title: &str,
    content: &str,
    options: &A::Options,
) -> Result<(PublishedPost, PublishAction), AppError>
where
    A: PublishAdapter + ?Sized,
{
    match id {
        Some(id) => Ok((
            api.update_post(&id, title, content, options).await?,
            PublishAction::Updated,
        )),
        None => Ok((
            api.create_post(title, content, options).await?,
            PublishAction::Created,
        )),
    }
}

async fn summaries<A>(api: &A, count: usize) -> Result<Vec<PostSummary>, AppError>
where
    A: PublishAdapter + ?Sized,
{
    Ok(api
        .get_posts(count)
        .await?
        .iter()
        .map(NativePost::summary)
        .collect())
}

pub struct Publisher {
    vault: CredentialVault,
    tokens: Arc<dyn AccessTokenSource>,
    connector: Arc<dyn Connector>,
}

impl Publisher {
    pub fn new(vault: CredentialVault, tokens: Arc<dyn AccessTokenSource>, connector: Arc<dyn Connector>) -> Self {
        Self {
            vault,
            tokens,
            connector,
        }
    }

    async fn google_token(&self) -> Result<String, AppError> {
        self.tokens.access_token().await.map_err(|e| match e {
            AppError::Configuration(_) => e,
            other => AppError::Authentication(format!(
                "Failed to authenticate with Google: {}. Run `liveblog login` and try again.",
                other
            )),
        })
    }

    async fn connect(&self, blog: &BlogConfig, target: &BlogTarget) -> Result<Connected, AppError> {
        debug!("Connecting to {} blog \"{}\"", target.platform(), blog.name);

        if let BlogTarget::Blogger { blog_id } = target {
            let token = self.google_token().await?;
            return Ok(Connected::Blogger(self.connector.blogger(blog_id, &token)?));
        }

        let credential = self
            .vault
            .resolve(blog.platform, &blog.name)
            .await?
            .ok_or_else(|| missing_credential(blog))?;

        Ok(match (target, credential) {
            (BlogTarget::WordPress { site_url, username }, BlogCredential::WordPress { password }) => {
                Connected::WordPress(self.connector.wordpress(site_url, username, &password)?)
            }
            (BlogTarget::Ghost { site_url }, BlogCredential::Ghost { api_key }) => {
                Connected::Ghost(self.connector.ghost(site_url, &api_key)?)
            }
            (BlogTarget::Substack { hostname }, BlogCredential::Substack(auth)) => {
                debug!("Substack auth method: {}", auth.method());
                Connected::Substack(self.connector.substack(hostname, auth)?)
            }
            (BlogTarget::DevTo, BlogCredential::DevTo { api_key }) => {
                Connected::DevTo(self.connector.devto(&api_key)?)
            }
            _ => return Err(missing_credential(blog)),
        })
    }

    /// Publish or update `payload` on `blog`
    ///
    /// An edit draft bound to a post id updates that post; anything else
    /// creates a new one. Format and id checks run before any credential
    /// lookup or network call.
    pub async fn publish(&self, blog: &BlogConfig, payload: &PostPayload) -> Result<PublishOutcome, AppError> {
        let target = blog.target()?;
        let platform = target.platform();
        let content = prepare_for_platform(payload, platform)?;
        let title = payload.title.as_str();

        let edit_id = payload.edit_target();
        let numeric_edit_id = match platform {
            Platform::WordPress | Platform::DevTo => edit_id.map(|raw| numeric_id(platform, raw)).transpose()?,
            _ => None,
        };
        let string_edit_id = edit_id.map(str::to_string);
        let publish_at = payload.publish_date().and_then(parse_publish_date);

        let (post, action, state) = match self.connect(blog, &target).await? {
            Connected::WordPress(api) => {
                let options = WordPressOptions {
                    status: Some(payload.status),
                    date: payload.publish_date().map(str::to_string),
                    excerpt: payload.excerpt().map(str::to_string),
                    tags: payload.tags.clone(),
                    categories: payload.categories.clone(),
                };
                let (post, action) = dispatch(api.as_ref(), numeric_edit_id, title, &content, &options).await?;
                (post, action, PublishState::from(payload.status))
            }
            Connected::Blogger(api) => {
                let is_draft = payload.status == PostStatus::Draft;
                let options = BloggerOptions {
                    is_draft,
                    published: publish_at
                        .filter(|_| payload.status == PostStatus::Publish)
                        .map(|dt| to_rfc3339(&dt)),
                    labels: payload.merged_taxonomy(),
                };
                let (post, action) = dispatch(api.as_ref(), string_edit_id, title, &content, &options).await?;
                let state = if is_draft {
                    PublishState::Draft
                } else {
                    PublishState::Published
                };
                (post, action, state)
            }
            Connected::Ghost(api) => {
                let status = GhostStatus::for_post(payload.status, publish_at.is_some());
                let options = GhostOptions {
                    status,
                    tags: payload.merged_taxonomy(),
                    excerpt: payload.excerpt().map(str::to_string),
                    published_at: publish_at.map(|dt| to_rfc3339(&dt)),
                };
                let (post, action) = dispatch(api.as_ref(), string_edit_id, title, &content, &options).await?;
                let state = match status {
                    GhostStatus::Draft => PublishState::Draft,
                    GhostStatus::Published => PublishState::Published,
                    GhostStatus::Scheduled => PublishState::Scheduled,
                };
                (post, action, state)
            }
            Connected::Substack(api) => {
                let is_draft = payload.status != PostStatus::Publish;
                let options = SubstackOptions {
                    is_draft,
                    subtitle: payload.excerpt().map(str::to_string),
                    published_at: publish_at.map(|dt| to_rfc3339(&dt)),
                };
                let (post, action) = dispatch(api.as_ref(), string_edit_id, title, &content, &options).await?;
                let state = if is_draft {
                    PublishState::Draft
                } else {
                    PublishState::Published
                };
                (post, action, state)
            }
            Connected::DevTo(api) => {
                let published = payload.status == PostStatus::Publish;
                let options = DevToOptions {
                    published,
                    tags: normalize_tags(&payload.merged_taxonomy()),
                    description: payload.excerpt().map(str::to_string),
                };
                let (post, action) = dispatch(api.as_ref(), numeric_edit_id, title, &content, &options).await?;
                let state = if published {
                    PublishState::Published
                } else {
                    PublishState::Draft
                };
                (post, action, state)
            }
        };

        info!(
            "{:?} {} post {} on \"{}\"",
            action, platform, post.id, blog.name
        );
        Ok(PublishOutcome {
            blog_name: blog.name.clone(),
            platform,
            post,
            action,
            state,
        })
    }

    /// Most recent posts of a blog
    pub async fn list_posts(&self, blog: &BlogConfig, count: usize) -> Result<Vec<PostSummary>, AppError> {
        let target = blog.target()?;
        match self.connect(blog, &target).await? {
            Connected::WordPress(api) => summaries(api.as_ref(), count).await,
            Connected::Blogger(api) => summaries(api.as_ref(), count).await,
            Connected::Ghost(api) => summaries(api.as_ref(), count).await,
            Connected::Substack(api) => summaries(api.as_ref(), count).await,
            Connected::DevTo(api) => summaries(api.as_ref(), count).await,
        }
    }

    /// Fetch an existing post as an edit draft bound to it
    pub async fn load_for_edit(&self, blog: &BlogConfig, post_id: &str) -> Result<PostPayload, AppError> {
        let target = blog.target()?;
        let platform = target.platform();
        let numeric = match platform {
            Platform::WordPress | Platform::DevTo => Some(numeric_id(platform, post_id)?),
            _ => None,
        };
        let id = post_id.trim().to_string();

        let payload = match (self.connect(blog, &target).await?, numeric) {
            (Connected::WordPress(api), Some(numeric)) => {
                let post = api.get_post(&numeric).await?;
                let tags = api.tag_names(&post.tags).await;
                let categories = api.category_names(&post.categories).await;
                PostPayload {
                    tags,
                    categories,
                    ..post.into_payload()
                }
            }
            (Connected::DevTo(api), Some(numeric)) => api.get_post(&numeric).await?.into_payload(),
            (Connected::Blogger(api), _) => api.get_post(&id).await?.into_payload(),
            (Connected::Ghost(api), _) => api.get_post(&id).await?.into_payload(),
            (Connected::Substack(api), _) => api.get_post(&id).await?.into_payload(),
            (Connected::WordPress(_) | Connected::DevTo(_), None) => {
                return Err(AppError::InvalidInput(format!(
                    "{} post IDs are numeric, got \"{}\"",
                    platform, post_id
                )))
            }
        };
        Ok(payload)
    }

    /// Validate a blog's fields and credential presence without any network call
    pub async fn check_blog(&self, blog: &BlogConfig) -> BlogCheck {
        let target = match blog.target() {
            Ok(target) => target,
            Err(e) => {
                return BlogCheck {
                    ok: false,
                    message: e.to_string(),
                }
            }
        };

        let ready = match target {
            BlogTarget::Blogger { .. } => Ok(self.tokens.is_authenticated().await),
            _ => self.vault.has_credential(blog.platform, &blog.name).await,
        };

        match ready {
            Ok(true) => BlogCheck {
                ok: true,
                message: format!("{} blog \"{}\" is ready to publish.", blog.platform, blog.name),
            },
            Ok(false) => BlogCheck {
                ok: false,
                message: missing_credential(blog).to_string(),
            },
            Err(e) => BlogCheck {
                ok: false,
                message: e.to_string(),
            },
        }
    }
}
