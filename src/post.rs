//! Normalized, adapter-agnostic post model

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Authoring format of `PostPayload::content`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    #[default]
    Html,
    Markdown,
}

/// Requested post status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    #[serde(alias = "published")]
    Publish,
    Pending,
    Private,
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PostStatus::Draft => "draft",
            PostStatus::Publish => "publish",
            PostStatus::Pending => "pending",
            PostStatus::Private => "private",
        })
    }
}

/// A post as authored by the user, independent of any platform
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPayload {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub content_format: ContentFormat,
    #[serde(default)]
    pub status: PostStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_post_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub published_post_id: Option<String>,
    #[serde(default)]
    pub is_edit_draft: bool,
}

impl PostPayload {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    /// Id of the existing post to update, only when this is an edit draft
    pub fn edit_target(&self) -> Option<&str> {
        if !self.is_edit_draft {
            return None;
        }
        self.published_post_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn publish_date(&self) -> Option<&str> {
        non_blank(&self.publish_date)
    }

    pub fn excerpt(&self) -> Option<&str> {
        non_blank(&self.excerpt)
    }

    /// Tags followed by categories, for platforms with a single taxonomy
    pub fn merged_taxonomy(&self) -> Vec<String> {
        self.tags
            .iter()
            .chain(self.categories.iter())
            .cloned()
            .collect()
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn deserialize_post_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    Ok(match Option::<RawId>::deserialize(deserializer)? {
        Some(RawId::Number(n)) => Some(n.to_string()),
        Some(RawId::Text(s)) => Some(s),
        None => None,
    })
}

/// Parse a user-supplied publish date
///
/// Accepts RFC 3339 timestamps and the zone-less `YYYY-MM-DDTHH:MM[:SS]` form
/// produced by date-time pickers, which is interpreted in local time.
pub fn parse_publish_date(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|local| local.with_timezone(&Utc))
}

/// Format as RFC 3339 with millisecond precision and a `Z` suffix
pub fn to_rfc3339(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}
