//! Blog configurations and their on-disk settings file

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Supported publishing platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[value(name = "wordpress")]
    WordPress,
    #[value(name = "blogger")]
    Blogger,
    #[value(name = "ghost")]
    Ghost,
    #[value(name = "substack")]
    Substack,
    #[value(name = "devto")]
    DevTo,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::WordPress,
        Platform::Blogger,
        Platform::Ghost,
        Platform::Substack,
        Platform::DevTo,
    ];

    /// Identifier used in configuration files and secret keys
    pub fn key(&self) -> &'static str {
        match self {
            Platform::WordPress => "wordpress",
            Platform::Blogger => "blogger",
            Platform::Ghost => "ghost",
            Platform::Substack => "substack",
            Platform::DevTo => "devto",
        }
    }

    /// Human-facing platform name
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::WordPress => "WordPress",
            Platform::Blogger => "Blogger",
            Platform::Ghost => "Ghost",
            Platform::Substack => "Substack",
            Platform::DevTo => "Dev.to",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A user-configured blog, referenced everywhere else by its unique name
///
/// `id` is platform specific: site URL (WordPress, Ghost), numeric blog ID
/// (Blogger) or publication hostname (Substack).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogConfig {
    pub name: String,
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Validated, platform-specific view of a [`BlogConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlogTarget {
    WordPress { site_url: String, username: String },
    Blogger { blog_id: String },
    Ghost { site_url: String },
    Substack { hostname: String },
    DevTo,
}

impl BlogTarget {
    pub fn platform(&self) -> Platform {
        match self {
            BlogTarget::WordPress { .. } => Platform::WordPress,
            BlogTarget::Blogger { .. } => Platform::Blogger,
            BlogTarget::Ghost { .. } => Platform::Ghost,
            BlogTarget::Substack { .. } => Platform::Substack,
            BlogTarget::DevTo => Platform::DevTo,
        }
    }
}

impl BlogConfig {
    pub fn new(name: impl Into<String>, platform: Platform) -> Self {
        Self {
            name: name.into(),
            platform,
            id: None,
            username: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Check the per-platform field requirements and build the tagged target
    pub fn target(&self) -> Result<BlogTarget, AppError> {
        let id = non_empty(&self.id);
        let username = non_empty(&self.username);

        match self.platform {
            Platform::WordPress => match (id, username) {
                (Some(url), Some(user)) => Ok(BlogTarget::WordPress {
                    site_url: trim_trailing_slash(url),
                    username: user.to_string(),
                }),
                _ => Err(AppError::Configuration(format!(
                    "WordPress configuration for \"{}\" is incomplete: both the site URL and the username are required. \
                     Run `liveblog blogs edit \"{}\" --id <url> --username <user>`.",
                    self.name, self.name
                ))),
            },
            Platform::Blogger => id
                .map(|blog_id| BlogTarget::Blogger {
                    blog_id: blog_id.to_string(),
                })
                .ok_or_else(|| self.missing_id("Blogger blog ID")),
            Platform::Ghost => id
                .map(|url| BlogTarget::Ghost {
                    site_url: trim_trailing_slash(url),
                })
                .ok_or_else(|| self.missing_id("Ghost site URL")),
            Platform::Substack => {
                let hostname = id.map(sanitize_hostname).unwrap_or_default();
                if hostname.is_empty() {
                    Err(self.missing_id("Substack hostname"))
                } else {
                    Ok(BlogTarget::Substack { hostname })
                }
            }
            Platform::DevTo => Ok(BlogTarget::DevTo),
        }
    }

    fn missing_id(&self, what: &str) -> AppError {
        AppError::Configuration(format!(
            "{} is not configured for \"{}\". Run `liveblog blogs edit \"{}\" --id <value>`.",
            what, self.name, self.name
        ))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn trim_trailing_slash(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Strip scheme and trailing slashes from a Substack hostname
pub fn sanitize_hostname(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    without_scheme.trim_end_matches('/').to_string()
}

/// Persisted blog list and default blog selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub blogs: Vec<BlogConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_blog: Option<String>,
}

/// Get the default path of the settings file
pub fn settings_path() -> Result<PathBuf, AppError> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| AppError::Storage("Cannot determine config directory".to_string()))?;
    Ok(config_dir.join("liveblog").join("config.json"))
}

impl Settings {
    /// Load settings, returning an empty configuration when the file is absent
    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            debug!("No settings file at {}, starting empty", path.display());
            return Ok(Settings::default());
        }

        let data = fs::read_to_string(path)
            .map_err(|e| AppError::Storage(format!("Failed to read settings file: {}", e)))?;
        serde_json::from_str(&data)
            .map_err(|e| AppError::Storage(format!("Failed to parse settings file: {}", e)))
    }

    /// Save settings with user-only permissions
    pub fn save_to(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::Storage(format!("Failed to create config directory: {}", e)))?;
        }

        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)
            .map_err(|e| AppError::Storage(format!("Failed to write settings file: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms)?;
        }

        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&BlogConfig> {
        self.blogs.iter().find(|b| b.name == name)
    }

    /// Look up a blog by name, falling back to the default blog
    pub fn resolve(&self, name: Option<&str>) -> Result<&BlogConfig, AppError> {
        let name = match name {
            Some(n) => n,
            None => self.default_blog.as_deref().ok_or_else(|| {
                AppError::Configuration(
                    "No blog selected and no default blog set. Pass --blog or run `liveblog blogs default <name>`."
                        .to_string(),
                )
            })?,
        };
        self.find(name)
            .ok_or_else(|| AppError::Configuration(format!("Blog \"{}\" is not configured", name)))
    }

    /// Add a new blog; names are unique
    pub fn add_blog(&mut self, blog: BlogConfig) -> Result<(), AppError> {
        if blog.name.trim().is_empty() {
            return Err(AppError::InvalidInput("Blog name cannot be empty".to_string()));
        }
        if self.find(&blog.name).is_some() {
            return Err(AppError::InvalidInput(format!(
                "A blog named \"{}\" already exists",
                blog.name
            )));
        }
        self.blogs.push(blog);
        Ok(())
    }

    /// Replace the platform-specific fields of an existing blog
    pub fn edit_blog(
        &mut self,
        name: &str,
        id: Option<String>,
        username: Option<String>,
    ) -> Result<&BlogConfig, AppError> {
        let blog = self
            .blogs
            .iter_mut()
            .find(|b| b.name == name)
            .ok_or_else(|| AppError::Configuration(format!("Blog \"{}\" is not configured", name)))?;
        if id.is_some() {
            blog.id = id;
        }
        if username.is_some() {
            blog.username = username;
        }
        Ok(blog)
    }

    /// Rename a blog, keeping the default selection pointed at it
    ///
    /// Credentials are keyed by blog name, so callers migrate them afterwards.
    pub fn rename_blog(&mut self, old: &str, new: &str) -> Result<Platform, AppError> {
        if new.trim().is_empty() {
            return Err(AppError::InvalidInput("Blog name cannot be empty".to_string()));
        }
        if old != new && self.find(new).is_some() {
            return Err(AppError::InvalidInput(format!(
                "A blog named \"{}\" already exists",
                new
            )));
        }
        let blog = self
            .blogs
            .iter_mut()
            .find(|b| b.name == old)
            .ok_or_else(|| AppError::Configuration(format!("Blog \"{}\" is not configured", old)))?;
        blog.name = new.to_string();
        let platform = blog.platform;

        if self.default_blog.as_deref() == Some(old) {
            self.default_blog = Some(new.to_string());
        }
        Ok(platform)
    }

    /// Remove a blog, clearing the default if it pointed there
    pub fn remove_blog(&mut self, name: &str) -> Result<BlogConfig, AppError> {
        let pos = self
            .blogs
            .iter()
            .position(|b| b.name == name)
            .ok_or_else(|| AppError::Configuration(format!("Blog \"{}\" is not configured", name)))?;
        let removed = self.blogs.remove(pos);
        if self.default_blog.as_deref() == Some(name) {
            self.default_blog = None;
        }
        Ok(removed)
    }

    /// Toggle the default blog; selecting the current default clears it
    pub fn toggle_default(&mut self, name: &str) -> Result<Option<&str>, AppError> {
        if self.find(name).is_none() {
            return Err(AppError::Configuration(format!("Blog \"{}\" is not configured", name)));
        }
        if self.default_blog.as_deref() == Some(name) {
            self.default_blog = None;
        } else {
            self.default_blog = Some(name.to_string());
        }
        Ok(self.default_blog.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_serialization_uses_lowercase_keys() {
        let json = serde_json::to_string(&Platform::DevTo).unwrap();
        assert_eq!(json, "\"devto\"");
        let parsed: Platform = serde_json::from_str("\"wordpress\"").unwrap();
        assert_eq!(parsed, Platform::WordPress);
    }

    #[test]
    fn test_wordpress_requires_url_and_username() {
        let blog = BlogConfig::new("wp", Platform::WordPress).with_id("https://example.com/");
        assert!(matches!(blog.target(), Err(AppError::Configuration(_))));

        let blog = blog.with_username("admin");
        assert_eq!(
            blog.target().unwrap(),
            BlogTarget::WordPress {
                site_url: "https://example.com".to_string(),
                username: "admin".to_string(),
            }
        );
    }

    #[test]
    fn test_devto_needs_no_fields() {
        let blog = BlogConfig::new("dev", Platform::DevTo);
        assert_eq!(blog.target().unwrap(), BlogTarget::DevTo);
    }

    #[test]
    fn test_blank_id_counts_as_missing() {
        let blog = BlogConfig::new("g", Platform::Ghost).with_id("   ");
        let err = blog.target().unwrap_err();
        assert!(err.to_string().contains("Ghost site URL"));
    }

    #[test]
    fn test_substack_hostname_is_sanitized() {
        let blog = BlogConfig::new("s", Platform::Substack).with_id("https://me.substack.com/");
        assert_eq!(
            blog.target().unwrap(),
            BlogTarget::Substack {
                hostname: "me.substack.com".to_string()
            }
        );

        let blog = BlogConfig::new("s", Platform::Substack).with_id("https:///");
        assert!(blog.target().is_err());
    }

    #[test]
    fn test_add_rejects_duplicate_names() {
        let mut settings = Settings::default();
        settings.add_blog(BlogConfig::new("A", Platform::DevTo)).unwrap();
        let err = settings
            .add_blog(BlogConfig::new("A", Platform::Ghost))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_rename_follows_default_and_checks_conflicts() {
        let mut settings = Settings::default();
        settings.add_blog(BlogConfig::new("A", Platform::DevTo)).unwrap();
        settings.add_blog(BlogConfig::new("B", Platform::DevTo)).unwrap();
        settings.toggle_default("A").unwrap();

        assert!(settings.rename_blog("A", "B").is_err());
        settings.rename_blog("A", "C").unwrap();
        assert_eq!(settings.default_blog.as_deref(), Some("C"));
        assert!(settings.find("A").is_none());
    }

    #[test]
    fn test_remove_clears_default() {
        let mut settings = Settings::default();
        settings.add_blog(BlogConfig::new("A", Platform::DevTo)).unwrap();
        settings.toggle_default("A").unwrap();
        settings.remove_blog("A").unwrap();
        assert!(settings.default_blog.is_none());
        assert!(settings.resolve(None).is_err());
    }

    #[test]
    fn test_toggle_default_twice_clears() {
        let mut settings = Settings::default();
        settings.add_blog(BlogConfig::new("A", Platform::DevTo)).unwrap();
        assert_eq!(settings.toggle_default("A").unwrap(), Some("A"));
        assert_eq!(settings.toggle_default("A").unwrap(), None);
    }

    #[test]
    fn test_settings_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut settings = Settings::default();
        settings
            .add_blog(
                BlogConfig::new("Work", Platform::WordPress)
                    .with_id("https://blog.example.com")
                    .with_username("me"),
            )
            .unwrap();
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.blogs, settings.blogs);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"platform\": \"wordpress\""));
    }

    #[test]
    fn test_missing_settings_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("absent.json")).unwrap();
        assert!(settings.blogs.is_empty());
    }
}
