//! Command-line surface
//!
//! Argument definitions only; `main` wires them to the library modules.

use crate::config::Platform;
use crate::post::{ContentFormat, PostStatus};
use crate::secrets::SecretBackend;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// liveblog CLI
#[derive(Parser, Debug)]
#[command(name = "liveblog")]
#[command(about = "Publish one post to WordPress, Blogger, Ghost, Substack and Dev.to", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-error output (no short flag to avoid conflicts)
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Settings file (defaults to <config dir>/liveblog/config.json)
    #[arg(long, global = true, env = "LIVEBLOG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Where secrets are kept
    #[arg(long, global = true, env = "LIVEBLOG_SECRETS", value_enum, default_value_t = SecretBackend::Auto)]
    pub secrets: SecretBackend,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Publish a post, or update one with --update
    Publish(PublishArgs),
    /// List or fetch existing posts
    Posts(PostsArgs),
    /// Manage configured blogs
    Blogs(BlogsArgs),
    /// Manage per-blog credentials
    Credential(CredentialArgs),
    /// Sign in to Google for Blogger
    Login,
    /// Forget the Google tokens
    Logout,
    /// Inspect or override the Google OAuth client
    Oauth(OAuthArgs),
}

/// Publish command arguments
#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Content file; `.md` and `.markdown` imply Markdown
    #[arg(required_unless_present = "payload", conflicts_with = "payload")]
    pub file: Option<PathBuf>,

    /// Blog name (defaults to the default blog)
    #[arg(short = 'b', long)]
    pub blog: Option<String>,

    /// Full post as JSON, e.g. the output of `liveblog posts get`
    #[arg(long)]
    pub payload: Option<PathBuf>,

    /// Post title
    #[arg(short = 't', long, required_unless_present = "payload")]
    pub title: Option<String>,

    /// Authoring format (inferred from the file extension when omitted)
    #[arg(short = 'f', long, value_enum)]
    pub format: Option<ContentFormat>,

    #[arg(short = 's', long, value_enum, default_value_t = PostStatus::Draft)]
    pub status: PostStatus,

    /// Publish date, RFC 3339 or YYYY-MM-DDTHH:MM in local time
    #[arg(short = 'd', long)]
    pub date: Option<String>,

    /// Comma-separated tags
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// Comma-separated categories
    #[arg(long, value_delimiter = ',')]
    pub categories: Vec<String>,

    /// Excerpt or subtitle
    #[arg(short = 'e', long)]
    pub excerpt: Option<String>,

    /// Update this existing post instead of creating one
    #[arg(short = 'u', long)]
    pub update: Option<String>,
}

#[derive(Args, Debug)]
pub struct PostsArgs {
    #[command(subcommand)]
    pub command: PostsCommands,
}

#[derive(Subcommand, Debug)]
pub enum PostsCommands {
    /// List recent posts
    List {
        #[arg(short = 'b', long)]
        blog: Option<String>,

        /// Number of posts
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Fetch one post as an editable JSON payload
    Get {
        #[arg(short = 'b', long)]
        blog: Option<String>,

        /// Platform post id
        id: String,
    },
}

#[derive(Args, Debug)]
pub struct BlogsArgs {
    #[command(subcommand)]
    pub command: BlogsCommands,
}

#[derive(Subcommand, Debug)]
pub enum BlogsCommands {
    /// List configured blogs
    List,
    /// Add a blog
    Add {
        name: String,

        #[arg(short = 'p', long, value_enum)]
        platform: Platform,

        /// Site URL (WordPress, Ghost), blog ID (Blogger) or hostname (Substack)
        #[arg(long)]
        id: Option<String>,

        /// WordPress username
        #[arg(long)]
        username: Option<String>,

        /// Also make it the default blog
        #[arg(long)]
        default: bool,
    },
    /// Change a blog's id or username
    Edit {
        name: String,

        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        username: Option<String>,
    },
    /// Rename a blog, moving its credentials
    Rename { old: String, new: String },
    /// Remove a blog and its credentials
    Remove { name: String },
    /// Toggle the default blog
    Default { name: String },
    /// Check configuration and stored credentials without network calls
    Check {
        /// Blog to check (all blogs when omitted)
        name: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct CredentialArgs {
    #[command(subcommand)]
    pub command: CredentialCommands,
}

#[derive(Subcommand, Debug)]
pub enum CredentialCommands {
    /// Store a blog's credential
    ///
    /// WordPress: application password. Ghost: Admin API key (id:secret).
    /// Dev.to: API key. Substack: connect.sid cookie, or --email with --password.
    Set(CredentialSetArgs),
}

#[derive(Args, Debug)]
pub struct CredentialSetArgs {
    #[arg(short = 'b', long)]
    pub blog: String,

    /// Credential value (prompted for when omitted)
    #[arg(long, env = "LIVEBLOG_CREDENTIAL", hide_env_values = true, conflicts_with = "email")]
    pub value: Option<String>,

    /// Substack account email
    #[arg(long, requires = "password")]
    pub email: Option<String>,

    /// Substack account password
    #[arg(long, requires = "email")]
    pub password: Option<String>,
}

#[derive(Args, Debug)]
pub struct OAuthArgs {
    #[command(subcommand)]
    pub command: OAuthCommands,
}

#[derive(Subcommand, Debug)]
pub enum OAuthCommands {
    /// Show sign-in and client status
    Status,
    /// Use your own Google OAuth client (signs you out)
    SetClient {
        #[arg(long)]
        client_id: String,

        #[arg(long)]
        client_secret: String,
    },
    /// Go back to the built-in client (signs you out)
    ClearClient,
}
