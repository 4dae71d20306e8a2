//! liveblog CLI (Rust)
//!
//! Author one post and publish or update it on WordPress, Blogger, Ghost,
//! Substack and Dev.to. Blogger signs in with Google (OAuth + PKCE); the
//! other platforms use per-blog credentials kept in the OS keyring or a
//! user-only secrets file.

mod cli;
mod config;
mod credentials;
mod error;
mod format;
mod http;
mod oauth;
mod platforms;
mod post;
mod publish;
mod secrets;
#[cfg(test)]
mod test_support;

use anyhow::Result;
use clap::Parser;
use cli::{BlogsCommands, Cli, Commands, CredentialCommands, OAuthCommands, PostsCommands};
use config::{BlogConfig, Settings};
use credentials::CredentialVault;
use error::AppError;
use oauth::{DefaultClient, GoogleOAuth, SystemBrowser};
use platforms::HttpConnector;
use post::{ContentFormat, PostPayload};
use publish::Publisher;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Everything a command needs, built once at startup
struct App {
    settings_path: PathBuf,
    settings: Settings,
    vault: CredentialVault,
    oauth: Arc<GoogleOAuth>,
    publisher: Publisher,
}

impl App {
    fn new(cli: &Cli) -> Result<Self, AppError> {
        let settings_path = match &cli.config {
            Some(path) => path.clone(),
            None => config::settings_path()?,
        };
        let settings = Settings::load_from(&settings_path)?;
        let store = secrets::open(cli.secrets)?;
        let client = http::client_with_timeout(http::DEFAULT_TIMEOUT)?;

        let vault = CredentialVault::new(store.clone());
        let oauth = Arc::new(GoogleOAuth::new(
            store,
            client.clone(),
            DefaultClient::compiled(),
            Arc::new(SystemBrowser),
        ));
        let publisher = Publisher::new(
            vault.clone(),
            oauth.clone(),
            Arc::new(HttpConnector::new(client)),
        );

        Ok(Self {
            settings_path,
            settings,
            vault,
            oauth,
            publisher,
        })
    }

    fn save(&self) -> Result<(), AppError> {
        self.settings.save_to(&self.settings_path)
    }

    fn blog(&self, name: &str) -> Result<&BlogConfig, AppError> {
        self.settings.resolve(Some(name))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity flags
    let log_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr) // Log to stderr to keep stdout clean
        .init();

    match run(cli).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(exit_code(&e));
        }
    }
}

async fn run(cli: Cli) -> Result<String> {
    let mut app = App::new(&cli)?;

    match cli.command {
        Commands::Publish(args) => execute_publish(&app, args).await,
        Commands::Posts(args) => execute_posts(&app, args.command).await,
        Commands::Blogs(args) => execute_blogs(&mut app, args.command).await,
        Commands::Credential(args) => execute_credential(&app, args.command).await,
        Commands::Login => {
            app.oauth.authenticate().await?;
            Ok("✓ Signed in to Google. Blogger publishing is ready.".to_string())
        }
        Commands::Logout => {
            app.oauth.clear_authentication().await?;
            Ok("✓ Signed out of Google".to_string())
        }
        Commands::Oauth(args) => execute_oauth(&app, args.command).await,
    }
}

/// Map an error to the process exit code
fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<AppError>()
        .map(AppError::exit_code)
        .unwrap_or(5)
}

fn read_file(path: &Path) -> Result<String, AppError> {
    std::fs::read_to_string(path)
        .map_err(|e| AppError::InvalidInput(format!("Cannot read {}: {}", path.display(), e)))
}

/// Markdown when the extension says so, HTML otherwise
fn infer_format(path: &Path) -> ContentFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("md") || ext.eq_ignore_ascii_case("markdown") => {
            ContentFormat::Markdown
        }
        _ => ContentFormat::Html,
    }
}

fn build_payload(args: cli::PublishArgs) -> Result<PostPayload, AppError> {
    if let Some(path) = &args.payload {
        return serde_json::from_str(&read_file(path)?)
            .map_err(|e| AppError::InvalidInput(format!("Invalid post payload {}: {}", path.display(), e)));
    }

    let path = args
        .file
        .ok_or_else(|| AppError::InvalidInput("A content file is required".to_string()))?;
    let title = args
        .title
        .ok_or_else(|| AppError::InvalidInput("A title is required".to_string()))?;

    Ok(PostPayload {
        title,
        content: read_file(&path)?,
        content_format: args.format.unwrap_or_else(|| infer_format(&path)),
        status: args.status,
        publish_date: args.date,
        tags: args.tags,
        categories: args.categories,
        excerpt: args.excerpt,
        is_edit_draft: args.update.is_some(),
        published_post_id: args.update,
    })
}

async fn execute_publish(app: &App, args: cli::PublishArgs) -> Result<String> {
    let blog = app.settings.resolve(args.blog.as_deref())?;
    let payload = build_payload(args)?;
    info!("Publishing \"{}\" to \"{}\"", payload.title, blog.name);
    let outcome = app.publisher.publish(blog, &payload).await?;
    Ok(outcome.summary())
}

async fn execute_posts(app: &App, command: PostsCommands) -> Result<String> {
    match command {
        PostsCommands::List { blog, count, json } => {
            let blog = app.settings.resolve(blog.as_deref())?;
            let posts = app.publisher.list_posts(blog, count).await?;
            if json {
                return Ok(serde_json::to_string_pretty(&posts)?);
            }
            if posts.is_empty() {
                return Ok(format!("No posts found on \"{}\"", blog.name));
            }

            let mut output = format!("Recent posts on \"{}\" ({}):\n", blog.name, posts.len());
            for post in posts {
                output.push_str(&format!(
                    "  {}  {}  {}\n",
                    post.id,
                    post.published_at.as_deref().unwrap_or("-"),
                    post.title
                ));
            }
            Ok(output)
        }
        PostsCommands::Get { blog, id } => {
            let blog = app.settings.resolve(blog.as_deref())?;
            let payload = app.publisher.load_for_edit(blog, &id).await?;
            Ok(serde_json::to_string_pretty(&payload)?)
        }
    }
}

async fn execute_blogs(app: &mut App, command: BlogsCommands) -> Result<String> {
    match command {
        BlogsCommands::List => {
            if app.settings.blogs.is_empty() {
                return Ok("No blogs configured. Use 'liveblog blogs add' to add one.".to_string());
            }
            let default = app.settings.default_blog.as_deref();
            let mut output = format!("Configured blogs ({}):\n", app.settings.blogs.len());
            for blog in &app.settings.blogs {
                let marker = if Some(blog.name.as_str()) == default {
                    " (default)"
                } else {
                    ""
                };
                output.push_str(&format!(
                    "  • {} [{}] {}{}\n",
                    blog.name,
                    blog.platform,
                    blog.id.as_deref().unwrap_or(""),
                    marker
                ));
            }
            Ok(output)
        }
        BlogsCommands::Add {
            name,
            platform,
            id,
            username,
            default,
        } => {
            let blog = BlogConfig {
                name: name.clone(),
                platform,
                id,
                username,
            };
            blog.target()?;
            app.settings.add_blog(blog)?;
            if default && app.settings.default_blog.as_deref() != Some(name.as_str()) {
                app.settings.toggle_default(&name)?;
            }
            app.save()?;
            Ok(format!(
                "✓ Added {} blog \"{}\". Next: liveblog {}",
                platform,
                name,
                match platform {
                    config::Platform::Blogger => "login".to_string(),
                    _ => format!("credential set --blog \"{}\"", name),
                }
            ))
        }
        BlogsCommands::Edit { name, id, username } => {
            app.settings.edit_blog(&name, id, username)?.target()?;
            app.save()?;
            Ok(format!("✓ Updated \"{}\"", name))
        }
        BlogsCommands::Rename { old, new } => {
            let platform = app.settings.rename_blog(&old, &new)?;
            let moved = app.vault.migrate(platform, &old, &new).await?;
            app.save()?;
            Ok(format!(
                "✓ Renamed \"{}\" to \"{}\" ({} credential(s) moved)",
                old, new, moved
            ))
        }
        BlogsCommands::Remove { name } => {
            let removed = app.settings.remove_blog(&name)?;
            app.vault.forget(removed.platform, &removed.name).await;
            app.save()?;
            Ok(format!("✓ Removed \"{}\"", name))
        }
        BlogsCommands::Default { name } => {
            let message = match app.settings.toggle_default(&name)? {
                Some(current) => format!("✓ Set \"{}\" as default blog", current),
                None => format!("✓ \"{}\" is no longer the default blog", name),
            };
            app.save()?;
            Ok(message)
        }
        BlogsCommands::Check { name } => {
            let blogs: Vec<&BlogConfig> = match &name {
                Some(name) => vec![app.blog(name)?],
                None => app.settings.blogs.iter().collect(),
            };
            if blogs.is_empty() {
                return Ok("No blogs configured.".to_string());
            }

            let mut output = String::new();
            for blog in blogs {
                let check = app.publisher.check_blog(blog).await;
                let mark = if check.ok { "✓" } else { "✗" };
                output.push_str(&format!("{} {}: {}\n", mark, blog.name, check.message));
            }
            Ok(output.trim_end().to_string())
        }
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

async fn execute_credential(app: &App, command: CredentialCommands) -> Result<String> {
    match command {
        CredentialCommands::Set(args) => {
            let blog = app.blog(&args.blog)?;

            if let (Some(email), Some(password)) = (&args.email, &args.password) {
                if blog.platform != config::Platform::Substack {
                    return Err(AppError::InvalidInput(
                        "--email and --password are only used by Substack blogs".to_string(),
                    )
                    .into());
                }
                app.vault
                    .set_substack_login(&blog.name, email, password)
                    .await?;
                return Ok(format!("✓ Stored Substack email/password for \"{}\"", blog.name));
            }

            let value = match args.value {
                Some(value) => value,
                None => prompt(match blog.platform {
                    config::Platform::WordPress => "Application password",
                    config::Platform::Ghost => "Admin API key (id:secret)",
                    config::Platform::Substack => "connect.sid cookie",
                    _ => "API key",
                })?,
            };
            app.vault
                .set_primary(blog.platform, &blog.name, &value)
                .await?;
            Ok(format!("✓ Stored credential for \"{}\"", blog.name))
        }
    }
}

async fn execute_oauth(app: &App, command: OAuthCommands) -> Result<String> {
    match command {
        OAuthCommands::Status => {
            let status = app.oauth.status().await?;
            let client = if status.using_custom_client {
                "custom"
            } else if status.default_client_available {
                "built-in"
            } else {
                "none configured"
            };
            let expiry = status
                .token_expires_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string());
            Ok(format!(
                "Signed in: {}\nClient: {}\nToken expires: {}",
                if status.authenticated { "yes" } else { "no" },
                client,
                expiry
            ))
        }
        OAuthCommands::SetClient {
            client_id,
            client_secret,
        } => {
            app.oauth
                .use_client(Some((&client_id, &client_secret)))
                .await?;
            Ok("✓ Using custom OAuth client. Run 'liveblog login' to sign in again.".to_string())
        }
        OAuthCommands::ClearClient => {
            app.oauth.use_client(None).await?;
            Ok("✓ Using the built-in OAuth client. Run 'liveblog login' to sign in again.".to_string())
        }
    }
}
