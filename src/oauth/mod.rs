//! Google OAuth (authorization code + PKCE) for the Blogger integration

pub mod callback_server;
pub mod client;
pub mod google;
pub mod pkce;

#[cfg(test)]
mod oauth_tests;

pub use client::DefaultClient;
pub use google::{AccessTokenSource, ConsentPrompt, GoogleOAuth, OAuthSettings, OAuthStatus, SystemBrowser};
