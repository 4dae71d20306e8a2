fn main() {
    // Default Google OAuth client baked in through option_env! in src/oauth/client.rs
    println!("cargo:rerun-if-env-changed=BLOGGER_OAUTH_CLIENT_ID");
    println!("cargo:rerun-if-env-changed=BLOGGER_OAUTH_CLIENT_SECRET");

    let id = std::env::var("BLOGGER_OAUTH_CLIENT_ID").unwrap_or_default();
    let secret = std::env::var("BLOGGER_OAUTH_CLIENT_SECRET").unwrap_or_default();
    if id.trim().is_empty() || secret.trim().is_empty() {
        println!(
            "cargo:warning=BLOGGER_OAUTH_CLIENT_ID/BLOGGER_OAUTH_CLIENT_SECRET not set; \
             Blogger sign-in will require custom OAuth client credentials"
        );
    }
}
