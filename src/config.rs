use std::collections::HashMap;

use anyhow::Context;
use url::Url;

use crate::social::{Provider, ProviderAllowList};

#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Lifetime of issued tokens; `None` means they never expire.
    pub expiration_minutes: Option<i64>,
}

impl TokenConfig {
    pub fn ttl(&self) -> Option<time::Duration> {
        self.expiration_minutes.map(time::Duration::minutes)
    }
}

#[derive(Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SocialConfig {
    pub providers: ProviderAllowList,
    pub credentials: HashMap<Provider, ProviderCredentials>,
    /// Front-end base the OAuth callback redirects the browser to.
    pub frontend_url: Url,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub token: TokenConfig,
    pub social: SocialConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let token = TokenConfig {
            expiration_minutes: parse_expiration(std::env::var("TOKEN_EXPIRATION_MINUTES").ok()),
        };

        let app_url = std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:8080".into());
        let frontend_url = std::env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into());
        let frontend_url = Url::parse(&frontend_url).context("FRONTEND_URL is not a valid URL")?;

        let providers = match std::env::var("SOCIAL_PROVIDERS") {
            Ok(list) => ProviderAllowList::parse(&list).context("SOCIAL_PROVIDERS")?,
            Err(_) => ProviderAllowList::default(),
        };

        let credentials = providers
            .iter()
            .filter_map(|p| provider_credentials_from_env(p, &app_url).map(|c| (p, c)))
            .collect();

        Ok(Self {
            database_url,
            token,
            social: SocialConfig {
                providers,
                credentials,
                frontend_url,
            },
        })
    }
}

/// Ten years; longer lifetimes are clamped.
pub const MAX_EXPIRATION_MINUTES: i64 = 10 * 365 * 24 * 60;

fn parse_expiration(raw: Option<String>) -> Option<i64> {
    let minutes = raw
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|minutes| *minutes > 0)?;
    if minutes > MAX_EXPIRATION_MINUTES {
        tracing::warn!(
            minutes,
            max = MAX_EXPIRATION_MINUTES,
            "TOKEN_EXPIRATION_MINUTES too large; clamping"
        );
        return Some(MAX_EXPIRATION_MINUTES);
    }
    Some(minutes)
}

fn provider_credentials_from_env(provider: Provider, app_url: &str) -> Option<ProviderCredentials> {
    let prefix = provider.as_str().to_uppercase();
    let client_id = std::env::var(format!("{prefix}_CLIENT_ID")).ok()?;
    let client_secret = std::env::var(format!("{prefix}_CLIENT_SECRET")).ok()?;
    let redirect_uri = std::env::var(format!("{prefix}_REDIRECT_URI"))
        .unwrap_or_else(|_| default_redirect_uri(app_url, provider));
    Some(ProviderCredentials {
        client_id,
        client_secret,
        redirect_uri,
    })
}

fn default_redirect_uri(app_url: &str, provider: Provider) -> String {
    format!(
        "{}/api/v1/auth/social-login-callback/{}",
        app_url.trim_end_matches('/'),
        provider
    )
}
