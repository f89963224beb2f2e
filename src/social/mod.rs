//! Social identity providers: the allow-list, the normalized profile and the
//! broker abstraction the auth service talks to.

use std::{fmt, str::FromStr};

use async_trait::async_trait;

pub mod broker;
pub mod providers;

pub use broker::HttpOAuthBroker;

/// External identity platforms this service knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Google,
    Github,
    Facebook,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Google, Provider::Github, Provider::Facebook];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Github => "github",
            Provider::Facebook => "facebook",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown social provider `{0}`")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownProvider(s.to_string()))
    }
}

/// Ordered set of providers accepted by the social-login endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAllowList(Vec<Provider>);

impl ProviderAllowList {
    pub fn new(providers: Vec<Provider>) -> Self {
        let mut unique: Vec<Provider> = Vec::with_capacity(providers.len());
        for p in providers {
            if !unique.contains(&p) {
                unique.push(p);
            }
        }
        Self(unique)
    }

    /// Parse a comma separated list such as `google, github`.
    pub fn parse(list: &str) -> Result<Self, UnknownProvider> {
        let providers = list
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<Provider>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(providers))
    }

    /// Resolve a request-supplied name; `None` unless it is on the list.
    pub fn resolve(&self, name: &str) -> Option<Provider> {
        let provider = name.trim().to_lowercase().parse::<Provider>().ok()?;
        self.0.contains(&provider).then_some(provider)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.0.iter().map(Provider::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = Provider> + '_ {
        self.0.iter().copied()
    }
}

impl Default for ProviderAllowList {
    fn default() -> Self {
        Self(Provider::ALL.to_vec())
    }
}

/// Profile of an external account, normalized across providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocialProfile {
    pub id: String,
    pub name: Option<String>,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
}

impl SocialProfile {
    /// Display name for a new local account.
    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .or(self.nickname.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.email
                    .as_deref()
                    .and_then(|e| e.split('@').next())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "user".to_string())
    }
}

/// Performs the provider side of OAuth: authorization URLs, code exchange and
/// profile lookup.
#[async_trait]
pub trait OAuthBroker: Send + Sync {
    /// URL of the provider's consent page. Nothing is persisted locally.
    fn authorization_url(&self, provider: Provider) -> anyhow::Result<String>;

    /// Trade an authorization code for a provider access token.
    async fn exchange_code(&self, provider: Provider, code: &str) -> anyhow::Result<String>;

    async fn fetch_profile(
        &self,
        provider: Provider,
        access_token: &str,
    ) -> anyhow::Result<SocialProfile>;
}
