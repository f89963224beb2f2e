use std::collections::HashMap;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use oauth2::{
    basic::BasicClient, AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use tracing::{debug, instrument};

use super::{
    providers::{primary_github_email, FacebookUser, GithubEmail, GithubUser, GoogleUser, GITHUB_EMAILS},
    OAuthBroker, Provider, SocialProfile,
};
use crate::config::ProviderCredentials;

type ConfiguredClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Talks to the real providers over HTTPS.
pub struct HttpOAuthBroker {
    credentials: HashMap<Provider, ProviderCredentials>,
    http: reqwest::Client,
}

impl HttpOAuthBroker {
    pub fn new(credentials: HashMap<Provider, ProviderCredentials>) -> anyhow::Result<Self> {
        // Redirects are disabled so a token endpoint can't bounce the code elsewhere.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("tokengate/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build oauth http client")?;
        Ok(Self { credentials, http })
    }

    fn client(&self, provider: Provider) -> anyhow::Result<ConfiguredClient> {
        let creds = self
            .credentials
            .get(&provider)
            .ok_or_else(|| anyhow!("{provider} OAuth credentials are not configured"))?;
        let endpoints = provider.endpoints();

        let client = BasicClient::new(ClientId::new(creds.client_id.clone()))
            .set_client_secret(ClientSecret::new(creds.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(endpoints.authorize.to_string())?)
            .set_token_uri(TokenUrl::new(endpoints.token.to_string())?)
            .set_redirect_uri(RedirectUrl::new(creds.redirect_uri.clone())?)
            .set_auth_type(AuthType::RequestBody);
        Ok(client)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> anyhow::Result<T> {
        let res = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = res.status();
        if !status.is_success() {
            anyhow::bail!("GET {url} returned {status}");
        }
        res.json::<T>()
            .await
            .with_context(|| format!("decode response of {url}"))
    }
}

#[async_trait]
impl OAuthBroker for HttpOAuthBroker {
    fn authorization_url(&self, provider: Provider) -> anyhow::Result<String> {
        let client = self.client(provider)?;
        // Stateless flow: the CSRF token is not kept between redirect and callback.
        let (url, _csrf) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(
                provider
                    .endpoints()
                    .scopes
                    .iter()
                    .map(|s| Scope::new((*s).to_string())),
            )
            .url();
        Ok(url.to_string())
    }

    #[instrument(skip(self, code))]
    async fn exchange_code(&self, provider: Provider, code: &str) -> anyhow::Result<String> {
        let client = self.client(provider)?;
        let token = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| anyhow!("{provider} token exchange failed: {e}"))?;
        debug!(%provider, "authorization code exchanged");
        Ok(token.access_token().secret().clone())
    }

    #[instrument(skip(self, access_token))]
    async fn fetch_profile(
        &self,
        provider: Provider,
        access_token: &str,
    ) -> anyhow::Result<SocialProfile> {
        let url = provider.endpoints().profile;
        let profile = match provider {
            Provider::Google => self.get_json::<GoogleUser>(url, access_token).await?.into(),
            Provider::Facebook => self.get_json::<FacebookUser>(url, access_token).await?.into(),
            Provider::Github => {
                let mut profile: SocialProfile =
                    self.get_json::<GithubUser>(url, access_token).await?.into();
                if profile.email.is_none() {
                    let emails = self
                        .get_json::<Vec<GithubEmail>>(GITHUB_EMAILS, access_token)
                        .await?;
                    profile.email = primary_github_email(emails);
                }
                profile
            }
        };
        debug!(%provider, provider_id = %profile.id, "provider profile fetched");
        Ok(profile)
    }
}
