use std::sync::Arc;

use anyhow::{anyhow, Context};
use time::{Duration, OffsetDateTime};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, RegisterRequest, SocialLoginRequest},
        password::{placeholder_password, CredentialVerifier},
        repo::{CreateUserError, UserStore},
        repo_types::{AccessToken, NewUser, User, DEFAULT_ROLE},
        tokens::{IssuedToken, TokenIssuer},
        validation::{self, EMAIL_TAKEN},
    },
    config::AppConfig,
    error::AppError,
    social::{OAuthBroker, Provider, ProviderAllowList, SocialProfile},
};

/// Resolved caller of a protected endpoint.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub token: AccessToken,
}

/// A user together with the token just issued for them.
#[derive(Debug)]
pub struct AuthSession {
    pub user: User,
    pub token: IssuedToken,
}

#[derive(Debug, Clone, Default)]
pub struct AuthPolicy {
    pub token_ttl: Option<Duration>,
    pub providers: ProviderAllowList,
}

impl AuthPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            token_ttl: config.token.ttl(),
            providers: config.social.providers.clone(),
        }
    }
}

pub struct AuthService {
    users: Arc<dyn UserStore>,
    credentials: Arc<dyn CredentialVerifier>,
    tokens: Arc<dyn TokenIssuer>,
    oauth: Arc<dyn OAuthBroker>,
    policy: AuthPolicy,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        credentials: Arc<dyn CredentialVerifier>,
        tokens: Arc<dyn TokenIssuer>,
        oauth: Arc<dyn OAuthBroker>,
        policy: AuthPolicy,
    ) -> Self {
        Self {
            users,
            credentials,
            tokens,
            oauth,
            policy,
        }
    }

    pub fn providers(&self) -> &ProviderAllowList {
        &self.policy.providers
    }

    async fn issue_token(&self, user: &User, name: &str) -> anyhow::Result<IssuedToken> {
        self.tokens
            .issue(user.id, name, &[], self.policy.token_ttl)
            .await
    }

    #[instrument(skip(self, req))]
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthSession, AppError> {
        let (reg, mut errors) = validation::registration(&req);
        if !errors.has("email") && self.users.find_by_email(&reg.email).await?.is_some() {
            errors.add("email", EMAIL_TAKEN);
        }
        if !errors.is_empty() {
            warn!(fields = ?errors, "registration rejected");
        }
        errors.into_result()?;

        let password_hash = self.credentials.hash(&reg.password)?;
        let new_user = NewUser {
            name: reg.name,
            email: reg.email,
            password_hash,
            role: DEFAULT_ROLE.to_string(),
            provider: None,
            provider_id: None,
            avatar: None,
            email_verified_at: None,
        };

        let user = match self.users.create(new_user).await {
            Ok(u) => u,
            Err(CreateUserError::EmailTaken) => {
                let mut errors = validation::FieldErrors::default();
                errors.add("email", EMAIL_TAKEN);
                return Err(AppError::Validation(errors));
            }
            Err(CreateUserError::Store(e)) => return Err(e.into()),
        };

        let token = self.issue_token(&user, "register").await?;
        info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(AuthSession { user, token })
    }

    #[instrument(skip(self, req))]
    pub async fn login(
        &self,
        req: LoginRequest,
        ip: Option<&str>,
    ) -> Result<AuthSession, AppError> {
        let creds = validation::login(&req)?;

        let user = match self.users.find_by_email(&creds.email).await? {
            Some(u) => u,
            None => {
                warn!(email = %creds.email, "login unknown email");
                return Err(AppError::InvalidCredentials);
            }
        };

        let ok = match user.password_hash.as_deref() {
            Some(hash) => self.credentials.verify(&creds.password, hash)?,
            None => false,
        };
        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }

        let user = self
            .users
            .record_login(user.id, OffsetDateTime::now_utc(), ip)
            .await?;
        let token = self.issue_token(&user, "login").await?;
        info!(user_id = %user.id, email = %user.email, "user logged in");
        Ok(AuthSession { user, token })
    }

    /// Resolve a bearer string into the calling user and token.
    pub async fn authenticate(&self, plain_text: &str) -> Result<Option<AuthContext>, AppError> {
        let Some(token) = self.tokens.resolve(plain_text).await? else {
            return Ok(None);
        };
        if token.is_expired_at(OffsetDateTime::now_utc()) {
            return Ok(None);
        }
        let Some(user) = self.users.find_by_id(token.user_id).await? else {
            warn!(user_id = %token.user_id, token_id = %token.id, "token owner missing");
            return Ok(None);
        };
        Ok(Some(AuthContext { user, token }))
    }

    /// Delete the token used for this request; other sessions stay valid.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user.id))]
    pub async fn logout(&self, ctx: &AuthContext) -> Result<(), AppError> {
        self.tokens.revoke(ctx.token.id).await?;
        info!(token_id = %ctx.token.id, "user logged out");
        Ok(())
    }

    /// Issue an additional token without revoking the current one.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user.id))]
    pub async fn refresh(&self, ctx: &AuthContext) -> Result<IssuedToken, AppError> {
        let token = self.issue_token(&ctx.user, "refresh").await?;
        info!(token_id = %token.token.id, "token refreshed");
        Ok(token)
    }

    /// Provider consent URL for the redirect flow.
    pub fn social_redirect_url(&self, provider: Option<&str>) -> Result<String, AppError> {
        let provider = provider
            .and_then(|p| self.policy.providers.resolve(p))
            .ok_or_else(|| AppError::InvalidProvider {
                valid_providers: self.policy.providers.names(),
            })?;
        Ok(self.oauth.authorization_url(provider)?)
    }

    /// Social login with a provider access token obtained by the client.
    #[instrument(skip(self, req))]
    pub async fn social_login(
        &self,
        req: SocialLoginRequest,
        ip: Option<&str>,
    ) -> Result<AuthSession, AppError> {
        let input = validation::social_login(&req, &self.policy.providers)?;
        let provider = input.provider;

        let profile = match self.verified_profile(provider, &input.access_token).await {
            Ok(p) => p,
            Err(e) => {
                warn!(%provider, error = %e, "provider rejected social login");
                return Err(AppError::ProviderAuth(provider.to_string()));
            }
        };
        Ok(self.complete_social_login(provider, profile, ip).await?)
    }

    /// Social login driven by an OAuth callback code.
    #[instrument(skip(self, code))]
    pub async fn social_login_with_code(
        &self,
        provider: Provider,
        code: &str,
        ip: Option<&str>,
    ) -> anyhow::Result<AuthSession> {
        let access_token = self.oauth.exchange_code(provider, code).await?;
        let profile = self.verified_profile(provider, &access_token).await?;
        self.complete_social_login(provider, profile, ip).await
    }

    async fn verified_profile(
        &self,
        provider: Provider,
        access_token: &str,
    ) -> anyhow::Result<SocialProfile> {
        let profile = self.oauth.fetch_profile(provider, access_token).await?;
        match profile.email.as_deref().map(validation::normalize_email) {
            Some(email) if validation::is_valid_email(&email) => Ok(SocialProfile {
                email: Some(email),
                ..profile
            }),
            _ => Err(anyhow!("{provider} profile {} has no usable email", profile.id)),
        }
    }

    /// Find-or-create by email, then stamp the login and issue a token.
    /// The email is the federation key: the first account to claim it owns it.
    async fn complete_social_login(
        &self,
        provider: Provider,
        profile: SocialProfile,
        ip: Option<&str>,
    ) -> anyhow::Result<AuthSession> {
        let email = profile
            .email
            .clone()
            .context("social profile without email")?;

        let user = match self.users.find_by_email(&email).await? {
            Some(existing) => existing,
            None => self.create_social_user(provider, &email, &profile).await?,
        };

        let user = self
            .users
            .record_login(user.id, OffsetDateTime::now_utc(), ip)
            .await?;
        let token = self
            .issue_token(&user, &format!("social:{provider}"))
            .await?;
        info!(user_id = %user.id, %provider, "social login");
        Ok(AuthSession { user, token })
    }

    async fn create_social_user(
        &self,
        provider: Provider,
        email: &str,
        profile: &SocialProfile,
    ) -> anyhow::Result<User> {
        let new_user = NewUser {
            name: profile.display_name(),
            email: email.to_string(),
            password_hash: self.credentials.hash(&placeholder_password())?,
            role: DEFAULT_ROLE.to_string(),
            provider: Some(provider.to_string()),
            provider_id: Some(profile.id.clone()),
            avatar: profile.avatar.clone(),
            email_verified_at: Some(OffsetDateTime::now_utc()),
        };

        match self.users.create(new_user).await {
            Ok(user) => {
                info!(user_id = %user.id, %provider, "user created from social profile");
                Ok(user)
            }
            // A concurrent first login won the insert; continue as a login for that account.
            Err(CreateUserError::EmailTaken) => {
                warn!(%provider, "social user created concurrently; reusing it");
                self.users
                    .find_by_email(email)
                    .await?
                    .ok_or_else(|| anyhow!("user vanished after email conflict"))
            }
            Err(CreateUserError::Store(e)) => Err(e),
        }
    }
}
