//! In-memory collaborators for service and router tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::anyhow;
use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{
    auth::{
        password::CredentialVerifier,
        repo::{CreateUserError, UserStore},
        repo_types::{AccessToken, NewUser, User},
        services::{AuthPolicy, AuthService},
        tokens::{hash_token, new_token_row, IssuedToken, TokenIssuer},
    },
    social::{OAuthBroker, Provider, SocialProfile},
};

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
    conflict_for: Mutex<Option<String>>,
}

impl MemoryUserStore {
    pub fn len(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    pub fn get_by_email(&self, email: &str) -> Option<User> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .cloned()
    }

    /// Make the next `create` for `email` behave as if another request
    /// inserted the same email first.
    pub fn conflict_on_next_create(&self, email: &str) {
        *self.conflict_for.lock().unwrap() = Some(email.to_string());
    }

    fn insert(&self, new: NewUser) -> User {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            password_hash: Some(new.password_hash),
            role: new.role,
            provider: new.provider,
            provider_id: new.provider_id,
            avatar: new.avatar,
            email_verified_at: new.email_verified_at,
            last_login_at: None,
            last_login_ip: None,
            created_at: now,
            updated_at: now,
        };
        self.users.lock().unwrap().push(user.clone());
        user
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.get_by_email(email))
    }

    async fn create(&self, new: NewUser) -> Result<User, CreateUserError> {
        let racing = self.conflict_for.lock().unwrap().take();
        if racing.as_deref() == Some(new.email.as_str()) {
            self.insert(new);
            return Err(CreateUserError::EmailTaken);
        }
        if self.get_by_email(&new.email).is_some() {
            return Err(CreateUserError::EmailTaken);
        }
        Ok(self.insert(new))
    }

    async fn record_login(
        &self,
        id: Uuid,
        at: OffsetDateTime,
        ip: Option<&str>,
    ) -> anyhow::Result<User> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| anyhow!("no user {id}"))?;
        user.last_login_at = Some(at);
        user.last_login_ip = ip.map(str::to_string);
        user.updated_at = at;
        Ok(user.clone())
    }
}

/// Reversible stand-in for Argon2 so tests stay fast.
pub struct FakeVerifier;

impl CredentialVerifier for FakeVerifier {
    fn hash(&self, plain: &str) -> anyhow::Result<String> {
        Ok(format!("fake${}", plain.chars().rev().collect::<String>()))
    }

    fn verify(&self, plain: &str, hash: &str) -> anyhow::Result<bool> {
        let stored = hash
            .strip_prefix("fake$")
            .ok_or_else(|| anyhow!("malformed hash"))?;
        Ok(stored.chars().rev().collect::<String>() == plain)
    }
}

#[derive(Default)]
pub struct MemoryTokenIssuer {
    tokens: Mutex<HashMap<Vec<u8>, AccessToken>>,
}

impl MemoryTokenIssuer {
    pub fn len(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }
}

#[async_trait]
impl TokenIssuer for MemoryTokenIssuer {
    async fn issue(
        &self,
        user_id: Uuid,
        name: &str,
        abilities: &[String],
        ttl: Option<Duration>,
    ) -> anyhow::Result<IssuedToken> {
        let issued = new_token_row(user_id, name, abilities, ttl, OffsetDateTime::now_utc())?;
        self.tokens
            .lock()
            .unwrap()
            .insert(issued.token.token_hash.clone(), issued.token.clone());
        Ok(issued)
    }

    async fn resolve(&self, plain_text: &str) -> anyhow::Result<Option<AccessToken>> {
        let now = OffsetDateTime::now_utc();
        let mut tokens = self.tokens.lock().unwrap();
        Ok(tokens
            .get_mut(&hash_token(plain_text))
            .filter(|t| !t.is_expired_at(now))
            .map(|t| {
                t.last_used_at = Some(now);
                t.clone()
            }))
    }

    async fn revoke(&self, token_id: Uuid) -> anyhow::Result<bool> {
        let mut tokens = self.tokens.lock().unwrap();
        let before = tokens.len();
        tokens.retain(|_, t| t.id != token_id);
        Ok(tokens.len() < before)
    }
}

/// Provider double: codes map to access tokens, access tokens map to profiles.
#[derive(Default)]
pub struct FakeOAuthBroker {
    codes: Mutex<HashMap<String, String>>,
    profiles: Mutex<HashMap<String, SocialProfile>>,
}

impl FakeOAuthBroker {
    pub fn add_code(&self, code: &str, access_token: &str) {
        self.codes
            .lock()
            .unwrap()
            .insert(code.to_string(), access_token.to_string());
    }

    pub fn add_profile(&self, access_token: &str, profile: SocialProfile) {
        self.profiles
            .lock()
            .unwrap()
            .insert(access_token.to_string(), profile);
    }
}

#[async_trait]
impl OAuthBroker for FakeOAuthBroker {
    fn authorization_url(&self, provider: Provider) -> anyhow::Result<String> {
        Ok(format!(
            "https://{provider}.example/oauth/authorize?client_id=test&response_type=code"
        ))
    }

    async fn exchange_code(&self, provider: Provider, code: &str) -> anyhow::Result<String> {
        self.codes
            .lock()
            .unwrap()
            .get(code)
            .cloned()
            .ok_or_else(|| anyhow!("{provider} rejected code"))
    }

    async fn fetch_profile(
        &self,
        provider: Provider,
        access_token: &str,
    ) -> anyhow::Result<SocialProfile> {
        self.profiles
            .lock()
            .unwrap()
            .get(access_token)
            .cloned()
            .ok_or_else(|| anyhow!("{provider} rejected access token"))
    }
}

pub fn profile(id: &str, email: &str) -> SocialProfile {
    SocialProfile {
        id: id.to_string(),
        name: Some("Social User".to_string()),
        nickname: None,
        email: Some(email.to_string()),
        avatar: Some(format!("https://avatars.example/{id}.png")),
    }
}

/// One of each collaborator, shared so tests can inspect them after the fact.
#[derive(Default, Clone)]
pub struct Fakes {
    pub users: Arc<MemoryUserStore>,
    pub tokens: Arc<MemoryTokenIssuer>,
    pub oauth: Arc<FakeOAuthBroker>,
}

impl Fakes {
    pub fn service(&self, policy: AuthPolicy) -> AuthService {
        AuthService::new(
            self.users.clone(),
            Arc::new(FakeVerifier),
            self.tokens.clone(),
            self.oauth.clone(),
            policy,
        )
    }
}
