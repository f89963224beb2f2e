//! Opaque bearer tokens. The plaintext is handed to the client once; only its
//! SHA-256 digest is persisted.

use anyhow::Context;
use async_trait::async_trait;
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::auth::repo_types::AccessToken;

pub const TOKEN_LEN: usize = 40;

/// Ability granted to tokens minted without explicit scopes.
pub const ALL_ABILITIES: &str = "*";

/// A freshly minted token together with its stored row.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub plain_text: String,
    pub token: AccessToken,
}

#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Mint a new token. Existing tokens of the user are left untouched.
    async fn issue(
        &self,
        user_id: Uuid,
        name: &str,
        abilities: &[String],
        ttl: Option<Duration>,
    ) -> anyhow::Result<IssuedToken>;

    /// Look up a presented bearer string; expired or unknown tokens yield `None`.
    async fn resolve(&self, plain_text: &str) -> anyhow::Result<Option<AccessToken>>;

    /// Delete one token. Returns whether it existed.
    async fn revoke(&self, token_id: Uuid) -> anyhow::Result<bool>;
}

pub fn generate_plain_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

pub fn hash_token(plain_text: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(plain_text.as_bytes());
    hasher.finalize().to_vec()
}

/// Build the row for a new token; `now` fixes both creation and expiry.
pub fn new_token_row(
    user_id: Uuid,
    name: &str,
    abilities: &[String],
    ttl: Option<Duration>,
    now: OffsetDateTime,
) -> anyhow::Result<IssuedToken> {
    let expires_at = match ttl {
        Some(ttl) => Some(
            now.checked_add(ttl)
                .with_context(|| format!("token lifetime {ttl} is out of range"))?,
        ),
        None => None,
    };
    let plain_text = generate_plain_token();
    let abilities = if abilities.is_empty() {
        vec![ALL_ABILITIES.to_string()]
    } else {
        abilities.to_vec()
    };
    let token = AccessToken {
        id: Uuid::new_v4(),
        user_id,
        name: name.to_string(),
        token_hash: hash_token(&plain_text),
        abilities,
        last_used_at: None,
        expires_at,
        created_at: now,
    };
    Ok(IssuedToken { plain_text, token })
}

pub struct PgTokenIssuer {
    db: PgPool,
}

impl PgTokenIssuer {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TokenIssuer for PgTokenIssuer {
    async fn issue(
        &self,
        user_id: Uuid,
        name: &str,
        abilities: &[String],
        ttl: Option<Duration>,
    ) -> anyhow::Result<IssuedToken> {
        let issued = new_token_row(user_id, name, abilities, ttl, OffsetDateTime::now_utc())?;
        let t = &issued.token;
        sqlx::query(
            r#"
            INSERT INTO personal_access_tokens
                (id, user_id, name, token_hash, abilities, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(t.id)
        .bind(t.user_id)
        .bind(&t.name)
        .bind(&t.token_hash)
        .bind(&t.abilities)
        .bind(t.expires_at)
        .bind(t.created_at)
        .execute(&self.db)
        .await
        .context("insert personal access token")?;

        debug!(user_id = %user_id, token_id = %t.id, name, "token issued");
        Ok(issued)
    }

    async fn resolve(&self, plain_text: &str) -> anyhow::Result<Option<AccessToken>> {
        let token = sqlx::query_as::<_, AccessToken>(
            r#"
            UPDATE personal_access_tokens
               SET last_used_at = NOW()
             WHERE token_hash = $1
               AND (expires_at IS NULL OR expires_at > NOW())
            RETURNING id, user_id, name, token_hash, abilities, last_used_at, expires_at, created_at
            "#,
        )
        .bind(hash_token(plain_text))
        .fetch_optional(&self.db)
        .await
        .context("resolve personal access token")?;
        Ok(token)
    }

    async fn revoke(&self, token_id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM personal_access_tokens WHERE id = $1")
            .bind(token_id)
            .execute(&self.db)
            .await
            .context("delete personal access token")?;
        debug!(token_id = %token_id, "token revoked");
        Ok(result.rows_affected() == 1)
    }
}
