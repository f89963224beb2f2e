use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};

#[derive(Debug, thiserror::Error)]
pub enum CreateUserError {
    #[error("email already registered")]
    EmailTaken,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Persistence of user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    /// Insert a user; a duplicate email is reported as [`CreateUserError::EmailTaken`].
    async fn create(&self, new: NewUser) -> Result<User, CreateUserError>;

    /// Stamp the last-login time and address, returning the updated record.
    async fn record_login(
        &self,
        id: Uuid,
        at: OffsetDateTime,
        ip: Option<&str>,
    ) -> anyhow::Result<User>;
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role, provider, provider_id, avatar, \
     email_verified_at, last_login_at, last_login_ip, created_at, updated_at";

pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn create(&self, new: NewUser) -> Result<User, CreateUserError> {
        let result = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, provider, provider_id,
                               avatar, email_verified_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.role)
        .bind(&new.provider)
        .bind(&new.provider_id)
        .bind(&new.avatar)
        .bind(new.email_verified_at)
        .fetch_one(&self.db)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(err) if is_unique_violation(&err) => Err(CreateUserError::EmailTaken),
            Err(err) => Err(anyhow::Error::new(err).context("insert user").into()),
        }
    }

    async fn record_login(
        &self,
        id: Uuid,
        at: OffsetDateTime,
        ip: Option<&str>,
    ) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET last_login_at = $2, last_login_ip = $3, updated_at = NOW()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(at)
        .bind(ip)
        .fetch_one(&self.db)
        .await
        .context("record user login")?;
        Ok(user)
    }
}
