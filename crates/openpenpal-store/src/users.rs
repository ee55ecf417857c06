//! Account rows backing session issuance. The password hash never leaves
//! this module's return values except as an opaque string the auth layer
//! verifies against.

use chrono::{DateTime, Utc};
use openpenpal_errors::DomainError;
use openpenpal_types::{User, UserId, UserRole};
use sqlx::{PgPool, Row};

use crate::codec;

fn storage_err(e: sqlx::Error) -> DomainError {
    DomainError::Internal(e.to_string())
}

/// A user row plus the stored credential, for login verification only.
pub struct UserCredential {
    pub user: User,
    pub password_hash: String,
}

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: &sqlx::postgres::PgRow) -> Result<User, DomainError> {
        let role: String = row.try_get("role").map_err(storage_err)?;
        Ok(User {
            id: UserId(row.try_get("id").map_err(storage_err)?),
            username: row.try_get("username").map_err(storage_err)?,
            role: codec::user_role_from_db(&role)
                .ok_or_else(|| DomainError::Internal("unknown user role".to_string()))?,
            deactivated: row.try_get("deactivated").map_err(storage_err)?,
        })
    }

    pub async fn get(&self, id: UserId) -> Result<User, DomainError> {
        let row = sqlx::query("SELECT * FROM users WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .ok_or(DomainError::NotFound)?;
        Self::row_to_user(&row)
    }

    /// Fetches the credential for login. Deactivated accounts are treated
    /// as absent so a caller can't distinguish them from unknown usernames.
    pub async fn credential_by_username(&self, username: &str) -> Result<Option<UserCredential>, DomainError> {
        let row = sqlx::query("SELECT * FROM users WHERE username = $1 AND NOT deactivated")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        row.map(|row| {
            Ok(UserCredential {
                password_hash: row.try_get("password_hash").map_err(storage_err)?,
                user: Self::row_to_user(&row)?,
            })
        })
        .transpose()
    }

    pub async fn create(
        &self,
        user: &User,
        password_hash: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, password_hash, role, deactivated, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id.0)
        .bind(&user.username)
        .bind(password_hash)
        .bind(codec::user_role_to_db(user.role))
        .bind(user.deactivated)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}
