//! PostgreSQL Repository Implementations

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::entity::{Credentials, Identity, LockoutPolicy};
use crate::domain::repository::{CredentialsRepository, IdentityRepository};
use crate::domain::value_object::{
    email::Email, totp_secret::TotpSecret, user_id::UserId, user_name::UserName,
    user_password::UserPassword, user_role::UserRole,
};
use crate::error::{AuthError, AuthResult};

const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL-backed auth repository
#[derive(Clone)]
pub struct PgAuthRepository {
    pool: PgPool,
}

impl PgAuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lift lockouts that have already expired
    pub async fn clear_expired_locks(&self) -> AuthResult<u64> {
        let cleared = sqlx::query(
            r#"
            UPDATE auth_credentials
            SET login_failed_count = 0, locked_until = NULL
            WHERE locked_until IS NOT NULL AND locked_until <= $1
            "#,
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();

        tracing::info!(locks_cleared = cleared, "Cleared expired account locks");

        Ok(cleared)
    }

    async fn lock_credentials(
        tx: &mut Transaction<'_, Postgres>,
        user_id: &UserId,
    ) -> AuthResult<Credentials> {
        let row = sqlx::query_as::<_, CredentialsRow>(
            r#"
            SELECT
                user_id,
                password_hash,
                totp_secret,
                login_failed_count,
                locked_until,
                updated_at
            FROM auth_credentials
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(AuthError::UserNotFound)?;

        row.into_credentials()
    }

    async fn write_lockout(
        tx: &mut Transaction<'_, Postgres>,
        credentials: &Credentials,
    ) -> AuthResult<()> {
        sqlx::query(
            r#"
            UPDATE auth_credentials
            SET login_failed_count = $2, locked_until = $3, updated_at = $4
            WHERE user_id = $1
            "#,
        )
        .bind(credentials.user_id.as_uuid())
        .bind(credentials.failed_login_count as i32)
        .bind(credentials.lock_until)
        .bind(credentials.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|e| e.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION)
}

// ============================================================================
// Identity Repository Implementation
// ============================================================================

const IDENTITY_COLUMNS: &str = r#"
    user_id,
    user_name,
    email,
    user_role,
    two_factor_enabled,
    token_version,
    last_login_at,
    created_at,
    updated_at
"#;

impl IdentityRepository for PgAuthRepository {
    async fn create(&self, identity: &Identity, credentials: &Credentials) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO users (
                user_id,
                user_name,
                email,
                user_role,
                two_factor_enabled,
                token_version,
                last_login_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(identity.user_id.as_uuid())
        .bind(identity.username.as_str())
        .bind(identity.email.as_str())
        .bind(identity.role.id())
        .bind(identity.two_factor_enabled)
        .bind(identity.token_version)
        .bind(identity.last_login_at)
        .bind(identity.created_at)
        .bind(identity.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            return Err(if is_unique_violation(&e) {
                AuthError::DuplicateEmail
            } else {
                e.into()
            });
        }

        sqlx::query(
            r#"
            INSERT INTO auth_credentials (
                user_id,
                password_hash,
                totp_secret,
                login_failed_count,
                locked_until,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(credentials.user_id.as_uuid())
        .bind(credentials.password_hash.as_phc_string())
        .bind(credentials.totp_secret.as_ref().map(TotpSecret::as_base32))
        .bind(credentials.failed_login_count as i32)
        .bind(credentials.lock_until)
        .bind(credentials.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn find_by_id(&self, user_id: &UserId) -> AuthResult<Option<Identity>> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM users WHERE user_id = $1"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(IdentityRow::into_identity).transpose()
    }

    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<Identity>> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(IdentityRow::into_identity).transpose()
    }

    async fn exists_by_email(&self, email: &Email) -> AuthResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn update(&self, identity: &Identity) -> AuthResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET
                user_name = $2,
                email = $3,
                user_role = $4,
                last_login_at = $5,
                updated_at = $6
            WHERE user_id = $1
            "#,
        )
        .bind(identity.user_id.as_uuid())
        .bind(identity.username.as_str())
        .bind(identity.email.as_str())
        .bind(identity.role.id())
        .bind(identity.last_login_at)
        .bind(identity.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(AuthError::UserNotFound),
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(AuthError::DuplicateEmail),
            Err(e) => Err(e.into()),
        }
    }

    async fn increment_token_version(&self, user_id: &UserId) -> AuthResult<i64> {
        let version: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET token_version = token_version + 1
            WHERE user_id = $1
            RETURNING token_version
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        version.ok_or(AuthError::UserNotFound)
    }
}

// ============================================================================
// Credentials Repository Implementation
// ============================================================================

impl CredentialsRepository for PgAuthRepository {
    async fn find_credentials(&self, user_id: &UserId) -> AuthResult<Option<Credentials>> {
        let row = sqlx::query_as::<_, CredentialsRow>(
            r#"
            SELECT
                user_id,
                password_hash,
                totp_secret,
                login_failed_count,
                locked_until,
                updated_at
            FROM auth_credentials
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(CredentialsRow::into_credentials).transpose()
    }

    async fn update_password_hash(
        &self,
        user_id: &UserId,
        password_hash: &UserPassword,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE auth_credentials
            SET password_hash = $2, updated_at = $3
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(password_hash.as_phc_string())
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }

        Ok(())
    }

    async fn record_login_failure(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
    ) -> AuthResult<Credentials> {
        // Row lock serialises concurrent failures for the same account
        let mut tx = self.pool.begin().await?;

        let mut credentials = Self::lock_credentials(&mut tx, user_id).await?;
        credentials.record_failure(now, policy);
        Self::write_lockout(&mut tx, &credentials).await?;

        tx.commit().await?;

        Ok(credentials)
    }

    async fn reset_login_failures(&self, user_id: &UserId, now: DateTime<Utc>) -> AuthResult<()> {
        sqlx::query(
            r#"
            UPDATE auth_credentials
            SET login_failed_count = 0, locked_until = NULL, updated_at = $2
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_two_factor(
        &self,
        user_id: &UserId,
        secret: Option<&TotpSecret>,
        now: DateTime<Utc>,
    ) -> AuthResult<()> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE auth_credentials
            SET totp_secret = $2, updated_at = $3
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(secret.map(TotpSecret::as_base32))
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(AuthError::UserNotFound);
        }

        sqlx::query(
            r#"
            UPDATE users
            SET two_factor_enabled = $2, updated_at = $3
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(secret.is_some())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(sqlx::FromRow)]
struct IdentityRow {
    user_id: Uuid,
    user_name: String,
    email: String,
    user_role: i16,
    two_factor_enabled: bool,
    token_version: i64,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl IdentityRow {
    fn into_identity(self) -> AuthResult<Identity> {
        let role = UserRole::from_id(self.user_role)
            .ok_or_else(|| AuthError::Internal(format!("Invalid user_role: {}", self.user_role)))?;

        Ok(Identity {
            user_id: UserId::from_uuid(self.user_id),
            username: UserName::from_db(self.user_name),
            email: Email::from_db(self.email),
            role,
            two_factor_enabled: self.two_factor_enabled,
            token_version: self.token_version,
            last_login_at: self.last_login_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CredentialsRow {
    user_id: Uuid,
    password_hash: String,
    totp_secret: Option<String>,
    login_failed_count: i32,
    locked_until: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl CredentialsRow {
    fn into_credentials(self) -> AuthResult<Credentials> {
        let password_hash = UserPassword::from_phc_string(self.password_hash)
            .map_err(|e| AuthError::Internal(format!("Invalid password_hash: {}", e)))?;
        let totp_secret = self
            .totp_secret
            .map(TotpSecret::from_base32)
            .transpose()
            .map_err(|e| AuthError::Internal(format!("Invalid TOTP secret: {}", e)))?;

        Ok(Credentials {
            user_id: UserId::from_uuid(self.user_id),
            password_hash,
            totp_secret,
            failed_login_count: self.login_failed_count.max(0) as u32,
            lock_until: self.locked_until,
            updated_at: self.updated_at,
        })
    }
}
