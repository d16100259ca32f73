use std::sync::Arc;

use sqlx::{pool::PoolConnection, PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use tracing::{debug, error, instrument};

use super::{
    password::{Argon2Verifier, PasswordVerifier},
    repo_types::{status, User},
};
use crate::{db::ConnectionProvider, error::RepositoryError};

const SELECT_USERS: &str = "SELECT * FROM users";

/// Data access for the `users` table.
///
/// Every operation takes one connection from the provider, runs one statement
/// and drops the connection before returning.
#[derive(Clone)]
pub struct UserRepository {
    connections: Arc<dyn ConnectionProvider>,
    verifier: Arc<dyn PasswordVerifier>,
}

fn failed(operation: &'static str, err: sqlx::Error) -> RepositoryError {
    let err = RepositoryError::from(err);
    error!(operation, error = %err, "user repository operation failed");
    err
}

fn expect_one_row(operation: &'static str, rows: u64) -> Result<(), RepositoryError> {
    if rows == 0 {
        debug!(operation, "no user row matched");
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

/// Returns the user only if the password matches and the account may sign in.
/// Callers cannot tell which check failed.
fn accept_credentials(
    user: Option<User>,
    password: &str,
    verifier: &dyn PasswordVerifier,
) -> Option<User> {
    let user = user?;
    if !verifier.verify(password, &user.password) {
        return None;
    }
    user.can_authenticate().then_some(user)
}

impl UserRepository {
    pub fn new(
        connections: Arc<dyn ConnectionProvider>,
        verifier: Arc<dyn PasswordVerifier>,
    ) -> Self {
        Self {
            connections,
            verifier,
        }
    }

    /// Repository over a pool, verifying passwords with Argon2.
    pub fn with_pool(pool: PgPool) -> Self {
        Self::new(Arc::new(pool), Arc::new(Argon2Verifier))
    }

    async fn conn(
        &self,
        operation: &'static str,
    ) -> Result<PoolConnection<Postgres>, RepositoryError> {
        self.connections
            .acquire()
            .await
            .map_err(|e| failed(operation, e))
    }

    /// Inserts `user` and stores the generated id on it.
    /// On failure `user.id` is left untouched.
    #[instrument(skip(self, user), fields(username = %user.username))]
    pub async fn insert(&self, user: &mut User) -> Result<i32, RepositoryError> {
        let mut conn = self.conn("insert").await?;
        let id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO users (username, email, password, role, status, created_at,
                               verification_code, verification_expiry, verified)
            VALUES ($1, $2, $3, $4, $5, NOW(), $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.role)
        .bind(&user.status)
        .bind(&user.verification_code)
        .bind(user.verification_expiry)
        .bind(user.verified)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| failed("insert", e))?;

        user.id = Some(id);
        debug!(user_id = id, "user inserted");
        Ok(id)
    }

    async fn fetch_one_by<'q, T>(
        &self,
        operation: &'static str,
        sql: &'q str,
        value: T,
    ) -> Result<Option<User>, RepositoryError>
    where
        T: 'q + Send + sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres>,
    {
        let mut conn = self.conn(operation).await?;
        sqlx::query_as::<_, User>(sql)
            .bind(value)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| failed(operation, e))
    }

    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: i32) -> Result<Option<User>, RepositoryError> {
        self.fetch_one_by("get_by_id", "SELECT * FROM users WHERE id = $1", id)
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        self.fetch_one_by("get_by_email", "SELECT * FROM users WHERE email = $1", email)
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        self.fetch_one_by(
            "get_by_username",
            "SELECT * FROM users WHERE username = $1",
            username,
        )
        .await
    }

    #[instrument(skip(self, code))]
    pub async fn get_by_verification_code(
        &self,
        code: &str,
    ) -> Result<Option<User>, RepositoryError> {
        self.fetch_one_by(
            "get_by_verification_code",
            "SELECT * FROM users WHERE verification_code = $1",
            code,
        )
        .await
    }

    #[instrument(skip(self, token))]
    pub async fn get_by_reset_token(&self, token: &str) -> Result<Option<User>, RepositoryError> {
        self.fetch_one_by(
            "get_by_reset_token",
            "SELECT * FROM users WHERE reset_token = $1",
            token,
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn get_all(&self) -> Result<Vec<User>, RepositoryError> {
        let mut conn = self.conn("get_all").await?;
        sqlx::query_as::<_, User>(SELECT_USERS)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| failed("get_all", e))
    }

    #[instrument(skip(self))]
    pub async fn get_all_by_role(&self, role: &str) -> Result<Vec<User>, RepositoryError> {
        let mut conn = self.conn("get_all_by_role").await?;
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE role = $1")
            .bind(role)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| failed("get_all_by_role", e))
    }

    /// Batch lookup. Order follows storage, not `ids`. An empty slice
    /// returns without touching the database.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn get_by_ids(&self, ids: &[i32]) -> Result<Vec<User>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Postgres>::new(SELECT_USERS);
        qb.push(" WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let mut conn = self.conn("get_by_ids").await?;
        qb.build_query_as::<User>()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| failed("get_by_ids", e))
    }

    /// Writes every mutable column of `user` and stamps `updated_at`.
    #[instrument(skip(self, user), fields(user_id = ?user.id))]
    pub async fn update(&self, user: &User) -> Result<(), RepositoryError> {
        let id = user.id.ok_or(RepositoryError::Unpersisted)?;
        let mut conn = self.conn("update").await?;
        let result = sqlx::query(
            r#"
            UPDATE users
               SET username = $1, email = $2, password = $3,
                   role = $4, status = $5, updated_at = NOW(),
                   verification_code = $6, verification_expiry = $7,
                   reset_token = $8, reset_token_expiry = $9, verified = $10
             WHERE id = $11
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.role)
        .bind(&user.status)
        .bind(&user.verification_code)
        .bind(user.verification_expiry)
        .bind(&user.reset_token)
        .bind(user.reset_token_expiry)
        .bind(user.verified)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| failed("update", e))?;

        expect_one_row("update", result.rows_affected())
    }

    /// Sets the verified flag; status follows it (`active` / `pending`).
    #[instrument(skip(self))]
    pub async fn update_verification_status(
        &self,
        user_id: i32,
        verified: bool,
    ) -> Result<(), RepositoryError> {
        let new_status = if verified {
            status::ACTIVE
        } else {
            status::PENDING
        };
        let mut conn = self.conn("update_verification_status").await?;
        let result = sqlx::query(
            "UPDATE users SET verified = $1, status = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(verified)
        .bind(new_status)
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| failed("update_verification_status", e))?;

        expect_one_row("update_verification_status", result.rows_affected())
    }

    #[instrument(skip(self, token))]
    pub async fn set_password_reset_token(
        &self,
        user_id: i32,
        token: &str,
        expiry: OffsetDateTime,
    ) -> Result<(), RepositoryError> {
        let mut conn = self.conn("set_password_reset_token").await?;
        let result = sqlx::query(
            r#"
            UPDATE users
               SET reset_token = $1, reset_token_expiry = $2, updated_at = NOW()
             WHERE id = $3
            "#,
        )
        .bind(token)
        .bind(expiry)
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| failed("set_password_reset_token", e))?;

        expect_one_row("set_password_reset_token", result.rows_affected())
    }

    /// Stores an already hashed password and clears any reset token in the same statement.
    #[instrument(skip(self, password_hash))]
    pub async fn update_password(
        &self,
        user_id: i32,
        password_hash: &str,
    ) -> Result<(), RepositoryError> {
        let mut conn = self.conn("update_password").await?;
        let result = sqlx::query(
            r#"
            UPDATE users
               SET password = $1, reset_token = NULL, reset_token_expiry = NULL,
                   updated_at = NOW()
             WHERE id = $2
            "#,
        )
        .bind(password_hash)
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| failed("update_password", e))?;

        expect_one_row("update_password", result.rows_affected())
    }

    /// `Ok(None)` for an unknown email, a wrong password, or an account that
    /// is not verified and active.
    #[instrument(skip(self, password))]
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let user = self.get_by_email(email).await?;
        let accepted = accept_credentials(user, password, self.verifier.as_ref());
        if accepted.is_none() {
            debug!("authentication rejected");
        }
        Ok(accepted)
    }
}
