use serde::Serialize;
use sqlx::{postgres::PgRow, FromRow, Postgres, Row};
use time::OffsetDateTime;

use super::tokens::IssuedToken;

pub mod status {
    pub const ACTIVE: &str = "active";
    pub const PENDING: &str = "pending";
}

pub mod role {
    pub const MEMBER: &str = "member";
    pub const ADMIN: &str = "admin";
}

/// User record in the `users` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: Option<i32>,           // assigned by storage on insert
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password: String,          // already hashed
    pub role: String,
    pub status: String,
    pub verified: bool,
    #[serde(skip_serializing)]
    pub verification_code: Option<String>,
    pub verification_expiry: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub reset_token: Option<String>,
    pub reset_token_expiry: Option<OffsetDateTime>,
    pub created_at: Option<OffsetDateTime>,
    pub updated_at: Option<OffsetDateTime>,
}

impl User {
    /// A not yet inserted account waiting for email verification.
    pub fn new_pending(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
        role: impl Into<String>,
        verification: IssuedToken,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password_hash.into(),
            role: role.into(),
            status: status::PENDING.to_string(),
            verified: false,
            verification_code: Some(verification.value),
            verification_expiry: Some(verification.expires_at),
            ..Self::default()
        }
    }

    pub fn can_authenticate(&self) -> bool {
        self.verified && self.status == status::ACTIVE
    }

    /// Missing expiry counts as expired.
    pub fn verification_expired_at(&self, now: OffsetDateTime) -> bool {
        self.verification_expiry.map_or(true, |exp| exp <= now)
    }

    pub fn reset_token_matches(&self, token: &str, now: OffsetDateTime) -> bool {
        match (&self.reset_token, self.reset_token_expiry) {
            (Some(stored), Some(exp)) => stored == token && now < exp,
            _ => false,
        }
    }
}

// Older deployments lack the verification/reset columns; a missing column
// decodes as None instead of failing the row.
fn legacy_column<'r, T>(row: &'r PgRow, column: &str) -> Result<Option<T>, sqlx::Error>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    match row.try_get::<Option<T>, _>(column) {
        Ok(value) => Ok(value),
        Err(sqlx::Error::ColumnNotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

impl<'r> FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: Some(row.try_get("id")?),
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password: row.try_get("password")?,
            role: row.try_get("role")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            verification_code: legacy_column(row, "verification_code")?,
            verification_expiry: legacy_column(row, "verification_expiry")?,
            reset_token: legacy_column(row, "reset_token")?,
            reset_token_expiry: legacy_column(row, "reset_token_expiry")?,
            verified: legacy_column::<bool>(row, "verified")?.unwrap_or(false),
        })
    }
}
