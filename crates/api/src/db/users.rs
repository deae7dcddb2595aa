//! User repository for database operations.
//!
//! Covers `users` and the lazily created `user_profiles` row.

use sqlx::PgPool;

use souk_core::{Email, UserId};

use super::RepositoryError;
use crate::models::{NewUser, ProfilePatch, User, UserPatch, UserProfile};

const USER_COLUMNS: &str = "id, email, username, password_hash, first_name, last_name, phone, \
     is_active, email_verified_at, locale, timezone, last_login_at, date_joined, updated_at";

const USERNAME_KEY: &str = "users_username_lower_key";

const PROFILE_COLUMNS: &str = "user_id, bio, date_of_birth, loyalty_points, marketing_emails, \
     order_notifications, newsletter_subscription, created_at, updated_at";

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(user)
    }

    /// Get a user by email (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;
        Ok(user)
    }

    /// Whether an account already uses this email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn email_exists(&self, email: &Email) -> Result<bool, RepositoryError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE lower(email) = lower($1))")
                .bind(email.as_str())
                .fetch_one(self.pool)
                .await?;
        Ok(exists)
    }

    /// Whether an account already uses this username (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn username_exists(&self, username: &str) -> Result<bool, RepositoryError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE lower(username) = lower($1))",
        )
        .bind(username)
        .fetch_one(self.pool)
        .await?;
        Ok(exists)
    }

    /// Insert an inactive user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict("email" | "username")` naming the
    /// field that is taken. Returns `RepositoryError::Database` for other
    /// database errors.
    pub async fn create(&self, new: &NewUser) -> Result<User, RepositoryError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r"
            INSERT INTO users (email, username, password_hash, first_name, last_name, phone)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(&new.email)
        .bind(&new.username)
        .bind(&new.password_hash)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.phone)
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            let field = match &e {
                sqlx::Error::Database(db_err) => taken_field(db_err.constraint()),
                _ => "email",
            };
            RepositoryError::from_unique(e, field)
        })?;
        Ok(user)
    }

    /// Mark the email verified and the account active.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn activate(&self, id: UserId) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            r"
            UPDATE users
            SET is_active = TRUE,
                email_verified_at = COALESCE(email_verified_at, NOW()),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Replace the stored password hash.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_password_hash(&self, id: UserId, hash: &str) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Record a successful login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn touch_last_login(&self, id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Apply a partial update to the account fields.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    pub async fn update(&self, id: UserId, patch: &UserPatch) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(&format!(
            r"
            UPDATE users
            SET first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                phone = COALESCE($4, phone),
                locale = COALESCE($5, locale),
                timezone = COALESCE($6, timezone),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(patch.first_name.as_deref())
        .bind(patch.last_name.as_deref())
        .bind(patch.phone.as_deref())
        .bind(patch.locale.as_deref())
        .bind(patch.timezone.as_deref())
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Fetch the profile, creating the default row on first access.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_or_create_profile(&self, id: UserId) -> Result<UserProfile, RepositoryError> {
        sqlx::query("INSERT INTO user_profiles (user_id) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(id)
            .execute(self.pool)
            .await?;

        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE user_id = $1"
        ))
        .bind(id)
        .fetch_one(self.pool)
        .await?;
        Ok(profile)
    }

    /// Apply a partial update to the profile preferences.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update_profile(
        &self,
        id: UserId,
        patch: &ProfilePatch,
    ) -> Result<UserProfile, RepositoryError> {
        self.get_or_create_profile(id).await?;

        let (set_dob, dob) = match patch.date_of_birth {
            Some(value) => (true, value),
            None => (false, None),
        };

        let profile = sqlx::query_as::<_, UserProfile>(&format!(
            r"
            UPDATE user_profiles
            SET bio = COALESCE($2, bio),
                date_of_birth = CASE WHEN $3 THEN $4 ELSE date_of_birth END,
                marketing_emails = COALESCE($5, marketing_emails),
                order_notifications = COALESCE($6, order_notifications),
                newsletter_subscription = COALESCE($7, newsletter_subscription),
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING {PROFILE_COLUMNS}
            "
        ))
        .bind(id)
        .bind(patch.bio.as_deref())
        .bind(set_dob)
        .bind(dob)
        .bind(patch.marketing_emails)
        .bind(patch.order_notifications)
        .bind(patch.newsletter_subscription)
        .fetch_one(self.pool)
        .await?;
        Ok(profile)
    }
}

/// Registration field behind a unique violation on `users`.
fn taken_field(constraint: Option<&str>) -> &'static str {
    if constraint == Some(USERNAME_KEY) {
        "username"
    } else {
        "email"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taken_field_follows_constraint() {
        assert_eq!(taken_field(Some("users_username_lower_key")), "username");
        assert_eq!(taken_field(Some("users_email_lower_key")), "email");
        assert_eq!(taken_field(None), "email");
    }
}
