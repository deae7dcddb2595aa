//! User account and loyalty profile models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use souk_core::{AddressId, Email, MembershipTier, UserId};

/// A registered account.
///
/// Implements `Debug` manually to keep the password hash out of logs.
#[derive(Clone, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    /// False until the email address has been verified.
    pub is_active: bool,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub locale: String,
    pub timezone: String,
    pub last_login_at: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password_hash", &"[REDACTED]")
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}

impl User {
    #[must_use]
    pub const fn is_email_verified(&self) -> bool {
        self.email_verified_at.is_some()
    }

    /// First and last name joined, or the username when both are blank.
    #[must_use]
    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_owned()
        }
    }
}

/// Fields required to insert a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Email,
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
}

/// Public view of a user.
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub email: Email,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub phone: String,
    pub is_active: bool,
    pub is_email_verified: bool,
    pub locale: String,
    pub timezone: String,
    pub date_joined: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            full_name: user.full_name(),
            phone: user.phone.clone(),
            is_active: user.is_active,
            is_email_verified: user.is_email_verified(),
            locale: user.locale.clone(),
            timezone: user.timezone.clone(),
            date_joined: user.date_joined,
        }
    }
}

/// Preferences and loyalty balance (one per user, created lazily).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserProfile {
    pub user_id: UserId,
    pub bio: String,
    pub date_of_birth: Option<NaiveDate>,
    pub loyalty_points: i32,
    pub marketing_emails: bool,
    pub order_notifications: bool,
    pub newsletter_subscription: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    #[must_use]
    pub const fn membership_tier(&self) -> MembershipTier {
        MembershipTier::for_points(self.loyalty_points)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileResponse {
    pub bio: String,
    pub date_of_birth: Option<NaiveDate>,
    pub loyalty_points: i32,
    pub membership_tier: MembershipTier,
    pub discount_percentage: u8,
    pub marketing_emails: bool,
    pub order_notifications: bool,
    pub newsletter_subscription: bool,
}

impl From<&UserProfile> for ProfileResponse {
    fn from(profile: &UserProfile) -> Self {
        let tier = profile.membership_tier();
        Self {
            bio: profile.bio.clone(),
            date_of_birth: profile.date_of_birth,
            loyalty_points: profile.loyalty_points,
            membership_tier: tier,
            discount_percentage: tier.discount_percentage(),
            marketing_emails: profile.marketing_emails,
            order_notifications: profile.order_notifications,
            newsletter_subscription: profile.newsletter_subscription,
        }
    }
}

/// Body of `PATCH /api/v1/users/me/`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub locale: Option<String>,
    pub timezone: Option<String>,
}

/// Body of `PATCH /api/v1/users/me/profile/`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfilePatch {
    pub bio: Option<String>,
    /// `Some(None)` clears the date.
    #[serde(deserialize_with = "double_option")]
    pub date_of_birth: Option<Option<NaiveDate>>,
    pub marketing_emails: Option<bool>,
    pub order_notifications: Option<bool>,
    pub newsletter_subscription: Option<bool>,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<NaiveDate>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<NaiveDate>::deserialize(deserializer).map(Some)
}

/// Response body of `GET /api/v1/users/me/`.
#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub profile: ProfileResponse,
    pub addresses_count: i64,
    pub default_address_id: Option<AddressId>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn user(first: &str, last: &str) -> User {
        let now = Utc::now();
        User {
            id: UserId::new(1),
            email: Email::parse("salma@example.ma").unwrap(),
            username: "salma".to_string(),
            password_hash: "$argon2id$v=19$hash".to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            phone: String::new(),
            is_active: true,
            email_verified_at: Some(now),
            locale: "fr".to_string(),
            timezone: "Africa/Casablanca".to_string(),
            last_login_at: None,
            date_joined: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_profile_patch_distinguishes_null_from_absent() {
        let absent: ProfilePatch = serde_json::from_str(r#"{"bio": "hi"}"#).unwrap();
        assert!(absent.date_of_birth.is_none());

        let cleared: ProfilePatch = serde_json::from_str(r#"{"date_of_birth": null}"#).unwrap();
        assert_eq!(cleared.date_of_birth, Some(None));

        let set: ProfilePatch =
            serde_json::from_str(r#"{"date_of_birth": "1994-03-02"}"#).unwrap();
        assert!(matches!(set.date_of_birth, Some(Some(_))));
    }

    #[test]
    fn test_full_name_falls_back_to_username() {
        assert_eq!(user("Salma", "Idrissi").full_name(), "Salma Idrissi");
        assert_eq!(user("Salma", "").full_name(), "Salma");
        assert_eq!(user("", " ").full_name(), "salma");
    }

    #[test]
    fn test_debug_hides_password_hash() {
        let debug = format!("{:?}", user("A", "B"));
        assert!(!debug.contains("argon2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_me_response_flattens_user() {
        let u = user("Salma", "Idrissi");
        let now = Utc::now();
        let profile = UserProfile {
            user_id: u.id,
            bio: String::new(),
            date_of_birth: None,
            loyalty_points: 5_200,
            marketing_emails: false,
            order_notifications: true,
            newsletter_subscription: false,
            created_at: now,
            updated_at: now,
        };
        let body = MeResponse {
            user: UserResponse::from(&u),
            profile: ProfileResponse::from(&profile),
            addresses_count: 2,
            default_address_id: Some(AddressId::new(9)),
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["email"], "salma@example.ma");
        assert_eq!(json["addresses_count"], 2);
        assert_eq!(json["default_address_id"], 9);
        assert_eq!(json["profile"]["membership_tier"], "gold");
        assert_eq!(json["profile"]["discount_percentage"], 10);
    }
}
