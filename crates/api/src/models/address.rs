//! Saved user addresses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use souk_core::{AddressId, AddressKind, UserId};

use crate::error::FieldErrors;

/// Country used when none is supplied (ISO 3166-1 alpha-2).
pub const DEFAULT_COUNTRY: &str = "MA";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Address {
    pub id: AddressId,
    #[serde(skip)]
    pub user_id: UserId,
    pub kind: AddressKind,
    pub label: String,
    pub full_name: String,
    pub line1: String,
    pub line2: String,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_country() -> String {
    DEFAULT_COUNTRY.to_string()
}

/// Body of `POST /api/v1/users/me/addresses/`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AddressInput {
    pub kind: AddressKind,
    pub label: String,
    pub full_name: String,
    pub line1: String,
    pub line2: String,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country: String,
    pub phone: String,
    pub is_default: bool,
}

impl AddressInput {
    /// Trim every field, upper-case the country and collect field errors.
    pub fn normalize(&mut self) -> FieldErrors {
        for field in [
            &mut self.label,
            &mut self.full_name,
            &mut self.line1,
            &mut self.line2,
            &mut self.city,
            &mut self.region,
            &mut self.postal_code,
            &mut self.phone,
        ] {
            *field = field.trim().to_owned();
        }
        self.country = self.country.trim().to_uppercase();
        if self.country.is_empty() {
            self.country = default_country();
        }

        let mut errors = FieldErrors::default();
        errors.require("full_name", &self.full_name);
        errors.require("line1", &self.line1);
        errors.require("city", &self.city);
        errors.max_len("full_name", &self.full_name, 120);
        errors.max_len("line1", &self.line1, 255);
        errors.max_len("line2", &self.line2, 255);
        errors.max_len("postal_code", &self.postal_code, 20);
        errors.max_len("phone", &self.phone, 32);
        validate_country(&mut errors, &self.country);
        errors
    }
}

/// Body of `PATCH /api/v1/users/me/addresses/{id}/`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AddressPatch {
    pub kind: Option<AddressKind>,
    pub label: Option<String>,
    pub full_name: Option<String>,
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
    pub is_default: Option<bool>,
}

impl AddressPatch {
    /// Merge the patch over an existing address, producing a full input.
    #[must_use]
    pub fn apply_to(self, current: &Address) -> AddressInput {
        AddressInput {
            kind: self.kind.unwrap_or(current.kind),
            label: self.label.unwrap_or_else(|| current.label.clone()),
            full_name: self.full_name.unwrap_or_else(|| current.full_name.clone()),
            line1: self.line1.unwrap_or_else(|| current.line1.clone()),
            line2: self.line2.unwrap_or_else(|| current.line2.clone()),
            city: self.city.unwrap_or_else(|| current.city.clone()),
            region: self.region.unwrap_or_else(|| current.region.clone()),
            postal_code: self.postal_code.unwrap_or_else(|| current.postal_code.clone()),
            country: self.country.unwrap_or_else(|| current.country.clone()),
            phone: self.phone.unwrap_or_else(|| current.phone.clone()),
            is_default: self.is_default.unwrap_or(current.is_default),
        }
    }
}

fn validate_country(errors: &mut FieldErrors, country: &str) {
    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_uppercase()) {
        errors.add("country", "Enter a two-letter ISO country code.");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_input_defaults_country_to_morocco() {
        let mut input: AddressInput = serde_json::from_str(
            r#"{"full_name": "Omar Tazi", "line1": "12 Rue Atlas", "city": "Rabat"}"#,
        )
        .unwrap();
        let errors = input.normalize();

        assert!(errors.is_empty());
        assert_eq!(input.country, "MA");
        assert_eq!(input.kind, AddressKind::Shipping);
    }

    #[test]
    fn test_input_reports_missing_fields() {
        let mut input = AddressInput {
            country: "fr".to_string(),
            ..AddressInput::default()
        };
        let errors = input.normalize();

        assert!(errors.contains("full_name"));
        assert!(errors.contains("line1"));
        assert!(errors.contains("city"));
        assert!(!errors.contains("country"));
        assert_eq!(input.country, "FR");
    }

    #[test]
    fn test_input_rejects_bad_country() {
        let mut input = AddressInput {
            full_name: "A".into(),
            line1: "B".into(),
            city: "C".into(),
            country: "Morocco".into(),
            ..AddressInput::default()
        };
        assert!(input.normalize().contains("country"));
    }

    #[test]
    fn test_patch_keeps_unspecified_fields() {
        let now = Utc::now();
        let current = Address {
            id: AddressId::new(3),
            user_id: UserId::new(1),
            kind: AddressKind::Billing,
            label: "Home".into(),
            full_name: "Omar Tazi".into(),
            line1: "12 Rue Atlas".into(),
            line2: String::new(),
            city: "Rabat".into(),
            region: "Rabat-Salé-Kénitra".into(),
            postal_code: "10000".into(),
            country: "MA".into(),
            phone: String::new(),
            is_default: true,
            created_at: now,
            updated_at: now,
        };
        let patch = AddressPatch {
            city: Some("Fès".into()),
            ..AddressPatch::default()
        };

        let merged = patch.apply_to(&current);
        assert_eq!(merged.city, "Fès");
        assert_eq!(merged.label, "Home");
        assert_eq!(merged.kind, AddressKind::Billing);
        assert!(merged.is_default);
    }
}
