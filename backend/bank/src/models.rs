//! # Models
//!
//! Records kept in Redis and the forms clients send to create or change them.
//!
//! ## Records
//! - **Store**: listing with a slug, tags, a GeoJSON-like point and an owning author.
//! - **Review**: free text plus an optional 1-5 rating, tied to a store and an author.
//! - **User**: account with a salted password hash and an optional reset token.
//!
//! Forms are deserialized leniently (every field defaults) so a missing field
//! surfaces as a readable validation message instead of a decode failure.
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Problems, ValidationError};

pub const POINT: &str = "Point";

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles"));

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Location {
    #[serde(rename = "type")]
    pub kind: String,
    /// `[lng, lat]`, the order GeoJSON uses.
    pub coordinates: [f64; 2],
    pub address: String,
}

impl Location {
    pub fn lng(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn lat(&self) -> f64 {
        self.coordinates[1]
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Store {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub tags: Vec<String>,
    pub created: DateTime<Utc>,
    pub location: Location,
    pub photo: Option<String>,
    pub author: Uuid,
}

impl Store {
    pub fn new(valid: ValidStore, slug: String, author: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: valid.name,
            slug,
            description: valid.description,
            tags: valid.tags,
            created: Utc::now(),
            location: valid.location,
            photo: valid.photo,
            author,
        }
    }

    /// Overwrites the editable fields. Returns whether the name changed, which
    /// is the only thing that moves the slug.
    pub fn apply(&mut self, valid: ValidStore) -> bool {
        let renamed = self.name != valid.name;

        self.name = valid.name;
        self.description = valid.description;
        self.tags = valid.tags;
        self.location = valid.location;
        if valid.photo.is_some() {
            self.photo = valid.photo;
        }

        renamed
    }

    pub fn is_owned_by(&self, user: Uuid) -> bool {
        self.author == user
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct LocationForm {
    pub coordinates: Vec<f64>,
    pub address: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct StoreForm {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub location: LocationForm,
    pub photo: Option<String>,
}

/// A [`StoreForm`] that passed validation, trimmed and normalised.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidStore {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub location: Location,
    pub photo: Option<String>,
}

impl StoreForm {
    pub fn validate(self) -> Result<ValidStore, ValidationError> {
        let mut problems = Problems::default();

        let name = self.name.trim().to_string();
        problems.check(!name.is_empty(), "Please enter a store name!");

        let address = self.location.address.trim().to_string();
        problems.check(!address.is_empty(), "You must supply an address");

        let coordinates = match self.location.coordinates.as_slice() {
            [lng, lat] => {
                problems.check(
                    (-180.0..=180.0).contains(lng),
                    "Longitude must be between -180 and 180",
                );
                problems.check(
                    (-90.0..=90.0).contains(lat),
                    "Latitude must be between -90 and 90",
                );
                [*lng, *lat]
            }
            _ => {
                problems.push("You must supply coordinates");
                [0.0, 0.0]
            }
        };

        let photo = self
            .photo
            .map(|photo| photo.trim().to_string())
            .filter(|photo| !photo.is_empty());

        problems.finish(ValidStore {
            name,
            description: self.description.trim().to_string(),
            tags: clean_tags(self.tags),
            location: Location {
                kind: POINT.to_string(),
                coordinates,
                address,
            },
            photo,
        })
    }
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(tags.len());

    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !cleaned.iter().any(|seen| seen == tag) {
            cleaned.push(tag.to_string());
        }
    }

    cleaned
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Review {
    pub id: Uuid,
    pub text: String,
    pub created: DateTime<Utc>,
    pub author: Uuid,
    pub store: Uuid,
    pub rating: Option<u8>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ReviewForm {
    pub text: String,
    pub rating: Option<i64>,
}

impl ReviewForm {
    pub fn validate(self, author: Uuid, store: Uuid) -> Result<Review, ValidationError> {
        let mut problems = Problems::default();

        let text = self.text.trim().to_string();
        problems.check(!text.is_empty(), "Please enter your review");

        let rating = match self.rating {
            Some(rating @ 1..=5) => Some(rating as u8),
            Some(_) => {
                problems.push("Rating must be between 1 and 5");
                None
            }
            None => None,
        };

        problems.finish(Review {
            id: Uuid::new_v4(),
            text,
            created: Utc::now(),
            author,
            store,
            rating,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created: DateTime<Utc>,
    pub reset_password_token: Option<String>,
    pub reset_password_expires: Option<DateTime<Utc>>,
}

impl User {
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }

    pub fn reset_valid_at(&self, token: &str, now: DateTime<Utc>) -> bool {
        self.reset_password_token.as_deref() == Some(token)
            && self.reset_password_expires.is_some_and(|expires| expires > now)
    }
}

/// What other users (and the owner) get to see of an account.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(alias = "password-confirm")]
    pub password_confirm: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidRegistration {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl RegisterForm {
    pub fn validate(self) -> Result<ValidRegistration, ValidationError> {
        let mut problems = Problems::default();

        let name = self.name.trim().to_string();
        problems.check(!name.is_empty(), "You must supply a name!");

        let email = normalize_email(&self.email);
        problems.check(EMAIL.is_match(&email), "That Email is not valid!");

        problems.check(!self.password.is_empty(), "Password cannot be blank!");
        problems.check(
            !self.password_confirm.is_empty(),
            "Confirmed password cannot be blank!",
        );
        problems.check(
            self.password == self.password_confirm,
            "Oops! Your passwords do not match",
        );

        problems.finish(ValidRegistration {
            name,
            email,
            password: self.password,
        })
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct AccountForm {
    pub name: String,
    pub email: String,
}

impl AccountForm {
    /// Returns the trimmed name and normalised email.
    pub fn validate(self) -> Result<(String, String), ValidationError> {
        let mut problems = Problems::default();

        let name = self.name.trim().to_string();
        problems.check(!name.is_empty(), "You must supply a name!");

        let email = normalize_email(&self.email);
        problems.check(EMAIL.is_match(&email), "That Email is not valid!");

        problems.finish((name, email))
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct PasswordForm {
    pub password: String,
    #[serde(alias = "password-confirm")]
    pub password_confirm: String,
}

impl PasswordForm {
    pub fn validate(self) -> Result<String, ValidationError> {
        let mut problems = Problems::default();

        problems.check(!self.password.is_empty(), "Password cannot be blank!");
        problems.check(
            self.password == self.password_confirm,
            "Passwords do not match",
        );

        problems.finish(self.password)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn form() -> StoreForm {
        StoreForm {
            name: "  Oyster Bar ".to_string(),
            description: " Fresh oysters\n".to_string(),
            tags: vec![
                "Wifi".to_string(),
                " ".to_string(),
                "Licensed".to_string(),
                "Wifi ".to_string(),
            ],
            location: LocationForm {
                coordinates: vec![-79.38, 43.65],
                address: " 1 King St ".to_string(),
            },
            photo: Some(String::new()),
        }
    }

    #[test]
    fn test_store_form_trims_and_normalises() {
        let valid = form().validate().unwrap();

        assert_eq!(valid.name, "Oyster Bar");
        assert_eq!(valid.description, "Fresh oysters");
        assert_eq!(valid.tags, vec!["Wifi", "Licensed"]);
        assert_eq!(valid.location.kind, POINT);
        assert_eq!(valid.location.address, "1 King St");
        assert_eq!(valid.location.lng(), -79.38);
        assert_eq!(valid.location.lat(), 43.65);
        assert_eq!(valid.photo, None);
    }

    #[test]
    fn test_store_form_collects_every_problem() {
        let err = StoreForm::default().validate().unwrap_err();

        assert_eq!(
            err.messages(),
            [
                "Please enter a store name!",
                "You must supply an address",
                "You must supply coordinates",
            ]
        );
    }

    #[test]
    fn test_store_form_rejects_out_of_range_coordinates() {
        let mut bad = form();
        bad.location.coordinates = vec![200.0, -91.0];

        let err = bad.validate().unwrap_err();
        assert_eq!(err.messages().len(), 2);
    }

    #[test]
    fn test_apply_reports_rename_and_keeps_identity() {
        let author = Uuid::new_v4();
        let mut store = Store::new(form().validate().unwrap(), "oyster-bar".to_string(), author);
        let id = store.id;
        let created = store.created;

        let mut same_name = form();
        same_name.description = "Now with chowder".to_string();
        assert!(!store.apply(same_name.validate().unwrap()));
        assert_eq!(store.description, "Now with chowder");

        let mut renamed = form();
        renamed.name = "Clam Shack".to_string();
        assert!(store.apply(renamed.validate().unwrap()));

        assert_eq!(store.id, id);
        assert_eq!(store.created, created);
        assert!(store.is_owned_by(author));
        assert!(!store.is_owned_by(Uuid::new_v4()));
    }

    #[test]
    fn test_location_serializes_with_type_key() {
        let location = Location {
            kind: POINT.to_string(),
            coordinates: [1.5, 2.5],
            address: "here".to_string(),
        };

        let json = serde_json::to_value(&location).unwrap();
        assert_eq!(json["type"], "Point");
        assert_eq!(json["coordinates"], serde_json::json!([1.5, 2.5]));
    }

    #[test]
    fn test_review_rating_bounds() {
        let author = Uuid::new_v4();
        let store = Uuid::new_v4();

        let ok = ReviewForm {
            text: " Great ".to_string(),
            rating: Some(5),
        };
        let review = ok.validate(author, store).unwrap();
        assert_eq!(review.text, "Great");
        assert_eq!(review.rating, Some(5));

        let unrated = ReviewForm {
            text: "Fine".to_string(),
            rating: None,
        };
        assert_eq!(unrated.validate(author, store).unwrap().rating, None);

        let too_high = ReviewForm {
            text: "Wow".to_string(),
            rating: Some(6),
        };
        assert!(too_high.validate(author, store).is_err());

        let empty = ReviewForm {
            text: "   ".to_string(),
            rating: Some(0),
        };
        assert_eq!(empty.validate(author, store).unwrap_err().messages().len(), 2);
    }

    #[test]
    fn test_register_form() {
        let form = RegisterForm {
            name: " Wes ".to_string(),
            email: " Wes@Example.COM ".to_string(),
            password: "hunter2".to_string(),
            password_confirm: "hunter2".to_string(),
        };

        let valid = form.validate().unwrap();
        assert_eq!(valid.name, "Wes");
        assert_eq!(valid.email, "wes@example.com");

        let mismatch = RegisterForm {
            name: "Wes".to_string(),
            email: "not-an-email".to_string(),
            password: "a".to_string(),
            password_confirm: "b".to_string(),
        };
        assert_eq!(
            mismatch.validate().unwrap_err().messages(),
            ["That Email is not valid!", "Oops! Your passwords do not match"]
        );
    }

    #[test]
    fn test_register_form_accepts_dashed_confirm_key() {
        let form: RegisterForm = serde_json::from_str(
            r#"{"name":"a","email":"a@b.co","password":"x","password-confirm":"x"}"#,
        )
        .unwrap();

        assert!(form.validate().is_ok());
    }

    #[test]
    fn test_password_form() {
        let form = PasswordForm {
            password: "new".to_string(),
            password_confirm: "new".to_string(),
        };
        assert_eq!(form.validate().unwrap(), "new");

        let form = PasswordForm {
            password: "new".to_string(),
            password_confirm: "old".to_string(),
        };
        assert_eq!(form.validate().unwrap_err().to_string(), "Passwords do not match");
    }

    #[test]
    fn test_reset_token_window() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: "a".to_string(),
            email: "a@b.co".to_string(),
            password_hash: String::new(),
            created: now,
            reset_password_token: Some("abc".to_string()),
            reset_password_expires: Some(now + Duration::hours(1)),
        };

        assert!(user.reset_valid_at("abc", now));
        assert!(!user.reset_valid_at("abd", now));
        assert!(!user.reset_valid_at("abc", now + Duration::hours(2)));
    }
}
