use bank::models::StoreForm;
use serde::Deserialize;

/// Seed data, linked by natural keys: authors by email, reviews by store key.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SeedFile {
    pub users: Vec<SeedUser>,
    pub stores: Vec<SeedStore>,
    pub reviews: Vec<SeedReview>,
}

#[derive(Debug, Deserialize)]
pub struct SeedUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SeedStore {
    /// Email of the owning user.
    pub author: String,
    /// What reviews use to point at this store. Defaults to the name, so stores
    /// sharing a name need one.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(flatten)]
    pub form: StoreForm,
}

impl SeedStore {
    pub fn link_key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.form.name).trim()
    }
}

#[derive(Debug, Deserialize)]
pub struct SeedReview {
    /// Link key of the reviewed store.
    pub store: String,
    /// Email of the reviewing user.
    pub author: String,
    pub text: String,
    pub rating: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::SeedFile;

    #[test]
    fn test_parse_seed_file() {
        let seed: SeedFile = serde_json::from_str(
            r#"{
                "users": [{"name": "Wes", "email": "wes@example.com", "password": "wes"}],
                "stores": [{
                    "author": "wes@example.com",
                    "name": "Oyster Bar",
                    "description": "Shellfish",
                    "tags": ["Licensed"],
                    "location": {"coordinates": [-79.38, 43.65], "address": "1 King St"}
                }],
                "reviews": [{
                    "store": "Oyster Bar",
                    "author": "wes@example.com",
                    "text": "Briny",
                    "rating": 5
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(seed.users.len(), 1);
        assert_eq!(seed.stores[0].author, "wes@example.com");
        assert_eq!(seed.stores[0].form.name, "Oyster Bar");
        assert_eq!(seed.stores[0].form.location.coordinates, vec![-79.38, 43.65]);
        assert_eq!(seed.stores[0].link_key(), "Oyster Bar");
        assert_eq!(seed.reviews[0].rating, Some(5));
    }

    #[test]
    fn test_explicit_key() {
        let seed: SeedFile = serde_json::from_str(
            r#"{"stores": [
                {"author": "a@b.co", "key": " oyster-bar-bloor ", "name": "Oyster Bar"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(seed.stores[0].link_key(), "oyster-bar-bloor");
        assert_eq!(seed.stores[0].form.name, "Oyster Bar");
    }

    #[test]
    fn test_sections_are_optional() {
        let seed: SeedFile = serde_json::from_str("{}").unwrap();

        assert!(seed.users.is_empty());
        assert!(seed.stores.is_empty());
        assert!(seed.reviews.is_empty());
    }
}
