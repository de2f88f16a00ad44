//! Optional admin-user provisioning in the destination.

use bson::{doc, Bson, DateTime, Document};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::UserRequest;
use crate::connectors::DocumentSink;
use crate::error::Result;

/// Collection holding user records.
pub const USERS_COLLECTION: &str = "users";

/// Role given to every provisioned user.
pub const DEFAULT_ROLE: &str = "admin";

/// Modules every provisioned user is granted.
pub const MODULE_GRANTS: [&str; 5] = ["dashboard", "users", "reports", "settings", "billing"];

const CREDENTIAL_LENGTH: usize = 20;
const SALT_LENGTH: usize = 16;
const HASH_SCHEME: &str = "sha256";

/// How a provisioning request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// No user was requested.
    None,
    /// A user with this email already exists; nothing was written.
    Duplicate {
        /// Normalized email.
        email: String,
    },
    /// A new user was inserted.
    Created {
        /// Normalized email.
        email: String,
        /// Generated numeric identifier.
        id: i64,
        /// One-time plaintext credential. Only its hash is stored.
        credential: String,
    },
}

impl ProvisionOutcome {
    /// Short status label.
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Duplicate { .. } => "duplicate",
            Self::Created { .. } => "created",
        }
    }
}

/// Creates the requested user unless one with the same email exists.
pub struct UserProvisioner<'a> {
    sink: &'a dyn DocumentSink,
}

impl<'a> UserProvisioner<'a> {
    /// Creates a provisioner writing through `sink`.
    pub fn new(sink: &'a dyn DocumentSink) -> Self {
        Self { sink }
    }

    /// Runs the request. `None` touches nothing.
    ///
    /// The region is trusted as already validated.
    ///
    /// # Errors
    ///
    /// Returns the lookup or insert error.
    pub async fn provision(&self, request: Option<&UserRequest>) -> Result<ProvisionOutcome> {
        let Some(request) = request else {
            debug!("No user requested");
            return Ok(ProvisionOutcome::None);
        };

        let email = request.normalized_email();
        let existing = self
            .sink
            .find_one(USERS_COLLECTION, doc! { "email": email.as_str() })
            .await?;
        if existing.is_some() {
            info!("User '{}' already exists, not creating", email);
            return Ok(ProvisionOutcome::Duplicate { email });
        }

        let credential = generate_credential();
        let id = generate_user_id();
        let record = user_record(request, &email, id, &hash_credential(&credential));

        self.sink.insert_one(USERS_COLLECTION, record).await?;
        info!("Created user '{}' with id {}", email, id);

        Ok(ProvisionOutcome::Created {
            email,
            id,
            credential,
        })
    }
}

fn user_record(request: &UserRequest, email: &str, id: i64, password_hash: &str) -> Document {
    let modules: Document = MODULE_GRANTS
        .iter()
        .map(|module| ((*module).to_string(), Bson::Boolean(true)))
        .collect();

    doc! {
        "id": id,
        "email": email,
        "firstName": request.first_name.trim(),
        "lastName": request.last_name.trim(),
        "region": request.region.as_str(),
        "role": DEFAULT_ROLE,
        "password": password_hash,
        "modules": modules,
        "createdAt": DateTime::now(),
    }
}

/// Random alphanumeric credential.
#[must_use]
pub fn generate_credential() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CREDENTIAL_LENGTH)
        .map(char::from)
        .collect()
}

fn generate_user_id() -> i64 {
    rand::thread_rng().gen_range(1_000_000..10_000_000)
}

/// Salted SHA-256 hash in the form `sha256$<salt-hex>$<digest-hex>`.
#[must_use]
pub fn hash_credential(credential: &str) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    hash_with_salt(&salt, credential)
}

/// Checks `credential` against a hash from [`hash_credential`].
#[must_use]
pub fn verify_credential(credential: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(HASH_SCHEME), Some(salt), Some(_), None) => {
            hex::decode(salt)
                .ok()
                .is_some_and(|salt| hash_with_salt(&salt, credential) == stored)
        }
        _ => false,
    }
}

fn hash_with_salt(salt: &[u8], credential: &str) -> String {
    let digest = Sha256::new()
        .chain_update(salt)
        .chain_update(credential.as_bytes())
        .finalize();
    format!(
        "{HASH_SCHEME}${}${}",
        hex::encode(salt),
        hex::encode(digest)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Region;
    use crate::connectors::memory::MemoryDatabase;

    fn request(email: &str) -> UserRequest {
        UserRequest {
            email: email.to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            region: Region::East,
        }
    }

    #[test]
    fn test_credential_shape() {
        let a = generate_credential();
        let b = generate_credential();
        assert_eq!(a.len(), CREDENTIAL_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_verifies_only_original() {
        let hash = hash_credential("s3cret");
        assert!(hash.starts_with("sha256$"));
        assert!(!hash.contains("s3cret"));
        assert!(verify_credential("s3cret", &hash));
        assert!(!verify_credential("s3cret!", &hash));
        assert!(!verify_credential("s3cret", "sha256$zz$00"));
        assert!(!verify_credential("s3cret", "plain"));
    }

    #[test]
    fn test_hash_fields_are_lowercase_hex() {
        let hash = hash_credential("s3cret");
        let fields: Vec<&str> = hash.split('$').collect();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[1].len(), SALT_LENGTH * 2);
        assert_eq!(fields[2].len(), 64);
        for field in &fields[1..] {
            assert!(field
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        }

        let odd_salt = format!("sha256${}${}", &fields[1][1..], fields[2]);
        assert!(!verify_credential("s3cret", &odd_salt));
        let upper_salt = format!("sha256${}${}", fields[1].to_uppercase(), fields[2]);
        assert!(!verify_credential("s3cret", &upper_salt));
    }

    #[test]
    fn test_hash_is_salted() {
        assert_ne!(hash_credential("same"), hash_credential("same"));
    }

    #[tokio::test]
    async fn test_no_request_is_noop() {
        let db = MemoryDatabase::new();
        let outcome = UserProvisioner::new(&db).provision(None).await.unwrap();

        assert_eq!(outcome, ProvisionOutcome::None);
        assert_eq!(db.write_count(), 0);
    }

    #[tokio::test]
    async fn test_created_then_duplicate() {
        let db = MemoryDatabase::new();
        let provisioner = UserProvisioner::new(&db);
        let req = request("Ada@Example.COM");

        let first = provisioner.provision(Some(&req)).await.unwrap();
        let second = provisioner.provision(Some(&req)).await.unwrap();

        assert_eq!(first.status(), "created");
        assert_eq!(
            second,
            ProvisionOutcome::Duplicate {
                email: "ada@example.com".to_string()
            }
        );
        assert_eq!(db.collection(USERS_COLLECTION).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_created_record_contents() {
        let db = MemoryDatabase::new();
        let outcome = UserProvisioner::new(&db)
            .provision(Some(&request("X@Y.com")))
            .await
            .unwrap();

        let ProvisionOutcome::Created {
            email,
            id,
            credential,
        } = outcome
        else {
            panic!("expected a created user");
        };

        let users = db.collection(USERS_COLLECTION).unwrap();
        let record = &users[0];
        assert_eq!(email, "x@y.com");
        assert_eq!(record.get_str("email").unwrap(), "x@y.com");
        assert_eq!(record.get_i64("id").unwrap(), id);
        assert_eq!(record.get_str("role").unwrap(), DEFAULT_ROLE);
        assert_eq!(record.get_str("region").unwrap(), "East");
        assert!(verify_credential(&credential, record.get_str("password").unwrap()));
        let modules = record.get_document("modules").unwrap();
        assert_eq!(modules.len(), MODULE_GRANTS.len());
        assert!(modules.get_bool("billing").unwrap());
    }
}
