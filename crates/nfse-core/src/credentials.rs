//! Credential provider contract
//!
//! The fetch layer authenticates against the municipal API with per-tenant
//! credentials stored encrypted at rest. This core never sees ciphertext:
//! it consumes a provider that hands over already-decrypted values. The
//! management layer implements this trait; tests use the static impl.

use async_trait::async_trait;
use uuid::Uuid;

/// Decrypted credential for one tenant's municipal API access.
#[derive(Clone)]
pub struct DecryptedCredential {
    pub login: String,
    pub password: String,
    pub api_token: String,
}

impl std::fmt::Debug for DecryptedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secrets stay out of logs.
        f.debug_struct("DecryptedCredential")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// Trait implemented by the credential-management layer.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return the decrypted credential for the given tenant.
    async fn get_decrypted(&self, tenant_id: Uuid) -> Result<DecryptedCredential, String>;
}

/// Static in-memory provider for tests and local development.
pub struct StaticCredentialProvider {
    credential: DecryptedCredential,
}

impl StaticCredentialProvider {
    pub fn new(login: String, password: String, api_token: String) -> Self {
        Self {
            credential: DecryptedCredential {
                login,
                password,
                api_token,
            },
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn get_decrypted(&self, _tenant_id: Uuid) -> Result<DecryptedCredential, String> {
        Ok(self.credential.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider_returns_credential() {
        let provider =
            StaticCredentialProvider::new("user".into(), "pass".into(), "token".into());
        let cred = provider.get_decrypted(Uuid::new_v4()).await.unwrap();
        assert_eq!(cred.login, "user");
        assert_eq!(cred.api_token, "token");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let cred = DecryptedCredential {
            login: "user".into(),
            password: "hunter2".into(),
            api_token: "tok123".into(),
        };
        let dbg = format!("{:?}", cred);
        assert!(!dbg.contains("hunter2"));
        assert!(!dbg.contains("tok123"));
    }
}
