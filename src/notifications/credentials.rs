use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::encryption::{is_encrypted, EncryptionError, EncryptionService};
use crate::db::models::{OrganizationId, OrganizationSecrets, StoredSmtpSettings};
use crate::db::store::{MonitorStore, StoreError};

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Failed to load organisation secrets: {0}")]
    Store(#[from] StoreError),
    #[error("Failed to decrypt secret: {0}")]
    Decryption(#[from] EncryptionError),
    #[error("Secret is encrypted but no encryption key is configured")]
    MissingKey,
}

/// A decrypted value that never shows up in logs or serialized jobs.
/// Senders read it in process through [`Secret::expose`].
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

const REDACTED: &str = "***";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Secret,
    pub from_address: String,
    pub secure: bool,
}

/// How an email job should be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EmailTransport {
    Smtp(SmtpCredentials),
    #[serde(rename_all = "camelCase")]
    Resend {
        api_key: Secret,
        from_address: Option<String>,
    },
    PlatformDefault,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationCredentials {
    pub organization_id: OrganizationId,
    pub email: EmailTransport,
}

impl OrganizationCredentials {
    pub fn platform_default(organization_id: OrganizationId) -> Self {
        Self {
            organization_id,
            email: EmailTransport::PlatformDefault,
        }
    }
}

/// Decrypts an `enc:v1:` value; plain values pass through unchanged.
pub fn reveal_secret(
    stored: &str,
    encryption: Option<&EncryptionService>,
) -> Result<Secret, CredentialError> {
    if !is_encrypted(stored) {
        return Ok(Secret::new(stored));
    }
    let encryption = encryption.ok_or(CredentialError::MissingKey)?;
    Ok(Secret::new(encryption.decrypt_str(stored)?))
}

/// Turns stored organisation secrets into usable credentials. Holds no state
/// besides its collaborators, so one instance serves every worker task.
pub struct CredentialResolver {
    store: Arc<dyn MonitorStore>,
    encryption: Option<Arc<EncryptionService>>,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn MonitorStore>, encryption: Option<Arc<EncryptionService>>) -> Self {
        Self { store, encryption }
    }

    pub fn decrypt_secret(&self, stored: &str) -> Result<Secret, CredentialError> {
        reveal_secret(stored, self.encryption.as_deref())
    }

    pub async fn resolve(
        &self,
        organization_id: OrganizationId,
    ) -> Result<OrganizationCredentials, CredentialError> {
        let Some(secrets) = self.store.organization_secrets(organization_id).await? else {
            debug!(organization_id, "No organisation secrets; using platform email.");
            return Ok(OrganizationCredentials::platform_default(organization_id));
        };
        self.decrypt_secrets(secrets)
    }

    fn decrypt_secrets(
        &self,
        secrets: OrganizationSecrets,
    ) -> Result<OrganizationCredentials, CredentialError> {
        let email = if let Some(smtp) = secrets.smtp {
            EmailTransport::Smtp(self.decrypt_smtp(smtp)?)
        } else if let Some(api_key) = secrets.resend_api_key.filter(|k| !k.is_empty()) {
            EmailTransport::Resend {
                api_key: self.decrypt_secret(&api_key)?,
                from_address: secrets.email_from,
            }
        } else {
            EmailTransport::PlatformDefault
        };

        Ok(OrganizationCredentials {
            organization_id: secrets.organization_id,
            email,
        })
    }

    fn decrypt_smtp(&self, smtp: StoredSmtpSettings) -> Result<SmtpCredentials, CredentialError> {
        Ok(SmtpCredentials {
            username: self.decrypt_secret(&smtp.username)?.expose().to_string(),
            password: self.decrypt_secret(&smtp.password)?,
            host: smtp.host,
            port: smtp.port,
            from_address: smtp.from_address,
            secure: smtp.secure,
        })
    }
}
