pub mod builder;
pub mod chat;
pub mod credentials;
pub mod encryption;
pub mod jobs;
pub mod models;
pub mod signing;
pub mod templates;

pub use builder::{AlertContext, JobBuildError, JobBuilder, PreparedJob};
pub use credentials::{CredentialError, CredentialResolver, EmailTransport, OrganizationCredentials};
pub use encryption::{EncryptionError, EncryptionService};
pub use jobs::NotificationJob;
pub use models::{ChannelConfig, ChannelConfigError};
