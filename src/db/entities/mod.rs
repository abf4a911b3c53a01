//! SeaORM entities for the tables the worker reads and writes.

pub mod alert_channel;
pub mod alert_history;
pub mod alert_policy;
pub mod alert_policy_channel;
pub mod alert_policy_monitor;
pub mod check_result;
pub mod monitor;
pub mod organization_secret;

pub mod prelude {
    pub use super::alert_channel::Entity as AlertChannel;
    pub use super::alert_channel::Model as AlertChannelModel;
    pub use super::alert_channel::Column as AlertChannelColumn;

    pub use super::alert_history::Entity as AlertHistory;
    pub use super::alert_history::Model as AlertHistoryModel;
    pub use super::alert_history::ActiveModel as AlertHistoryActiveModel;
    pub use super::alert_history::Column as AlertHistoryColumn;

    pub use super::alert_policy::Entity as AlertPolicy;
    pub use super::alert_policy::Model as AlertPolicyModel;
    pub use super::alert_policy::Column as AlertPolicyColumn;

    pub use super::alert_policy_channel::Entity as AlertPolicyChannel;
    pub use super::alert_policy_channel::Column as AlertPolicyChannelColumn;

    pub use super::alert_policy_monitor::Entity as AlertPolicyMonitor;
    pub use super::alert_policy_monitor::Column as AlertPolicyMonitorColumn;

    pub use super::check_result::Entity as CheckResult;
    pub use super::check_result::ActiveModel as CheckResultActiveModel;

    pub use super::monitor::Entity as Monitor;
    pub use super::monitor::Model as MonitorModel;
    pub use super::monitor::ActiveModel as MonitorActiveModel;
    pub use super::monitor::Column as MonitorColumn;

    pub use super::organization_secret::Entity as OrganizationSecret;
    pub use super::organization_secret::Model as OrganizationSecretModel;
}
