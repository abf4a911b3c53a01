pub mod alerting;
pub mod checks;
pub mod db;
pub mod notifications;
pub mod queue;
pub mod version;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::db::enums::{AlertStatus, ChannelType, MonitorStatus, MonitorType};
    use crate::db::models::{AlertChannel, AlertPolicy, ChannelId, Monitor, PolicyId};

    pub fn monitor(monitor_type: MonitorType, target: &str) -> Monitor {
        Monitor {
            id: 1,
            organization_id: 10,
            name: "API".to_string(),
            monitor_type,
            target: target.to_string(),
            frequency_seconds: 60,
            timeout_seconds: 10,
            config: Default::default(),
            status: MonitorStatus::Active,
            streak: Default::default(),
            next_check_at: None,
            last_checked_at: None,
        }
    }

    pub fn channel(id: ChannelId, channel_type: ChannelType, config: serde_json::Value) -> AlertChannel {
        AlertChannel {
            id,
            organization_id: 10,
            name: format!("{channel_type} #{id}"),
            channel_type,
            config,
            message_template: None,
        }
    }

    pub fn policy(id: PolicyId, channel_ids: Vec<ChannelId>, notify_on: Vec<AlertStatus>) -> AlertPolicy {
        AlertPolicy {
            id,
            organization_id: 10,
            name: format!("Policy {id}"),
            monitor_ids: vec![1],
            applies_to_all_monitors: false,
            channel_ids,
            notify_on,
            is_active: true,
        }
    }
}
