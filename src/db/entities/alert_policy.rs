use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "alert_policies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub organization_id: i32,
    pub name: String,
    pub applies_to_all_monitors: bool,
    /// JSON array of alert statuses, e.g. `["down", "recovered"]`.
    #[sea_orm(column_type = "JsonBinary")]
    pub notify_on: Json,
    pub is_active: bool,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::alert_policy_monitor::Entity")]
    AlertPolicyMonitors,
    #[sea_orm(has_many = "super::alert_policy_channel::Entity")]
    AlertPolicyChannels,
}

impl Related<super::monitor::Entity> for Entity {
    fn to() -> RelationDef {
        super::alert_policy_monitor::Relation::Monitor.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::alert_policy_monitor::Relation::AlertPolicy.def().rev())
    }
}

impl Related<super::alert_channel::Entity> for Entity {
    fn to() -> RelationDef {
        super::alert_policy_channel::Relation::AlertChannel.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::alert_policy_channel::Relation::AlertPolicy.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
