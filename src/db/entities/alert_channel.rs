use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "alert_channels")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub organization_id: i32,
    pub name: String,
    pub channel_type: String, // e.g. "slack", "pagerduty"
    #[sea_orm(column_type = "JsonBinary")]
    pub config: Json,
    #[sea_orm(column_type = "Text", nullable)]
    pub message_template: Option<String>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::alert_policy_channel::Entity")]
    AlertPolicyChannels,
    #[sea_orm(has_many = "super::alert_history::Entity")]
    AlertHistory,
}

impl Related<super::alert_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AlertHistory.def()
    }
}

impl Related<super::alert_policy::Entity> for Entity {
    fn to() -> RelationDef {
        super::alert_policy_channel::Relation::AlertPolicy.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::alert_policy_channel::Relation::AlertChannel.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
