use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "alert_history")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub organization_id: i32,
    pub monitor_id: i32,
    pub channel_id: i32,
    /// NULL on the entry that opened the incident.
    pub incident_id: Option<i64>,
    pub status: String,
    #[sea_orm(column_type = "Text")]
    pub message: String,
    pub dispatched_at: ChronoDateTimeUtc,
    pub acknowledged_at: Option<ChronoDateTimeUtc>,
    pub acknowledged_by: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::monitor::Entity",
        from = "Column::MonitorId",
        to = "super::monitor::Column::Id",
        on_delete = "Cascade"
    )]
    Monitor,
    #[sea_orm(
        belongs_to = "super::alert_channel::Entity",
        from = "Column::ChannelId",
        to = "super::alert_channel::Column::Id",
        on_delete = "Cascade"
    )]
    AlertChannel,
}

impl Related<super::monitor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Monitor.def()
    }
}

impl Related<super::alert_channel::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AlertChannel.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
