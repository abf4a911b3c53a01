use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "monitors")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub organization_id: i32,
    pub name: String,
    pub monitor_type: String,
    pub target: String,
    pub frequency_seconds: i32,
    pub timeout_seconds: i32,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub config: Option<Json>,
    pub status: String,
    pub streak_outcome: Option<String>,
    pub streak_count: i32,
    pub next_check_at: Option<ChronoDateTimeUtc>,
    pub last_checked_at: Option<ChronoDateTimeUtc>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::check_result::Entity")]
    CheckResults,
    #[sea_orm(has_many = "super::alert_history::Entity")]
    AlertHistory,
    #[sea_orm(has_many = "super::alert_policy_monitor::Entity")]
    AlertPolicyMonitors,
}

impl Related<super::check_result::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CheckResults.def()
    }
}

impl Related<super::alert_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AlertHistory.def()
    }
}

// Policies bound to this monitor explicitly, via alert_policy_monitors
impl Related<super::alert_policy::Entity> for Entity {
    fn to() -> RelationDef {
        super::alert_policy_monitor::Relation::AlertPolicy.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::alert_policy_monitor::Relation::Monitor.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
