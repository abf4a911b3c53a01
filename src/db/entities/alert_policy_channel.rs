use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "alert_policy_channels")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub policy_id: i32,
    #[sea_orm(primary_key, auto_increment = false)]
    pub channel_id: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::alert_policy::Entity",
        from = "Column::PolicyId",
        to = "super::alert_policy::Column::Id",
        on_delete = "Cascade",
        on_update = "Cascade"
    )]
    AlertPolicy,
    #[sea_orm(
        belongs_to = "super::alert_channel::Entity",
        from = "Column::ChannelId",
        to = "super::alert_channel::Column::Id",
        on_delete = "Cascade",
        on_update = "Cascade"
    )]
    AlertChannel,
}

impl Related<super::alert_policy::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AlertPolicy.def()
    }
}

impl Related<super::alert_channel::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AlertChannel.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
