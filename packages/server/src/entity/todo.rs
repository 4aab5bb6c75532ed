use common::TodoStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "todo")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub owner: String,
    pub title: String, // at most 255 characters
    pub status: TodoStatus,

    /// Number of attachment rows referencing this todo.
    /// Only changed by the attachment sagas, always as a relative update.
    pub file_count: i32,

    #[sea_orm(has_many)]
    pub attachments: HasMany<super::attachment::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
