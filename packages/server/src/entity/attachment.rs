use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "attachment")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub todo_id: i64,
    #[sea_orm(belongs_to, from = "todo_id", to = "id", on_delete = "Cascade")]
    pub todo: HasOne<super::todo::Entity>,

    /// Filename as uploaded. Display only, never used to address storage.
    pub original_filename: String,

    /// Blob key in the todo's storage namespace.
    #[sea_orm(unique)]
    pub storage_filename: String,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
