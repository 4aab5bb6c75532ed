use chrono::Utc;
use common::TodoStatus;
use common::storage::StorageKey;
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};

use super::error::TodoError;
use crate::entity::{attachment, todo};

/// Row-level queries, usable on a connection or inside a transaction.
pub struct Queries<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> Queries<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn insert_todo(&self, owner: &str, title: &str) -> Result<todo::Model, DbErr> {
        todo::ActiveModel {
            owner: Set(owner.to_string()),
            title: Set(title.to_string()),
            status: Set(TodoStatus::Incomplete),
            file_count: Set(0),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.conn)
        .await
    }

    pub async fn get_todo(&self, id: i64) -> Result<Option<todo::Model>, DbErr> {
        todo::Entity::find_by_id(id).one(self.conn).await
    }

    /// List todos, newest first. Returns the page and the total count.
    pub async fn list_todos(
        &self,
        owner: Option<&str>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<todo::Model>, u64), DbErr> {
        let mut query = todo::Entity::find();
        if let Some(owner) = owner {
            query = query.filter(todo::Column::Owner.eq(owner));
        }

        let total = query.clone().count(self.conn).await?;
        let todos = query
            .order_by_desc(todo::Column::Id)
            .offset(page.saturating_sub(1) * per_page)
            .limit(per_page)
            .all(self.conn)
            .await?;

        Ok((todos, total))
    }

    /// Set the title and/or status of a todo. Returns `None` if the todo does
    /// not exist.
    pub async fn update_todo(
        &self,
        id: i64,
        title: Option<&str>,
        status: Option<TodoStatus>,
    ) -> Result<Option<todo::Model>, DbErr> {
        if title.is_none() && status.is_none() {
            return self.get_todo(id).await;
        }

        let mut update = todo::Entity::update_many().filter(todo::Column::Id.eq(id));
        if let Some(title) = title {
            update = update.col_expr(todo::Column::Title, Expr::value(title));
        }
        if let Some(status) = status {
            update = update.col_expr(todo::Column::Status, Expr::value(status.as_str()));
        }

        if update.exec(self.conn).await?.rows_affected == 0 {
            return Ok(None);
        }
        self.get_todo(id).await
    }

    /// Shift `file_count` by `delta` in one statement and return the updated row.
    ///
    /// A decrement that would take the count below zero touches no row and
    /// fails with [`TodoError::Consistency`].
    pub async fn add_file_count(&self, id: i64, delta: i32) -> Result<todo::Model, TodoError> {
        let mut update = todo::Entity::update_many()
            .col_expr(
                todo::Column::FileCount,
                Expr::col(todo::Column::FileCount).add(delta),
            )
            .filter(todo::Column::Id.eq(id));
        if delta < 0 {
            update = update.filter(todo::Column::FileCount.gte(-delta));
        }

        let result = update.exec(self.conn).await?;
        if result.rows_affected == 0 {
            return match self.get_todo(id).await? {
                None => Err(TodoError::todo_not_found(id)),
                Some(row) => Err(TodoError::Consistency(format!(
                    "file_count of todo {id} is {} and cannot change by {delta}",
                    row.file_count
                ))),
            };
        }

        self.get_todo(id)
            .await?
            .ok_or_else(|| TodoError::todo_not_found(id))
    }

    /// Delete a todo row. Returns the number of rows removed.
    pub async fn delete_todo(&self, id: i64) -> Result<u64, DbErr> {
        let result = todo::Entity::delete_by_id(id).exec(self.conn).await?;
        Ok(result.rows_affected)
    }

    pub async fn insert_attachment(
        &self,
        todo_id: i64,
        original_filename: &str,
        key: &StorageKey,
    ) -> Result<attachment::Model, DbErr> {
        attachment::ActiveModel {
            todo_id: Set(todo_id),
            original_filename: Set(original_filename.to_string()),
            storage_filename: Set(key.to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.conn)
        .await
    }

    /// Fetch an attachment only if it belongs to the given todo.
    pub async fn get_attachment(
        &self,
        todo_id: i64,
        attachment_id: i64,
    ) -> Result<Option<attachment::Model>, DbErr> {
        attachment::Entity::find_by_id(attachment_id)
            .filter(attachment::Column::TodoId.eq(todo_id))
            .one(self.conn)
            .await
    }

    pub async fn list_attachments(&self, todo_id: i64) -> Result<Vec<attachment::Model>, DbErr> {
        attachment::Entity::find()
            .filter(attachment::Column::TodoId.eq(todo_id))
            .order_by_asc(attachment::Column::Id)
            .all(self.conn)
            .await
    }

    pub async fn count_attachments(&self, todo_id: i64) -> Result<u64, DbErr> {
        attachment::Entity::find()
            .filter(attachment::Column::TodoId.eq(todo_id))
            .count(self.conn)
            .await
    }

    /// Delete one attachment of a todo. Returns the number of rows removed.
    pub async fn delete_attachment(&self, todo_id: i64, attachment_id: i64) -> Result<u64, DbErr> {
        let result = attachment::Entity::delete_many()
            .filter(attachment::Column::Id.eq(attachment_id))
            .filter(attachment::Column::TodoId.eq(todo_id))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn delete_attachments_of(&self, todo_id: i64) -> Result<u64, DbErr> {
        let result = attachment::Entity::delete_many()
            .filter(attachment::Column::TodoId.eq(todo_id))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected)
    }
}
