use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{StoreError, WorkspaceStore};
use crate::models::workspace::{AccountRouting, Project, SourceContent};

#[derive(Clone)]
pub struct PgWorkspaceStore {
    pool: PgPool,
}

impl PgWorkspaceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkspaceStore for PgWorkspaceStore {
    async fn routing(&self, account_id: Uuid) -> Result<Option<AccountRouting>, StoreError> {
        Ok(sqlx::query_as::<_, AccountRouting>(
            "SELECT * FROM account_routing WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn template_override(&self, account_id: Uuid, name: &str) -> Result<Option<String>, StoreError> {
        Ok(sqlx::query_scalar::<_, String>(
            "SELECT body FROM prompt_templates WHERE account_id = $1 AND name = $2",
        )
        .bind(account_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn source_content(&self, account_id: Uuid, source_id: Uuid) -> Result<Option<SourceContent>, StoreError> {
        Ok(sqlx::query_as::<_, SourceContent>(
            "SELECT id, account_id, title, body FROM source_contents WHERE id = $1 AND account_id = $2",
        )
        .bind(source_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn project(&self, account_id: Uuid, project_id: Uuid) -> Result<Option<Project>, StoreError> {
        Ok(sqlx::query_as::<_, Project>(
            "SELECT id, account_id, title, slides, caption FROM projects WHERE id = $1 AND account_id = $2",
        )
        .bind(project_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn set_project_caption(
        &self,
        account_id: Uuid,
        project_id: Uuid,
        caption: &str,
    ) -> Result<(), StoreError> {
        let updated = sqlx::query("UPDATE projects SET caption = $1 WHERE id = $2 AND account_id = $3")
            .bind(caption)
            .bind(project_id)
            .bind(account_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        }
        Ok(())
    }
}
