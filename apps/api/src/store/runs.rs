use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use super::{RunStore, StoreError, ABANDONED_ERROR};
use crate::models::run::{NewRun, RunCompletion, RunFailure, RunKind, RunRow};

const UNIQUE_VIOLATION: &str = "23505";

/// `generation_runs` on Postgres.
///
/// The partial unique index `generation_runs_one_active_idx` allows one
/// running row per (kind, target, context). Rows left running longer than
/// `stale_after_minutes` are failed as abandoned before a new run is opened.
#[derive(Clone)]
pub struct PgRunStore {
    pool: PgPool,
    stale_after_minutes: i32,
}

impl PgRunStore {
    pub fn new(pool: PgPool, stale_after_minutes: i32) -> Self {
        Self {
            pool,
            stale_after_minutes,
        }
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn create_run(&self, new_run: &NewRun) -> Result<RunRow, StoreError> {
        let mut tx = self.pool.begin().await?;

        let abandoned = sqlx::query(
            r#"
            UPDATE generation_runs
            SET status = 'failed',
                error = $5,
                progress_marker = NULL,
                finished_at = now()
            WHERE kind = $1
              AND target_id = $2
              AND COALESCE(context_key, '') = COALESCE($3, '')
              AND status = 'running'
              AND created_at < now() - make_interval(mins => $4)
            "#,
        )
        .bind(new_run.kind.as_str())
        .bind(new_run.target_id)
        .bind(new_run.context_key.as_deref())
        .bind(self.stale_after_minutes)
        .bind(ABANDONED_ERROR)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if abandoned > 0 {
            warn!(
                "Marked {abandoned} stale {} run(s) for target {} as failed",
                new_run.kind, new_run.target_id
            );
        }

        let inserted = sqlx::query_as::<_, RunRow>(
            r#"
            INSERT INTO generation_runs
                (id, account_id, target_id, kind, context_key, status, progress_marker)
            VALUES ($1, $2, $3, $4, $5, 'running', $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new_run.account_id)
        .bind(new_run.target_id)
        .bind(new_run.kind.as_str())
        .bind(new_run.context_key.as_deref())
        .bind(new_run.progress_marker)
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                return Err(StoreError::ActiveRun {
                    kind: new_run.kind,
                    target_id: new_run.target_id,
                });
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;
        info!("Opened {} run {} for target {}", row.kind, row.id, row.target_id);
        Ok(row)
    }

    async fn set_progress(&self, run_id: Uuid, marker: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE generation_runs SET progress_marker = $1 WHERE id = $2 AND status = 'running'",
        )
        .bind(marker)
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_run(&self, run_id: Uuid, completion: &RunCompletion) -> Result<RunRow, StoreError> {
        sqlx::query_as::<_, RunRow>(
            r#"
            UPDATE generation_runs
            SET status = 'completed',
                output_artifact = $1,
                prompt_rendered = $2,
                input_context = $3,
                model_used = $4,
                error = NULL,
                progress_marker = NULL,
                finished_at = now()
            WHERE id = $5 AND status = 'running'
            RETURNING *
            "#,
        )
        .bind(&completion.artifact)
        .bind(completion.prompt_rendered.as_deref())
        .bind(&completion.input_context)
        .bind(completion.model_used.as_deref())
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotRunning(run_id))
    }

    async fn fail_run(&self, run_id: Uuid, failure: &RunFailure) -> Result<RunRow, StoreError> {
        sqlx::query_as::<_, RunRow>(
            r#"
            UPDATE generation_runs
            SET status = 'failed',
                error = $1,
                prompt_rendered = COALESCE($2, prompt_rendered),
                input_context = $3,
                output_artifact = NULL,
                progress_marker = NULL,
                finished_at = now()
            WHERE id = $4 AND status = 'running'
            RETURNING *
            "#,
        )
        .bind(&failure.error)
        .bind(failure.prompt_rendered.as_deref())
        .bind(&failure.input_context)
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotRunning(run_id))
    }

    async fn get_run(&self, account_id: Uuid, run_id: Uuid) -> Result<Option<RunRow>, StoreError> {
        Ok(sqlx::query_as::<_, RunRow>(
            "SELECT * FROM generation_runs WHERE id = $1 AND account_id = $2",
        )
        .bind(run_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_runs(
        &self,
        account_id: Uuid,
        target_id: Uuid,
        kind: Option<RunKind>,
    ) -> Result<Vec<RunRow>, StoreError> {
        Ok(sqlx::query_as::<_, RunRow>(
            r#"
            SELECT * FROM generation_runs
            WHERE account_id = $1
              AND target_id = $2
              AND ($3::text IS NULL OR kind = $3)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(account_id)
        .bind(target_id)
        .bind(kind.map(|k| k.as_str()))
        .fetch_all(&self.pool)
        .await?)
    }

    async fn exemplar_runs(
        &self,
        account_id: Uuid,
        target_id: Uuid,
        kind: RunKind,
        context_key: Option<&str>,
    ) -> Result<Vec<RunRow>, StoreError> {
        Ok(sqlx::query_as::<_, RunRow>(
            r#"
            SELECT * FROM generation_runs
            WHERE account_id = $1
              AND target_id = $2
              AND kind = $3
              AND COALESCE(context_key, '') = COALESCE($4, '')
              AND status = 'completed'
              AND output_artifact IS NOT NULL
              AND NOT excluded_from_prompt
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(account_id)
        .bind(target_id)
        .bind(kind.as_str())
        .bind(context_key)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn set_excluded(
        &self,
        account_id: Uuid,
        run_id: Uuid,
        excluded: bool,
    ) -> Result<Option<RunRow>, StoreError> {
        Ok(sqlx::query_as::<_, RunRow>(
            r#"
            UPDATE generation_runs
            SET excluded_from_prompt = $1
            WHERE id = $2
              AND account_id = $3
              AND status = 'completed'
              AND kind IN ('caption_regen', 'brand_alignment')
            RETURNING *
            "#,
        )
        .bind(excluded)
        .bind(run_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}
