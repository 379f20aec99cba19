use async_trait::async_trait;

use crate::application::repos::{CheckpointRepo, RepoError};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl CheckpointRepo for PostgresRepositories {
    async fn load_cursor(&self, service: &str) -> Result<Option<i64>, RepoError> {
        sqlx::query_scalar::<_, i64>(
            r#"
            SELECT cursor
            FROM sub_state
            WHERE service = $1
            "#,
        )
        .bind(service)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn save_cursor(&self, service: &str, cursor: i64) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO sub_state (service, cursor)
            VALUES ($1, $2)
            ON CONFLICT (service)
            DO UPDATE SET cursor = GREATEST(sub_state.cursor, EXCLUDED.cursor)
            "#,
        )
        .bind(service)
        .bind(cursor)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
