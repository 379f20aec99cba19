use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{NewPost, PostsWriteRepo, RepoError, RetentionRepo};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn insert_member_posts(&self, posts: &[NewPost]) -> Result<u64, RepoError> {
        if posts.is_empty() {
            return Ok(0);
        }

        let mut uris = Vec::with_capacity(posts.len());
        let mut cids = Vec::with_capacity(posts.len());
        let mut authors = Vec::with_capacity(posts.len());
        let mut reply_parents = Vec::with_capacity(posts.len());
        let mut reply_roots = Vec::with_capacity(posts.len());
        for post in posts {
            uris.push(post.uri.clone());
            cids.push(post.cid.clone());
            authors.push(post.author.clone());
            reply_parents.push(post.reply_parent.clone());
            reply_roots.push(post.reply_root.clone());
        }

        let result = sqlx::query(
            r#"
            INSERT INTO post (uri, cid, author, reply_parent, reply_root)
            SELECT candidate.uri, candidate.cid, candidate.author,
                   candidate.reply_parent, candidate.reply_root
            FROM UNNEST($1::text[], $2::text[], $3::text[], $4::text[], $5::text[])
                AS candidate (uri, cid, author, reply_parent, reply_root)
            WHERE EXISTS (
                SELECT 1 FROM membership m WHERE m.member_did = candidate.author
            )
            ON CONFLICT (uri) DO NOTHING
            "#,
        )
        .bind(&uris)
        .bind(&cids)
        .bind(&authors)
        .bind(&reply_parents)
        .bind(&reply_roots)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn delete_posts(&self, uris: &[String]) -> Result<u64, RepoError> {
        if uris.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM post WHERE uri = ANY($1)")
            .bind(uris)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RetentionRepo for PostgresRepositories {
    async fn delete_posts_indexed_before(&self, cutoff: OffsetDateTime) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM post WHERE indexed_at < $1")
            .bind(cutoff)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
