//! Folder tree repository.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use vfs_core::{Error, Folder, FolderRepository, Result, Status};

const FOLDER_COLUMNS: &str =
    "folder_id, parent_folder_id, title, is_favorite, created_at, status_id";

/// Parent hops followed before the branch query gives up on a corrupt tree.
const MAX_BRANCH_DEPTH: i32 = 1024;

/// Transaction-scoped advisory lock key shared by every folder move.
const FOLDER_MOVE_LOCK: i64 = 0x7666_735f_6d6f_7665;

/// PostgreSQL implementation of FolderRepository.
#[derive(Clone)]
pub struct PgFolderRepository {
    pool: PgPool,
}

impl PgFolderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn parse_row(row: PgRow) -> Folder {
        let status_id: i32 = row.get("status_id");
        Folder {
            id: row.get("folder_id"),
            parent_id: row.get("parent_folder_id"),
            title: row.get("title"),
            is_favorite: row.get("is_favorite"),
            created_at: row.get("created_at"),
            status: Status::from_id(status_id).unwrap_or(Status::Disabled),
        }
    }
}

fn expect_one(result: sqlx::postgres::PgQueryResult, id: i32) -> Result<()> {
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("folder {id}")));
    }
    Ok(())
}

#[async_trait]
impl FolderRepository for PgFolderRepository {
    async fn get(&self, id: i32) -> Result<Option<Folder>> {
        let row = sqlx::query(&format!(
            "SELECT {FOLDER_COLUMNS} FROM vfs_folders WHERE folder_id = $1 AND status_id <> 3"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    async fn children(&self, id: i32) -> Result<Vec<Folder>> {
        let rows = sqlx::query(&format!(
            "SELECT {FOLDER_COLUMNS} FROM vfs_folders
             WHERE parent_folder_id = $1 AND status_id <> 3
             ORDER BY title"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    async fn ancestors(&self, id: i32) -> Result<Vec<Folder>> {
        let rows = sqlx::query(&format!(
            "WITH RECURSIVE branch AS (
                 SELECT {FOLDER_COLUMNS}, 0 AS depth
                 FROM vfs_folders WHERE folder_id = $1
                 UNION ALL
                 SELECT f.folder_id, f.parent_folder_id, f.title, f.is_favorite,
                        f.created_at, f.status_id, b.depth + 1
                 FROM vfs_folders f
                 JOIN branch b ON f.folder_id = b.parent_folder_id
                 WHERE b.depth < $2
             )
             SELECT {FOLDER_COLUMNS} FROM branch ORDER BY depth DESC"
        ))
        .bind(id)
        .bind(MAX_BRANCH_DEPTH)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    async fn reparent(&self, id: i32, parent_id: i32) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Two moves checked against the same snapshot could each pass and
        // close a cycle between them.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(FOLDER_MOVE_LOCK)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let inside: bool = sqlx::query_scalar(
            "WITH RECURSIVE branch AS (
                 SELECT folder_id, parent_folder_id, 0 AS depth
                 FROM vfs_folders WHERE folder_id = $1
                 UNION ALL
                 SELECT f.folder_id, f.parent_folder_id, b.depth + 1
                 FROM vfs_folders f
                 JOIN branch b ON f.folder_id = b.parent_folder_id
                 WHERE b.depth < $3
             )
             SELECT EXISTS (SELECT 1 FROM branch WHERE folder_id = $2)",
        )
        .bind(parent_id)
        .bind(id)
        .bind(MAX_BRANCH_DEPTH)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;
        if inside {
            return Err(Error::Conflict(format!(
                "folder {parent_id} is inside folder {id}"
            )));
        }

        let result = sqlx::query("UPDATE vfs_folders SET parent_folder_id = $1 WHERE folder_id = $2")
            .bind(parent_id)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        expect_one(result, id)?;

        tx.commit().await.map_err(Error::Database)
    }

    async fn create(&self, parent_id: i32, title: &str) -> Result<Folder> {
        let row = sqlx::query(&format!(
            "INSERT INTO vfs_folders (parent_folder_id, title, status_id)
             VALUES ($1, $2, 1)
             RETURNING {FOLDER_COLUMNS}"
        ))
        .bind(parent_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_row(row))
    }

    async fn rename(&self, id: i32, title: &str) -> Result<()> {
        let result = sqlx::query("UPDATE vfs_folders SET title = $1 WHERE folder_id = $2 AND status_id <> 3")
            .bind(title)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        expect_one(result, id)
    }

    async fn set_status(&self, id: i32, status: Status) -> Result<()> {
        let result = sqlx::query("UPDATE vfs_folders SET status_id = $1 WHERE folder_id = $2")
            .bind(status.as_id())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        expect_one(result, id)
    }

    async fn set_favorite(&self, id: i32, favorite: bool) -> Result<()> {
        let result = sqlx::query("UPDATE vfs_folders SET is_favorite = $1 WHERE folder_id = $2 AND status_id <> 3")
            .bind(favorite)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        expect_one(result, id)
    }

    async fn favorites(&self) -> Result<Vec<Folder>> {
        let rows = sqlx::query(&format!(
            "SELECT {FOLDER_COLUMNS} FROM vfs_folders
             WHERE is_favorite AND status_id <> 3
             ORDER BY title"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }
}
