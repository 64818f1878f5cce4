//! Tree file repository.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::warn;

use vfs_core::{
    Error, File, FileRepository, ListFilesRequest, NewFile, PathMove, Result, Status,
};

const FILE_COLUMNS: &str = "file_id, folder_id, title, path, width, height, mime_type, \
                            file_size, file_exists, created_at, status_id";

/// PostgreSQL implementation of FileRepository.
#[derive(Clone)]
pub struct PgFileRepository {
    pool: PgPool,
}

impl PgFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn parse_row(row: PgRow) -> File {
        let status_id: i32 = row.get("status_id");
        File {
            id: row.get("file_id"),
            folder_id: row.get("folder_id"),
            title: row.get("title"),
            path: row.get("path"),
            width: row.get("width"),
            height: row.get("height"),
            mime_type: row.get("mime_type"),
            file_size: row.get("file_size"),
            file_exists: row.get("file_exists"),
            created_at: row.get("created_at"),
            status: Status::from_id(status_id).unwrap_or(Status::Disabled),
        }
    }
}

#[async_trait]
impl FileRepository for PgFileRepository {
    async fn next_id(&self) -> Result<i32> {
        let (id,): (i64,) = sqlx::query_as("SELECT nextval('vfs_files_file_id_seq')")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        i32::try_from(id).map_err(|_| Error::Internal(format!("file id {id} out of range")))
    }

    async fn insert(&self, file: NewFile) -> Result<File> {
        let row = sqlx::query(&format!(
            "INSERT INTO vfs_files
                 (file_id, folder_id, title, path, width, height, mime_type, file_size,
                  file_exists, status_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, 1)
             RETURNING {FILE_COLUMNS}"
        ))
        .bind(file.id)
        .bind(file.folder_id)
        .bind(&file.title)
        .bind(&file.path)
        .bind(file.width)
        .bind(file.height)
        .bind(&file.mime_type)
        .bind(file.file_size)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_row(row))
    }

    async fn get(&self, id: i32) -> Result<Option<File>> {
        let row = sqlx::query(&format!(
            "SELECT {FILE_COLUMNS} FROM vfs_files WHERE file_id = $1 AND status_id <> 3"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    async fn find_by_path(&self, path: &str) -> Result<Option<File>> {
        let row = sqlx::query(&format!(
            "SELECT {FILE_COLUMNS} FROM vfs_files
             WHERE path = $1 AND status_id <> 3
             ORDER BY file_id DESC
             LIMIT 1"
        ))
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    async fn list(&self, req: &ListFilesRequest) -> Result<Vec<File>> {
        // Sort column comes from a closed enum, never from user text.
        let direction = if req.sort_desc { "DESC" } else { "ASC" };
        let rows = sqlx::query(&format!(
            "SELECT {FILE_COLUMNS} FROM vfs_files
             WHERE folder_id = $1
               AND status_id <> 3
               AND ($2::text IS NULL OR title ILIKE '%' || $2 || '%')
             ORDER BY {} {direction}, file_id {direction}
             LIMIT $3 OFFSET $4",
            req.sort.column()
        ))
        .bind(req.folder_id)
        .bind(req.search.as_deref())
        .bind(req.limit)
        .bind(req.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }

    async fn count(&self, folder_id: i32, search: Option<&str>) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM vfs_files
             WHERE folder_id = $1
               AND status_id <> 3
               AND ($2::text IS NULL OR title ILIKE '%' || $2 || '%')",
        )
        .bind(folder_id)
        .bind(search)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(count)
    }

    async fn move_to_folder(&self, ids: &[i32], folder_id: i32) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE vfs_files SET folder_id = $2 WHERE file_id = ANY($1) AND status_id <> 3",
        )
        .bind(ids)
        .bind(folder_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn set_status(&self, ids: &[i32], status: Status) -> Result<u64> {
        let result = sqlx::query("UPDATE vfs_files SET status_id = $2 WHERE file_id = ANY($1)")
            .bind(ids)
            .bind(status.as_id())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected())
    }

    async fn set_path(&self, id: i32, path: &str, apply: PathMove) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let result =
            sqlx::query("UPDATE vfs_files SET path = $2 WHERE file_id = $1 AND status_id <> 3")
                .bind(id)
                .bind(path)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("file {id}")));
        }

        // Dropping tx on failure rolls the path update back.
        apply.await?;

        if let Err(e) = tx.commit().await {
            warn!(
                subsystem = "db",
                component = "files",
                op = "set_path",
                file_id = id,
                error = %e,
                "Commit failed after the file was moved on disk"
            );
            return Err(Error::Database(e));
        }
        Ok(())
    }
}
