//! Filesystem store client.
//!
//! Renders each batch as text and appends it to one file per target under
//! a base directory (`<dir>/<target>.rows`, tab-separated fields, one row
//! per line). This is the development and demo backend: it makes the
//! relay's output inspectable with ordinary tools while exercising the
//! same batch path a database-backed client would.

use super::{StoreClient, StoreError};
use crate::relay::command::Row;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::io::AsyncWriteExt;

/// Store client appending rendered batches to per-target files.
#[derive(Debug, Clone)]
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    /// Create a new filesystem store. Creates the directory if needed.
    pub fn new(dir: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&dir)?;
        Ok(FsStore { dir })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn target_path(&self, target: &str) -> Result<PathBuf, StoreError> {
        // Target names become file names; path traversal is a constraint
        // violation, not an I/O error.
        if target.contains('/') || target.contains('\\') || target.contains("..") {
            return Err(StoreError::Constraint(format!(
                "target not usable as file name: {}",
                target
            )));
        }
        Ok(self.dir.join(format!("{}.rows", target)))
    }

    fn render(rows: &[Row]) -> Vec<u8> {
        let mut out = Vec::with_capacity(rows.len() * 32);
        for row in rows {
            for (i, field) in row.fields().iter().enumerate() {
                if i > 0 {
                    out.push(b'\t');
                }
                out.extend_from_slice(field);
            }
            out.push(b'\n');
        }
        out
    }
}

impl StoreClient for FsStore {
    fn write_batch<'a>(
        &'a self,
        target: &'a str,
        rows: &'a [Row],
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>> {
        Box::pin(async move {
            debug_assert!(!rows.is_empty(), "Precondition: batch must not be empty");
            let path = self.target_path(target)?;
            let rendered = Self::render(rows);

            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(&rendered).await?;
            file.flush().await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::command::Row;

    #[tokio::test]
    async fn test_appends_rendered_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().to_path_buf()).unwrap();

        store
            .write_batch("events", &[Row::from_fields(["1", "alice"])])
            .await
            .unwrap();
        store
            .write_batch("events", &[Row::from_fields(["2", "bob"])])
            .await
            .unwrap();

        let contents = std::fs::read_to_string(dir.path().join("events.rows")).unwrap();
        assert_eq!(contents, "1\talice\n2\tbob\n");
    }

    #[tokio::test]
    async fn test_targets_get_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().to_path_buf()).unwrap();

        store
            .write_batch("users", &[Row::from_fields(["a"])])
            .await
            .unwrap();
        store
            .write_batch("orders", &[Row::from_fields(["b"])])
            .await
            .unwrap();

        assert!(dir.path().join("users.rows").exists());
        assert!(dir.path().join("orders.rows").exists());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().to_path_buf()).unwrap();

        let result = store
            .write_batch("../escape", &[Row::from_fields(["x"])])
            .await;
        assert!(matches!(result, Err(StoreError::Constraint(_))));
    }
}
