use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Files under a base directory; used both as the download cache and as the
/// output folder.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: String,
}

impl LocalStorage {
    pub fn new(base_path: String) -> Self {
        Self { base_path }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        Path::new(&self.base_path).join(path)
    }
}

fn part_path(full_path: &Path) -> PathBuf {
    let mut name = full_path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn write_then_rename(part: &Path, target: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(part).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(part, target).await
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let data = tokio::fs::read(self.full_path(path)).await?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // 先寫入暫存檔再改名，寫入中斷時目標檔案不會只剩一半
        let part = part_path(&full_path);
        if let Err(e) = write_then_rename(&part, &full_path, data).await {
            if let Err(cleanup) = tokio::fs::remove_file(&part).await {
                tracing::debug!("Could not remove {}: {}", part.display(), cleanup);
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        tokio::fs::try_exists(self.full_path(path))
            .await
            .unwrap_or(false)
    }

    fn location(&self, path: &str) -> String {
        self.full_path(path).display().to_string()
    }
}
