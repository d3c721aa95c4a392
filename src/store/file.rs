//! 文件存储：每个任务一个 JSON 文件（<dir>/<task_id>.json）

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;

use crate::store::TaskStore;
use crate::task::TaskState;

#[derive(Debug, Clone)]
pub struct FileTaskStore {
    dir: PathBuf,
}

impl FileTaskStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, task_id: &str) -> anyhow::Result<PathBuf> {
        // task_id 直接用作文件名，拒绝路径分隔符
        if task_id.is_empty()
            || task_id.contains(['/', '\\'])
            || task_id.contains("..")
        {
            anyhow::bail!("invalid task id: {task_id:?}");
        }
        Ok(self.dir.join(format!("{task_id}.json")))
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn save(&self, state: &TaskState) -> anyhow::Result<()> {
        let path = self.path_for(&state.task_id)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create {:?}", self.dir))?;

        // 临时文件 + rename
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_string_pretty(state)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, task_id: &str) -> anyhow::Result<Option<TaskState>> {
        let path = self.path_for(task_id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(data) => {
                let state = serde_json::from_str(&data)
                    .with_context(|| format!("parse {:?}", path))?;
                Ok(Some(state))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, task_id: &str) -> anyhow::Result<bool> {
        let path = self.path_for(task_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> anyhow::Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
