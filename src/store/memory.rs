//! 内存存储：保存序列化后的快照，读出时反序列化，行为与持久化后端一致

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::store::TaskStore;
use crate::task::TaskState;

#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, String>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn save(&self, state: &TaskState) -> anyhow::Result<()> {
        let snapshot = serde_json::to_string(state)?;
        self.tasks
            .write()
            .await
            .insert(state.task_id.clone(), snapshot);
        Ok(())
    }

    async fn load(&self, task_id: &str) -> anyhow::Result<Option<TaskState>> {
        match self.tasks.read().await.get(task_id) {
            Some(snapshot) => Ok(Some(serde_json::from_str(snapshot)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, task_id: &str) -> anyhow::Result<bool> {
        Ok(self.tasks.write().await.remove(task_id).is_some())
    }

    async fn list(&self) -> anyhow::Result<Vec<String>> {
        let mut ids: Vec<String> = self.tasks.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
