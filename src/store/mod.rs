//! 任务状态存储
//!
//! 挂起后的 TaskState 必须落到这里；再次进入时一律从存储加载，不依赖进程内存。

pub mod file;
pub mod memory;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{StoreKind, StoreSection};
use crate::task::TaskState;

pub use file::FileTaskStore;
pub use memory::InMemoryTaskStore;

/// 任务存储 trait
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn save(&self, state: &TaskState) -> anyhow::Result<()>;

    async fn load(&self, task_id: &str) -> anyhow::Result<Option<TaskState>>;

    /// 返回是否存在并已删除
    async fn remove(&self, task_id: &str) -> anyhow::Result<bool>;

    async fn list(&self) -> anyhow::Result<Vec<String>>;
}

/// 按配置创建存储后端
pub fn create_store(cfg: &StoreSection) -> Arc<dyn TaskStore> {
    match cfg.kind {
        StoreKind::Memory => {
            tracing::info!("Using in-memory task store");
            Arc::new(InMemoryTaskStore::new())
        }
        StoreKind::File => {
            tracing::info!("Using file task store: {:?}", cfg.dir);
            Arc::new(FileTaskStore::new(PathBuf::from(&cfg.dir)))
        }
    }
}
