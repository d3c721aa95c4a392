//! 编排器门面：计划生成 -> 运行 -> 持久化，以及外部回报后的重入
//!
//! 每次进入都从 TaskStore 加载状态、修改、运行、再保存，挂起点两侧不共享任何内存。
//! 同一任务的重入按 task_id 串行：从 load 到 save 持有该任务的锁。

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::error::apology;
use crate::core::{Coordinator, OrchestratorError, WorkerRegistry};
use crate::llm::ProviderRegistry;
use crate::plan::{PlanBuilder, PlanContext};
use crate::store::{create_store, TaskStore};
use crate::task::{PendingArtifact, TaskEvent, TaskRequest, TaskState, TaskStatus};

/// 一次进入后返回给调用方的结果
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub status: TaskStatus,
    /// 挂起时需要外部执行的产物
    pub pending: Option<PendingArtifact>,
    pub response: Option<String>,
    /// 失败时面向用户的信息（不含内部细节）
    pub message: Option<String>,
}

impl TaskOutcome {
    pub fn from_state(state: &TaskState) -> Self {
        Self {
            task_id: state.task_id.clone(),
            status: state.status,
            pending: state.pending_artifact(),
            response: state.final_response.clone(),
            message: (state.status == TaskStatus::Error).then(|| apology(&state.task_id)),
        }
    }
}

pub struct Orchestrator {
    planner: PlanBuilder,
    coordinator: Coordinator,
    store: Arc<dyn TaskStore>,
    /// task_id -> 重入锁；无人等待时移除
    task_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(planner: PlanBuilder, coordinator: Coordinator, store: Arc<dyn TaskStore>) -> Self {
        Self {
            planner,
            coordinator,
            store,
            task_locks: Mutex::new(HashMap::new()),
        }
    }

    /// 按配置组装：推理服务后端、计划步数上限、存储；worker 由嵌入方提供
    pub fn from_config(
        cfg: &AppConfig,
        workers: WorkerRegistry,
        events: Option<broadcast::Sender<TaskEvent>>,
    ) -> Self {
        let providers = ProviderRegistry::from_config(&cfg.llm);
        let planner = PlanBuilder::new(providers.selected(), cfg.planner.max_steps);
        let mut coordinator = Coordinator::new(workers);
        if let Some(tx) = events {
            coordinator = coordinator.with_events(tx);
        }
        Self::new(planner, coordinator, create_store(&cfg.store))
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// 新请求：计划无效时直接返回错误，不创建任务
    pub async fn submit(
        &self,
        request: TaskRequest,
        context: &PlanContext,
    ) -> Result<TaskOutcome, OrchestratorError> {
        let mut state = self.planner.build_task(request, context).await?;
        tracing::info!(
            "task {} created ({}, {} steps)",
            state.task_id,
            state.task_type,
            state.plan.len()
        );
        self.run_and_save(&mut state, None).await
    }

    /// 同 submit，运行期间可通过令牌取消
    pub async fn submit_with_cancel(
        &self,
        request: TaskRequest,
        context: &PlanContext,
        cancel: &CancellationToken,
    ) -> Result<TaskOutcome, OrchestratorError> {
        let mut state = self.planner.build_task(request, context).await?;
        self.run_and_save(&mut state, Some(cancel)).await
    }

    /// 外部执行成功回报
    pub async fn complete_step(
        &self,
        task_id: &str,
        step_id: &str,
        payload: Value,
    ) -> Result<TaskOutcome, OrchestratorError> {
        let guard = self.lock_task(task_id).await;
        let outcome = self.complete_locked(task_id, step_id, payload).await;
        self.release_task(task_id, guard).await;
        outcome
    }

    /// 外部执行失败回报
    pub async fn fail_step(
        &self,
        task_id: &str,
        step_id: &str,
        message: &str,
    ) -> Result<TaskOutcome, OrchestratorError> {
        let guard = self.lock_task(task_id).await;
        let outcome = self.fail_locked(task_id, step_id, message).await;
        self.release_task(task_id, guard).await;
        outcome
    }

    pub async fn cancel(&self, task_id: &str) -> Result<TaskOutcome, OrchestratorError> {
        let guard = self.lock_task(task_id).await;
        let outcome = self.cancel_locked(task_id).await;
        self.release_task(task_id, guard).await;
        outcome
    }

    pub async fn task(&self, task_id: &str) -> Result<TaskState, OrchestratorError> {
        self.load(task_id).await
    }

    async fn complete_locked(
        &self,
        task_id: &str,
        step_id: &str,
        payload: Value,
    ) -> Result<TaskOutcome, OrchestratorError> {
        let mut state = self.load(task_id).await?;
        self.coordinator.complete_step(&mut state, step_id, payload)?;
        self.run_and_save(&mut state, None).await
    }

    async fn fail_locked(
        &self,
        task_id: &str,
        step_id: &str,
        message: &str,
    ) -> Result<TaskOutcome, OrchestratorError> {
        let mut state = self.load(task_id).await?;
        self.coordinator.fail_step(&mut state, step_id, message)?;
        self.save(&state).await?;
        Ok(TaskOutcome::from_state(&state))
    }

    async fn cancel_locked(&self, task_id: &str) -> Result<TaskOutcome, OrchestratorError> {
        let mut state = self.load(task_id).await?;
        if !self.coordinator.cancel(&mut state) {
            return Err(OrchestratorError::TaskNotActive {
                task_id: state.task_id.clone(),
                status: state.status,
            });
        }
        self.save(&state).await?;
        Ok(TaskOutcome::from_state(&state))
    }

    async fn lock_task(&self, task_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.task_locks.lock().await;
            Arc::clone(locks.entry(task_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    async fn release_task(&self, task_id: &str, guard: OwnedMutexGuard<()>) {
        let mut locks = self.task_locks.lock().await;
        // 只剩表项与本 guard 两个引用：没有等待者
        if Arc::strong_count(OwnedMutexGuard::mutex(&guard)) <= 2 {
            locks.remove(task_id);
        }
        drop(guard);
    }

    /// 运行并保存；运行中的内部错误已记录在状态上，这里只记日志并返回对外结果
    async fn run_and_save(
        &self,
        state: &mut TaskState,
        cancel: Option<&CancellationToken>,
    ) -> Result<TaskOutcome, OrchestratorError> {
        if let Err(e) = self.coordinator.run_with_cancel(state, cancel).await {
            tracing::error!("task {} aborted: {}", state.task_id, e);
        }
        self.save(state).await?;
        Ok(TaskOutcome::from_state(state))
    }

    async fn load(&self, task_id: &str) -> Result<TaskState, OrchestratorError> {
        self.store
            .load(task_id)
            .await
            .map_err(|e| OrchestratorError::Store(e.to_string()))?
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))
    }

    async fn save(&self, state: &TaskState) -> Result<(), OrchestratorError> {
        self.store
            .save(state)
            .await
            .map_err(|e| OrchestratorError::Store(e.to_string()))
    }
}
