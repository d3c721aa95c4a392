//! 协调器：任务的 run 循环与重入操作
//!
//! run 从依赖解析取就绪步骤，按计划顺序逐个派发给 worker；某步产出 artifact 时任务挂起
//! （WaitingForClient）并把控制权整个交还调用方。外部执行环境回报后，调用方通过
//! complete_step / fail_step 修改持久化状态，再次调用 run 继续。

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use serde_json::Value;

use crate::core::{OrchestratorError, WorkerRegistry, WorkerRequest};
use crate::plan::{find_cycle, promote_ready_dependents, ready_steps, PlanError, StepId, StepStatus};
use crate::task::{assemble_response, StepResult, TaskEvent, TaskState, TaskStatus};

/// 协调器：持有 worker 分派表与可选的事件通道
pub struct Coordinator {
    workers: WorkerRegistry,
    events: Option<broadcast::Sender<TaskEvent>>,
}

impl Coordinator {
    pub fn new(workers: WorkerRegistry) -> Self {
        Self {
            workers,
            events: None,
        }
    }

    /// 进度事件发往该通道；接收端全部关闭时静默丢弃
    pub fn with_events(mut self, tx: broadcast::Sender<TaskEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    fn emit(&self, event: TaskEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// 运行直到挂起、完成或失败。终止状态下重复调用直接返回当前状态。
    pub async fn run(&self, state: &mut TaskState) -> Result<TaskStatus, OrchestratorError> {
        self.run_with_cancel(state, None).await
    }

    /// 同 run，每轮循环开头检查取消令牌
    pub async fn run_with_cancel(
        &self,
        state: &mut TaskState,
        cancel: Option<&CancellationToken>,
    ) -> Result<TaskStatus, OrchestratorError> {
        if state.is_terminal() {
            tracing::debug!("task {} already {:?}, nothing to run", state.task_id, state.status);
            return Ok(state.status);
        }

        if state.status == TaskStatus::Planned {
            self.emit(TaskEvent::plan_announced(&state.task_id, &state.plan));
        }

        if let Some(id) = find_cycle(state.plan.steps()) {
            let err = PlanError::CycleDetected(id);
            state.fail(None, err.to_string());
            self.emit_failed(state);
            return Err(OrchestratorError::StructuralPlan(err));
        }

        state.status = TaskStatus::Running;

        while state.completed_steps.len() < state.plan.len() {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                state.cancel_requested = true;
            }
            if state.cancel_requested {
                self.mark_cancelled(state);
                return Ok(TaskStatus::Cancelled);
            }

            let ready: Vec<StepId> = ready_steps(&state.plan, &state.completed_steps)
                .iter()
                .map(|s| s.id.clone())
                .collect();

            if ready.is_empty() {
                if state.plan.has_executing() {
                    if state.current_step_id.is_none() {
                        state.current_step_id = state
                            .plan
                            .steps()
                            .iter()
                            .find(|s| s.status == StepStatus::Executing)
                            .map(|s| s.id.clone());
                    }
                    state.status = TaskStatus::WaitingForClient;
                    tracing::info!(
                        "task {} waiting for client on step {:?}",
                        state.task_id,
                        state.current_step_id
                    );
                    return Ok(TaskStatus::WaitingForClient);
                }

                let msg = format!(
                    "no ready or executing steps with {}/{} completed",
                    state.completed_steps.len(),
                    state.plan.len()
                );
                tracing::error!("task {}: {}", state.task_id, msg);
                state.fail(None, msg.clone());
                self.emit_failed(state);
                return Err(OrchestratorError::FatalScheduling(msg));
            }

            for step_id in ready {
                let result = match self.dispatch(&step_id, state).await {
                    Ok(result) => result,
                    Err(err) => {
                        tracing::error!("task {}: dispatch of {} failed: {}", state.task_id, step_id, err);
                        self.record_step_error(state, &step_id, StepResult::failure(err.to_string()));
                        return Err(err);
                    }
                };

                if !result.success {
                    self.record_step_error(state, &step_id, result);
                    return Ok(TaskStatus::Error);
                }

                if result.awaits_external() {
                    let artifact = result.artifact.clone();
                    if let Some(step) = state.plan.step_mut(&step_id) {
                        step.result = Some(result);
                    }
                    state.current_step_id = Some(step_id.clone());
                    state.status = TaskStatus::WaitingForClient;
                    if let Some(artifact) = artifact {
                        self.emit(TaskEvent::AwaitingClient {
                            task_id: state.task_id.clone(),
                            step_id: step_id.clone(),
                            artifact,
                        });
                    }
                    tracing::info!("task {} suspended on step {}", state.task_id, step_id);
                    return Ok(TaskStatus::WaitingForClient);
                }

                self.finalize(state, &step_id, result)?;
            }
        }

        state.status = TaskStatus::Completed;
        state.current_step_id = None;
        state.final_response = Some(assemble_response(state));
        state.end_time = Some(Utc::now());
        tracing::info!("task {} completed ({} steps)", state.task_id, state.plan.len());
        self.emit(TaskEvent::Completed {
            task_id: state.task_id.clone(),
            response: state.final_response.clone().unwrap_or_default(),
            artifacts: state.artifacts().into_iter().map(|(_, a)| a).collect(),
        });
        Ok(TaskStatus::Completed)
    }

    /// 按步骤类型分派给 worker；worker 自身失败包装为失败的 StepResult
    async fn dispatch(
        &self,
        step_id: &str,
        state: &mut TaskState,
    ) -> Result<StepResult, OrchestratorError> {
        let step_type = state
            .step(step_id)
            .map(|s| s.step_type)
            .ok_or_else(|| OrchestratorError::StepNotFound(step_id.to_string()))?;
        let worker = self.workers.get(step_type)?;

        let step = {
            let step = state
                .plan
                .step_mut(step_id)
                .ok_or_else(|| OrchestratorError::StepNotFound(step_id.to_string()))?;
            step.status = StepStatus::Executing;
            step.started_at = Some(Utc::now());
            step.clone()
        };

        let request = WorkerRequest {
            task_id: state.task_id.clone(),
            query: state.query.clone(),
            context: state.dependency_results(&step),
            step,
        };

        tracing::debug!("task {}: dispatching {} ({})", state.task_id, step_id, step_type);
        self.emit(TaskEvent::StepStarted {
            task_id: state.task_id.clone(),
            step_id: step_id.to_string(),
        });

        match worker.handle(&request).await {
            Ok(output) => Ok(output.into_step_result()),
            Err(message) => {
                tracing::warn!("task {}: worker failed on {}: {}", state.task_id, step_id, message);
                Ok(StepResult::failure(message))
            }
        }
    }

    /// 标记完成、记录数据、并向依赖者传播
    fn finalize(
        &self,
        state: &mut TaskState,
        step_id: &str,
        result: StepResult,
    ) -> Result<(), OrchestratorError> {
        let data = result.data.clone();
        state.usage.add(result.usage);

        let step = state
            .plan
            .step_mut(step_id)
            .ok_or_else(|| OrchestratorError::StepNotFound(step_id.to_string()))?;
        step.status = StepStatus::Completed;
        step.finished_at = Some(Utc::now());
        step.result = Some(result);

        state.completed_steps.insert(step_id.to_string());
        if let Some(data) = data {
            state.step_results.insert(step_id.to_string(), data);
        }
        if state.current_step_id.as_deref() == Some(step_id) {
            state.current_step_id = None;
        }

        let promoted = promote_ready_dependents(step_id, &mut state.plan, &state.completed_steps);
        if !promoted.is_empty() {
            tracing::debug!("task {}: {} unlocked {:?}", state.task_id, step_id, promoted);
        }

        self.emit(TaskEvent::StepCompleted {
            task_id: state.task_id.clone(),
            step_id: step_id.to_string(),
        });
        Ok(())
    }

    /// 外部执行成功：以 payload 作为该步数据完成它。之后由调用方再次 run。
    ///
    /// 对已完成步骤的重复投递只记日志，不改状态。
    pub fn complete_step(
        &self,
        state: &mut TaskState,
        step_id: &str,
        payload: Value,
    ) -> Result<(), OrchestratorError> {
        let step = state
            .step(step_id)
            .ok_or_else(|| OrchestratorError::StepNotFound(step_id.to_string()))?;

        if step.status == StepStatus::Completed {
            tracing::warn!(
                "task {}: duplicate completion for step {} ignored",
                state.task_id,
                step_id
            );
            return Ok(());
        }
        self.ensure_in_flight(state, step_id, step.status)?;

        let previous = step.result.clone().unwrap_or_default();
        let result = StepResult {
            success: true,
            artifact: previous.artifact,
            data: Some(payload),
            error: None,
            usage: previous.usage,
        };
        self.finalize(state, step_id, result)
    }

    /// 外部执行失败：步骤记为 Error，任务随之进入不可恢复的 Error
    pub fn fail_step(
        &self,
        state: &mut TaskState,
        step_id: &str,
        message: &str,
    ) -> Result<(), OrchestratorError> {
        let step = state
            .step(step_id)
            .ok_or_else(|| OrchestratorError::StepNotFound(step_id.to_string()))?;
        self.ensure_in_flight(state, step_id, step.status)?;

        let previous = step.result.clone().unwrap_or_default();
        let result = StepResult {
            artifact: previous.artifact,
            usage: previous.usage,
            ..StepResult::failure(message)
        };
        self.record_step_error(state, step_id, result);
        Ok(())
    }

    /// 请求取消。未在 run 中的任务立即进入 Cancelled；返回是否接受
    pub fn cancel(&self, state: &mut TaskState) -> bool {
        if state.is_terminal() {
            return false;
        }
        state.cancel_requested = true;
        if state.status != TaskStatus::Running {
            self.mark_cancelled(state);
        }
        true
    }

    fn ensure_in_flight(
        &self,
        state: &TaskState,
        step_id: &str,
        status: StepStatus,
    ) -> Result<(), OrchestratorError> {
        if state.is_terminal() {
            return Err(OrchestratorError::TaskNotActive {
                task_id: state.task_id.clone(),
                status: state.status,
            });
        }
        if status != StepStatus::Executing {
            return Err(OrchestratorError::InvalidStepTransition {
                step_id: step_id.to_string(),
                status,
            });
        }
        Ok(())
    }

    fn record_step_error(&self, state: &mut TaskState, step_id: &str, result: StepResult) {
        let message = result
            .error
            .clone()
            .unwrap_or_else(|| "step failed".to_string());
        if let Some(step) = state.plan.step_mut(step_id) {
            step.status = StepStatus::Error;
            step.finished_at = Some(Utc::now());
            step.result = Some(result);
        }

        self.emit(TaskEvent::StepError {
            task_id: state.task_id.clone(),
            step_id: step_id.to_string(),
            error: message.clone(),
        });
        let err = OrchestratorError::StepExecution {
            step_id: step_id.to_string(),
            message,
        };
        tracing::error!("task {}: {}", state.task_id, err);
        state.fail(Some(step_id.to_string()), err.to_string());
        self.emit_failed(state);
    }

    fn mark_cancelled(&self, state: &mut TaskState) {
        state.status = TaskStatus::Cancelled;
        state.current_step_id = None;
        state.end_time = Some(Utc::now());
        tracing::info!("task {} cancelled", state.task_id);
        self.emit(TaskEvent::Cancelled {
            task_id: state.task_id.clone(),
        });
    }

    fn emit_failed(&self, state: &TaskState) {
        let error = state
            .error
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_default();
        self.emit(TaskEvent::Failed {
            task_id: state.task_id.clone(),
            error,
        });
    }
}
