//! 任务进度事件：供展示层订阅（计划公告、步骤进度、完成/失败）
//!
//! 核心只负责把状态序列化为这些形状，不持有传输通道的另一端。

use serde::Serialize;

use crate::plan::{ExecutionPlan, Step, StepId, StepStatus, StepType};
use crate::task::Artifact;

/// 计划公告中的步骤视图
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StepView {
    pub id: StepId,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub description: String,
    pub depends_on: Vec<StepId>,
    pub status: StepStatus,
}

impl From<&Step> for StepView {
    fn from(step: &Step) -> Self {
        Self {
            id: step.id.clone(),
            step_type: step.step_type,
            description: step.description.clone(),
            depends_on: step.depends_on.clone(),
            status: step.status,
        }
    }
}

/// 单个事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// 计划公告：步骤、依赖边与初始状态
    PlanAnnounced { task_id: String, steps: Vec<StepView> },
    /// 步骤开始执行
    StepStarted { task_id: String, step_id: StepId },
    /// 步骤完成
    StepCompleted { task_id: String, step_id: StepId },
    /// 步骤失败
    StepError {
        task_id: String,
        step_id: StepId,
        error: String,
    },
    /// 步骤产出 artifact，任务挂起等待外部执行
    AwaitingClient {
        task_id: String,
        step_id: StepId,
        artifact: Artifact,
    },
    /// 任务完成：最终回复与产出过的 artifact
    Completed {
        task_id: String,
        response: String,
        artifacts: Vec<Artifact>,
    },
    /// 任务失败
    Failed { task_id: String, error: String },
    /// 任务取消
    Cancelled { task_id: String },
}

impl TaskEvent {
    pub fn plan_announced(task_id: &str, plan: &ExecutionPlan) -> Self {
        TaskEvent::PlanAnnounced {
            task_id: task_id.to_string(),
            steps: plan.steps().iter().map(StepView::from).collect(),
        }
    }
}
