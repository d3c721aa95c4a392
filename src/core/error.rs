//! 编排错误分类
//!
//! 计划阶段的错误直接返回调用方且不创建 TaskState；任务存在后，任何步骤失败都会升级为
//! 任务级不可恢复错误。对外只暴露一句致歉信息与关联 ID，内部细节只进日志。

use thiserror::Error;

use crate::plan::{PlanError, StepId, StepStatus, StepType};
use crate::task::TaskStatus;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// 推理服务的回答无法转成计划
    #[error("plan generation failed: {0}")]
    PlanGeneration(PlanError),

    /// 计划含环、悬空引用等结构问题
    #[error("structural plan error: {0}")]
    StructuralPlan(PlanError),

    /// 回调引用了计划外的步骤（集成错误，不面向用户）
    #[error("step not found: {0}")]
    StepNotFound(StepId),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// 没有就绪步骤也没有执行中步骤；对已校验的无环计划不应出现
    #[error("no progress possible: {0}")]
    FatalScheduling(String),

    #[error("step '{step_id}' failed: {message}")]
    StepExecution { step_id: StepId, message: String },

    #[error("no worker registered for step type '{0}'")]
    WorkerNotRegistered(StepType),

    #[error("step '{step_id}' is {status:?}, expected executing")]
    InvalidStepTransition { step_id: StepId, status: StepStatus },

    #[error("task {task_id} is already {status:?}")]
    TaskNotActive { task_id: String, status: TaskStatus },

    #[error("task store error: {0}")]
    Store(String),
}

impl From<PlanError> for OrchestratorError {
    fn from(err: PlanError) -> Self {
        if err.is_structural() {
            OrchestratorError::StructuralPlan(err)
        } else {
            OrchestratorError::PlanGeneration(err)
        }
    }
}

impl OrchestratorError {
    /// 面向用户的统一信息
    pub fn user_message(&self, correlation_id: &str) -> String {
        apology(correlation_id)
    }
}

pub fn apology(correlation_id: &str) -> String {
    format!("Sorry, we couldn't complete this request. Reference: {correlation_id}")
}
