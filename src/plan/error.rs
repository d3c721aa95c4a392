//! 计划生成错误

use thiserror::Error;

/// 计划生成 / 校验失败；任一错误都意味着整个请求在执行任何步骤之前被拒绝
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("oracle request failed: {0}")]
    Oracle(String),

    #[error("malformed oracle response: {0}")]
    MalformedResponse(String),

    #[error("unknown task classification: {0}")]
    UnknownTaskType(String),

    #[error("step '{step}' has unknown type '{value}'")]
    UnknownStepType { step: String, value: String },

    #[error("step '{step}' has unknown agent '{value}'")]
    UnknownAgent { step: String, value: String },

    #[error("step '{step}' has type '{step_type}' but agent '{agent}'")]
    AgentMismatch {
        step: String,
        step_type: String,
        agent: String,
    },

    #[error("step #{index} has empty {field}")]
    EmptyField { index: usize, field: &'static str },

    #[error("plan has no steps")]
    EmptyPlan,

    #[error("plan has {count} steps, limit is {limit}")]
    TooManySteps { count: usize, limit: usize },

    #[error("duplicate step id: {0}")]
    DuplicateStepId(String),

    #[error("step '{0}' depends on itself")]
    SelfDependency(String),

    #[error("step '{step}' depends on undefined step '{missing}'")]
    DanglingDependency { step: String, missing: String },

    #[error("dependency cycle involving step '{0}'")]
    CycleDetected(String),
}

impl PlanError {
    /// 结构性错误（重复 ID、自依赖、悬空引用、环），其余为计划生成错误
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            PlanError::DuplicateStepId(_)
                | PlanError::SelfDependency(_)
                | PlanError::DanglingDependency { .. }
                | PlanError::CycleDetected(_)
        )
    }
}
