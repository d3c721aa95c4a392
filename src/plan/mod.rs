//! 计划层：类型、依赖解析、推理服务响应格式与计划构建

pub mod builder;
pub mod error;
pub mod resolver;
pub mod schema;
pub mod types;

pub use builder::{validate_document, DataSource, PlanBuilder, PlanContext};
pub use error::PlanError;
pub use resolver::{
    build_dependents_map, detect_cycle, find_cycle, promote_ready_dependents, ready_steps,
};
pub use schema::{parse_plan_document, PlanDocument, StepDescriptor};
pub use types::{AgentKind, ExecutionPlan, Step, StepId, StepStatus, StepType, TaskType};
