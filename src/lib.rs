//! Relay - 执行计划编排器
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 协调器 run 循环、worker 分派、错误分类、编排器门面
//! - **llm**: 推理服务客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）与后端注册表
//! - **observability**: 日志初始化
//! - **plan**: 计划类型、依赖解析、推理服务响应格式、计划构建
//! - **store**: 任务状态存储（内存 / JSON 文件）
//! - **task**: 任务状态聚合根、单步结果、进度事件

pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod plan;
pub mod store;
pub mod task;

pub use crate::core::{Coordinator, Orchestrator, OrchestratorError, TaskOutcome};
pub use plan::{ExecutionPlan, PlanBuilder, PlanContext, PlanError};
pub use task::{TaskRequest, TaskState, TaskStatus};
