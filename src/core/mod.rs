//! 核心编排层：错误分类、worker 分派、协调器 run 循环、编排器门面

pub mod coordinator;
pub mod error;
pub mod orchestrator;
pub mod worker;

pub use coordinator::Coordinator;
pub use error::OrchestratorError;
pub use orchestrator::{Orchestrator, TaskOutcome};
pub use worker::{DomainWorker, WorkerOutput, WorkerRegistry, WorkerRequest};
