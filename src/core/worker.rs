//! 领域 worker：把一个步骤变成具体产物（查询语句 / 逻辑片段 / 直接数据）
//!
//! WorkerRegistry 是按步骤类型分派的显式表；查不到即硬失败，不会静默跳过。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::OrchestratorError;
use crate::plan::{Step, StepId, StepType};
use crate::task::{Artifact, StepResult, Usage};

/// 交给 worker 的请求：原始问题、步骤本身、以及它的依赖结果
#[derive(Debug, Clone)]
pub struct WorkerRequest {
    pub task_id: String,
    pub query: String,
    pub step: Step,
    pub context: BTreeMap<StepId, Value>,
}

/// worker 的回答
#[derive(Debug, Clone, Default)]
pub struct WorkerOutput {
    pub response: String,
    /// 结构化数据；缺省时以 response 文本作为数据
    pub data: Option<Value>,
    /// 需要外部执行的产物；存在则任务挂起
    pub artifact: Option<Artifact>,
    pub usage: Usage,
}

impl WorkerOutput {
    pub fn text(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifact = Some(artifact);
        self
    }

    pub fn with_usage(mut self, input_units: u64, output_units: u64) -> Self {
        self.usage = Usage {
            input_units,
            output_units,
        };
        self
    }

    pub fn into_step_result(self) -> StepResult {
        let result = match self.artifact {
            Some(artifact) if !artifact.is_empty() => StepResult::artifact(artifact),
            _ => StepResult::data(self.data.unwrap_or(Value::String(self.response))),
        };
        result.with_usage(self.usage)
    }
}

/// 领域 worker trait
#[async_trait]
pub trait DomainWorker: Send + Sync {
    /// 处理单个步骤；Err 为 worker 自身失败
    async fn handle(&self, request: &WorkerRequest) -> Result<WorkerOutput, String>;
}

/// 步骤类型 -> worker
#[derive(Default, Clone)]
pub struct WorkerRegistry {
    workers: HashMap<StepType, Arc<dyn DomainWorker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, step_type: StepType, worker: impl DomainWorker + 'static) {
        self.workers.insert(step_type, Arc::new(worker));
    }

    pub fn get(&self, step_type: StepType) -> Result<Arc<dyn DomainWorker>, OrchestratorError> {
        self.workers
            .get(&step_type)
            .cloned()
            .ok_or(OrchestratorError::WorkerNotRegistered(step_type))
    }
}
