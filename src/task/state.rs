//! 任务状态：一个请求从计划生成到终止的完整生命周期
//!
//! TaskState 必须可完整序列化：挂起点两侧可能跨越进程重启或不同机器，
//! 任何字段都不能依赖内存中的连续性。

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plan::{ExecutionPlan, Step, StepId, TaskType};

/// 任务状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 计划已生成，尚未运行
    Planned,
    /// run 循环进行中
    Running,
    /// 挂起：等待外部执行环境回报
    WaitingForClient,
    Completed,
    Error,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Error | TaskStatus::Cancelled
        )
    }
}

/// 外部执行环境需要运行的产物（查询语句或逻辑片段）；编排器不解释 content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
}

impl Artifact {
    pub fn new(artifact_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            artifact_type: artifact_type.into(),
            content: content.into(),
            metadata: Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// 内容为空的 artifact 不触发挂起
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// worker 消耗量（仅记录，不计费）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_units: u64,
    pub output_units: u64,
}

impl Usage {
    pub fn add(&mut self, other: Usage) {
        self.input_units = self.input_units.saturating_add(other.input_units);
        self.output_units = self.output_units.saturating_add(other.output_units);
    }
}

/// 单步执行结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub usage: Usage,
}

impl StepResult {
    pub fn data(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn artifact(artifact: Artifact) -> Self {
        Self {
            success: true,
            artifact: Some(artifact),
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// 成功且带非空 artifact：步骤尚未真正完成，等待外部执行
    pub fn awaits_external(&self) -> bool {
        self.success && self.artifact.as_ref().is_some_and(|a| !a.is_empty())
    }
}

/// 发起请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub conversation_id: String,
    pub user_id: String,
    pub query: String,
}

impl TaskRequest {
    pub fn new(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            query: query.into(),
        }
    }
}

/// 任务级错误（不可恢复）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    #[serde(default)]
    pub step_id: Option<StepId>,
    pub message: String,
}

/// 交给外部执行环境的负载：artifact + 它需要的依赖结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingArtifact {
    pub task_id: String,
    pub step_id: StepId,
    pub artifact: Artifact,
    pub inputs: BTreeMap<StepId, Value>,
}

/// 单个请求的聚合根
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub task_id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub query: String,
    pub task_type: TaskType,
    pub plan: ExecutionPlan,
    pub status: TaskStatus,
    /// 只增不减
    #[serde(default)]
    pub completed_steps: BTreeSet<StepId>,
    /// 步骤 ID -> 产出数据（作为依赖者的输入）
    #[serde(default)]
    pub step_results: BTreeMap<StepId, Value>,
    /// 仅在挂起时设置
    #[serde(default)]
    pub current_step_id: Option<StepId>,
    #[serde(default)]
    pub final_response: Option<String>,
    #[serde(default)]
    pub error: Option<TaskError>,
    #[serde(default)]
    pub cancel_requested: bool,
    #[serde(default)]
    pub usage: Usage,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl TaskState {
    /// 计划有效后立即创建；任务分类在此推导一次，之后不再重算
    pub fn new(request: TaskRequest, plan: ExecutionPlan) -> Self {
        let task_type = TaskType::classify(plan.steps());
        Self {
            task_id: format!("task_{}", uuid::Uuid::new_v4()),
            conversation_id: request.conversation_id,
            user_id: request.user_id,
            query: request.query,
            task_type,
            plan,
            status: TaskStatus::Planned,
            completed_steps: BTreeSet::new(),
            step_results: BTreeMap::new(),
            current_step_id: None,
            final_response: None,
            error: None,
            cancel_requested: false,
            usage: Usage::default(),
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.plan.step(id)
    }

    /// 某步骤依赖的已产出结果（只包含它声明的依赖）
    pub fn dependency_results(&self, step: &Step) -> BTreeMap<StepId, Value> {
        step.depends_on
            .iter()
            .filter_map(|dep| {
                self.step_results
                    .get(dep)
                    .map(|value| (dep.clone(), value.clone()))
            })
            .collect()
    }

    /// 挂起中的步骤及其 artifact；非挂起状态返回 None
    pub fn pending_artifact(&self) -> Option<PendingArtifact> {
        if self.status != TaskStatus::WaitingForClient {
            return None;
        }
        let step = self.step(self.current_step_id.as_deref()?)?;
        let artifact = step.result.as_ref()?.artifact.clone()?;
        Some(PendingArtifact {
            task_id: self.task_id.clone(),
            step_id: step.id.clone(),
            artifact,
            inputs: self.dependency_results(step),
        })
    }

    /// 本任务产出过的全部 artifact（按计划顺序）
    pub fn artifacts(&self) -> Vec<(StepId, Artifact)> {
        self.plan
            .steps()
            .iter()
            .filter_map(|s| {
                let artifact = s.result.as_ref()?.artifact.clone()?;
                Some((s.id.clone(), artifact))
            })
            .collect()
    }

    pub(crate) fn fail(&mut self, step_id: Option<StepId>, message: impl Into<String>) {
        self.status = TaskStatus::Error;
        self.error = Some(TaskError {
            step_id,
            message: message.into(),
        });
        self.current_step_id = None;
        self.end_time = Some(Utc::now());
    }
}

/// 按计划顺序拼出最终回复：每个完成步骤的说明 + 数据
pub fn assemble_response(state: &TaskState) -> String {
    let mut parts = Vec::new();
    for step in state.plan.steps() {
        if !state.completed_steps.contains(&step.id) {
            continue;
        }
        let rendered = match state.step_results.get(&step.id) {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => "(no data)".to_string(),
            Some(other) => other.to_string(),
        };
        parts.push(format!("[{}] {}\n{}", step.id, step.description, rendered));
    }
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{AgentKind, StepType};
    use serde_json::json;

    #[test]
    fn test_usage_add_saturates() {
        let mut usage = Usage {
            input_units: u64::MAX - 1,
            output_units: 7,
        };
        usage.add(Usage {
            input_units: 10,
            output_units: 3,
        });
        assert_eq!(usage.input_units, u64::MAX);
        assert_eq!(usage.output_units, 10);
    }

    fn sample_state() -> TaskState {
        let plan = ExecutionPlan::new(vec![
            Step::new("s1", StepType::Fetch, AgentKind::Fetch, "orders", vec![]),
            Step::new(
                "s2",
                StepType::Transform,
                AgentKind::Transform,
                "aggregate",
                vec!["s1".to_string()],
            ),
        ]);
        TaskState::new(TaskRequest::new("c1", "u1", "orders per day"), plan)
    }

    #[test]
    fn test_new_state() {
        let state = sample_state();
        assert!(state.task_id.starts_with("task_"));
        assert_eq!(state.status, TaskStatus::Planned);
        assert_eq!(state.task_type, TaskType::Comparison);
        assert!(state.completed_steps.is_empty());
        assert!(!state.is_terminal());
    }

    #[test]
    fn test_awaits_external() {
        assert!(StepResult::artifact(Artifact::new("sql", "select 1")).awaits_external());
        assert!(!StepResult::artifact(Artifact::new("sql", "  ")).awaits_external());
        assert!(!StepResult::data(json!(1)).awaits_external());
        assert!(!StepResult::failure("x").awaits_external());
    }

    #[test]
    fn test_pending_artifact_carries_dependency_inputs() {
        let mut state = sample_state();
        state.completed_steps.insert("s1".to_string());
        state.step_results.insert("s1".to_string(), json!([{"day": 1, "n": 3}]));
        {
            let s2 = state.plan.step_mut("s2").unwrap();
            s2.result = Some(StepResult::artifact(Artifact::new("python", "df.sum()")));
        }
        state.current_step_id = Some("s2".to_string());
        assert!(state.pending_artifact().is_none());

        state.status = TaskStatus::WaitingForClient;
        let pending = state.pending_artifact().unwrap();
        assert_eq!(pending.step_id, "s2");
        assert_eq!(pending.artifact.content, "df.sum()");
        assert_eq!(pending.inputs["s1"], json!([{"day": 1, "n": 3}]));
    }

    #[test]
    fn test_state_roundtrips_through_json() {
        let mut state = sample_state();
        state.completed_steps.insert("s1".to_string());
        state.step_results.insert("s1".to_string(), json!({"rows": 2}));

        let restored: TaskState =
            serde_json::from_str(&serde_json::to_string(&state).unwrap()).unwrap();
        assert_eq!(restored.task_id, state.task_id);
        assert_eq!(restored.completed_steps, state.completed_steps);
        assert_eq!(restored.plan.dependents_of("s1"), ["s2".to_string()]);
    }

    #[test]
    fn test_assemble_response_in_plan_order() {
        let mut state = sample_state();
        state.completed_steps.insert("s2".to_string());
        state.completed_steps.insert("s1".to_string());
        state.step_results.insert("s1".to_string(), json!("3 rows"));
        state.step_results.insert("s2".to_string(), json!({"total": 3}));

        let response = assemble_response(&state);
        let s1 = response.find("[s1]").unwrap();
        let s2 = response.find("[s2]").unwrap();
        assert!(s1 < s2);
        assert!(response.contains("3 rows"));
        assert!(response.contains(r#"{"total":3}"#));
    }
}
