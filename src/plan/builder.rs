//! 计划构建器
//!
//! 向推理服务请求计划，严格解析并在本地重新校验全部结构性质（封闭枚举、引用、环），
//! 推理服务的回答一律视为不可信输入。

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::llm::{LlmClient, Message};
use crate::plan::resolver::find_cycle;
use crate::plan::schema::{parse_plan_document, plan_document_schema_json, PlanDocument};
use crate::plan::types::{AgentKind, ExecutionPlan, Step, StepType, TaskType};
use crate::plan::PlanError;
use crate::task::{TaskRequest, TaskState};

/// 可用数据源描述
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataSource {
    pub name: String,
    /// 数据源类别，如 postgres、bigquery、sheet
    pub kind: String,
    #[serde(default)]
    pub description: String,
}

/// 计划上下文：当前有哪些数据源
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanContext {
    #[serde(default)]
    pub sources: Vec<DataSource>,
}

impl PlanContext {
    pub fn new(sources: Vec<DataSource>) -> Self {
        Self { sources }
    }
}

/// 计划构建器：持有推理服务客户端与计划步数上限
pub struct PlanBuilder {
    llm: Arc<dyn LlmClient>,
    max_steps: usize,
}

impl PlanBuilder {
    pub fn new(llm: Arc<dyn LlmClient>, max_steps: usize) -> Self {
        Self {
            llm,
            max_steps: max_steps.max(1),
        }
    }

    /// 请求 -> 校验后的 ExecutionPlan
    pub async fn build_plan(
        &self,
        query: &str,
        context: &PlanContext,
    ) -> Result<ExecutionPlan, PlanError> {
        let messages = vec![
            Message::system(self.system_prompt(context)),
            Message::user(query.to_string()),
        ];

        let raw = self
            .llm
            .complete(&messages)
            .await
            .map_err(PlanError::Oracle)?;
        tracing::debug!("oracle plan response: {}", raw);

        let plan = parse_plan_document(&raw)
            .and_then(|doc| validate_document(&doc, self.max_steps))
            .map(ExecutionPlan::new);

        match &plan {
            Ok(plan) => tracing::info!("Accepted plan {} with {} steps", plan.id(), plan.len()),
            Err(e) => tracing::warn!("Rejected oracle plan: {}", e),
        }
        plan
    }

    /// 计划生成成功后立即创建 TaskState；计划无效时不创建任何状态
    pub async fn build_task(
        &self,
        request: TaskRequest,
        context: &PlanContext,
    ) -> Result<TaskState, PlanError> {
        let plan = self.build_plan(&request.query, context).await?;
        Ok(TaskState::new(request, plan))
    }

    fn system_prompt(&self, context: &PlanContext) -> String {
        let list = |items: Vec<&str>| items.join(", ");
        let sources = serde_json::to_string_pretty(&context.sources).unwrap_or_else(|_| "[]".to_string());

        format!(
            "You plan data tasks as a dependency graph of steps.\n\
             Task classifications: {task_types}\n\
             Step types: {step_types} (fetch = read from a source, transform = run logic over \
             previous results, transfer = move data between systems)\n\
             Agents: {agents} (a step's agent must equal its type)\n\
             At most {max} steps. Every id in dependsOn must be the id of another step in the \
             same plan. No cycles.\n\
             Available sources:\n{sources}\n\
             Reply with exactly one JSON object matching this schema and nothing else:\n{schema}",
            task_types = list(TaskType::ALL.iter().map(TaskType::as_str).collect()),
            step_types = list(StepType::ALL.iter().map(StepType::as_str).collect()),
            agents = list(AgentKind::ALL.iter().map(AgentKind::as_str).collect()),
            max = self.max_steps,
            sources = sources,
            schema = plan_document_schema_json(),
        )
    }
}

/// 校验计划文档并物化为 Step 列表（无依赖为 Ready，否则 Pending）
pub fn validate_document(doc: &PlanDocument, max_steps: usize) -> Result<Vec<Step>, PlanError> {
    doc.task_classification
        .parse::<TaskType>()
        .map_err(|_| PlanError::UnknownTaskType(doc.task_classification.clone()))?;

    if doc.steps.is_empty() {
        return Err(PlanError::EmptyPlan);
    }
    if doc.steps.len() > max_steps {
        return Err(PlanError::TooManySteps {
            count: doc.steps.len(),
            limit: max_steps,
        });
    }

    let mut ids = HashSet::new();
    let mut steps = Vec::with_capacity(doc.steps.len());

    for (index, d) in doc.steps.iter().enumerate() {
        let id = d.id.trim();
        if id.is_empty() {
            return Err(PlanError::EmptyField { index, field: "id" });
        }
        if d.description.trim().is_empty() {
            return Err(PlanError::EmptyField {
                index,
                field: "description",
            });
        }
        if !ids.insert(id.to_string()) {
            return Err(PlanError::DuplicateStepId(id.to_string()));
        }

        let step_type = d
            .step_type
            .parse::<StepType>()
            .map_err(|_| PlanError::UnknownStepType {
                step: id.to_string(),
                value: d.step_type.clone(),
            })?;
        let agent = d.agent.parse::<AgentKind>().map_err(|_| PlanError::UnknownAgent {
            step: id.to_string(),
            value: d.agent.clone(),
        })?;
        if agent != step_type.agent() {
            return Err(PlanError::AgentMismatch {
                step: id.to_string(),
                step_type: step_type.to_string(),
                agent: agent.to_string(),
            });
        }

        let mut depends_on: Vec<String> = Vec::with_capacity(d.depends_on.len());
        for dep in &d.depends_on {
            let dep = dep.trim();
            if dep == id {
                return Err(PlanError::SelfDependency(id.to_string()));
            }
            if !depends_on.iter().any(|existing| existing == dep) {
                depends_on.push(dep.to_string());
            }
        }

        steps.push(Step::new(id, step_type, agent, d.description.trim(), depends_on));
    }

    for step in &steps {
        if let Some(missing) = step.depends_on.iter().find(|dep| !ids.contains(*dep)) {
            return Err(PlanError::DanglingDependency {
                step: step.id.clone(),
                missing: missing.clone(),
            });
        }
    }

    if let Some(id) = find_cycle(&steps) {
        return Err(PlanError::CycleDetected(id));
    }

    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::plan::types::StepStatus;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> PlanDocument {
        serde_json::from_value(value).unwrap()
    }

    fn two_step() -> serde_json::Value {
        json!({
            "taskClassification": "analysis",
            "steps": [
                {"id": "s1", "type": "fetch", "agent": "fetch", "description": "load", "dependsOn": [], "justification": "raw rows"},
                {"id": "s2", "type": "transform", "agent": "transform", "description": "aggregate", "dependsOn": ["s1"], "justification": "daily totals"}
            ],
            "justification": "fetch then aggregate"
        })
    }

    #[test]
    fn test_materialize_statuses() {
        let steps = validate_document(&doc(two_step()), 8).unwrap();
        assert_eq!(steps[0].status, StepStatus::Ready);
        assert_eq!(steps[1].status, StepStatus::Pending);
        assert_eq!(steps[1].depends_on, vec!["s1".to_string()]);
    }

    #[test]
    fn test_reject_unknown_classification() {
        let mut v = two_step();
        v["taskClassification"] = json!("magic");
        assert_eq!(
            validate_document(&doc(v), 8).unwrap_err(),
            PlanError::UnknownTaskType("magic".to_string())
        );
    }

    #[test]
    fn test_reject_unknown_step_type_and_agent() {
        let mut v = two_step();
        v["steps"][0]["type"] = json!("delete");
        assert!(matches!(
            validate_document(&doc(v), 8),
            Err(PlanError::UnknownStepType { .. })
        ));

        let mut v = two_step();
        v["steps"][1]["agent"] = json!("shell");
        assert!(matches!(
            validate_document(&doc(v), 8),
            Err(PlanError::UnknownAgent { .. })
        ));
    }

    #[test]
    fn test_reject_agent_that_does_not_match_type() {
        let mut v = two_step();
        v["steps"][0]["type"] = json!("transfer");
        let err = validate_document(&doc(v), 8).unwrap_err();
        assert_eq!(
            err,
            PlanError::AgentMismatch {
                step: "s1".to_string(),
                step_type: "transfer".to_string(),
                agent: "fetch".to_string(),
            }
        );
        assert!(!err.is_structural());
    }

    #[test]
    fn test_reject_empty_id_and_description() {
        let mut v = two_step();
        v["steps"][0]["id"] = json!("  ");
        assert_eq!(
            validate_document(&doc(v), 8).unwrap_err(),
            PlanError::EmptyField { index: 0, field: "id" }
        );

        let mut v = two_step();
        v["steps"][1]["description"] = json!("");
        assert_eq!(
            validate_document(&doc(v), 8).unwrap_err(),
            PlanError::EmptyField {
                index: 1,
                field: "description"
            }
        );
    }

    #[test]
    fn test_reject_dangling_dependency() {
        let mut v = two_step();
        v["steps"][1]["dependsOn"] = json!(["s9"]);
        let err = validate_document(&doc(v), 8).unwrap_err();
        assert!(err.is_structural());
        assert_eq!(
            err,
            PlanError::DanglingDependency {
                step: "s2".to_string(),
                missing: "s9".to_string()
            }
        );
    }

    #[test]
    fn test_reject_cycle() {
        let mut v = two_step();
        v["steps"][0]["dependsOn"] = json!(["s2"]);
        let err = validate_document(&doc(v), 8).unwrap_err();
        assert!(matches!(err, PlanError::CycleDetected(_)));
        assert!(err.is_structural());
    }

    #[test]
    fn test_reject_self_dependency_duplicates_and_limits() {
        let mut v = two_step();
        v["steps"][0]["dependsOn"] = json!(["s1"]);
        assert_eq!(
            validate_document(&doc(v), 8).unwrap_err(),
            PlanError::SelfDependency("s1".to_string())
        );

        let mut v = two_step();
        v["steps"][1]["id"] = json!("s1");
        assert_eq!(
            validate_document(&doc(v), 8).unwrap_err(),
            PlanError::DuplicateStepId("s1".to_string())
        );

        assert_eq!(
            validate_document(&doc(two_step()), 1).unwrap_err(),
            PlanError::TooManySteps { count: 2, limit: 1 }
        );

        let mut v = two_step();
        v["steps"] = json!([]);
        assert_eq!(validate_document(&doc(v), 8).unwrap_err(), PlanError::EmptyPlan);
    }

    #[tokio::test]
    async fn test_build_plan_prompt_and_result() {
        let mock = Arc::new(MockLlmClient::with_responses([two_step().to_string()]));
        let builder = PlanBuilder::new(mock.clone(), 8);
        let ctx = PlanContext::new(vec![DataSource {
            name: "warehouse".to_string(),
            kind: "postgres".to_string(),
            description: "orders".to_string(),
        }]);

        let plan = builder.build_plan("total orders per day", &ctx).await.unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.dependents_of("s1"), ["s2".to_string()]);

        let request = mock.last_request().unwrap();
        assert!(request[0].content.contains("warehouse"));
        assert!(request[0].content.contains("single_source"));
        assert_eq!(request[1].content, "total orders per day");
    }

    #[tokio::test]
    async fn test_oracle_failure_is_plan_error() {
        let mock = MockLlmClient::new();
        mock.push_error("timeout");
        let builder = PlanBuilder::new(Arc::new(mock), 8);
        let err = builder
            .build_plan("q", &PlanContext::default())
            .await
            .unwrap_err();
        assert_eq!(err, PlanError::Oracle("timeout".to_string()));
        assert!(!err.is_structural());
    }
}
