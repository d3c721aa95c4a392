//! 推理服务返回的计划文档格式与严格解析
//!
//! 文档格式同时通过 schemars 生成 JSON Schema 注入请求，减少格式错误；
//! 解析时任何偏差（多余字段、缺字段、前后夹杂文字）都整体拒绝，不做部分挽救。

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::plan::PlanError;

/// 计划文档
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlanDocument {
    /// 整体任务分类：single_source / analysis / transfer / comparison
    pub task_classification: String,
    /// 按执行顺序列出的步骤
    pub steps: Vec<StepDescriptor>,
    /// 整体理由
    pub justification: String,
}

/// 单个步骤描述
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StepDescriptor {
    /// 计划内唯一 ID，如 s1、s2
    pub id: String,
    /// 步骤类型：fetch / transform / transfer
    #[serde(rename = "type")]
    pub step_type: String,
    /// 处理该步骤的 worker：fetch / transform / transfer
    pub agent: String,
    /// 面向人的步骤说明
    pub description: String,
    /// 依赖的步骤 ID（必须是本计划内的其他步骤）
    pub depends_on: Vec<String>,
    /// 选择该步骤的理由
    pub justification: String,
}

/// 返回计划文档的 JSON Schema 字符串，可拼入 system prompt
pub fn plan_document_schema_json() -> String {
    let schema = schema_for!(PlanDocument);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 严格解析：整段必须是一个 JSON 对象，或整段恰好被一个 ```json 代码块包裹
pub fn parse_plan_document(raw: &str) -> Result<PlanDocument, PlanError> {
    let body = strip_fence(raw.trim());
    if !body.starts_with('{') {
        return Err(PlanError::MalformedResponse(
            "response is not a JSON object".to_string(),
        ));
    }
    serde_json::from_str(body).map_err(|e| PlanError::MalformedResponse(e.to_string()))
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
    else {
        return text;
    };
    match rest.strip_suffix("```") {
        Some(inner) => inner.trim(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "taskClassification": "comparison",
        "steps": [
            {"id": "s1", "type": "fetch", "agent": "fetch", "description": "orders", "dependsOn": [], "justification": "x"},
            {"id": "s2", "type": "fetch", "agent": "fetch", "description": "refunds", "dependsOn": [], "justification": ""}
        ],
        "justification": "compare"
    }"#;

    #[test]
    fn test_parse_valid_document() {
        let doc = parse_plan_document(VALID).unwrap();
        assert_eq!(doc.task_classification, "comparison");
        assert_eq!(doc.steps.len(), 2);
        assert_eq!(doc.steps[1].justification, "");
    }

    #[test]
    fn test_parse_fenced_document() {
        let fenced = format!("```json\n{VALID}\n```");
        assert!(parse_plan_document(&fenced).is_ok());
    }

    #[test]
    fn test_reject_prose_around_json() {
        let noisy = format!("Sure! Here is the plan:\n{VALID}");
        assert!(matches!(
            parse_plan_document(&noisy),
            Err(PlanError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_reject_unknown_field() {
        let raw = r#"{"taskClassification": "single_source", "steps": [], "justification": "", "extra": 1}"#;
        assert!(matches!(
            parse_plan_document(raw),
            Err(PlanError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_reject_missing_depends_on() {
        let raw = r#"{"taskClassification": "single_source", "steps": [{"id": "s1", "type": "fetch", "agent": "fetch", "description": "d", "justification": "j"}], "justification": "j"}"#;
        assert!(parse_plan_document(raw).is_err());
    }

    #[test]
    fn test_reject_missing_justification() {
        let no_step_reason = r#"{"taskClassification": "single_source", "steps": [{"id": "s1", "type": "fetch", "agent": "fetch", "description": "d", "dependsOn": []}], "justification": "j"}"#;
        assert!(matches!(
            parse_plan_document(no_step_reason),
            Err(PlanError::MalformedResponse(_))
        ));

        let no_plan_reason = r#"{"taskClassification": "single_source", "steps": [{"id": "s1", "type": "fetch", "agent": "fetch", "description": "d", "dependsOn": [], "justification": "j"}]}"#;
        assert!(matches!(
            parse_plan_document(no_plan_reason),
            Err(PlanError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_schema_mentions_fields() {
        let schema = plan_document_schema_json();
        assert!(schema.contains("taskClassification"));
        assert!(schema.contains("dependsOn"));
    }
}
