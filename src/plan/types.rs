//! 计划类型定义
//!
//! 步骤、步骤类型、Agent 类别、任务分类，以及创建后结构不可变的 ExecutionPlan。

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::resolver::build_dependents_map;
use crate::task::StepResult;

/// 计划内唯一的步骤 ID
pub type StepId = String;

/// 步骤类型（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// 从数据源取数
    Fetch,
    /// 通过逻辑片段变换数据
    Transform,
    /// 在系统之间搬运数据
    Transfer,
}

impl StepType {
    pub const ALL: [StepType; 3] = [StepType::Fetch, StepType::Transform, StepType::Transfer];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Fetch => "fetch",
            StepType::Transform => "transform",
            StepType::Transfer => "transfer",
        }
    }

    /// 该类型步骤唯一对应的 worker 类别
    pub fn agent(&self) -> AgentKind {
        match self {
            StepType::Fetch => AgentKind::Fetch,
            StepType::Transform => AgentKind::Transform,
            StepType::Transfer => AgentKind::Transfer,
        }
    }
}

/// 处理步骤的 worker 类别（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Fetch,
    Transform,
    Transfer,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [AgentKind::Fetch, AgentKind::Transform, AgentKind::Transfer];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Fetch => "fetch",
            AgentKind::Transform => "transform",
            AgentKind::Transfer => "transfer",
        }
    }
}

/// 整个请求的分类（由计划推导，不由调用方指定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// 单数据源取数
    SingleSource,
    /// 单步变换/分析
    Analysis,
    /// 跨系统搬运
    Transfer,
    /// 多源对比
    Comparison,
}

impl TaskType {
    pub const ALL: [TaskType; 4] = [
        TaskType::SingleSource,
        TaskType::Analysis,
        TaskType::Transfer,
        TaskType::Comparison,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::SingleSource => "single_source",
            TaskType::Analysis => "analysis",
            TaskType::Transfer => "transfer",
            TaskType::Comparison => "comparison",
        }
    }

    /// 由计划推导任务分类：
    /// - 单步：按该步的 agent 类别
    /// - 多步且含 transfer 步：Transfer
    /// - 其余多步：Comparison
    pub fn classify(steps: &[Step]) -> TaskType {
        if let [only] = steps {
            return match only.agent {
                AgentKind::Fetch => TaskType::SingleSource,
                AgentKind::Transform => TaskType::Analysis,
                AgentKind::Transfer => TaskType::Transfer,
            };
        }
        if steps.iter().any(|s| s.step_type == StepType::Transfer) {
            TaskType::Transfer
        } else {
            TaskType::Comparison
        }
    }
}

macro_rules! impl_str_enum {
    ($ty:ty, $label:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$ty>::ALL
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| format!("unknown {}: {}", $label, s))
            }
        }
    };
}

impl_str_enum!(StepType, "step type");
impl_str_enum!(AgentKind, "agent");
impl_str_enum!(TaskType, "task type");

/// 步骤状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// 等待依赖完成
    Pending,
    /// 依赖已满足，可以派发
    Ready,
    /// 已派发；若产出 artifact 则保持此状态直到外部回报
    Executing,
    /// 已完成
    Completed,
    /// 失败
    Error,
}

/// 计划中的单个步骤
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub agent: AgentKind,
    pub description: String,
    #[serde(default)]
    pub depends_on: Vec<StepId>,
    pub status: StepStatus,
    #[serde(default)]
    pub result: Option<StepResult>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Step {
    /// 新步骤：无依赖为 Ready，否则 Pending
    pub fn new(
        id: impl Into<StepId>,
        step_type: StepType,
        agent: AgentKind,
        description: impl Into<String>,
        depends_on: Vec<StepId>,
    ) -> Self {
        let status = if depends_on.is_empty() {
            StepStatus::Ready
        } else {
            StepStatus::Pending
        };
        Self {
            id: id.into(),
            step_type,
            agent,
            description: description.into(),
            depends_on,
            status,
            result: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// 执行计划：创建后结构（步骤集合与依赖边）不再改变，只有步骤状态随执行推进
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    id: String,
    steps: Vec<Step>,
    /// 依赖者映射：步骤 ID -> 依赖它的步骤 ID 列表（depends_on 的转置）
    dependents: HashMap<StepId, Vec<StepId>>,
    created_at: DateTime<Utc>,
}

impl ExecutionPlan {
    /// 由步骤列表构建计划，并一次性推导依赖者映射。
    /// 结构校验（引用、环）由 PlanBuilder 负责。
    pub fn new(steps: Vec<Step>) -> Self {
        let dependents = build_dependents_map(&steps);
        Self {
            id: format!("plan_{}", uuid::Uuid::new_v4()),
            steps,
            dependents,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 依赖 `id` 的步骤
    pub fn dependents_of(&self, id: &str) -> &[StepId] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub(crate) fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// 是否有步骤正在执行（含等待外部回报）
    pub fn has_executing(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Executing)
    }
}
