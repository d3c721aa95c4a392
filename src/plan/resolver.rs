//! 依赖解析：纯函数，无 I/O
//!
//! 环检测（三色 DFS）、依赖者映射、就绪步骤选择、完成后向依赖者传播。

use std::collections::{BTreeSet, HashMap};

use crate::plan::types::{ExecutionPlan, Step, StepId, StepStatus};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// 依赖者映射：每个步骤都有条目；对每条依赖边 dep -> step，把 step 追加到 dep 的列表
pub fn build_dependents_map(steps: &[Step]) -> HashMap<StepId, Vec<StepId>> {
    let mut dependents: HashMap<StepId, Vec<StepId>> =
        steps.iter().map(|s| (s.id.clone(), Vec::new())).collect();

    for step in steps {
        for dep in &step.depends_on {
            dependents
                .entry(dep.clone())
                .or_default()
                .push(step.id.clone());
        }
    }

    dependents
}

/// 查找环：返回环上某个步骤 ID。
///
/// 显式栈实现的三色 DFS，O(V+E)，不递归；栈深度以步骤数为上限。
/// 指向计划外的依赖在这里忽略（由引用校验负责）。
pub fn find_cycle(steps: &[Step]) -> Option<StepId> {
    let index: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();
    let mut color = vec![Color::White; steps.len()];

    for root in 0..steps.len() {
        if color[root] != Color::White {
            continue;
        }
        // (节点, 下一条待检查的依赖边)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        color[root] = Color::Gray;

        while let Some(frame) = stack.last_mut() {
            let (node, edge) = *frame;
            let deps = &steps[node].depends_on;
            if edge >= deps.len() {
                color[node] = Color::Black;
                stack.pop();
                continue;
            }
            frame.1 += 1;

            let Some(&next) = index.get(deps[edge].as_str()) else {
                continue;
            };
            match color[next] {
                Color::Gray => return Some(steps[next].id.clone()),
                Color::White => {
                    if stack.len() >= steps.len() {
                        // 不可能超过 V；超过即视为有环
                        return Some(steps[next].id.clone());
                    }
                    color[next] = Color::Gray;
                    stack.push((next, 0));
                }
                Color::Black => {}
            }
        }
    }

    None
}

/// 计划是否含环
pub fn detect_cycle(plan: &ExecutionPlan) -> bool {
    find_cycle(plan.steps()).is_some()
}

/// 可派发的步骤：状态为 Ready、未完成、且依赖全部完成。保持计划中的原始顺序。
pub fn ready_steps<'a>(plan: &'a ExecutionPlan, completed: &BTreeSet<StepId>) -> Vec<&'a Step> {
    plan.steps()
        .iter()
        .filter(|s| {
            s.status == StepStatus::Ready
                && !completed.contains(&s.id)
                && s.depends_on.iter().all(|d| completed.contains(d))
        })
        .collect()
}

/// 某步完成后，把依赖全部满足的 Pending 依赖者提升为 Ready；返回新就绪的步骤 ID。
/// Pending -> Ready 只在这里发生。
pub fn promote_ready_dependents(
    finished_id: &str,
    plan: &mut ExecutionPlan,
    completed: &BTreeSet<StepId>,
) -> Vec<StepId> {
    let candidates = plan.dependents_of(finished_id).to_vec();
    let mut promoted = Vec::new();

    for id in candidates {
        let Some(step) = plan.step_mut(&id) else {
            continue;
        };
        if step.status == StepStatus::Pending
            && step.depends_on.iter().all(|d| completed.contains(d))
        {
            step.status = StepStatus::Ready;
            promoted.push(id);
        }
    }

    promoted
}
