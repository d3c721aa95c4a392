//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! 若预置了脚本回复则按顺序返回；脚本耗尽后退化为「单步 fetch 计划」，便于本地跑通整条链路。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message, Role};

/// Mock 客户端：脚本化回复 + 默认单步计划
#[derive(Debug, Default)]
pub struct MockLlmClient {
    scripted: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一组按顺序返回的回复
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::default();
        if let Ok(mut q) = client.scripted.lock() {
            q.extend(responses.into_iter().map(|r| Ok(r.into())));
        }
        client
    }

    /// 追加一次失败（模拟网络错误等）
    pub fn push_error(&self, message: impl Into<String>) {
        if let Ok(mut q) = self.scripted.lock() {
            q.push_back(Err(message.into()));
        }
    }

    /// 已收到的请求数
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// 最近一次请求的消息
    pub fn last_request(&self) -> Option<Vec<Message>> {
        self.calls.lock().ok().and_then(|c| c.last().cloned())
    }

    fn default_plan(query: &str) -> String {
        serde_json::json!({
            "taskClassification": "single_source",
            "steps": [{
                "id": "s1",
                "type": "fetch",
                "agent": "fetch",
                "description": query,
                "dependsOn": [],
                "justification": "mock: single fetch step"
            }],
            "justification": "mock plan"
        })
        .to_string()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }

        let scripted = self.scripted.lock().ok().and_then(|mut q| q.pop_front());
        if let Some(reply) = scripted {
            return reply;
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(Self::default_plan(last_user))
    }
}
