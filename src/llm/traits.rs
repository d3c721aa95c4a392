//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：请求/响应式的 complete。

use async_trait::async_trait;

use crate::llm::Message;

/// LLM 客户端 trait：一次请求，一次完整文本回复
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;
}
