//! 推理服务后端选择：启动时一次性构建，按封闭枚举查找
//!
//! 注册表构建后不再修改；请求期间只读。

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::LlmSection;
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient};

/// 可选后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    DeepSeek,
    OpenAi,
    #[default]
    Mock,
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::DeepSeek => write!(f, "deepseek"),
            LlmProvider::OpenAi => write!(f, "openai"),
            LlmProvider::Mock => write!(f, "mock"),
        }
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deepseek" => Ok(LlmProvider::DeepSeek),
            "openai" => Ok(LlmProvider::OpenAi),
            "mock" => Ok(LlmProvider::Mock),
            other => Err(format!("unknown llm provider: {other}")),
        }
    }
}

/// 后端注册表
pub struct ProviderRegistry {
    clients: HashMap<LlmProvider, Arc<dyn LlmClient>>,
    selected: LlmProvider,
}

impl ProviderRegistry {
    /// 根据配置与环境变量构建所有可用后端；Mock 始终可用
    pub fn from_config(cfg: &LlmSection) -> Self {
        let mut clients: HashMap<LlmProvider, Arc<dyn LlmClient>> = HashMap::new();
        clients.insert(LlmProvider::Mock, Arc::new(MockLlmClient::new()));

        if std::env::var("DEEPSEEK_API_KEY").is_ok() {
            let model = cfg
                .deepseek
                .model
                .clone()
                .or_else(|| cfg.model.clone())
                .unwrap_or_else(|| crate::llm::DEEPSEEK_CHAT.to_string());
            clients.insert(
                LlmProvider::DeepSeek,
                Arc::new(create_deepseek_client(Some(&model))),
            );
        }

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            let model = cfg
                .openai
                .model
                .clone()
                .or_else(|| cfg.model.clone())
                .unwrap_or_else(|| "gpt-4o-mini".to_string());
            clients.insert(
                LlmProvider::OpenAi,
                Arc::new(OpenAiClient::new(
                    cfg.base_url.as_deref(),
                    &model,
                    Some(key.as_str()),
                )),
            );
        }

        let mut registry = Self {
            clients,
            selected: LlmProvider::Mock,
        };
        registry.selected = if registry.clients.contains_key(&cfg.provider) {
            cfg.provider
        } else {
            tracing::warn!(
                "LLM provider {} not available (missing API key?), using mock",
                cfg.provider
            );
            LlmProvider::Mock
        };
        tracing::info!("Using {} LLM for plan synthesis", registry.selected);
        registry
    }

    /// 用给定客户端构建（测试或嵌入方自行注入）
    pub fn single(provider: LlmProvider, client: Arc<dyn LlmClient>) -> Self {
        let mut clients: HashMap<LlmProvider, Arc<dyn LlmClient>> = HashMap::new();
        clients.insert(provider, client);
        Self {
            clients,
            selected: provider,
        }
    }

    pub fn get(&self, provider: LlmProvider) -> Option<Arc<dyn LlmClient>> {
        self.clients.get(&provider).cloned()
    }

    pub fn selected_provider(&self) -> LlmProvider {
        self.selected
    }

    /// 配置选定的后端
    pub fn selected(&self) -> Arc<dyn LlmClient> {
        match self.clients.get(&self.selected) {
            Some(client) => Arc::clone(client),
            None => Arc::new(MockLlmClient::new()),
        }
    }
}
