//! 模型标识 → 图像服务适配器

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::image_client::{ImageProvider, OpenAiImageClient};
use crate::config::Config;
use crate::error::ConfigError;

/// 按模型标识选择适配器
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ImageProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 配置中的每个模型都注册到同一个 OpenAI 兼容客户端
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let client: Arc<dyn ImageProvider> = Arc::new(OpenAiImageClient::new(config)?);
        let mut registry = Self::new();
        for model in &config.image_models {
            registry.register(model.clone(), client.clone());
        }
        info!("📦 已注册 {} 个图像模型: {:?}", registry.len(), registry.models());
        Ok(registry)
    }

    pub fn register(&mut self, model: impl Into<String>, provider: Arc<dyn ImageProvider>) {
        self.providers.insert(model.into(), provider);
    }

    pub fn with_provider(mut self, model: impl Into<String>, provider: Arc<dyn ImageProvider>) -> Self {
        self.register(model, provider);
        self
    }

    pub fn get(&self, model: &str) -> Option<Arc<dyn ImageProvider>> {
        self.providers.get(model.trim()).cloned()
    }

    pub fn models(&self) -> Vec<&str> {
        let mut models: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        models.sort_unstable();
        models
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
