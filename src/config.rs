use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::services::RetryPolicy;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时处理的提交数量
    pub max_concurrent_submissions: usize,
    /// 单条流水线的时间预算（秒）
    pub pipeline_timeout_secs: u64,
    /// 单次 AI 调用的最大尝试次数
    pub retry_max_attempts: u32,
    /// 第一次重试前的等待（毫秒），之后指数增长
    pub retry_base_delay_ms: u64,
    /// 单个 HTTP 请求超时（秒）
    pub request_timeout_secs: u64,
    /// 流水线定义文件
    pub pipeline_file: String,
    /// 提交 TOML 文件存放目录
    pub submissions_folder: String,
    /// 资源存储根目录
    pub asset_root: String,
    /// 结果报告输出目录
    pub output_folder: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- 图像 API 配置 ---
    pub image_api_base_url: String,
    pub image_api_key: String,
    pub image_models: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_submissions: 8,
            pipeline_timeout_secs: 300,
            retry_max_attempts: 3,
            retry_base_delay_ms: 1000,
            request_timeout_secs: 120,
            pipeline_file: "pipeline.toml".to_string(),
            submissions_folder: "submissions".to_string(),
            asset_root: "assets".to_string(),
            output_folder: "output".to_string(),
            verbose_logging: false,
            image_api_base_url: "https://api.openai.com/v1".to_string(),
            image_api_key: String::new(),
            image_models: vec!["gpt-image-1".to_string()],
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse::<T>().ok() {
            Some(value) => value,
            None => {
                let err = ConfigError::EnvVarParseFailed {
                    var_name: name.to_string(),
                    value: raw,
                    expected_type: std::any::type_name::<T>().to_string(),
                };
                tracing::warn!("{}，使用默认值", err);
                default
            }
        },
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_submissions: env_or("MAX_CONCURRENT_SUBMISSIONS", default.max_concurrent_submissions).max(1),
            pipeline_timeout_secs: env_or("PIPELINE_TIMEOUT_SECS", default.pipeline_timeout_secs),
            retry_max_attempts: env_or("RETRY_MAX_ATTEMPTS", default.retry_max_attempts),
            retry_base_delay_ms: env_or("RETRY_BASE_DELAY_MS", default.retry_base_delay_ms),
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", default.request_timeout_secs),
            pipeline_file: std::env::var("PIPELINE_FILE").unwrap_or(default.pipeline_file),
            submissions_folder: std::env::var("SUBMISSIONS_FOLDER").unwrap_or(default.submissions_folder),
            asset_root: std::env::var("ASSET_ROOT").unwrap_or(default.asset_root),
            output_folder: std::env::var("OUTPUT_FOLDER").unwrap_or(default.output_folder),
            verbose_logging: env_or("VERBOSE_LOGGING", default.verbose_logging),
            image_api_base_url: std::env::var("IMAGE_API_BASE_URL").unwrap_or(default.image_api_base_url),
            image_api_key: std::env::var("IMAGE_API_KEY").unwrap_or(default.image_api_key),
            image_models: std::env::var("IMAGE_MODELS")
                .map(|v| parse_list(&v))
                .unwrap_or(default.image_models),
        }
    }

    /// 执行引擎使用的设置
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            pipeline_timeout: Duration::from_secs(self.pipeline_timeout_secs),
            retry: RetryPolicy::new(
                self.retry_max_attempts,
                Duration::from_millis(self.retry_base_delay_ms),
            ),
        }
    }
}

/// 执行引擎设置（时间预算 + 重试策略）
#[derive(Clone, Copy, Debug)]
pub struct EngineSettings {
    pub pipeline_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Config::default().engine_settings()
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
