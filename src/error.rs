use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::models::ImageSource;

/// 对外暴露的稳定错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// 需要参与者自拍，但本次提交没有
    SelfieRequiredMissing,
    /// 参考图无法获取
    ReferenceImageNotFound,
    /// 流水线配置错误
    InvalidConfig,
    /// AI 服务调用失败
    ApiError,
    /// 超出流水线时间预算
    Timeout,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::SelfieRequiredMissing => "SELFIE_REQUIRED_MISSING",
            ErrorCode::ReferenceImageNotFound => "REFERENCE_IMAGE_NOT_FOUND",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::ApiError => "API_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 流水线执行错误
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("参考图 '{image_name}' 需要参与者自拍，但本次提交没有自拍")]
    SelfieRequiredMissing { image_name: String },

    #[error("参考图 '{image_name}' ({source_kind}) 无法获取: {reason}")]
    ReferenceImageNotFound {
        image_name: String,
        source_kind: ImageSource,
        reason: String,
    },

    #[error("流水线配置错误: {0}")]
    InvalidConfig(String),

    #[error("模型 {model} 调用失败: {source}")]
    Api {
        model: String,
        #[source]
        source: ProviderError,
    },

    #[error("流水线超时: 已用 {elapsed:?}，预算 {budget:?}")]
    Timeout { elapsed: Duration, budget: Duration },
}

impl PipelineError {
    /// 映射到对外的稳定错误码
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::SelfieRequiredMissing { .. } => ErrorCode::SelfieRequiredMissing,
            PipelineError::ReferenceImageNotFound { .. } => ErrorCode::ReferenceImageNotFound,
            PipelineError::InvalidConfig(_) => ErrorCode::InvalidConfig,
            PipelineError::Api { .. } => ErrorCode::ApiError,
            PipelineError::Timeout { .. } => ErrorCode::Timeout,
        }
    }
}

/// AI 服务错误，已区分可重试与不可重试
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("请求频率限制 ({endpoint})")]
    RateLimited { endpoint: String },

    #[error("网络请求失败 ({endpoint}): {message}")]
    Network { endpoint: String, message: String },

    #[error("服务端错误 ({endpoint}): status={status}")]
    ServerError { endpoint: String, status: u16 },

    #[error("请求被拒绝 ({endpoint}): status={status}, {message}")]
    Rejected {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("响应无法解析: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// 是否属于瞬时错误（限流、网络抖动、5xx）
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Network { .. }
                | ProviderError::ServerError { .. }
        )
    }
}

/// 资源存储错误
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("资源不存在: {0}")]
    NotFound(String),

    #[error("读取资源失败 ({reference}): {message}")]
    ReadFailed { reference: String, message: String },

    #[error("写入资源失败 ({reference}): {source}")]
    WriteFailed {
        reference: String,
        #[source]
        source: std::io::Error,
    },
}

/// 提交记录存储错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("提交记录不存在: {0}")]
    SubmissionNotFound(String),

    #[error("提交 {id} 的状态不能从 {from} 变为 {to}")]
    InvalidTransition { id: String, from: String, to: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },

    #[error("HTTP 客户端构建失败: {0}")]
    HttpClient(String),
}

/// 应用程序错误类型
///
/// 流水线自身的失败体现在 `PipelineResult` 中，这里只有协作者的错误
#[derive(Debug, Error)]
pub enum AppError {
    #[error("资源错误: {0}")]
    Asset(#[from] AssetError),

    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
}

// ========== 便捷构造函数 ==========

impl PipelineError {
    /// 创建参考图获取失败错误
    pub fn reference_not_found(
        image_name: impl Into<String>,
        source_kind: ImageSource,
        reason: impl Into<String>,
    ) -> Self {
        PipelineError::ReferenceImageNotFound {
            image_name: image_name.into(),
            source_kind,
            reason: reason.into(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
