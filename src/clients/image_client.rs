//! 图像生成 API 客户端
//!
//! 封装所有与 AI 图像服务相关的调用逻辑
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{ConfigError, ProviderError};
use crate::models::ResolvedImage;

/// 纯文本生成请求
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub size: Option<String>,
}

/// 带参考图的编辑请求
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub model: String,
    pub prompt: String,
    pub size: Option<String>,
    pub images: Vec<ResolvedImage>,
}

/// 图像服务适配器
///
/// 错误必须已区分瞬时（可重试）与永久
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    /// 根据文本生成一张图
    async fn generate(&self, request: &GenerateRequest) -> Result<Vec<u8>, ProviderError>;

    /// 根据参考图 + 文本生成一张图
    async fn edit(&self, request: &EditRequest) -> Result<Vec<u8>, ProviderError>;
}

/// OpenAI 兼容的图像客户端（`/images/generations` 与 `/images/edits`）
pub struct OpenAiImageClient {
    http: reqwest::Client,
    api_base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    b64_json: Option<String>,
    url: Option<String>,
}

impl OpenAiImageClient {
    /// 创建新的图像客户端
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        Self::with_endpoint(
            &config.image_api_base_url,
            &config.image_api_key,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// 创建自定义端点的图像客户端
    pub fn with_endpoint(
        api_base_url: &str,
        api_key: &str,
        request_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self {
            http,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn post_images(&self, path: &str, body: JsonValue) -> Result<Vec<u8>, ProviderError> {
        let endpoint = format!("{}/{}", self.api_base_url, path);
        debug!("调用图像 API: {}", endpoint);

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_send_error(&endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("图像 API 返回错误 ({}): {}", status, message);
            return Err(classify_status(&endpoint, status.as_u16(), message));
        }

        let parsed: ImagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let first = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("图像 API 返回结果为空".into()))?;

        match (first.b64_json, first.url) {
            (Some(b64), _) => BASE64
                .decode(b64.trim())
                .map_err(|e| ProviderError::InvalidResponse(format!("base64 解码失败: {}", e))),
            (None, Some(url)) => self.download(&url).await,
            (None, None) => Err(ProviderError::InvalidResponse(
                "图像 API 既没有返回 b64_json 也没有返回 url".into(),
            )),
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| map_send_error(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(url, status.as_u16(), String::new()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| map_send_error(url, e))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ImageProvider for OpenAiImageClient {
    fn provider_name(&self) -> &str {
        "openai-compatible"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Vec<u8>, ProviderError> {
        let mut body = json!({
            "model": request.model,
            "prompt": request.prompt,
            "n": 1,
        });
        if let Some(size) = &request.size {
            body["size"] = json!(size);
        }
        self.post_images("images/generations", body).await
    }

    async fn edit(&self, request: &EditRequest) -> Result<Vec<u8>, ProviderError> {
        let images: Vec<JsonValue> = request
            .images
            .iter()
            .map(|img| json!({ "image_url": to_data_url(&img.data) }))
            .collect();

        debug!("编辑请求包含 {} 张参考图", images.len());

        let mut body = json!({
            "model": request.model,
            "prompt": request.prompt,
            "images": images,
            "n": 1,
        });
        if let Some(size) = &request.size {
            body["size"] = json!(size);
        }
        self.post_images("images/edits", body).await
    }
}

/// 把 HTTP 状态码映射为瞬时 / 永久错误
fn classify_status(endpoint: &str, status: u16, message: String) -> ProviderError {
    match status {
        429 => ProviderError::RateLimited {
            endpoint: endpoint.to_string(),
        },
        500..=599 => ProviderError::ServerError {
            endpoint: endpoint.to_string(),
            status,
        },
        _ => ProviderError::Rejected {
            endpoint: endpoint.to_string(),
            status,
            message,
        },
    }
}

fn map_send_error(endpoint: &str, error: reqwest::Error) -> ProviderError {
    if let Some(status) = error.status() {
        return classify_status(endpoint, status.as_u16(), error.to_string());
    }
    ProviderError::Network {
        endpoint: endpoint.to_string(),
        message: error.to_string(),
    }
}

/// 根据魔数推断图片 MIME 类型
fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "application/octet-stream"
    }
}

fn to_data_url(bytes: &[u8]) -> String {
    format!("data:{};base64,{}", sniff_mime(bytes), BASE64.encode(bytes))
}
