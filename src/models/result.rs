use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::block::ImageSource;
use crate::error::{ErrorCode, PipelineError};

/// 图片字节，块之间共享同一份分配
pub type ImageBuffer = Arc<Vec<u8>>;

/// 本次运行中已产出的块输出（块 id → 图片）
pub type BlockOutputs = HashMap<String, ImageBuffer>;

/// 结构化错误（错误码 + 描述）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineFailure {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&PipelineError> for PipelineFailure {
    fn from(err: &PipelineError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// 参考图的观测信息
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceSummary {
    pub name: String,
    pub source: ImageSource,
    pub size: usize,
}

/// 已解析的参考图，按声明顺序排列
#[derive(Debug, Clone)]
pub struct ResolvedImage {
    pub name: String,
    pub source: ImageSource,
    pub data: ImageBuffer,
}

impl ResolvedImage {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn summary(&self) -> ReferenceSummary {
        ReferenceSummary {
            name: self.name.clone(),
            source: self.source,
            size: self.size(),
        }
    }
}

/// 单个块的执行结果
#[derive(Debug, Clone)]
pub struct BlockResult {
    pub block_id: String,
    pub success: bool,
    pub image: Option<ImageBuffer>,
    pub prompt: Option<String>,
    pub error: Option<PipelineFailure>,
    pub references: Vec<ReferenceSummary>,
    pub elapsed: Duration,
}

impl BlockResult {
    pub fn succeeded(
        block_id: impl Into<String>,
        image: ImageBuffer,
        prompt: String,
        references: Vec<ReferenceSummary>,
        elapsed: Duration,
    ) -> Self {
        Self {
            block_id: block_id.into(),
            success: true,
            image: Some(image),
            prompt: Some(prompt),
            error: None,
            references,
            elapsed,
        }
    }

    pub fn failed(block_id: impl Into<String>, err: &PipelineError, elapsed: Duration) -> Self {
        Self {
            block_id: block_id.into(),
            success: false,
            image: None,
            prompt: None,
            error: Some(err.into()),
            references: Vec::new(),
            elapsed,
        }
    }

    /// 渲染出的提示词（即使调用失败也保留，便于排查）
    pub fn with_prompt(mut self, prompt: String) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn summary(&self) -> JsonValue {
        json!({
            "block_id": self.block_id,
            "success": self.success,
            "image_size": self.image.as_ref().map(|b| b.len()),
            "prompt": self.prompt,
            "error": self.error,
            "references": self.references,
            "elapsed_ms": self.elapsed.as_millis() as u64,
        })
    }
}

/// 整条流水线的执行结果
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub success: bool,
    pub final_image: Option<ImageBuffer>,
    pub final_prompt: Option<String>,
    pub error: Option<PipelineFailure>,
    pub block_results: Vec<BlockResult>,
    pub elapsed: Duration,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl PipelineResult {
    pub fn failure(
        failure: PipelineFailure,
        block_results: Vec<BlockResult>,
        elapsed: Duration,
        started_at: DateTime<Local>,
    ) -> Self {
        Self {
            success: false,
            final_image: None,
            final_prompt: None,
            error: Some(failure),
            block_results,
            elapsed,
            started_at,
            finished_at: Local::now(),
        }
    }

    /// 全部成功：最终输出取最后一个带图片的块
    pub fn completed(
        block_results: Vec<BlockResult>,
        elapsed: Duration,
        started_at: DateTime<Local>,
    ) -> Self {
        let last = block_results.iter().rev().find(|r| r.image.is_some());
        Self {
            success: true,
            final_image: last.and_then(|r| r.image.clone()),
            final_prompt: last.and_then(|r| r.prompt.clone()),
            error: None,
            block_results,
            elapsed,
            started_at,
            finished_at: Local::now(),
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }

    pub fn summary(&self) -> JsonValue {
        json!({
            "success": self.success,
            "final_prompt": self.final_prompt,
            "final_image_size": self.final_image.as_ref().map(|b| b.len()),
            "error": self.error,
            "blocks": self.block_results.iter().map(BlockResult::summary).collect::<Vec<_>>(),
            "elapsed_ms": self.elapsed.as_millis() as u64,
            "started_at": self.started_at.to_rfc3339(),
            "finished_at": self.finished_at.to_rfc3339(),
        })
    }
}
