//! 流水线配置模型
//!
//! 配置由外部编辑器写入，执行期间只读。

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::PipelineError;

/// 一条完整的流水线定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub blocks: Vec<PipelineBlock>,
}

/// 流水线中的一个处理块
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineBlock {
    pub id: String,
    pub name: String,
    /// 声明顺序（升序执行）
    pub order: u32,
    #[serde(flatten)]
    pub config: BlockConfig,
}

/// 按块类型区分的配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockConfig {
    Preprocessing(PreprocessingConfig),
    Scoring(ScoringConfig),
    AiGeneration(GenerationConfig),
}

/// 预处理块（由上游完成，本引擎只做校验与记录）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    pub operation: String,
    #[serde(default)]
    pub params: toml::Table,
}

/// 问卷计分块
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub selected_questions: Vec<String>,
    #[serde(default)]
    pub mappings: Vec<QuestionMapping>,
    #[serde(default)]
    pub profiles: Vec<ScoringProfile>,
}

/// 计分档案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringProfile {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_style: String,
}

/// 题目 → (选项文本 → 档案 key)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionMapping {
    pub question_id: String,
    #[serde(default)]
    pub options: Vec<OptionMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionMapping {
    pub option_text: String,
    pub profile_key: String,
}

/// AI 生成块
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub model: String,
    pub prompt_template: String,
    #[serde(default)]
    pub reference_images: Vec<ReferenceImageSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

/// 参考图来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    /// 参与者自拍
    ParticipantCapture,
    /// 运营上传的素材
    UploadedAsset,
    /// 外部链接
    ExternalUrl,
    /// 之前某个块的输出
    PriorBlockOutput,
}

impl ImageSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageSource::ParticipantCapture => "participant_capture",
            ImageSource::UploadedAsset => "uploaded_asset",
            ImageSource::ExternalUrl => "external_url",
            ImageSource::PriorBlockOutput => "prior_block_output",
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 生成块上的一张具名参考图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceImageSpec {
    pub id: String,
    pub name: String,
    pub source: ImageSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer_block_id: Option<String>,
    /// 声明顺序（从 1 开始）
    pub order: u32,
}

impl PipelineBlock {
    pub fn as_scoring(&self) -> Option<&ScoringConfig> {
        match &self.config {
            BlockConfig::Scoring(cfg) => Some(cfg),
            _ => None,
        }
    }

    pub fn as_generation(&self) -> Option<&GenerationConfig> {
        match &self.config {
            BlockConfig::AiGeneration(cfg) => Some(cfg),
            _ => None,
        }
    }
}

impl ScoringConfig {
    /// 至少 2 个档案且至少选了 1 道题才算配置完成
    pub fn is_configured(&self) -> bool {
        self.profiles.len() >= 2 && !self.selected_questions.is_empty()
    }
}

impl PipelineDefinition {
    /// 所有计分块，按声明顺序升序
    pub fn scoring_blocks(&self) -> Vec<&PipelineBlock> {
        self.sorted_blocks(|b| b.as_scoring().is_some())
    }

    /// 所有生成块，按声明顺序升序
    pub fn generation_blocks(&self) -> Vec<&PipelineBlock> {
        self.sorted_blocks(|b| b.as_generation().is_some())
    }

    pub fn preprocessing_blocks(&self) -> Vec<&PipelineBlock> {
        self.sorted_blocks(|b| matches!(b.config, BlockConfig::Preprocessing(_)))
    }

    fn sorted_blocks(&self, keep: impl Fn(&PipelineBlock) -> bool) -> Vec<&PipelineBlock> {
        let mut blocks: Vec<&PipelineBlock> = self.blocks.iter().filter(|b| keep(b)).collect();
        blocks.sort_by_key(|b| b.order);
        blocks
    }

    /// 静态校验，在调用任何外部服务之前执行
    pub fn validate(&self) -> Result<(), PipelineError> {
        let generation = self.generation_blocks();
        if generation.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "流水线 {} 没有任何 AI 生成块",
                self.id
            )));
        }

        let mut capture_count = 0usize;

        for block in &generation {
            let Some(cfg) = block.as_generation() else {
                continue;
            };

            if cfg.model.trim().is_empty() {
                return Err(PipelineError::InvalidConfig(format!(
                    "生成块 {} 缺少模型标识",
                    block.id
                )));
            }
            if cfg.prompt_template.trim().is_empty() {
                return Err(PipelineError::InvalidConfig(format!(
                    "生成块 {} 缺少提示词模板",
                    block.id
                )));
            }

            let mut names = HashSet::new();
            for spec in &cfg.reference_images {
                if !names.insert(spec.name.to_lowercase()) {
                    return Err(PipelineError::InvalidConfig(format!(
                        "生成块 {} 中参考图名称重复: {}",
                        block.id, spec.name
                    )));
                }

                match spec.source {
                    ImageSource::ParticipantCapture => capture_count += 1,
                    ImageSource::PriorBlockOutput => self.check_producer(block, spec)?,
                    ImageSource::UploadedAsset | ImageSource::ExternalUrl => {}
                }
            }
        }

        if capture_count > 1 {
            return Err(PipelineError::InvalidConfig(format!(
                "每条流水线最多一张参与者自拍参考图，实际 {} 张",
                capture_count
            )));
        }

        Ok(())
    }

    /// 引用的生产块必须存在、是生成块，并且声明顺序严格在前
    fn check_producer(
        &self,
        consumer: &PipelineBlock,
        spec: &ReferenceImageSpec,
    ) -> Result<(), PipelineError> {
        let producer_id = spec.producer_block_id.as_deref().ok_or_else(|| {
            PipelineError::InvalidConfig(format!(
                "生成块 {} 的参考图 {} 未指定来源块",
                consumer.id, spec.name
            ))
        })?;

        let producer = self
            .blocks
            .iter()
            .find(|b| b.id == producer_id)
            .ok_or_else(|| {
                PipelineError::InvalidConfig(format!(
                    "参考图 {} 引用了不存在的块 {}",
                    spec.name, producer_id
                ))
            })?;

        if producer.as_generation().is_none() {
            return Err(PipelineError::InvalidConfig(format!(
                "参考图 {} 引用的块 {} 不是生成块",
                spec.name, producer_id
            )));
        }

        if producer.order >= consumer.order {
            return Err(PipelineError::InvalidConfig(format!(
                "参考图 {} 引用的块 {} (顺序 {}) 不在块 {} (顺序 {}) 之前",
                spec.name, producer_id, producer.order, consumer.id, consumer.order
            )));
        }

        Ok(())
    }
}
