//! 参考图解析服务 - 业务能力层
//!
//! 只负责"按来源取到参考图字节"，不关心流程

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::infrastructure::AssetStore;
use crate::models::{BlockOutputs, ImageSource, ReferenceImageSpec, ResolvedImage};

/// 参考图解析服务
///
/// 职责：
/// - 按声明顺序逐张解析
/// - 第一张失败即中止（fail-fast）
/// - 之前块的输出直接复用同一份缓冲区，不重复读取
pub struct ReferenceImageResolver {
    assets: Arc<dyn AssetStore>,
}

impl ReferenceImageResolver {
    pub fn new(assets: Arc<dyn AssetStore>) -> Self {
        Self { assets }
    }

    /// 解析一个块的全部参考图
    ///
    /// # 参数
    /// - `specs`: 块的参考图配置（任意存储顺序）
    /// - `capture_ref`: 本次提交的自拍引用
    /// - `outputs`: 本次运行中已产出的块输出
    ///
    /// # 返回
    /// 按声明顺序排列的参考图
    pub async fn resolve(
        &self,
        specs: &[ReferenceImageSpec],
        capture_ref: Option<&str>,
        outputs: &BlockOutputs,
    ) -> Result<Vec<ResolvedImage>, PipelineError> {
        let mut ordered: Vec<&ReferenceImageSpec> = specs.iter().collect();
        ordered.sort_by_key(|s| s.order);

        let mut resolved = Vec::with_capacity(ordered.len());
        for spec in ordered {
            let image = self.resolve_one(spec, capture_ref, outputs).await?;
            debug!(
                "✓ 参考图 {} ({}) 已解析: {} 字节",
                image.name,
                image.source,
                image.size()
            );
            resolved.push(image);
        }
        Ok(resolved)
    }

    async fn resolve_one(
        &self,
        spec: &ReferenceImageSpec,
        capture_ref: Option<&str>,
        outputs: &BlockOutputs,
    ) -> Result<ResolvedImage, PipelineError> {
        let data = match spec.source {
            ImageSource::ParticipantCapture => {
                let reference = capture_ref.ok_or_else(|| PipelineError::SelfieRequiredMissing {
                    image_name: spec.name.clone(),
                })?;
                self.fetch(spec, reference).await?
            }
            ImageSource::UploadedAsset | ImageSource::ExternalUrl => {
                let url = spec
                    .url
                    .as_deref()
                    .filter(|u| !u.trim().is_empty())
                    .ok_or_else(|| {
                        PipelineError::reference_not_found(&spec.name, spec.source, "未配置 URL")
                    })?;
                self.fetch(spec, url).await?
            }
            ImageSource::PriorBlockOutput => {
                let producer = spec.producer_block_id.as_deref().unwrap_or_default();
                outputs.get(producer).cloned().ok_or_else(|| {
                    PipelineError::reference_not_found(
                        &spec.name,
                        spec.source,
                        format!("块 {} 在本次运行中尚未产出图片", producer),
                    )
                })?
            }
        };

        Ok(ResolvedImage {
            name: spec.name.clone(),
            source: spec.source,
            data,
        })
    }

    /// 资源存储的任何失败都统一报告为"找不到"
    async fn fetch(
        &self,
        spec: &ReferenceImageSpec,
        reference: &str,
    ) -> Result<Arc<Vec<u8>>, PipelineError> {
        match self.assets.fetch(reference).await {
            Ok(bytes) => Ok(Arc::new(bytes)),
            Err(e) => {
                warn!("⚠️ 参考图 {} 读取失败: {}", spec.name, e);
                Err(PipelineError::reference_not_found(
                    &spec.name,
                    spec.source,
                    e.to_string(),
                ))
            }
        }
    }
}
