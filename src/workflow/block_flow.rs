//! 生成块执行流程 - 流程层
//!
//! 核心职责：定义"一个 AI 生成块"的完整处理流程
//!
//! 流程顺序：
//! 1. 按模型标识选择适配器（在任何外部调用之前）
//! 2. 解析参考图
//! 3. 渲染提示词（先参考图名称，再上下文变量）
//! 4. 有参考图走 edit，否则走 generate；在重试策略下调用，成功后把图片写入本次运行的输出表

use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::clients::{EditRequest, GenerateRequest, ImageProvider, ProviderRegistry};
use crate::error::{PipelineError, ProviderError};
use crate::infrastructure::AssetStore;
use crate::models::{
    BlockConfig, BlockOutputs, BlockResult, ExecutionContext, GenerationConfig, PipelineBlock,
    ResolvedImage,
};
use crate::services::{render_prompt, ReferenceImageResolver, RetryPolicy};
use crate::utils::logging::truncate_text;
use crate::workflow::block_ctx::BlockCtx;

/// 一次 AI 调用
enum Dispatch {
    Generate(GenerateRequest),
    Edit(EditRequest),
}

/// 生成块执行器
///
/// - 不持有任何运行状态，上下文和输出表由编排层传入
/// - 任何失败都转成失败的 `BlockResult`，不向外返回错误
pub struct BlockExecutor {
    resolver: ReferenceImageResolver,
    providers: Arc<ProviderRegistry>,
    retry: RetryPolicy,
    verbose_logging: bool,
}

impl BlockExecutor {
    /// 创建新的块执行器
    pub fn new(
        assets: Arc<dyn AssetStore>,
        providers: Arc<ProviderRegistry>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            resolver: ReferenceImageResolver::new(assets),
            providers,
            retry,
            verbose_logging: false,
        }
    }

    pub fn with_verbose_logging(mut self, verbose: bool) -> Self {
        self.verbose_logging = verbose;
        self
    }

    pub async fn run(
        &self,
        block: &PipelineBlock,
        ctx: &ExecutionContext,
        capture_ref: Option<&str>,
        outputs: &mut BlockOutputs,
        run_ctx: &BlockCtx,
    ) -> BlockResult {
        let started = Instant::now();

        let cfg = match &block.config {
            BlockConfig::AiGeneration(cfg) => cfg,
            BlockConfig::Scoring(_) | BlockConfig::Preprocessing(_) => {
                let err = PipelineError::InvalidConfig(format!("块 {} 不是 AI 生成块", block.id));
                return self.fail(run_ctx, &err, started);
            }
        };

        info!("{} 🎨 开始执行生成块 (模型: {})", run_ctx, cfg.model);

        // ========== 1. 选择适配器 ==========
        let Some(provider) = self.providers.get(&cfg.model) else {
            let err = PipelineError::InvalidConfig(format!("不支持的模型: {}", cfg.model));
            return self.fail(run_ctx, &err, started);
        };

        // ========== 2. 解析参考图 ==========
        let images = match self
            .resolver
            .resolve(&cfg.reference_images, capture_ref, outputs)
            .await
        {
            Ok(images) => images,
            Err(err) => return self.fail(run_ctx, &err, started),
        };
        if !images.is_empty() {
            info!("{} ✓ 已解析 {} 张参考图", run_ctx, images.len());
        }

        // ========== 3. 渲染提示词 ==========
        let rendered = render_prompt(&cfg.prompt_template, &cfg.reference_images, ctx);
        if !rendered.unresolved.is_empty() {
            info!(
                "{} 提示词中有 {} 个变量未解析，已置空",
                run_ctx,
                rendered.unresolved.len()
            );
        }
        self.log_prompt(run_ctx, &rendered.text);
        let prompt = rendered.text;

        // ========== 4. 调用（带重试） ==========
        let references = images.iter().map(ResolvedImage::summary).collect();
        let dispatch = build_dispatch(cfg, &prompt, images);

        match self.call_provider(&provider, &dispatch, run_ctx).await {
            Ok(bytes) => {
                let buffer = Arc::new(bytes);
                outputs.insert(block.id.clone(), buffer.clone());
                info!(
                    "{} ✅ 生成成功: {} 字节, 耗时 {:?}",
                    run_ctx,
                    buffer.len(),
                    started.elapsed()
                );
                BlockResult::succeeded(&block.id, buffer, prompt, references, started.elapsed())
            }
            Err(source) => {
                let err = PipelineError::Api {
                    model: cfg.model.clone(),
                    source,
                };
                let mut result = self.fail(run_ctx, &err, started).with_prompt(prompt);
                result.references = references;
                result
            }
        }
    }

    async fn call_provider(
        &self,
        provider: &Arc<dyn ImageProvider>,
        dispatch: &Dispatch,
        run_ctx: &BlockCtx,
    ) -> Result<Vec<u8>, ProviderError> {
        let label = format!("{} {} 调用", run_ctx, provider.provider_name());

        let bytes = self
            .retry
            .run(
                &label,
                move |attempt| async move {
                    debug!("第 {} 次调用图像服务", attempt);
                    match dispatch {
                        Dispatch::Generate(request) => provider.generate(request).await,
                        Dispatch::Edit(request) => provider.edit(request).await,
                    }
                },
                ProviderError::is_transient,
            )
            .await?;

        if bytes.is_empty() {
            return Err(ProviderError::InvalidResponse("图像服务返回了空图片".into()));
        }
        Ok(bytes)
    }

    fn fail(&self, run_ctx: &BlockCtx, err: &PipelineError, started: Instant) -> BlockResult {
        error!("{} ❌ [{}] {}", run_ctx, err.code(), err);
        BlockResult::failed(&run_ctx.block_id, err, started.elapsed())
    }

    fn log_prompt(&self, run_ctx: &BlockCtx, prompt: &str) {
        if self.verbose_logging {
            info!("{} 提示词: {}", run_ctx, prompt);
        } else {
            debug!("{} 提示词: {}", run_ctx, truncate_text(prompt, 80));
        }
    }
}

fn build_dispatch(cfg: &GenerationConfig, prompt: &str, images: Vec<ResolvedImage>) -> Dispatch {
    if images.is_empty() {
        Dispatch::Generate(GenerateRequest {
            model: cfg.model.clone(),
            prompt: prompt.to_string(),
            size: cfg.size.clone(),
        })
    } else {
        Dispatch::Edit(EditRequest {
            model: cfg.model.clone(),
            prompt: prompt.to_string(),
            size: cfg.size.clone(),
            images,
        })
    }
}
