//! 单条流水线处理器 - 编排层
//!
//! ## 职责
//!
//! 对一个提交执行整条流水线，是提交级别的编排器。
//!
//! ## 核心功能
//!
//! 1. **静态校验**：配置错误在任何外部调用之前返回
//! 2. **构建上下文**：参与者信息 + 答案
//! 3. **计分**：所有计分块先于任何生成块执行，胜出档案写入上下文
//! 4. **生成**：按声明顺序逐块执行，块边界检查时间预算，任一失败即中止
//! 5. **状态管理**：`process_submission` 负责 pending → processing → completed / failed

use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::clients::ProviderRegistry;
use crate::config::EngineSettings;
use crate::error::{AppResult, ErrorCode, PipelineError};
use crate::infrastructure::{AssetStore, SubmissionStore};
use crate::models::{
    BlockOutputs, PipelineDefinition, PipelineFailure, PipelineResult, Submission,
    SubmissionStatus,
};
use crate::services::{build_context, score_block};
use crate::workflow::{BlockCtx, BlockExecutor};

/// 流水线编排器
///
/// 所有协作者都通过构造函数注入，可被多个并发任务共享（`Arc<Self>`）
pub struct PipelineOrchestrator {
    submissions: Arc<dyn SubmissionStore>,
    assets: Arc<dyn AssetStore>,
    providers: Arc<ProviderRegistry>,
    executor: BlockExecutor,
    settings: EngineSettings,
}

impl PipelineOrchestrator {
    pub fn new(
        submissions: Arc<dyn SubmissionStore>,
        assets: Arc<dyn AssetStore>,
        providers: Arc<ProviderRegistry>,
        settings: EngineSettings,
    ) -> Self {
        let executor = BlockExecutor::new(assets.clone(), providers.clone(), settings.retry);
        Self {
            submissions,
            assets,
            providers,
            executor,
            settings,
        }
    }

    pub fn with_verbose_logging(mut self, verbose: bool) -> Self {
        self.executor = self.executor.with_verbose_logging(verbose);
        self
    }

    /// 对一个提交执行流水线，不读写提交记录
    ///
    /// 永不返回错误：所有失败都体现在 `PipelineResult` 中
    pub async fn execute(
        &self,
        pipeline: &PipelineDefinition,
        submission: &Submission,
    ) -> PipelineResult {
        let started_at = Local::now();
        let clock = Instant::now();
        let tag = format!("[提交 {}]", submission.id);

        // ========== 1. 静态校验 ==========
        if let Err(err) = pipeline.validate().and_then(|_| self.check_models(pipeline)) {
            error!("{} ❌ 流水线配置无效: {}", tag, err);
            return PipelineResult::failure((&err).into(), Vec::new(), clock.elapsed(), started_at);
        }

        info!(
            "{} 🚀 开始执行流水线 {} ({} 个块)",
            tag,
            pipeline.name,
            pipeline.blocks.len()
        );

        // ========== 2. 构建上下文 ==========
        let mut ctx = build_context(submission);
        debug!("{} 上下文变量: {:?}", tag, ctx.keys().collect::<Vec<_>>());

        // ========== 3. 计分 ==========
        for block in pipeline.scoring_blocks() {
            if let Some(outcome) = score_block(block, submission) {
                outcome.enrich(&mut ctx);
            }
        }

        for block in pipeline.preprocessing_blocks() {
            debug!("{} 预处理块 {} 由上游完成，跳过", tag, block.name);
        }

        // ========== 4. 生成 ==========
        let mut outputs = BlockOutputs::new();
        let mut results = Vec::new();

        for block in pipeline.generation_blocks() {
            if let Err(err) = self.check_budget(clock) {
                warn!("{} ⏱️ {}，停止执行", tag, err);
                return PipelineResult::failure((&err).into(), results, clock.elapsed(), started_at);
            }

            let run_ctx = BlockCtx::new(&submission.id, block);
            let result = self
                .executor
                .run(
                    block,
                    &ctx,
                    submission.capture_ref.as_deref(),
                    &mut outputs,
                    &run_ctx,
                )
                .await;

            // 超出预算的块结果直接丢弃
            if let Err(err) = self.check_budget(clock) {
                warn!("{} ⏱️ {}，丢弃块 {} 的结果", tag, err, block.id);
                return PipelineResult::failure((&err).into(), results, clock.elapsed(), started_at);
            }

            if !result.success {
                let failure = result.error.clone().unwrap_or_else(|| PipelineFailure {
                    code: ErrorCode::ApiError,
                    message: format!("块 {} 执行失败", block.id),
                });
                results.push(result);
                error!("{} ❌ 流水线在块 {} 中止: {}", tag, block.id, failure.message);
                return PipelineResult::failure(failure, results, clock.elapsed(), started_at);
            }

            results.push(result);
        }

        // ========== 5. 汇总 ==========
        let result = PipelineResult::completed(results, clock.elapsed(), started_at);
        info!(
            "{} ✅ 流水线完成，共 {} 个生成块，耗时 {:?}",
            tag,
            result.block_results.len(),
            result.elapsed
        );
        result
    }

    /// 读取提交记录、执行流水线并回写状态
    pub async fn process_submission(
        &self,
        pipeline: &PipelineDefinition,
        submission_id: &str,
    ) -> AppResult<PipelineResult> {
        let submission = self.submissions.get(submission_id).await?;
        self.submissions
            .update_status(submission_id, SubmissionStatus::Processing)
            .await?;

        let result = self.execute(pipeline, &submission).await;

        if let Some(failure) = &result.error {
            self.submissions
                .fail(submission_id, failure.code, &failure.message)
                .await?;
            return Ok(result);
        }

        let output_ref = match &result.final_image {
            Some(image) => {
                let key = format!("outputs/{}.png", submission_id);
                match self.assets.store(&key, image).await {
                    Ok(reference) => Some(reference),
                    Err(e) => {
                        error!("[提交 {}] ❌ 最终图片保存失败: {}", submission_id, e);
                        self.submissions
                            .fail(submission_id, ErrorCode::ApiError, &e.to_string())
                            .await?;
                        return Err(e.into());
                    }
                }
            }
            None => None,
        };

        info!(
            "[提交 {}] 💾 最终输出: {}",
            submission_id,
            output_ref.as_deref().unwrap_or("(无)")
        );
        self.submissions.complete(submission_id, output_ref).await?;
        Ok(result)
    }

    /// 每个生成块的模型都必须有已注册的适配器
    fn check_models(&self, pipeline: &PipelineDefinition) -> Result<(), PipelineError> {
        for block in pipeline.generation_blocks() {
            let Some(cfg) = block.as_generation() else {
                continue;
            };
            if self.providers.get(&cfg.model).is_none() {
                return Err(PipelineError::InvalidConfig(format!(
                    "生成块 {} 使用了不支持的模型: {}",
                    block.id, cfg.model
                )));
            }
        }
        Ok(())
    }

    fn check_budget(&self, clock: Instant) -> Result<(), PipelineError> {
        let elapsed = clock.elapsed();
        let budget: Duration = self.settings.pipeline_timeout;
        if elapsed > budget {
            return Err(PipelineError::Timeout { elapsed, budget });
        }
        Ok(())
    }
}
