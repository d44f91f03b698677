//! 批量提交处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量提交的处理和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：根据配置创建资源存储、图像适配器和提交存储
//! 2. **批量加载**：读取流水线定义，扫描并加载所有待处理的提交
//! 3. **并发控制**：使用 Semaphore 限制同时执行的流水线数量
//! 4. **分批处理**：将提交分批次处理，每批完成后再开始下一批
//! 5. **结果报告**：每个提交的结果摘要写入输出目录
//! 6. **全局统计**：按提交存储中的最终状态汇总

use anyhow::{Context, Result};
use futures::future::join_all;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::clients::ProviderRegistry;
use crate::config::Config;
use crate::infrastructure::{InMemorySubmissionStore, LocalAssetStore};
use crate::models::{load_all_submissions, load_pipeline, PipelineDefinition, PipelineResult, SubmissionStatus};
use crate::orchestrator::PipelineOrchestrator;
use crate::utils::logging;

/// 应用主结构
pub struct App {
    config: Config,
    submissions: Arc<InMemorySubmissionStore>,
    orchestrator: Arc<PipelineOrchestrator>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        logging::log_startup(&config);

        if config.image_api_key.is_empty() {
            warn!("⚠️ 未设置 IMAGE_API_KEY，图像服务调用可能被拒绝");
        }

        let assets = Arc::new(LocalAssetStore::new(
            &config.asset_root,
            Duration::from_secs(config.request_timeout_secs),
        )?);
        let providers = Arc::new(ProviderRegistry::from_config(&config)?);
        let submissions = Arc::new(InMemorySubmissionStore::new());

        let orchestrator = PipelineOrchestrator::new(
            submissions.clone(),
            assets,
            providers,
            config.engine_settings(),
        )
        .with_verbose_logging(config.verbose_logging);

        Ok(Self {
            config,
            submissions,
            orchestrator: Arc::new(orchestrator),
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        let pipeline = Arc::new(self.load_pipeline().await?);

        info!("\n📁 正在扫描待处理的提交...");
        let all_submissions = load_all_submissions(&self.config.submissions_folder).await?;

        if all_submissions.is_empty() {
            warn!("⚠️ 没有找到待处理的TOML文件，程序结束");
            return Ok(());
        }

        let mut ids = Vec::with_capacity(all_submissions.len());
        for submission in all_submissions {
            ids.push(submission.id.clone());
            self.submissions.insert(submission).await;
        }

        tokio::fs::create_dir_all(&self.config.output_folder)
            .await
            .with_context(|| format!("无法创建输出目录: {}", self.config.output_folder))?;

        logging::log_submissions_loaded(ids.len(), self.config.max_concurrent_submissions);

        self.process_all_submissions(&pipeline, &ids).await?;

        // 以存储中的最终状态为准
        let records = self.submissions.all().await;
        let success = records
            .iter()
            .filter(|s| s.status == SubmissionStatus::Completed)
            .count();
        let failed = records
            .iter()
            .filter(|s| s.status == SubmissionStatus::Failed)
            .count();
        logging::print_final_stats(success, failed, records.len(), &self.config.output_folder);

        Ok(())
    }

    /// 加载流水线定义
    async fn load_pipeline(&self) -> Result<PipelineDefinition> {
        info!("\n📐 正在加载流水线: {}", self.config.pipeline_file);
        let pipeline = load_pipeline(Path::new(&self.config.pipeline_file)).await?;
        info!(
            "✓ 流水线 {} 包含 {} 个块 (计分 {} / 生成 {})",
            pipeline.name,
            pipeline.blocks.len(),
            pipeline.scoring_blocks().len(),
            pipeline.generation_blocks().len()
        );
        if let Err(e) = pipeline.validate() {
            warn!("⚠️ 流水线配置无效，所有提交都将失败: {}", e);
        }
        Ok(pipeline)
    }

    /// 处理所有提交
    async fn process_all_submissions(
        &self,
        pipeline: &Arc<PipelineDefinition>,
        ids: &[String],
    ) -> Result<()> {
        let max_concurrent = self.config.max_concurrent_submissions.max(1);
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let total = ids.len();
        let total_batches = total.div_ceil(max_concurrent);

        // 分批处理
        for batch_start in (0..total).step_by(max_concurrent) {
            let batch_end = (batch_start + max_concurrent).min(total);
            let batch_num = batch_start / max_concurrent + 1;

            logging::log_batch_start(batch_num, total_batches, batch_start + 1, batch_end, total);

            let success = self
                .process_batch(pipeline, &ids[batch_start..batch_end], semaphore.clone())
                .await?;

            logging::log_batch_complete(batch_num, success, batch_end - batch_start);
        }

        Ok(())
    }

    /// 处理单个批次，返回成功数量
    async fn process_batch(
        &self,
        pipeline: &Arc<PipelineDefinition>,
        batch_ids: &[String],
        semaphore: Arc<Semaphore>,
    ) -> Result<usize> {
        let mut handles = Vec::with_capacity(batch_ids.len());

        for id in batch_ids {
            let permit = semaphore.clone().acquire_owned().await?;
            let orchestrator = self.orchestrator.clone();
            let pipeline = pipeline.clone();
            let output_folder = self.config.output_folder.clone();
            let id = id.clone();

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let result = orchestrator.process_submission(&pipeline, &id).await?;
                write_report(&output_folder, &id, &result).await?;
                Ok::<bool, anyhow::Error>(result.success)
            });
            handles.push(handle);
        }

        // 等待本批所有任务完成
        let outcomes = join_all(handles).await;
        let mut success = 0;
        for (id, outcome) in batch_ids.iter().zip(outcomes) {
            match outcome {
                Ok(Ok(true)) => success += 1,
                Ok(Ok(false)) => {}
                Ok(Err(e)) => error!("[提交 {}] ❌ 处理过程中发生错误: {:#}", id, e),
                Err(e) => error!("[提交 {}] 任务执行失败: {}", id, e),
            }
        }

        Ok(success)
    }
}

/// 把一次执行的摘要写成 `{output_folder}/{id}.json`
async fn write_report(output_folder: &str, id: &str, result: &PipelineResult) -> Result<()> {
    let report = json!({
        "submission_id": id,
        "error_code": result.error_code(),
        "result": result.summary(),
    });
    let path = Path::new(output_folder).join(format!("{}.json", id));
    let content = serde_json::to_string_pretty(&report)?;
    tokio::fs::write(&path, content)
        .await
        .with_context(|| format!("无法写入结果报告: {}", path.display()))?;
    Ok(())
}
