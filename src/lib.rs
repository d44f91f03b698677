//! # Image Pipeline
//!
//! 一个按问卷结果个性化生成图片的流水线执行引擎
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构：
//!
//! ### ① 基础设施层（Infrastructure / Clients）
//! - `infrastructure/` - 持有文件系统、HTTP 连接和提交记录，只暴露能力
//! - `AssetStore` - 按引用读写图片字节
//! - `SubmissionStore` - 提交记录与状态机
//! - `clients/` - `ImageProvider` 适配器与按模型选择的 `ProviderRegistry`
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心流程
//! - `build_context` - 由提交构建上下文变量
//! - `score_block` - 问卷计分，选出胜出档案
//! - `render_prompt` - 提示词变量替换
//! - `ReferenceImageResolver` - 按来源解析参考图
//! - `RetryPolicy` - 指数退避重试
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个生成块"的完整处理流程
//! - `BlockCtx` - 上下文封装（提交 id + 块 id）
//! - `BlockExecutor` - 流程编排（resolve → render → generate/edit）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量提交处理器，管理资源和并发
//! - `orchestrator/pipeline_processor` - 单条流水线处理器，校验、计分、按序执行生成块
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{ImageProvider, ProviderRegistry};
pub use config::{Config, EngineSettings};
pub use error::{AppError, AppResult, ErrorCode, PipelineError};
pub use infrastructure::{AssetStore, SubmissionStore};
pub use models::{PipelineDefinition, PipelineResult, Submission};
pub use orchestrator::{App, PipelineOrchestrator};
pub use workflow::{BlockCtx, BlockExecutor};
