//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量提交处理器
//! - 管理应用生命周期（初始化、运行）
//! - 加载流水线定义与全部提交
//! - 控制并发数量（Semaphore）
//! - 写出结果报告，输出全局统计信息
//!
//! ### `pipeline_processor` - 单条流水线处理器
//! - 校验流水线、构建上下文、执行计分块
//! - 按顺序调度生成块（BlockExecutor），块边界检查时间预算
//! - 回写提交状态与最终输出
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<Submission>)
//!     ↓
//! pipeline_processor (处理 Vec<PipelineBlock>)
//!     ↓
//! workflow::BlockExecutor (处理单个生成块)
//!     ↓
//! services (能力层：context / scoring / substitution / resolver / retry)
//!     ↓
//! infrastructure + clients (AssetStore / SubmissionStore / ImageProvider)
//! ```

pub mod batch_processor;
pub mod pipeline_processor;

// 重新导出主要类型
pub use batch_processor::App;
pub use pipeline_processor::PipelineOrchestrator;
