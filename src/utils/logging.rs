/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

/// 初始化全局日志
///
/// `RUST_LOG` 优先；未设置时按 `verbose` 选择 debug 或 info
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("image_pipeline={},warn", default_level)));

    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 并发流水线执行模式");
    info!("📊 最大并发数: {}", config.max_concurrent_submissions);
    info!("⏱️ 单条流水线时间预算: {} 秒", config.pipeline_timeout_secs);
    info!("🔁 AI 调用最多尝试 {} 次", config.retry_max_attempts);
    info!("🤖 已配置模型: {}", config.image_models.join(", "));
    info!("{}", "=".repeat(60));
}

/// 记录提交加载信息
///
/// # 参数
/// - `total`: 提交总数
/// - `max_concurrent`: 最大并发数
pub fn log_submissions_loaded(total: usize, max_concurrent: usize) {
    info!("✓ 找到 {} 个待处理的提交", total);
    info!("📋 将以每批 {} 个的方式处理", max_concurrent);
    info!("💡 每批完成后再开始下一批\n");
}

/// 记录批次开始信息
pub fn log_batch_start(
    batch_num: usize,
    total_batches: usize,
    start: usize,
    end: usize,
    total: usize,
) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始处理第 {}/{} 批", batch_num, total_batches);
    info!("📄 本批提交: {}-{} / 共 {} 个", start, end, total);
    info!("{}", "=".repeat(60));
}

pub fn log_batch_complete(batch_num: usize, success: usize, total: usize) {
    info!("\n{}", "─".repeat(60));
    info!("✓ 第 {} 批完成: 成功 {}/{}", batch_num, success, total);
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
///
/// # 参数
/// - `success`: 成功数量
/// - `failed`: 失败数量
/// - `total`: 总数
/// - `output_folder`: 结果报告目录
pub fn print_final_stats(success: usize, failed: usize, total: usize, output_folder: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", success, total);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
    info!("\n结果报告已保存至: {}", output_folder);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
