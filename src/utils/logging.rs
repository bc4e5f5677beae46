use anyhow::Result;
/// 日志工具模块
///
/// 提供日志初始化、会话日志文件和输出辅助函数
use std::fs::{self, OpenOptions};
use std::io::Write;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, ProctorConfig};
use crate::workflow::SessionSnapshot;

/// 初始化 tracing 订阅者
///
/// `RUST_LOG` 优先；未设置时按 `verbose` 选择 debug 或 info。
/// 日志写到 stderr，stdout 留给答题界面。重复调用时静默忽略。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n监考会话日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config, proctor: &ProctorConfig) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 监考答题模式");
    info!("📄 试卷文件: {}", config.quiz_file);
    info!(
        "⏱️ 检测周期 {:?}，违规阈值 {} 次",
        proctor.detection_period, proctor.violation_threshold
    );
    info!("{}", "=".repeat(60));
}

/// 会话结束摘要
pub fn format_session_summary(quiz_code: &str, snapshot: &SessionSnapshot) -> String {
    let mut lines = vec![
        "=".repeat(60),
        format!("试卷: {}", quiz_code),
        format!(
            "结束时间: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ),
        format!("最终状态: {}", snapshot.state),
        format!("作答: {}/{}", snapshot.answered, snapshot.total),
        format!(
            "违规: {}/{}",
            snapshot.violations.count, snapshot.violation_threshold
        ),
    ];
    if let Some(reason) = &snapshot.violations.reason {
        lines.push(format!("最后一次违规: {}", reason));
    }
    if let Some(score) = snapshot.score {
        lines.push(format!("得分: {}", score));
    }
    lines.push("=".repeat(60));
    lines.join("\n")
}

/// 打印会话摘要并追加到日志文件
pub fn log_session_summary(quiz_code: &str, snapshot: &SessionSnapshot, log_file_path: &str) -> Result<()> {
    let summary = format_session_summary(quiz_code, snapshot);
    for line in summary.lines() {
        info!("{}", line);
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)?;
    writeln!(file, "{}", summary)?;
    info!("\n日志已保存至: {}", log_file_path);
    Ok(())
}

/// 截断长文本用于日志显示
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
