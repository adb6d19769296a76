// ==========================================
// 采购撮合运营平台 - 命令行入口
// ==========================================
// 用法: sourcing-ops [db_path]
// 环境变量: SOURCING_OPS_LOG_FORMAT=json 输出 JSON 行日志
// 职责: 初始化日志、建库、补齐默认配置，输出项目状态概览
// ==========================================

use anyhow::Context;
use sourcing_ops::app::{get_default_db_path, AppState};
use sourcing_ops::HandoffStatus;

fn main() -> anyhow::Result<()> {
    match std::env::var("SOURCING_OPS_LOG_FORMAT").as_deref() {
        Ok("json") => sourcing_ops::logging::init_json(),
        _ => sourcing_ops::logging::init(),
    }

    tracing::info!("==================================================");
    tracing::info!("{} v{}", sourcing_ops::SYSTEM_NAME, sourcing_ops::VERSION);
    tracing::info!("==================================================");

    let db_path = std::env::args()
        .nth(1)
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(get_default_db_path);
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path.clone())
        .map_err(|e| anyhow::anyhow!("无法初始化AppState: {}", e))?;

    let counts = state
        .handoff_repo
        .count_by_status()
        .context("统计项目状态失败")?;

    println!("{} ({})", sourcing_ops::SYSTEM_NAME, db_path);
    let mut total = 0;
    for status in HandoffStatus::ALL {
        let n = counts.get(status.as_str()).copied().unwrap_or(0);
        total += n;
        println!("  {:<20} {}", status.as_str(), n);
    }
    println!("  {:<20} {}", "total", total);

    Ok(())
}
