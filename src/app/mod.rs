// ==========================================
// 采购撮合运营平台 - 应用层
// ==========================================
// 职责: 组装仓储与 API，供二进制入口和外部宿主使用
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
