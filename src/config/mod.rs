// ==========================================
// 采购撮合运营平台 - 配置层
// ==========================================
// 职责: 费率/比例/提现门槛等运行时配置
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod rate_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use rate_config_trait::{ConfigResult, RateConfigReader};
