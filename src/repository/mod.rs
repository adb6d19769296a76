// ==========================================
// 采购撮合运营平台 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod action_log_repo;
pub mod error;
pub mod handoff_repo;
pub mod payout_repo;
pub mod quote_repo;

// 重导出核心仓储
pub use action_log_repo::ActionLogRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use handoff_repo::HandoffRepository;
pub use payout_repo::PayoutRequestRepository;
pub use quote_repo::QuoteRepository;
