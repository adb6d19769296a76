// ==========================================
// 采购撮合运营平台 - 核心库
// ==========================================
// 范围: 认领协调 / 项目生命周期 / 报价引擎 / 佣金台账
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 费率与提现配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/schema）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    AgentIdentity, ClaimOutcome, HandoffStatus, PaymentPurpose, PayoutStatus, ShippingRateUnit,
};

// 领域实体
pub use domain::{
    ActionLog, ActionType, EarningsSnapshot, Handoff, ManufacturerDetails, PayoutRequest, Quote,
    QuoteItem, QuoteTotals, RateConfig, StatusExtraFields,
};

// 引擎
pub use engine::{
    DraftContext, DraftSnapshot, DraftStash, LedgerCalculator, LifecycleMachine,
    NotificationDispatcher, OpsEvent, QuoteCalculator, QuoteDraft,
};

// API
pub use api::{ApiError, ApiResult, ClaimApi, ErrorKind, HandoffApi, LedgerApi, QuoteApi};

// ==========================================
// 系统常量
// ==========================================

/// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 系统名称
pub const SYSTEM_NAME: &str = "采购撮合运营平台";
