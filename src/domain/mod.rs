// ==========================================
// 采购撮合运营平台 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod handoff;
pub mod payout;
pub mod quote;
pub mod types;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType};
pub use handoff::{Handoff, ManufacturerDetails, Milestones, StatusExtraFields};
pub use payout::{CommissionLine, EarningsSnapshot, PayoutRequest};
pub use quote::{Quote, QuoteItem, QuotePayment, QuoteTotals, RateConfig, RawQuoteItem};
pub use types::{
    AgentIdentity, ClaimOutcome, HandoffStatus, PaymentPurpose, PayoutStatus, ShippingRateUnit,
};
