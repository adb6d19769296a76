// ==========================================
// 采购撮合运营平台 - 引擎层
// ==========================================
// 职责: 实现业务规则引擎,不拼 SQL
// 红线: Engine 不拼 SQL, 所有拒绝必须输出原因
// ==========================================

pub mod draft;
pub mod events;
pub mod ledger;
pub mod lifecycle;
pub mod quote_calc;

// 重导出核心引擎
pub use draft::{DraftContext, DraftSnapshot, DraftStash, QuoteDraft};
pub use events::{NoOpDispatcher, NotificationDispatcher, OpsEvent, OptionalDispatcher};
pub use ledger::{LedgerCalculator, PayoutRejection};
pub use lifecycle::{LifecycleMachine, TransitionRejection};
pub use quote_calc::{QuoteCalculator, SubmitBlocker};
