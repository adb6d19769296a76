// ==========================================
// 采购撮合运营平台 - 佣金与提现领域模型
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::types::PayoutStatus;

// ==========================================
// PayoutRequest - 提现申请
// ==========================================
// 红线: amount > 0 且不低于配置的最低提现额
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub payout_id: String,
    pub agent_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: PayoutStatus,
    pub requested_note: Option<String>,
    pub admin_note: Option<String>,
    pub requested_at: NaiveDateTime,
    pub approved_at: Option<NaiveDateTime>,
    pub paid_at: Option<NaiveDateTime>,
}

// ==========================================
// EarningsSnapshot - 收益快照（派生，不落库）
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EarningsSnapshot {
    pub gross_earned: f64,
    pub locked: f64,
    pub paid_out: f64,
    pub available: f64,
    /// locked + paid_out 超出 gross_earned 的部分（正常为 0）
    pub overdrawn_by: f64,
}

impl EarningsSnapshot {
    pub fn is_overdrawn(&self) -> bool {
        self.overdrawn_by > 0.0
    }
}

// ==========================================
// CommissionLine - 单项目佣金明细
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionLine {
    pub handoff_id: String,
    pub quote_id: String,
    pub total_due_ngn: f64,
    pub commission_ngn: f64,
    pub locked_ngn: f64,
}
