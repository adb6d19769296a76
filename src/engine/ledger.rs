// ==========================================
// 采购撮合运营平台 - 佣金台账纯函数库
// ==========================================
// 职责: 由项目状态 + 当前报价 + 提现记录派生收益快照，校验提现申请
// 红线: available 永不为负；超额占用必须显式暴露（overdrawn_by）
// ==========================================

use crate::domain::handoff::Handoff;
use crate::domain::payout::{CommissionLine, EarningsSnapshot, PayoutRequest};
use crate::domain::quote::Quote;
use crate::domain::types::HandoffStatus;
use thiserror::Error;

// ==========================================
// PayoutRejection - 提现拒绝原因
// ==========================================
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PayoutRejection {
    #[error("提现金额必须大于0 (amount={0})")]
    NonPositive(f64),

    #[error("提现金额低于最低额: amount={amount}, minimum={minimum}")]
    BelowMinimum { amount: f64, minimum: f64 },

    #[error("提现金额超过可用余额: amount={amount}, available={available}")]
    ExceedsAvailable { amount: f64, available: f64 },
}

impl PayoutRejection {
    /// 超额属于状态冲突，其余属于输入校验
    pub fn is_state_conflict(&self) -> bool {
        matches!(self, PayoutRejection::ExceedsAvailable { .. })
    }
}

// ==========================================
// LedgerCalculator
// ==========================================
pub struct LedgerCalculator;

impl LedgerCalculator {
    /// 单项目佣金明细
    ///
    /// # 规则
    /// - 仅 paid / shipped / delivered 的项目确认佣金
    /// - commission = agent_percent / 100 × total_due_ngn（取报价快照中的比例）
    /// - paid / shipped 尚有取消风险，锁定 agent_commitment_percent / 100 × commission
    /// - delivered 后解除锁定
    pub fn commission_line(handoff: &Handoff, current_quote: &Quote) -> Option<CommissionLine> {
        if !handoff.status.commission_recognized() {
            return None;
        }
        let commission_ngn = current_quote.commission_ngn();
        let locked_ngn = match handoff.status {
            HandoffStatus::Paid | HandoffStatus::Shipped => {
                current_quote.rates.agent_commitment_percent / 100.0 * commission_ngn
            }
            _ => 0.0,
        };
        Some(CommissionLine {
            handoff_id: handoff.handoff_id.clone(),
            quote_id: current_quote.quote_id.clone(),
            total_due_ngn: current_quote.totals.total_due_ngn,
            commission_ngn,
            locked_ngn,
        })
    }

    /// 派生收益快照
    ///
    /// - gross_earned = Σ commission
    /// - locked = Σ locked
    /// - paid_out = Σ amount（approved / paid）
    /// - available = max(0, gross − locked − paid_out)
    pub fn derive_earnings(lines: &[CommissionLine], payouts: &[PayoutRequest]) -> EarningsSnapshot {
        let gross_earned: f64 = lines.iter().map(|l| l.commission_ngn).sum();
        let locked: f64 = lines.iter().map(|l| l.locked_ngn).sum();
        let paid_out: f64 = payouts
            .iter()
            .filter(|p| p.status.counts_as_paid_out())
            .map(|p| p.amount)
            .sum();

        Self::snapshot(gross_earned, locked, paid_out)
    }

    /// 由三项汇总值构造快照
    pub fn snapshot(gross_earned: f64, locked: f64, paid_out: f64) -> EarningsSnapshot {
        let raw = gross_earned - locked - paid_out;
        EarningsSnapshot {
            gross_earned,
            locked,
            paid_out,
            available: raw.max(0.0),
            overdrawn_by: (-raw).max(0.0),
        }
    }

    /// 校验提现金额
    ///
    /// # 规则（按顺序）
    /// 1. amount > 0
    /// 2. amount ≥ minimum
    /// 3. amount ≤ available
    pub fn validate_payout(
        amount: f64,
        minimum: f64,
        earnings: &EarningsSnapshot,
    ) -> Result<(), PayoutRejection> {
        if !(amount.is_finite() && amount > 0.0) {
            return Err(PayoutRejection::NonPositive(amount));
        }
        if amount < minimum {
            return Err(PayoutRejection::BelowMinimum { amount, minimum });
        }
        if amount > earnings.available {
            return Err(PayoutRejection::ExceedsAvailable {
                amount,
                available: earnings.available,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::PayoutStatus;
    use chrono::NaiveDate;

    fn line(id: &str, commission: f64, locked: f64) -> CommissionLine {
        CommissionLine {
            handoff_id: id.to_string(),
            quote_id: format!("Q-{}", id),
            total_due_ngn: commission * 10.0,
            commission_ngn: commission,
            locked_ngn: locked,
        }
    }

    fn payout(amount: f64, status: PayoutStatus) -> PayoutRequest {
        PayoutRequest {
            payout_id: format!("P-{}-{}", amount, status),
            agent_id: "agent_a".to_string(),
            amount,
            currency: "NGN".to_string(),
            status,
            requested_note: None,
            admin_note: None,
            requested_at: NaiveDate::from_ymd_opt(2026, 6, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            approved_at: None,
            paid_at: None,
        }
    }

    #[test]
    fn test_payout_against_available_balance() {
        let lines = vec![line("H1", 60_000.0, 20_000.0), line("H2", 40_000.0, 0.0)];
        let payouts = vec![
            payout(10_000.0, PayoutStatus::Approved),
            payout(20_000.0, PayoutStatus::Paid),
            payout(5_000.0, PayoutStatus::Pending),
            payout(7_000.0, PayoutStatus::Rejected),
            payout(9_000.0, PayoutStatus::Failed),
        ];

        let e = LedgerCalculator::derive_earnings(&lines, &payouts);
        assert_eq!(e.gross_earned, 100_000.0);
        assert_eq!(e.locked, 20_000.0);
        assert_eq!(e.paid_out, 30_000.0);
        assert_eq!(e.available, 50_000.0);
        assert!(!e.is_overdrawn());

        let err = LedgerCalculator::validate_payout(60_000.0, 5_000.0, &e).unwrap_err();
        assert_eq!(
            err,
            PayoutRejection::ExceedsAvailable {
                amount: 60_000.0,
                available: 50_000.0
            }
        );
        assert!(err.is_state_conflict());

        assert!(LedgerCalculator::validate_payout(50_000.0, 5_000.0, &e).is_ok());
    }

    #[test]
    fn test_amount_validation_order() {
        let e = LedgerCalculator::snapshot(10_000.0, 0.0, 0.0);
        assert_eq!(
            LedgerCalculator::validate_payout(0.0, 5_000.0, &e),
            Err(PayoutRejection::NonPositive(0.0))
        );
        assert!(matches!(
            LedgerCalculator::validate_payout(-5.0, 5_000.0, &e),
            Err(PayoutRejection::NonPositive(_))
        ));
        let err = LedgerCalculator::validate_payout(4_999.0, 5_000.0, &e).unwrap_err();
        assert!(matches!(err, PayoutRejection::BelowMinimum { .. }));
        assert!(!err.is_state_conflict());
    }

    #[test]
    fn test_overdrawn_is_clamped_and_surfaced() {
        let e = LedgerCalculator::snapshot(10_000.0, 4_000.0, 9_000.0);
        assert_eq!(e.available, 0.0);
        assert_eq!(e.overdrawn_by, 3_000.0);
        assert!(e.is_overdrawn());
    }
}
