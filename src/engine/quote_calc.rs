// ==========================================
// 采购撮合运营平台 - 报价计算纯函数库
// ==========================================
// 职责: 到岸成本汇总、提交前置校验、货款余额
// 红线: 无状态、无副作用、无 I/O 操作
// 红线: 所有拒绝必须输出具体原因
// ==========================================

use crate::domain::quote::{QuoteItem, QuotePayment, QuoteTotals, RateConfig};
use crate::domain::types::{AgentIdentity, HandoffStatus, ShippingRateUnit};
use thiserror::Error;

// ==========================================
// SubmitBlocker - 提交阻断原因
// ==========================================
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubmitBlocker {
    #[error("项目已进入终态({0})，报价只读")]
    HandoffTerminal(HandoffStatus),

    #[error("报价已设为只读")]
    QuoteReadOnly,

    #[error("代理未通过审核: agent_id={0}")]
    AgentNotApproved(String),

    #[error("报价至少需要一条明细")]
    NoItems,

    #[error("第{position}行明细无效: {reason}")]
    InvalidItem { position: usize, reason: String },

    #[error("费率必须大于0: {field}={value}")]
    NonPositiveRate { field: &'static str, value: f64 },
}

impl SubmitBlocker {
    /// 是否属于权限类阻断（其余为输入校验类）
    pub fn is_permission(&self) -> bool {
        matches!(
            self,
            SubmitBlocker::HandoffTerminal(_)
                | SubmitBlocker::QuoteReadOnly
                | SubmitBlocker::AgentNotApproved(_)
        )
    }
}

// ==========================================
// QuoteCalculator - 纯函数工具类
// ==========================================
pub struct QuoteCalculator;

impl QuoteCalculator {
    /// 计算报价汇总
    ///
    /// # 规则
    /// 1. total_product_rmb = Σ(数量 × 单价) + Σ(国内运费)
    /// 2. total_weight_kg = Σ(数量 × 单重)；total_cbm = Σ(数量 × 单体积)
    /// 3. total_product_ngn = total_product_rmb × exchange_rate_rmb
    /// 4. 计费基数: per_cbm 取 total_cbm，否则取 total_weight_kg
    /// 5. total_shipping_usd = 计费基数 × shipping_rate_usd
    ///    total_shipping_ngn = total_shipping_usd × exchange_rate_usd
    /// 6. total_markup_ngn = total_product_ngn × markup_percent / 100
    /// 7. total_due_ngn = 货款 + 运费 + 加价
    ///
    /// 累加顺序固定为明细顺序，相同输入得到逐位相同的结果
    pub fn compute_totals(items: &[QuoteItem], rates: &RateConfig) -> QuoteTotals {
        let mut goods_rmb = 0.0;
        let mut local_transport_rmb = 0.0;
        let mut total_weight_kg = 0.0;
        let mut total_cbm = 0.0;

        for item in items {
            let qty = item.quantity as f64;
            goods_rmb += qty * item.unit_price_rmb;
            local_transport_rmb += item.local_transport_rmb;
            total_weight_kg += qty * item.unit_weight_kg;
            total_cbm += qty * item.unit_cbm;
        }

        let total_product_rmb = goods_rmb + local_transport_rmb;
        let total_product_ngn = total_product_rmb * rates.exchange_rate_rmb;

        let shipping_basis = match rates.shipping_rate_unit {
            ShippingRateUnit::PerCbm => total_cbm,
            ShippingRateUnit::PerKg => total_weight_kg,
        };
        let total_shipping_usd = shipping_basis * rates.shipping_rate_usd;
        let total_shipping_ngn = total_shipping_usd * rates.exchange_rate_usd;

        let total_markup_ngn = total_product_ngn * rates.markup_percent / 100.0;
        let total_due_ngn = total_product_ngn + total_shipping_ngn + total_markup_ngn;

        QuoteTotals {
            total_product_rmb,
            total_weight_kg,
            total_cbm,
            total_product_ngn,
            total_shipping_usd,
            total_shipping_ngn,
            total_markup_ngn,
            total_due_ngn,
        }
    }

    /// 提交前置校验
    ///
    /// # 规则（按顺序，返回第一个未满足的条件）
    /// 1. 项目非终态
    /// 2. 报价未设只读
    /// 3. 调用方为已审核代理
    /// 4. 至少一条明细，且每条明细可提交、数值非负
    /// 5. exchange_rate_rmb / exchange_rate_usd / shipping_rate_usd 均 > 0
    pub fn can_submit(
        handoff_status: HandoffStatus,
        quote_read_only: bool,
        caller: &AgentIdentity,
        items: &[QuoteItem],
        rates: &RateConfig,
    ) -> Result<(), SubmitBlocker> {
        if handoff_status.is_terminal() {
            return Err(SubmitBlocker::HandoffTerminal(handoff_status));
        }
        if quote_read_only {
            return Err(SubmitBlocker::QuoteReadOnly);
        }
        if !caller.approved {
            return Err(SubmitBlocker::AgentNotApproved(caller.agent_id.clone()));
        }

        if items.is_empty() {
            return Err(SubmitBlocker::NoItems);
        }
        for (idx, item) in items.iter().enumerate() {
            if let Some(reason) = Self::item_defect(item) {
                return Err(SubmitBlocker::InvalidItem {
                    position: idx + 1,
                    reason,
                });
            }
        }

        for (field, value) in [
            ("exchange_rate_rmb", rates.exchange_rate_rmb),
            ("exchange_rate_usd", rates.exchange_rate_usd),
            ("shipping_rate_usd", rates.shipping_rate_usd),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(SubmitBlocker::NonPositiveRate { field, value });
            }
        }

        Ok(())
    }

    /// 货款余额 = (货款 + 加价) − Σ(product/deposit 用途的收款)
    ///
    /// 结果 ≤ 0 表示已结清
    pub fn product_balance(totals: &QuoteTotals, payments: &[QuotePayment]) -> f64 {
        let settled: f64 = payments
            .iter()
            .filter(|p| p.purpose.settles_product())
            .map(|p| p.amount_ngn)
            .sum();
        totals.product_due_ngn() - settled
    }

    fn item_defect(item: &QuoteItem) -> Option<String> {
        if item.product_name.trim().is_empty() {
            return Some("品名为空".to_string());
        }
        if item.quantity <= 0 {
            return Some(format!("数量必须大于0 (quantity={})", item.quantity));
        }
        for (field, value) in [
            ("unit_price_rmb", item.unit_price_rmb),
            ("unit_weight_kg", item.unit_weight_kg),
            ("unit_cbm", item.unit_cbm),
            ("local_transport_rmb", item.local_transport_rmb),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Some(format!("{}必须为非负数 ({})", field, value));
            }
        }
        None
    }
}
