// ==========================================
// 采购撮合运营平台 - 报价领域模型
// ==========================================
// 红线: 报价所属项目进入终态后只读
// 说明: 金额单位 - rmb 人民币 / usd 美元 / ngn 结算币种
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::types::{PaymentPurpose, ShippingRateUnit};

// ==========================================
// QuoteItem - 报价明细行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteItem {
    pub product_name: String,
    pub description: Option<String>,
    pub quantity: i64,
    pub unit_price_rmb: f64,
    pub unit_weight_kg: f64,
    pub unit_cbm: f64,
    pub local_transport_rmb: f64,
}

impl QuoteItem {
    /// 可提交：数量 > 0 且品名非空
    pub fn is_submittable(&self) -> bool {
        self.quantity > 0 && !self.product_name.trim().is_empty()
    }
}

/// 前端原始行数据（数值字段均为文本，需在边界处严格解析）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawQuoteItem {
    pub product_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub quantity: String,
    pub unit_price_rmb: String,
    #[serde(default)]
    pub unit_weight_kg: String,
    #[serde(default)]
    pub unit_cbm: String,
    #[serde(default)]
    pub local_transport_rmb: String,
}

// ==========================================
// RateConfig - 报价费率快照
// ==========================================
// 保存报价时整体固化，后续配置变化不影响历史报价
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateConfig {
    pub exchange_rate_rmb: f64, // 1 RMB → NGN
    pub exchange_rate_usd: f64, // 1 USD → NGN
    pub shipping_rate_usd: f64,
    pub shipping_rate_unit: ShippingRateUnit,
    pub markup_percent: f64,
    pub agent_percent: f64,            // 代理佣金比例
    pub agent_commitment_percent: f64, // 佣金保证金（锁定）比例
    pub commitment_due: f64,
    pub deposit_enabled: bool,
    pub deposit_percent: f64,
}

// ==========================================
// QuoteTotals - 报价汇总
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteTotals {
    pub total_product_rmb: f64,
    pub total_weight_kg: f64,
    pub total_cbm: f64,
    pub total_product_ngn: f64,
    pub total_shipping_usd: f64,
    pub total_shipping_ngn: f64,
    pub total_markup_ngn: f64,
    pub total_due_ngn: f64,
}

impl QuoteTotals {
    /// 货款应收（含加价），用于发货前结清校验
    pub fn product_due_ngn(&self) -> f64 {
        self.total_product_ngn + self.total_markup_ngn
    }
}

// ==========================================
// Quote - 报价
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub quote_id: String,
    pub handoff_id: String,
    pub token: String, // 对客户公开的不透明标识
    pub agent_id: String,
    pub items: Vec<QuoteItem>,
    pub rates: RateConfig,
    pub payment_purpose: PaymentPurpose,
    pub agent_note: Option<String>,
    pub read_only: bool,
    pub totals: QuoteTotals,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub sent_at: Option<NaiveDateTime>,
    pub seq_no: i32, // 项目内报价序号，最大者为当前报价
}

impl Quote {
    /// 定金应收（未启用定金时为 0）
    pub fn deposit_due_ngn(&self) -> f64 {
        if self.rates.deposit_enabled {
            self.totals.total_due_ngn * self.rates.deposit_percent / 100.0
        } else {
            0.0
        }
    }

    /// 代理佣金
    pub fn commission_ngn(&self) -> f64 {
        self.rates.agent_percent / 100.0 * self.totals.total_due_ngn
    }
}

// ==========================================
// QuotePayment - 报价收款记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotePayment {
    pub payment_id: String,
    pub quote_id: String,
    pub amount_ngn: f64,
    pub purpose: PaymentPurpose,
    pub recorded_by: String,
    pub recorded_at: NaiveDateTime,
}
