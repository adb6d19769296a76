// ==========================================
// 采购撮合运营平台 - 报价草稿（备忘录）
// ==========================================
// 职责: 切换编辑上下文时保存/恢复未提交的报价草稿
// 红线: 快照为纯值对象，不落库、不共享可变状态
// ==========================================

use crate::domain::quote::{QuoteItem, QuoteTotals, RateConfig};
use crate::domain::types::PaymentPurpose;
use crate::engine::quote_calc::QuoteCalculator;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ==========================================
// QuoteDraft - 正在编辑的报价
// ==========================================
// quote_id 为空表示尚未保存；首次保存后回填，后续保存走更新
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteDraft {
    pub handoff_id: String,
    pub quote_id: Option<String>,
    pub items: Vec<QuoteItem>,
    pub rates: RateConfig,
    pub payment_purpose: PaymentPurpose,
    pub agent_note: Option<String>,
}

impl QuoteDraft {
    pub fn new(handoff_id: impl Into<String>, rates: RateConfig) -> Self {
        Self {
            handoff_id: handoff_id.into(),
            quote_id: None,
            items: Vec::new(),
            rates,
            payment_purpose: PaymentPurpose::Product,
            agent_note: None,
        }
    }

    pub fn is_saved(&self) -> bool {
        self.quote_id.is_some()
    }

    /// 预览汇总（不保存）
    pub fn preview_totals(&self) -> QuoteTotals {
        QuoteCalculator::compute_totals(&self.items, &self.rates)
    }

    /// 生成快照（深拷贝，之后对草稿的修改不影响快照）
    pub fn snapshot(&self) -> DraftSnapshot {
        DraftSnapshot {
            draft: self.clone(),
        }
    }
}

// ==========================================
// DraftSnapshot - 草稿快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSnapshot {
    draft: QuoteDraft,
}

impl DraftSnapshot {
    pub fn handoff_id(&self) -> &str {
        &self.draft.handoff_id
    }

    /// 恢复为可编辑草稿
    pub fn restore(self) -> QuoteDraft {
        self.draft
    }
}

// ==========================================
// DraftContext - 编辑上下文
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DraftContext {
    /// 某项目下的报价
    Project(String),
    /// 我的全部报价
    AllQuotes,
}

// ==========================================
// DraftStash - 各上下文的草稿暂存
// ==========================================
// 调用方持有，显式传入/取出
#[derive(Debug, Clone, Default)]
pub struct DraftStash {
    slots: HashMap<DraftContext, DraftSnapshot>,
}

impl DraftStash {
    pub fn new() -> Self {
        Self::default()
    }

    /// 暂存快照；同一上下文已有快照时覆盖并返回旧值
    pub fn stash(&mut self, context: DraftContext, snapshot: DraftSnapshot) -> Option<DraftSnapshot> {
        self.slots.insert(context, snapshot)
    }

    /// 取出快照（取出后不再保留）
    pub fn take(&mut self, context: &DraftContext) -> Option<DraftSnapshot> {
        self.slots.remove(context)
    }

    pub fn peek(&self, context: &DraftContext) -> Option<&DraftSnapshot> {
        self.slots.get(context)
    }

    /// 离开当前上下文并进入目标上下文
    ///
    /// 当前草稿存入 `leaving`，返回 `entering` 中暂存的草稿（若有）
    pub fn switch(
        &mut self,
        leaving: DraftContext,
        current: &QuoteDraft,
        entering: &DraftContext,
    ) -> Option<QuoteDraft> {
        self.stash(leaving, current.snapshot());
        self.take(entering).map(DraftSnapshot::restore)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ShippingRateUnit;

    fn rates() -> RateConfig {
        RateConfig {
            exchange_rate_rmb: 230.0,
            exchange_rate_usd: 1600.0,
            shipping_rate_usd: 5.0,
            shipping_rate_unit: ShippingRateUnit::PerKg,
            markup_percent: 20.0,
            agent_percent: 10.0,
            agent_commitment_percent: 20.0,
            commitment_due: 0.0,
            deposit_enabled: true,
            deposit_percent: 50.0,
        }
    }

    fn item(name: &str) -> QuoteItem {
        QuoteItem {
            product_name: name.to_string(),
            description: None,
            quantity: 2,
            unit_price_rmb: 100.0,
            unit_weight_kg: 1.0,
            unit_cbm: 0.01,
            local_transport_rmb: 10.0,
        }
    }

    #[test]
    fn test_snapshot_is_detached_from_draft() {
        let mut draft = QuoteDraft::new("H1", rates());
        draft.items.push(item("kettle"));

        let snap = draft.snapshot();
        draft.items.push(item("toaster"));
        draft.rates.markup_percent = 35.0;

        let restored = snap.restore();
        assert_eq!(restored.items.len(), 1);
        assert_eq!(restored.rates.markup_percent, 20.0);
        assert_eq!(restored.preview_totals().total_due_ngn, 73960.0);
    }

    #[test]
    fn test_switch_between_project_and_all_quotes() {
        let mut stash = DraftStash::new();
        let project = DraftContext::Project("H1".to_string());

        let mut project_draft = QuoteDraft::new("H1", rates());
        project_draft.items.push(item("blender"));

        // 项目视图 → 全部报价视图：全部报价视图还没有暂存草稿
        let entered = stash.switch(project.clone(), &project_draft, &DraftContext::AllQuotes);
        assert!(entered.is_none());
        assert_eq!(stash.len(), 1);

        let mut all_draft = QuoteDraft::new("H2", rates());
        all_draft.agent_note = Some("bulk order".to_string());

        // 切回项目视图：未保存的明细原样恢复
        let back = stash
            .switch(DraftContext::AllQuotes, &all_draft, &project)
            .unwrap();
        assert_eq!(back, project_draft);
        assert!(stash.peek(&project).is_none());
        assert_eq!(
            stash.peek(&DraftContext::AllQuotes).map(|s| s.handoff_id()),
            Some("H2")
        );
    }
}
