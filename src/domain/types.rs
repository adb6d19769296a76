// ==========================================
// 采购撮合运营平台 - 领域类型定义
// ==========================================
// 序列化格式: snake_case (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 项目状态 (Handoff Status)
// ==========================================
// 主链: pending → claimed → manufacturer_found → paid → shipped → delivered
// cancelled 可从 delivered 之前的任一状态进入
// delivered / cancelled 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    Pending,           // 待认领
    Claimed,           // 已认领
    ManufacturerFound, // 已找到厂家
    Paid,              // 已付款
    Shipped,           // 已发货
    Delivered,         // 已交付
    Cancelled,         // 已取消
}

impl HandoffStatus {
    pub const ALL: [HandoffStatus; 7] = [
        HandoffStatus::Pending,
        HandoffStatus::Claimed,
        HandoffStatus::ManufacturerFound,
        HandoffStatus::Paid,
        HandoffStatus::Shipped,
        HandoffStatus::Delivered,
        HandoffStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HandoffStatus::Pending => "pending",
            HandoffStatus::Claimed => "claimed",
            HandoffStatus::ManufacturerFound => "manufacturer_found",
            HandoffStatus::Paid => "paid",
            HandoffStatus::Shipped => "shipped",
            HandoffStatus::Delivered => "delivered",
            HandoffStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<HandoffStatus> {
        let s = s.trim().to_lowercase();
        HandoffStatus::ALL.into_iter().find(|st| st.as_str() == s)
    }

    /// 终态：不再允许修改项目及其报价
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandoffStatus::Delivered | HandoffStatus::Cancelled)
    }

    /// 主链上的序号（cancelled 不在主链上，返回 None）
    pub fn rank(&self) -> Option<u8> {
        match self {
            HandoffStatus::Pending => Some(0),
            HandoffStatus::Claimed => Some(1),
            HandoffStatus::ManufacturerFound => Some(2),
            HandoffStatus::Paid => Some(3),
            HandoffStatus::Shipped => Some(4),
            HandoffStatus::Delivered => Some(5),
            HandoffStatus::Cancelled => None,
        }
    }

    /// 厂家信息是否可编辑
    pub fn manufacturer_editable(&self) -> bool {
        matches!(
            self,
            HandoffStatus::ManufacturerFound | HandoffStatus::Paid | HandoffStatus::Shipped
        )
    }

    /// 是否允许释放认领（仅 pending / manufacturer_found）
    pub fn releasable(&self) -> bool {
        matches!(self, HandoffStatus::Pending | HandoffStatus::ManufacturerFound)
    }

    /// 佣金是否已确认（已付款及之后，且未取消）
    pub fn commission_recognized(&self) -> bool {
        matches!(
            self,
            HandoffStatus::Paid | HandoffStatus::Shipped | HandoffStatus::Delivered
        )
    }
}

impl fmt::Display for HandoffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 运费计价单位
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingRateUnit {
    PerKg,  // 按重量
    PerCbm, // 按体积
}

impl ShippingRateUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingRateUnit::PerKg => "per_kg",
            ShippingRateUnit::PerCbm => "per_cbm",
        }
    }

    pub fn parse(s: &str) -> Option<ShippingRateUnit> {
        match s.trim().to_lowercase().as_str() {
            "per_kg" | "kg" => Some(ShippingRateUnit::PerKg),
            "per_cbm" | "cbm" => Some(ShippingRateUnit::PerCbm),
            _ => None,
        }
    }
}

impl fmt::Display for ShippingRateUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 付款用途
// ==========================================
// product / deposit 计入货款结清；shipping / commitment 不计入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPurpose {
    Product,
    Shipping,
    Deposit,
    Commitment,
}

impl PaymentPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentPurpose::Product => "product",
            PaymentPurpose::Shipping => "shipping",
            PaymentPurpose::Deposit => "deposit",
            PaymentPurpose::Commitment => "commitment",
        }
    }

    pub fn parse(s: &str) -> Option<PaymentPurpose> {
        match s.trim().to_lowercase().as_str() {
            "product" => Some(PaymentPurpose::Product),
            "shipping" => Some(PaymentPurpose::Shipping),
            "deposit" => Some(PaymentPurpose::Deposit),
            "commitment" => Some(PaymentPurpose::Commitment),
            _ => None,
        }
    }

    /// 是否冲减货款余额
    pub fn settles_product(&self) -> bool {
        matches!(self, PaymentPurpose::Product | PaymentPurpose::Deposit)
    }
}

impl fmt::Display for PaymentPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 提现申请状态
// ==========================================
// pending → {approved, rejected}; approved → {paid, failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
    Failed,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Approved => "approved",
            PayoutStatus::Rejected => "rejected",
            PayoutStatus::Paid => "paid",
            PayoutStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<PayoutStatus> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(PayoutStatus::Pending),
            "approved" => Some(PayoutStatus::Approved),
            "rejected" => Some(PayoutStatus::Rejected),
            "paid" => Some(PayoutStatus::Paid),
            "failed" => Some(PayoutStatus::Failed),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: PayoutStatus) -> bool {
        matches!(
            (self, next),
            (PayoutStatus::Pending, PayoutStatus::Approved)
                | (PayoutStatus::Pending, PayoutStatus::Rejected)
                | (PayoutStatus::Approved, PayoutStatus::Paid)
                | (PayoutStatus::Approved, PayoutStatus::Failed)
        )
    }

    /// 已占用额度（approved 视为已划出）
    pub fn counts_as_paid_out(&self) -> bool {
        matches!(self, PayoutStatus::Approved | PayoutStatus::Paid)
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 认领结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimOutcome {
    Claimed,         // 本次认领成功
    AlreadyAssigned, // 已被认领（自己或他人），未改派
    TakenOver,       // 管理员改派
}

impl fmt::Display for ClaimOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimOutcome::Claimed => write!(f, "claimed"),
            ClaimOutcome::AlreadyAssigned => write!(f, "already_assigned"),
            ClaimOutcome::TakenOver => write!(f, "taken_over"),
        }
    }
}

// ==========================================
// 调用方身份（来自外部身份服务）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub approved: bool, // 已审核通过的代理才能提交报价
    pub is_admin: bool,
}

impl AgentIdentity {
    pub fn agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            approved: true,
            is_admin: false,
        }
    }

    pub fn admin(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            approved: true,
            is_admin: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handoff_status_round_trip_and_terminal() {
        for st in HandoffStatus::ALL {
            assert_eq!(HandoffStatus::parse(st.as_str()), Some(st));
        }
        assert_eq!(HandoffStatus::parse("SHIPPED"), Some(HandoffStatus::Shipped));
        assert_eq!(HandoffStatus::parse("lost"), None);

        assert!(HandoffStatus::Delivered.is_terminal());
        assert!(HandoffStatus::Cancelled.is_terminal());
        assert!(!HandoffStatus::Shipped.is_terminal());

        let releasable: Vec<_> = HandoffStatus::ALL
            .into_iter()
            .filter(|s| s.releasable())
            .collect();
        assert_eq!(
            releasable,
            vec![HandoffStatus::Pending, HandoffStatus::ManufacturerFound]
        );
    }

    #[test]
    fn test_payout_edges() {
        use PayoutStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Paid));
        assert!(Approved.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Paid));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Paid.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Paid));
    }
}
