// ==========================================
// 采购撮合运营平台 - 采购项目领域模型
// ==========================================
// 红线: 同一时刻最多一个 assigned_agent_id
// 红线: 里程碑时间只在首次进入对应状态时写入一次
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::types::HandoffStatus;

// ==========================================
// Handoff - 采购项目
// ==========================================
// 由外部受理流程以 pending 状态创建；从不删除，取消是终态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handoff {
    pub handoff_id: String,
    pub handoff_type: String,
    pub status: HandoffStatus,
    pub assigned_agent_id: Option<String>,

    // ===== 客户 =====
    pub customer_id: String,
    pub customer_name: Option<String>,
    pub customer_contact: Option<String>,

    // ===== 厂家（找到前为空） =====
    pub manufacturer: ManufacturerDetails,

    // ===== 物流（发货前为空） =====
    pub shipper: Option<String>,
    pub tracking_number: Option<String>,

    pub cancel_reason: Option<String>,

    pub milestones: Milestones,

    pub revision: i32, // 乐观锁：修订号
}

impl Handoff {
    /// 新建待认领项目
    pub fn new_pending(
        handoff_id: String,
        handoff_type: String,
        customer_id: String,
        created_at: NaiveDateTime,
    ) -> Self {
        Self {
            handoff_id,
            handoff_type,
            status: HandoffStatus::Pending,
            assigned_agent_id: None,
            customer_id,
            customer_name: None,
            customer_contact: None,
            manufacturer: ManufacturerDetails::default(),
            shipper: None,
            tracking_number: None,
            cancel_reason: None,
            milestones: Milestones {
                created_at,
                ..Milestones::default()
            },
            revision: 0,
        }
    }

    pub fn is_assigned_to(&self, agent_id: &str) -> bool {
        self.assigned_agent_id.as_deref() == Some(agent_id)
    }
}

// ==========================================
// ManufacturerDetails - 厂家信息
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturerDetails {
    pub name: Option<String>,
    pub address: Option<String>,
    pub contact: Option<String>,
    pub note: Option<String>,
}

impl ManufacturerDetails {
    /// 名称与地址均非空
    pub fn is_complete(&self) -> bool {
        non_blank(&self.name) && non_blank(&self.address)
    }

    /// 合并：patch 中非 None 的字段覆盖当前值
    pub fn merged_with(&self, patch: &ManufacturerDetails) -> ManufacturerDetails {
        ManufacturerDetails {
            name: patch.name.clone().or_else(|| self.name.clone()),
            address: patch.address.clone().or_else(|| self.address.clone()),
            contact: patch.contact.clone().or_else(|| self.contact.clone()),
            note: patch.note.clone().or_else(|| self.note.clone()),
        }
    }
}

// ==========================================
// Milestones - 里程碑时间
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestones {
    pub created_at: NaiveDateTime,
    pub claimed_at: Option<NaiveDateTime>,
    pub manufacturer_found_at: Option<NaiveDateTime>,
    pub paid_at: Option<NaiveDateTime>,
    pub shipped_at: Option<NaiveDateTime>,
    pub delivered_at: Option<NaiveDateTime>,
    pub cancelled_at: Option<NaiveDateTime>,
}

impl Milestones {
    /// 某状态对应的里程碑（pending 对应 created_at）
    pub fn get(&self, status: HandoffStatus) -> Option<NaiveDateTime> {
        match status {
            HandoffStatus::Pending => Some(self.created_at),
            HandoffStatus::Claimed => self.claimed_at,
            HandoffStatus::ManufacturerFound => self.manufacturer_found_at,
            HandoffStatus::Paid => self.paid_at,
            HandoffStatus::Shipped => self.shipped_at,
            HandoffStatus::Delivered => self.delivered_at,
            HandoffStatus::Cancelled => self.cancelled_at,
        }
    }

    /// 首次进入状态时写入；已写入则保持不变
    ///
    /// 返回是否本次写入
    pub fn stamp_once(&mut self, status: HandoffStatus, at: NaiveDateTime) -> bool {
        let slot = match status {
            HandoffStatus::Pending => return false,
            HandoffStatus::Claimed => &mut self.claimed_at,
            HandoffStatus::ManufacturerFound => &mut self.manufacturer_found_at,
            HandoffStatus::Paid => &mut self.paid_at,
            HandoffStatus::Shipped => &mut self.shipped_at,
            HandoffStatus::Delivered => &mut self.delivered_at,
            HandoffStatus::Cancelled => &mut self.cancelled_at,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(at);
        true
    }
}

// ==========================================
// StatusExtraFields - 状态推进附带字段
// ==========================================
/// advance_status 时随状态一起写入的字段（按目标状态取用）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusExtraFields {
    pub manufacturer: Option<ManufacturerDetails>,
    pub shipper: Option<String>,
    pub tracking_number: Option<String>,
    pub cancel_reason: Option<String>,
}

pub(crate) fn non_blank(v: &Option<String>) -> bool {
    v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
}
