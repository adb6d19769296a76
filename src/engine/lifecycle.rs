// ==========================================
// 采购撮合运营平台 - 项目生命周期状态机
// ==========================================
// 主链: pending → claimed → manufacturer_found → paid → shipped → delivered
// 捷径: manufacturer_found → shipped（paid 仅为信息性节点，货款结清即可发货）
// 取消: delivered 之前任一非终态 → cancelled
// 红线: 无 I/O；守卫基于调用方传入的最新读取状态，写入由仓储层 CAS 兜底
// ==========================================

use crate::domain::handoff::{non_blank, Handoff, StatusExtraFields};
use crate::domain::types::HandoffStatus;
use chrono::NaiveDateTime;
use thiserror::Error;

// ==========================================
// TransitionRejection - 状态推进拒绝原因
// ==========================================
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransitionRejection {
    #[error("非法状态转换: {from} → {to}")]
    IllegalEdge {
        from: HandoffStatus,
        to: HandoffStatus,
    },

    #[error("项目尚未被认领，不能进入 claimed")]
    NotAssigned,

    #[error("缺少必填字段: {0}")]
    MissingField(&'static str),

    #[error("项目没有报价，无法确认货款已结清")]
    NoQuote,

    #[error("货款未结清，余额={balance:.2}")]
    BalanceOutstanding { balance: f64 },
}

impl TransitionRejection {
    /// 缺字段属于输入校验，其余属于状态冲突
    pub fn is_validation(&self) -> bool {
        matches!(self, TransitionRejection::MissingField(_))
    }
}

// ==========================================
// LifecycleMachine - 纯函数状态机
// ==========================================
pub struct LifecycleMachine;

impl LifecycleMachine {
    /// 是否为合法边
    pub fn is_edge(from: HandoffStatus, to: HandoffStatus) -> bool {
        use HandoffStatus::*;
        match (from, to) {
            (Pending, Claimed)
            | (Claimed, ManufacturerFound)
            | (ManufacturerFound, Paid)
            | (ManufacturerFound, Shipped)
            | (Paid, Shipped)
            | (Shipped, Delivered) => true,
            (f, Cancelled) => !f.is_terminal(),
            _ => false,
        }
    }

    /// 某状态的合法后继
    pub fn next_statuses(from: HandoffStatus) -> Vec<HandoffStatus> {
        HandoffStatus::ALL
            .into_iter()
            .filter(|to| Self::is_edge(from, *to))
            .collect()
    }

    /// 规划一次状态推进
    ///
    /// # 参数
    /// - handoff: 最新读取的项目
    /// - next: 目标状态
    /// - extra: 随状态写入的字段（厂家信息 / 物流 / 取消原因）
    /// - product_balance: 当前报价货款余额（无报价时为 None）
    /// - now: 里程碑时间
    ///
    /// # 返回
    /// - 推进后的项目（revision 未变，由仓储层更新时校验）
    pub fn plan_transition(
        handoff: &Handoff,
        next: HandoffStatus,
        extra: &StatusExtraFields,
        product_balance: Option<f64>,
        now: NaiveDateTime,
    ) -> Result<Handoff, TransitionRejection> {
        let from = handoff.status;
        if !Self::is_edge(from, next) {
            return Err(TransitionRejection::IllegalEdge { from, to: next });
        }

        let mut planned = handoff.clone();

        match next {
            HandoffStatus::Claimed => {
                if planned.assigned_agent_id.is_none() {
                    return Err(TransitionRejection::NotAssigned);
                }
            }
            HandoffStatus::ManufacturerFound => {
                if let Some(patch) = &extra.manufacturer {
                    planned.manufacturer = planned.manufacturer.merged_with(patch);
                }
                if !non_blank(&planned.manufacturer.name) {
                    return Err(TransitionRejection::MissingField("manufacturer_name"));
                }
                if !non_blank(&planned.manufacturer.address) {
                    return Err(TransitionRejection::MissingField("manufacturer_address"));
                }
            }
            HandoffStatus::Shipped => {
                if extra.shipper.is_some() {
                    planned.shipper = extra.shipper.clone();
                }
                if extra.tracking_number.is_some() {
                    planned.tracking_number = extra.tracking_number.clone();
                }
                if !non_blank(&planned.shipper) {
                    return Err(TransitionRejection::MissingField("shipper"));
                }
                if !non_blank(&planned.tracking_number) {
                    return Err(TransitionRejection::MissingField("tracking_number"));
                }
                match product_balance {
                    None => return Err(TransitionRejection::NoQuote),
                    Some(balance) if balance > 0.0 => {
                        return Err(TransitionRejection::BalanceOutstanding { balance })
                    }
                    Some(_) => {}
                }
            }
            HandoffStatus::Cancelled => {
                if !non_blank(&extra.cancel_reason) {
                    return Err(TransitionRejection::MissingField("cancel_reason"));
                }
                planned.cancel_reason = extra.cancel_reason.clone();
            }
            // paid / delivered 无额外前置条件
            HandoffStatus::Paid | HandoffStatus::Delivered | HandoffStatus::Pending => {}
        }

        planned.status = next;
        planned.milestones.stamp_once(next, now);
        Ok(planned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::handoff::ManufacturerDetails;
    use chrono::NaiveDate;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 10)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn handoff(status: HandoffStatus) -> Handoff {
        let mut h = Handoff::new_pending("H1".to_string(), "sourcing".to_string(), "C1".to_string(), ts(8));
        h.status = status;
        h.assigned_agent_id = Some("agent_a".to_string());
        h
    }

    fn shipping_fields() -> StatusExtraFields {
        StatusExtraFields {
            shipper: Some("GIG Logistics".to_string()),
            tracking_number: Some("GIG-0001".to_string()),
            ..StatusExtraFields::default()
        }
    }

    #[test]
    fn test_edge_list() {
        use HandoffStatus::*;
        assert_eq!(LifecycleMachine::next_statuses(Pending), vec![Claimed, Cancelled]);
        assert_eq!(LifecycleMachine::next_statuses(Paid), vec![Shipped, Cancelled]);
        assert_eq!(
            LifecycleMachine::next_statuses(ManufacturerFound),
            vec![Paid, Shipped, Cancelled]
        );
        assert!(LifecycleMachine::next_statuses(Delivered).is_empty());
        assert!(LifecycleMachine::next_statuses(Cancelled).is_empty());

        // 不允许跳级或回退
        assert!(!LifecycleMachine::is_edge(Claimed, Paid));
        assert!(!LifecycleMachine::is_edge(Shipped, Paid));
        assert!(!LifecycleMachine::is_edge(Shipped, Shipped));
    }

    #[test]
    fn test_illegal_edge_names_both_statuses() {
        let h = handoff(HandoffStatus::Claimed);
        let err = LifecycleMachine::plan_transition(&h, HandoffStatus::Delivered, &StatusExtraFields::default(), None, ts(9))
            .unwrap_err();
        assert_eq!(
            err,
            TransitionRejection::IllegalEdge {
                from: HandoffStatus::Claimed,
                to: HandoffStatus::Delivered
            }
        );
        let msg = err.to_string();
        assert!(msg.contains("claimed") && msg.contains("delivered"));
    }

    #[test]
    fn test_manufacturer_found_requires_name_and_address() {
        let h = handoff(HandoffStatus::Claimed);
        let partial = StatusExtraFields {
            manufacturer: Some(ManufacturerDetails {
                name: Some("Yiwu Bags Co".to_string()),
                ..ManufacturerDetails::default()
            }),
            ..StatusExtraFields::default()
        };
        let err = LifecycleMachine::plan_transition(&h, HandoffStatus::ManufacturerFound, &partial, None, ts(9))
            .unwrap_err();
        assert_eq!(err, TransitionRejection::MissingField("manufacturer_address"));
        assert!(err.is_validation());

        let full = StatusExtraFields {
            manufacturer: Some(ManufacturerDetails {
                name: Some("Yiwu Bags Co".to_string()),
                address: Some("Futian Market D2".to_string()),
                ..ManufacturerDetails::default()
            }),
            ..StatusExtraFields::default()
        };
        let planned = LifecycleMachine::plan_transition(&h, HandoffStatus::ManufacturerFound, &full, None, ts(9))
            .unwrap();
        assert_eq!(planned.status, HandoffStatus::ManufacturerFound);
        assert_eq!(planned.milestones.manufacturer_found_at, Some(ts(9)));
        // 原对象不变
        assert_eq!(h.status, HandoffStatus::Claimed);
    }

    #[test]
    fn test_shipped_requires_cleared_balance() {
        let h = handoff(HandoffStatus::Paid);

        let err = LifecycleMachine::plan_transition(&h, HandoffStatus::Shipped, &shipping_fields(), Some(500.0), ts(10))
            .unwrap_err();
        assert_eq!(err, TransitionRejection::BalanceOutstanding { balance: 500.0 });
        assert!(!err.is_validation());

        let err = LifecycleMachine::plan_transition(&h, HandoffStatus::Shipped, &shipping_fields(), None, ts(10))
            .unwrap_err();
        assert_eq!(err, TransitionRejection::NoQuote);

        let err = LifecycleMachine::plan_transition(&h, HandoffStatus::Shipped, &StatusExtraFields::default(), Some(0.0), ts(10))
            .unwrap_err();
        assert_eq!(err, TransitionRejection::MissingField("shipper"));

        let planned = LifecycleMachine::plan_transition(&h, HandoffStatus::Shipped, &shipping_fields(), Some(-1.0), ts(10))
            .unwrap();
        assert_eq!(planned.milestones.shipped_at, Some(ts(10)));
        assert_eq!(planned.tracking_number.as_deref(), Some("GIG-0001"));
    }

    #[test]
    fn test_manufacturer_found_may_ship_once_settled() {
        let h = handoff(HandoffStatus::ManufacturerFound);
        let err = LifecycleMachine::plan_transition(&h, HandoffStatus::Shipped, &shipping_fields(), Some(500.0), ts(10))
            .unwrap_err();
        assert_eq!(err, TransitionRejection::BalanceOutstanding { balance: 500.0 });

        let planned = LifecycleMachine::plan_transition(&h, HandoffStatus::Shipped, &shipping_fields(), Some(0.0), ts(10))
            .unwrap();
        assert_eq!(planned.status, HandoffStatus::Shipped);
        assert_eq!(planned.milestones.paid_at, None);
        assert_eq!(planned.milestones.shipped_at, Some(ts(10)));
    }

    #[test]
    fn test_cancel_requires_reason_and_non_terminal() {
        let h = handoff(HandoffStatus::Shipped);
        let err = LifecycleMachine::plan_transition(&h, HandoffStatus::Cancelled, &StatusExtraFields::default(), None, ts(11))
            .unwrap_err();
        assert_eq!(err, TransitionRejection::MissingField("cancel_reason"));

        let reason = StatusExtraFields {
            cancel_reason: Some("customer withdrew".to_string()),
            ..StatusExtraFields::default()
        };
        let planned = LifecycleMachine::plan_transition(&h, HandoffStatus::Cancelled, &reason, None, ts(11)).unwrap();
        assert_eq!(planned.cancel_reason.as_deref(), Some("customer withdrew"));
        assert_eq!(planned.milestones.cancelled_at, Some(ts(11)));

        let done = handoff(HandoffStatus::Delivered);
        let err = LifecycleMachine::plan_transition(&done, HandoffStatus::Cancelled, &reason, None, ts(11))
            .unwrap_err();
        assert!(matches!(err, TransitionRejection::IllegalEdge { .. }));
    }

    #[test]
    fn test_claimed_requires_assignee() {
        let mut h = handoff(HandoffStatus::Pending);
        h.assigned_agent_id = None;
        let err = LifecycleMachine::plan_transition(&h, HandoffStatus::Claimed, &StatusExtraFields::default(), None, ts(9))
            .unwrap_err();
        assert_eq!(err, TransitionRejection::NotAssigned);
    }
}
