// ==========================================
// 采购撮合运营平台 - 佣金台账 API
// ==========================================
// 职责: 收益快照、提现申请与审批
// 红线: available 永不为负；超额占用记录告警
// 红线: 审批通过前重新校验可用余额，保证 approved 不会透支
// ==========================================

use std::sync::Arc;
use tracing::instrument;

use crate::api::error::{config_error, ApiError, ApiResult};
use crate::api::validator::parse_positive_amount;
use crate::api::{now, record_action, require_admin, require_non_empty};
use crate::config::RateConfigReader;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::payout::{CommissionLine, EarningsSnapshot, PayoutRequest};
use crate::domain::types::{AgentIdentity, PayoutStatus};
use crate::engine::events::{OpsEvent, OptionalDispatcher};
use crate::engine::ledger::LedgerCalculator;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::handoff_repo::HandoffRepository;
use crate::repository::payout_repo::PayoutRequestRepository;
use crate::repository::quote_repo::QuoteRepository;

// ==========================================
// LedgerApi
// ==========================================
pub struct LedgerApi {
    handoff_repo: Arc<HandoffRepository>,
    quote_repo: Arc<QuoteRepository>,
    payout_repo: Arc<PayoutRequestRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    config: Arc<dyn RateConfigReader>,
    notifier: OptionalDispatcher,
}

impl LedgerApi {
    pub fn new(
        handoff_repo: Arc<HandoffRepository>,
        quote_repo: Arc<QuoteRepository>,
        payout_repo: Arc<PayoutRequestRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        config: Arc<dyn RateConfigReader>,
        notifier: OptionalDispatcher,
    ) -> Self {
        Self {
            handoff_repo,
            quote_repo,
            payout_repo,
            action_log_repo,
            config,
            notifier,
        }
    }

    // ==========================================
    // 收益
    // ==========================================

    /// 代理名下各项目的佣金明细（仅已确认佣金的项目）
    pub fn commission_lines(&self, agent_id: &str) -> ApiResult<Vec<CommissionLine>> {
        require_non_empty("agent_id", agent_id)?;

        let mut lines = Vec::new();
        for handoff in self.handoff_repo.list_by_agent(agent_id)? {
            if !handoff.status.commission_recognized() {
                continue;
            }
            match self.quote_repo.find_current_for_handoff(&handoff.handoff_id)? {
                Some(quote) => {
                    if let Some(line) = LedgerCalculator::commission_line(&handoff, &quote) {
                        lines.push(line);
                    }
                }
                None => {
                    tracing::warn!(
                        handoff_id = %handoff.handoff_id,
                        status = %handoff.status,
                        "已确认佣金的项目没有报价，跳过"
                    );
                }
            }
        }
        Ok(lines)
    }

    /// 收益快照
    pub fn compute_earnings(&self, agent_id: &str) -> ApiResult<EarningsSnapshot> {
        let lines = self.commission_lines(agent_id)?;
        let payouts = self.payout_repo.list_by_agent(agent_id)?;
        let snapshot = LedgerCalculator::derive_earnings(&lines, &payouts);

        if snapshot.is_overdrawn() {
            tracing::warn!(
                agent_id,
                gross_earned = snapshot.gross_earned,
                locked = snapshot.locked,
                paid_out = snapshot.paid_out,
                overdrawn_by = snapshot.overdrawn_by,
                "台账超额占用，可用余额按 0 计"
            );
        }
        Ok(snapshot)
    }

    // ==========================================
    // 提现
    // ==========================================

    /// 发起提现申请
    ///
    /// # 错误
    /// - ValidationError: 金额 ≤ 0 或低于最低提现额
    /// - StateConflict: 金额超过可用余额
    #[instrument(skip(self, caller, note), fields(agent_id = %caller.agent_id))]
    pub async fn create_payout_request(
        &self,
        caller: &AgentIdentity,
        amount: f64,
        note: Option<String>,
    ) -> ApiResult<PayoutRequest> {
        require_non_empty("agent_id", &caller.agent_id)?;

        let minimum = config_error(self.config.get_min_payout().await)?;
        let currency = config_error(self.config.get_payout_currency().await)?;

        let earnings = self.compute_earnings(&caller.agent_id)?;
        LedgerCalculator::validate_payout(amount, minimum, &earnings).map_err(|r| {
            tracing::warn!(amount, available = earnings.available, reason = %r, "提现申请被拒绝");
            ApiError::from(r)
        })?;

        let payout = PayoutRequest {
            payout_id: uuid::Uuid::new_v4().to_string(),
            agent_id: caller.agent_id.clone(),
            amount,
            currency,
            status: PayoutStatus::Pending,
            requested_note: note,
            admin_note: None,
            requested_at: now(),
            approved_at: None,
            paid_at: None,
        };
        self.payout_repo.insert(&payout)?;

        record_action(
            &self.action_log_repo,
            ActionLog::now(
                ActionType::CreatePayout,
                None,
                &caller.agent_id,
                Some(serde_json::json!({
                    "payout_id": payout.payout_id,
                    "amount": amount,
                    "currency": payout.currency,
                    "available": earnings.available,
                })),
                None,
            ),
        );
        self.notifier.notify(OpsEvent::PayoutRequested {
            payout_id: payout.payout_id.clone(),
            agent_id: caller.agent_id.clone(),
            amount,
        });
        tracing::info!(payout_id = %payout.payout_id, amount, "提现申请已创建");
        Ok(payout)
    }

    /// 发起提现申请（金额为前端原始文本，如 "50,000"）
    pub async fn create_payout_request_text(
        &self,
        caller: &AgentIdentity,
        amount_text: &str,
        note: Option<String>,
    ) -> ApiResult<PayoutRequest> {
        let amount = parse_positive_amount("amount", amount_text)?;
        self.create_payout_request(caller, amount, note).await
    }

    /// 审批通过（重新校验可用余额）
    pub fn approve_payout(
        &self,
        payout_id: &str,
        admin_note: Option<&str>,
        admin: &AgentIdentity,
    ) -> ApiResult<PayoutRequest> {
        require_admin(admin, "审批提现")?;
        let payout = self.load(payout_id)?;

        if payout.status == PayoutStatus::Pending {
            let earnings = self.compute_earnings(&payout.agent_id)?;
            if payout.amount > earnings.available {
                return Err(ApiError::StateConflict(format!(
                    "提现金额超过当前可用余额: amount={}, available={}",
                    payout.amount, earnings.available
                )));
            }
        }
        self.resolve(payout, PayoutStatus::Approved, admin_note, admin)
    }

    pub fn reject_payout(
        &self,
        payout_id: &str,
        admin_note: Option<&str>,
        admin: &AgentIdentity,
    ) -> ApiResult<PayoutRequest> {
        require_admin(admin, "驳回提现")?;
        let payout = self.load(payout_id)?;
        self.resolve(payout, PayoutStatus::Rejected, admin_note, admin)
    }

    pub fn mark_payout_paid(
        &self,
        payout_id: &str,
        admin_note: Option<&str>,
        admin: &AgentIdentity,
    ) -> ApiResult<PayoutRequest> {
        require_admin(admin, "确认打款")?;
        let payout = self.load(payout_id)?;
        self.resolve(payout, PayoutStatus::Paid, admin_note, admin)
    }

    pub fn mark_payout_failed(
        &self,
        payout_id: &str,
        admin_note: Option<&str>,
        admin: &AgentIdentity,
    ) -> ApiResult<PayoutRequest> {
        require_admin(admin, "标记打款失败")?;
        let payout = self.load(payout_id)?;
        self.resolve(payout, PayoutStatus::Failed, admin_note, admin)
    }

    pub fn list_payouts(&self, agent_id: &str) -> ApiResult<Vec<PayoutRequest>> {
        require_non_empty("agent_id", agent_id)?;
        Ok(self.payout_repo.list_by_agent(agent_id)?)
    }

    pub fn get_payout(&self, payout_id: &str) -> ApiResult<PayoutRequest> {
        self.load(payout_id)
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    /// 按边表流转，写入用条件更新（期望状态 = 读到的状态）
    fn resolve(
        &self,
        payout: PayoutRequest,
        next: PayoutStatus,
        admin_note: Option<&str>,
        admin: &AgentIdentity,
    ) -> ApiResult<PayoutRequest> {
        if !payout.status.can_transition_to(next) {
            return Err(ApiError::InvalidStateTransition {
                from: payout.status.to_string(),
                to: next.to_string(),
                reason: "提现状态只允许 pending→approved/rejected, approved→paid/failed".to_string(),
            });
        }

        self.payout_repo
            .transition(&payout.payout_id, payout.status, next, admin_note, now())?;

        record_action(
            &self.action_log_repo,
            ActionLog::now(
                ActionType::ResolvePayout,
                None,
                &admin.agent_id,
                Some(serde_json::json!({
                    "payout_id": payout.payout_id,
                    "agent_id": payout.agent_id,
                    "from": payout.status,
                    "to": next,
                    "amount": payout.amount,
                })),
                admin_note.map(|s| s.to_string()),
            ),
        );
        tracing::info!(payout_id = %payout.payout_id, from = %payout.status, to = %next, "提现状态已更新");

        self.load(&payout.payout_id)
    }

    fn load(&self, payout_id: &str) -> ApiResult<PayoutRequest> {
        require_non_empty("payout_id", payout_id)?;
        self.payout_repo
            .find_by_id(payout_id)?
            .ok_or_else(|| ApiError::not_found("PayoutRequest", payout_id))
    }
}
