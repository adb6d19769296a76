// ==========================================
// 采购撮合运营平台 - 报价 API
// ==========================================
// 职责: 报价创建/更新/查询/发送、收款登记、默认费率
// 红线: 汇总总是由明细 + 费率在保存时重算，不接受外部传入的汇总
// 红线: 项目终态或报价只读后所有写操作返回 PermissionDenied
// ==========================================

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

use crate::api::error::{config_error, ApiError, ApiResult};
use crate::api::validator::{parse_positive_amount, parse_raw_items};
use crate::api::{now, record_action, require_admin, require_assignee_or_admin, require_non_empty};
use crate::config::RateConfigReader;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::handoff::Handoff;
use crate::domain::quote::{Quote, QuoteItem, QuotePayment, QuoteTotals, RateConfig, RawQuoteItem};
use crate::domain::types::{AgentIdentity, PaymentPurpose, ShippingRateUnit};
use crate::engine::draft::QuoteDraft;
use crate::engine::events::{OpsEvent, OptionalDispatcher};
use crate::engine::quote_calc::QuoteCalculator;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::error::RepositoryError;
use crate::repository::handoff_repo::HandoffRepository;
use crate::repository::quote_repo::QuoteRepository;

// ==========================================
// 请求 / 响应
// ==========================================

/// 报价保存输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteInput {
    pub items: Vec<QuoteItem>,
    pub rates: RateConfig,
    pub payment_purpose: PaymentPurpose,
    pub agent_note: Option<String>,
}

impl QuoteInput {
    pub fn new(items: Vec<QuoteItem>, rates: RateConfig) -> Self {
        Self {
            items,
            rates,
            payment_purpose: PaymentPurpose::Product,
            agent_note: None,
        }
    }

    /// 由前端文本明细构造（数值字段严格解析）
    pub fn from_raw(raw_items: &[RawQuoteItem], rates: RateConfig) -> ApiResult<Self> {
        Ok(Self::new(parse_raw_items(raw_items)?, rates))
    }
}

impl From<&QuoteDraft> for QuoteInput {
    fn from(d: &QuoteDraft) -> Self {
        Self {
            items: d.items.clone(),
            rates: d.rates.clone(),
            payment_purpose: d.payment_purpose,
            agent_note: d.agent_note.clone(),
        }
    }
}

/// 报价保存结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSaveResult {
    pub quote_id: String,
    pub token: String,
    pub seq_no: i32,
    pub totals: QuoteTotals,
}

impl From<&Quote> for QuoteSaveResult {
    fn from(q: &Quote) -> Self {
        Self {
            quote_id: q.quote_id.clone(),
            token: q.token.clone(),
            seq_no: q.seq_no,
            totals: q.totals,
        }
    }
}

// ==========================================
// QuoteApi
// ==========================================
pub struct QuoteApi {
    handoff_repo: Arc<HandoffRepository>,
    quote_repo: Arc<QuoteRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    config: Arc<dyn RateConfigReader>,
    notifier: OptionalDispatcher,
}

impl QuoteApi {
    pub fn new(
        handoff_repo: Arc<HandoffRepository>,
        quote_repo: Arc<QuoteRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        config: Arc<dyn RateConfigReader>,
        notifier: OptionalDispatcher,
    ) -> Self {
        Self {
            handoff_repo,
            quote_repo,
            action_log_repo,
            config,
            notifier,
        }
    }

    // ==========================================
    // 写操作
    // ==========================================

    /// 新建报价（首次保存）
    #[instrument(skip(self, input, caller), fields(agent_id = %caller.agent_id))]
    pub fn create_quote(
        &self,
        handoff_id: &str,
        input: QuoteInput,
        caller: &AgentIdentity,
    ) -> ApiResult<QuoteSaveResult> {
        require_non_empty("handoff_id", handoff_id)?;

        let handoff = self.load_handoff(handoff_id)?;
        require_assignee_or_admin(&handoff, caller)?;
        QuoteCalculator::can_submit(handoff.status, false, caller, &input.items, &input.rates)
            .map_err(|b| {
                tracing::warn!(handoff_id, reason = %b, "报价提交被拒绝");
                ApiError::from(b)
            })?;

        let ts = now();
        let totals = QuoteCalculator::compute_totals(&input.items, &input.rates);
        let mut quote = Quote {
            quote_id: uuid::Uuid::new_v4().to_string(),
            handoff_id: handoff_id.to_string(),
            token: uuid::Uuid::new_v4().simple().to_string(),
            agent_id: caller.agent_id.clone(),
            items: input.items,
            rates: input.rates,
            payment_purpose: input.payment_purpose,
            agent_note: input.agent_note,
            read_only: false,
            totals,
            created_at: ts,
            updated_at: ts,
            sent_at: None,
            seq_no: 0,
        };

        self.quote_repo
            .insert(&mut quote)
            .map_err(read_only_as_permission)?;

        record_action(
            &self.action_log_repo,
            ActionLog::now(
                ActionType::CreateQuote,
                Some(handoff_id),
                &caller.agent_id,
                Some(serde_json::json!({
                    "quote_id": quote.quote_id,
                    "seq_no": quote.seq_no,
                    "item_count": quote.items.len(),
                    "total_due_ngn": quote.totals.total_due_ngn,
                })),
                None,
            ),
        );
        tracing::info!(handoff_id, quote_id = %quote.quote_id, total_due_ngn = quote.totals.total_due_ngn, "报价已创建");
        Ok(QuoteSaveResult::from(&quote))
    }

    /// 覆盖保存已有报价（同一编辑会话的后续保存）
    #[instrument(skip(self, input, caller), fields(agent_id = %caller.agent_id))]
    pub fn update_quote(
        &self,
        quote_id: &str,
        input: QuoteInput,
        caller: &AgentIdentity,
    ) -> ApiResult<QuoteSaveResult> {
        require_non_empty("quote_id", quote_id)?;

        let mut quote = self.load_quote(quote_id)?;
        let handoff = self.load_handoff(&quote.handoff_id)?;
        require_assignee_or_admin(&handoff, caller)?;
        QuoteCalculator::can_submit(handoff.status, quote.read_only, caller, &input.items, &input.rates)
            .map_err(|b| {
                tracing::warn!(quote_id, reason = %b, "报价保存被拒绝");
                ApiError::from(b)
            })?;

        quote.totals = QuoteCalculator::compute_totals(&input.items, &input.rates);
        quote.items = input.items;
        quote.rates = input.rates;
        quote.payment_purpose = input.payment_purpose;
        quote.agent_note = input.agent_note;
        quote.updated_at = now();

        self.quote_repo
            .update(&quote)
            .map_err(read_only_as_permission)?;

        record_action(
            &self.action_log_repo,
            ActionLog::now(
                ActionType::UpdateQuote,
                Some(&quote.handoff_id),
                &caller.agent_id,
                Some(serde_json::json!({
                    "quote_id": quote.quote_id,
                    "item_count": quote.items.len(),
                    "total_due_ngn": quote.totals.total_due_ngn,
                })),
                None,
            ),
        );
        tracing::info!(quote_id, total_due_ngn = quote.totals.total_due_ngn, "报价已更新");
        Ok(QuoteSaveResult::from(&quote))
    }

    /// 保存草稿：未保存过则新建并回填 quote_id，否则更新同一报价
    pub fn save_draft(
        &self,
        draft: &mut QuoteDraft,
        caller: &AgentIdentity,
    ) -> ApiResult<QuoteSaveResult> {
        let input = QuoteInput::from(&*draft);
        let result = match draft.quote_id.clone() {
            Some(quote_id) => self.update_quote(&quote_id, input, caller)?,
            None => self.create_quote(&draft.handoff_id, input, caller)?,
        };
        draft.quote_id = Some(result.quote_id.clone());
        Ok(result)
    }

    /// 发送给客户（首次发送时间保留）
    #[instrument(skip(self, caller), fields(agent_id = %caller.agent_id))]
    pub fn send_quote(&self, quote_id: &str, caller: &AgentIdentity) -> ApiResult<Quote> {
        let (quote, handoff) = self.load_writable(quote_id, caller)?;

        self.quote_repo.mark_sent(quote_id, now())?;
        let sent = self.load_quote(quote_id)?;

        record_action(
            &self.action_log_repo,
            ActionLog::now(
                ActionType::SendQuote,
                Some(&handoff.handoff_id),
                &caller.agent_id,
                Some(serde_json::json!({ "quote_id": quote_id, "token": quote.token })),
                None,
            ),
        );
        self.notifier.notify(OpsEvent::QuoteSent {
            quote_id: quote_id.to_string(),
            handoff_id: handoff.handoff_id.clone(),
            token: quote.token.clone(),
        });
        tracing::info!(quote_id, "报价已发送");
        Ok(sent)
    }

    /// 设置只读（管理员）
    pub fn set_quote_read_only(&self, quote_id: &str, admin: &AgentIdentity) -> ApiResult<()> {
        require_admin(admin, "设置报价只读")?;
        let quote = self.load_quote(quote_id)?;
        if quote.read_only {
            return Ok(());
        }
        self.quote_repo.set_read_only(quote_id)?;

        record_action(
            &self.action_log_repo,
            ActionLog::now(
                ActionType::SetQuoteReadOnly,
                Some(&quote.handoff_id),
                &admin.agent_id,
                Some(serde_json::json!({ "quote_id": quote_id })),
                None,
            ),
        );
        Ok(())
    }

    /// 登记收款
    ///
    /// # 返回
    /// - 登记后的货款余额
    #[instrument(skip(self, caller), fields(agent_id = %caller.agent_id))]
    pub fn record_payment(
        &self,
        quote_id: &str,
        amount_ngn: f64,
        purpose: PaymentPurpose,
        caller: &AgentIdentity,
    ) -> ApiResult<f64> {
        if !(amount_ngn.is_finite() && amount_ngn > 0.0) {
            return Err(ApiError::ValidationError(format!(
                "收款金额必须大于0 (amount_ngn={})",
                amount_ngn
            )));
        }
        let (quote, handoff) = self.load_writable(quote_id, caller)?;

        let payment = QuotePayment {
            payment_id: uuid::Uuid::new_v4().to_string(),
            quote_id: quote_id.to_string(),
            amount_ngn,
            purpose,
            recorded_by: caller.agent_id.clone(),
            recorded_at: now(),
        };
        self.quote_repo
            .insert_payment(&payment)
            .map_err(read_only_as_permission)?;

        let payments = self.quote_repo.list_payments(quote_id)?;
        let balance = QuoteCalculator::product_balance(&quote.totals, &payments);

        record_action(
            &self.action_log_repo,
            ActionLog::now(
                ActionType::RecordPayment,
                Some(&handoff.handoff_id),
                &caller.agent_id,
                Some(serde_json::json!({
                    "quote_id": quote_id,
                    "amount_ngn": amount_ngn,
                    "purpose": purpose,
                    "product_balance": balance,
                })),
                None,
            ),
        );
        tracing::info!(quote_id, amount_ngn, purpose = %purpose, balance, "收款已登记");
        Ok(balance)
    }

    /// 登记收款（金额与用途为前端原始文本）
    pub fn record_payment_text(
        &self,
        quote_id: &str,
        amount_text: &str,
        purpose_text: &str,
        caller: &AgentIdentity,
    ) -> ApiResult<f64> {
        let amount = parse_positive_amount("amount_ngn", amount_text)?;
        let purpose = PaymentPurpose::parse(purpose_text).ok_or_else(|| {
            ApiError::ValidationError(format!("未知的收款用途: '{}'", purpose_text))
        })?;
        self.record_payment(quote_id, amount, purpose, caller)
    }

    // ==========================================
    // 读操作
    // ==========================================

    pub fn get_quote(&self, quote_id: &str) -> ApiResult<Quote> {
        require_non_empty("quote_id", quote_id)?;
        self.load_quote(quote_id)
    }

    /// 客户通过公开 token 查看报价
    pub fn get_quote_by_token(&self, token: &str) -> ApiResult<Quote> {
        require_non_empty("token", token)?;
        self.quote_repo
            .find_by_token(token)?
            .ok_or_else(|| ApiError::NotFound(format!("报价 token={} 不存在", token)))
    }

    pub fn list_quotes_by_handoff(&self, handoff_id: &str) -> ApiResult<Vec<Quote>> {
        require_non_empty("handoff_id", handoff_id)?;
        Ok(self.quote_repo.list_by_handoff(handoff_id)?)
    }

    pub fn list_quotes_by_agent(&self, agent_id: &str) -> ApiResult<Vec<Quote>> {
        require_non_empty("agent_id", agent_id)?;
        Ok(self.quote_repo.list_by_agent(agent_id)?)
    }

    pub fn list_payments(&self, quote_id: &str) -> ApiResult<Vec<QuotePayment>> {
        require_non_empty("quote_id", quote_id)?;
        Ok(self.quote_repo.list_payments(quote_id)?)
    }

    /// 货款余额（≤0 表示已结清）
    pub fn product_balance(&self, quote_id: &str) -> ApiResult<f64> {
        let quote = self.load_quote(quote_id)?;
        let payments = self.quote_repo.list_payments(quote_id)?;
        Ok(QuoteCalculator::product_balance(&quote.totals, &payments))
    }

    /// 定金应收
    pub fn deposit_due(&self, quote_id: &str) -> ApiResult<f64> {
        Ok(self.load_quote(quote_id)?.deposit_due_ngn())
    }

    /// 由配置中心生成默认费率（每次调用实时读取）
    pub async fn default_rate_config(&self, unit: ShippingRateUnit) -> ApiResult<RateConfig> {
        let deposit_percent = config_error(self.config.get_deposit_percent().await)?;
        Ok(RateConfig {
            exchange_rate_rmb: config_error(self.config.get_exchange_rate_rmb().await)?,
            exchange_rate_usd: config_error(self.config.get_exchange_rate_usd().await)?,
            shipping_rate_usd: config_error(self.config.get_shipping_rate_usd(unit).await)?,
            shipping_rate_unit: unit,
            markup_percent: config_error(self.config.get_markup_percent().await)?,
            agent_percent: config_error(self.config.get_agent_percent().await)?,
            agent_commitment_percent: config_error(
                self.config.get_agent_commitment_percent().await,
            )?,
            commitment_due: 0.0,
            deposit_enabled: deposit_percent > 0.0,
            deposit_percent,
        })
    }

    /// 以默认费率开启新草稿
    pub async fn new_draft(&self, handoff_id: &str, unit: ShippingRateUnit) -> ApiResult<QuoteDraft> {
        require_non_empty("handoff_id", handoff_id)?;
        let rates = self.default_rate_config(unit).await?;
        Ok(QuoteDraft::new(handoff_id, rates))
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    /// 加载报价并校验可写（非只读、项目非终态、调用方有权限）
    fn load_writable(&self, quote_id: &str, caller: &AgentIdentity) -> ApiResult<(Quote, Handoff)> {
        require_non_empty("quote_id", quote_id)?;
        let quote = self.load_quote(quote_id)?;
        let handoff = self.load_handoff(&quote.handoff_id)?;
        require_assignee_or_admin(&handoff, caller)?;

        if handoff.status.is_terminal() {
            return Err(ApiError::PermissionDenied(format!(
                "项目已进入终态({})，报价只读",
                handoff.status
            )));
        }
        if quote.read_only {
            return Err(ApiError::PermissionDenied("报价已设为只读".to_string()));
        }
        Ok((quote, handoff))
    }

    fn load_quote(&self, quote_id: &str) -> ApiResult<Quote> {
        self.quote_repo
            .find_by_id(quote_id)?
            .ok_or_else(|| ApiError::not_found("Quote", quote_id))
    }

    fn load_handoff(&self, handoff_id: &str) -> ApiResult<Handoff> {
        self.handoff_repo
            .find_by_id(handoff_id)?
            .ok_or_else(|| ApiError::not_found("Handoff", handoff_id))
    }
}

/// 写入时发现报价只读 / 项目终结，按只读语义返回
fn read_only_as_permission(err: RepositoryError) -> ApiError {
    match err {
        RepositoryError::StatusChanged { entity, id, actual, .. } => ApiError::PermissionDenied(
            format!("{}(id={}) 已不可编辑（{}）", entity, id, actual),
        ),
        other => other.into(),
    }
}
