// ==========================================
// 采购撮合运营平台 - 报价数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑（只读校验在 API 层）
// 说明: 报价主表 + 明细行 + 收款记录；明细按 position 保序
// ==========================================

use crate::domain::quote::{Quote, QuoteItem, QuotePayment, QuoteTotals, RateConfig};
use crate::domain::types::{PaymentPurpose, ShippingRateUnit};
use crate::repository::error::{
    enum_column, fmt_ts, parse_opt_ts, parse_ts, RepositoryError, RepositoryResult,
};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Result as SqliteResult, Row, Transaction};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT quote_id, handoff_id, token, agent_id,
           exchange_rate_rmb, exchange_rate_usd, shipping_rate_usd, shipping_rate_unit,
           markup_percent, agent_percent, agent_commitment_percent, commitment_due,
           deposit_enabled, deposit_percent,
           payment_purpose, agent_note, read_only,
           total_product_rmb, total_weight_kg, total_cbm, total_product_ngn,
           total_shipping_usd, total_shipping_ngn, total_markup_ngn, total_due_ngn,
           created_at, updated_at, sent_at, seq_no
    FROM quote
"#;

// ==========================================
// QuoteRepository - 报价仓储
// ==========================================
pub struct QuoteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl QuoteRepository {
    /// 创建新的QuoteRepository实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 新建报价（自动分配项目内 seq_no）
    ///
    /// 说明：
    /// - 在同一事务内校验项目未终结、查询 MAX(seq_no) 并写入主表与明细，保证原子性。
    /// - 该方法会覆盖传入的 `quote.seq_no`。
    pub fn insert(&self, quote: &mut Quote) -> RepositoryResult<String> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let handoff_status: String = tx
            .query_row(
                "SELECT status FROM handoff WHERE handoff_id = ?1",
                params![quote.handoff_id],
                |row| row.get(0),
            )
            .map_err(|_| RepositoryError::NotFound {
                entity: "Handoff".to_string(),
                id: quote.handoff_id.clone(),
            })?;
        if handoff_status == "delivered" || handoff_status == "cancelled" {
            return Err(RepositoryError::StatusChanged {
                entity: "Handoff".to_string(),
                id: quote.handoff_id.clone(),
                expected: "editable".to_string(),
                actual: handoff_status,
            });
        }

        let max_seq: Option<i32> = tx.query_row(
            "SELECT MAX(seq_no) FROM quote WHERE handoff_id = ?1",
            params![quote.handoff_id],
            |row| row.get(0),
        )?;
        quote.seq_no = max_seq.unwrap_or(0) + 1;

        let r = &quote.rates;
        let t = &quote.totals;
        tx.execute(
            r#"
            INSERT INTO quote (
                quote_id, handoff_id, token, agent_id,
                exchange_rate_rmb, exchange_rate_usd, shipping_rate_usd, shipping_rate_unit,
                markup_percent, agent_percent, agent_commitment_percent, commitment_due,
                deposit_enabled, deposit_percent,
                payment_purpose, agent_note, read_only,
                total_product_rmb, total_weight_kg, total_cbm, total_product_ngn,
                total_shipping_usd, total_shipping_ngn, total_markup_ngn, total_due_ngn,
                created_at, updated_at, sent_at, seq_no
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7, ?8,
                ?9, ?10, ?11, ?12,
                ?13, ?14,
                ?15, ?16, ?17,
                ?18, ?19, ?20, ?21,
                ?22, ?23, ?24, ?25,
                ?26, ?27, ?28, ?29
            )
            "#,
            params![
                quote.quote_id,
                quote.handoff_id,
                quote.token,
                quote.agent_id,
                r.exchange_rate_rmb,
                r.exchange_rate_usd,
                r.shipping_rate_usd,
                r.shipping_rate_unit.as_str(),
                r.markup_percent,
                r.agent_percent,
                r.agent_commitment_percent,
                r.commitment_due,
                r.deposit_enabled as i64,
                r.deposit_percent,
                quote.payment_purpose.as_str(),
                quote.agent_note,
                quote.read_only as i64,
                t.total_product_rmb,
                t.total_weight_kg,
                t.total_cbm,
                t.total_product_ngn,
                t.total_shipping_usd,
                t.total_shipping_ngn,
                t.total_markup_ngn,
                t.total_due_ngn,
                fmt_ts(&quote.created_at),
                fmt_ts(&quote.updated_at),
                quote.sent_at.as_ref().map(fmt_ts),
                quote.seq_no,
            ],
        )?;

        write_items(&tx, &quote.quote_id, &quote.items)?;
        touch_handoff(&tx, &quote.quote_id)?;

        tx.commit()?;
        Ok(quote.quote_id.clone())
    }

    /// 覆盖保存已有报价（同一编辑会话的后续保存）
    ///
    /// 主表费率/汇总/备注与全部明细在同一事务内替换；
    /// 写入时重新校验只读标记与项目终态
    ///
    /// # 错误
    /// - `RepositoryError::StatusChanged`: 报价已只读或项目已终结
    /// - `RepositoryError::NotFound`: quote_id 不存在
    pub fn update(&self, quote: &Quote) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let r = &quote.rates;
        let t = &quote.totals;
        let rows = tx.execute(
            r#"
            UPDATE quote
            SET exchange_rate_rmb = ?1, exchange_rate_usd = ?2,
                shipping_rate_usd = ?3, shipping_rate_unit = ?4,
                markup_percent = ?5, agent_percent = ?6,
                agent_commitment_percent = ?7, commitment_due = ?8,
                deposit_enabled = ?9, deposit_percent = ?10,
                payment_purpose = ?11, agent_note = ?12,
                total_product_rmb = ?13, total_weight_kg = ?14, total_cbm = ?15,
                total_product_ngn = ?16, total_shipping_usd = ?17, total_shipping_ngn = ?18,
                total_markup_ngn = ?19, total_due_ngn = ?20,
                updated_at = ?21
            WHERE quote_id = ?22
              AND read_only = 0
              AND NOT EXISTS (
                  SELECT 1 FROM handoff h
                  WHERE h.handoff_id = quote.handoff_id
                    AND h.status IN ('delivered', 'cancelled')
              )
            "#,
            params![
                r.exchange_rate_rmb,
                r.exchange_rate_usd,
                r.shipping_rate_usd,
                r.shipping_rate_unit.as_str(),
                r.markup_percent,
                r.agent_percent,
                r.agent_commitment_percent,
                r.commitment_due,
                r.deposit_enabled as i64,
                r.deposit_percent,
                quote.payment_purpose.as_str(),
                quote.agent_note,
                t.total_product_rmb,
                t.total_weight_kg,
                t.total_cbm,
                t.total_product_ngn,
                t.total_shipping_usd,
                t.total_shipping_ngn,
                t.total_markup_ngn,
                t.total_due_ngn,
                fmt_ts(&quote.updated_at),
                quote.quote_id,
            ],
        )?;

        if rows == 0 {
            let exists: Result<i64, _> = tx.query_row(
                "SELECT 1 FROM quote WHERE quote_id = ?1",
                params![quote.quote_id],
                |row| row.get(0),
            );
            return match exists {
                Ok(_) => Err(RepositoryError::StatusChanged {
                    entity: "Quote".to_string(),
                    id: quote.quote_id.clone(),
                    expected: "editable".to_string(),
                    actual: "read_only".to_string(),
                }),
                Err(_) => Err(RepositoryError::NotFound {
                    entity: "Quote".to_string(),
                    id: quote.quote_id.clone(),
                }),
            };
        }

        tx.execute(
            "DELETE FROM quote_item WHERE quote_id = ?1",
            params![quote.quote_id],
        )?;
        write_items(&tx, &quote.quote_id, &quote.items)?;
        touch_handoff(&tx, &quote.quote_id)?;

        tx.commit()?;
        Ok(())
    }

    /// 标记已发送给客户（首次发送时间保留）
    pub fn mark_sent(&self, quote_id: &str, sent_at: NaiveDateTime) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE quote SET sent_at = COALESCE(sent_at, ?1) WHERE quote_id = ?2",
            params![fmt_ts(&sent_at), quote_id],
        )?;
        Ok(rows)
    }

    /// 设置只读标记
    pub fn set_read_only(&self, quote_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE quote SET read_only = 1 WHERE quote_id = ?1",
            params![quote_id],
        )?;
        Ok(rows)
    }

    /// 记录收款
    ///
    /// 与 update 相同，写入时重新校验只读标记与项目终态
    ///
    /// # 错误
    /// - `RepositoryError::StatusChanged`: 报价已只读或项目已终结
    /// - `RepositoryError::NotFound`: quote_id 不存在
    pub fn insert_payment(&self, payment: &QuotePayment) -> RepositoryResult<String> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let rows = tx.execute(
            r#"
            INSERT INTO quote_payment (
                payment_id, quote_id, amount_ngn, purpose, recorded_by, recorded_at
            )
            SELECT ?1, q.quote_id, ?3, ?4, ?5, ?6
            FROM quote q
            WHERE q.quote_id = ?2
              AND q.read_only = 0
              AND NOT EXISTS (
                  SELECT 1 FROM handoff h
                  WHERE h.handoff_id = q.handoff_id
                    AND h.status IN ('delivered', 'cancelled')
              )
            "#,
            params![
                payment.payment_id,
                payment.quote_id,
                payment.amount_ngn,
                payment.purpose.as_str(),
                payment.recorded_by,
                fmt_ts(&payment.recorded_at),
            ],
        )?;

        if rows == 0 {
            let exists: Result<i64, _> = tx.query_row(
                "SELECT 1 FROM quote WHERE quote_id = ?1",
                params![payment.quote_id],
                |row| row.get(0),
            );
            return match exists {
                Ok(_) => Err(RepositoryError::StatusChanged {
                    entity: "Quote".to_string(),
                    id: payment.quote_id.clone(),
                    expected: "editable".to_string(),
                    actual: "read_only".to_string(),
                }),
                Err(_) => Err(RepositoryError::NotFound {
                    entity: "Quote".to_string(),
                    id: payment.quote_id.clone(),
                }),
            };
        }

        touch_handoff(&tx, &payment.quote_id)?;

        tx.commit()?;
        Ok(payment.payment_id.clone())
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, quote_id: &str) -> RepositoryResult<Option<Quote>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE quote_id = ?1", SELECT_COLUMNS);
        find_one(&conn, &sql, quote_id)
    }

    pub fn find_by_token(&self, token: &str) -> RepositoryResult<Option<Quote>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE token = ?1", SELECT_COLUMNS);
        find_one(&conn, &sql, token)
    }

    /// 项目当前报价（seq_no 最大者）
    pub fn find_current_for_handoff(&self, handoff_id: &str) -> RepositoryResult<Option<Quote>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE handoff_id = ?1 ORDER BY seq_no DESC LIMIT 1",
            SELECT_COLUMNS
        );
        find_one(&conn, &sql, handoff_id)
    }

    /// 项目全部历史报价（新 → 旧）
    pub fn list_by_handoff(&self, handoff_id: &str) -> RepositoryResult<Vec<Quote>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE handoff_id = ?1 ORDER BY seq_no DESC", SELECT_COLUMNS);
        find_many(&conn, &sql, handoff_id)
    }

    /// 某代理创建的全部报价（新 → 旧）
    pub fn list_by_agent(&self, agent_id: &str) -> RepositoryResult<Vec<Quote>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE agent_id = ?1 ORDER BY created_at DESC, seq_no DESC",
            SELECT_COLUMNS
        );
        find_many(&conn, &sql, agent_id)
    }

    pub fn list_payments(&self, quote_id: &str) -> RepositoryResult<Vec<QuotePayment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT payment_id, quote_id, amount_ngn, purpose, recorded_by, recorded_at
            FROM quote_payment
            WHERE quote_id = ?1
            ORDER BY recorded_at ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![quote_id], map_payment_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }
}

// ==========================================
// 内部辅助
// ==========================================

/// 报价/收款变动时递增所属项目的 revision
///
/// 发货守卫依赖报价与收款计算货款余额；项目写入按 revision 校验，
/// 余额读取之后若有报价或收款落库，发货写入会因版本不符而重读重判
fn touch_handoff(tx: &Transaction, quote_id: &str) -> RepositoryResult<()> {
    tx.execute(
        r#"
        UPDATE handoff SET revision = revision + 1
        WHERE handoff_id = (SELECT handoff_id FROM quote WHERE quote_id = ?1)
        "#,
        params![quote_id],
    )?;
    Ok(())
}

fn write_items(tx: &Transaction, quote_id: &str, items: &[QuoteItem]) -> RepositoryResult<()> {
    let mut stmt = tx.prepare(
        r#"
        INSERT INTO quote_item (
            quote_id, position, product_name, description, quantity,
            unit_price_rmb, unit_weight_kg, unit_cbm, local_transport_rmb
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )?;
    for (position, item) in items.iter().enumerate() {
        stmt.execute(params![
            quote_id,
            position as i64,
            item.product_name,
            item.description,
            item.quantity,
            item.unit_price_rmb,
            item.unit_weight_kg,
            item.unit_cbm,
            item.local_transport_rmb,
        ])?;
    }
    Ok(())
}

fn load_items(conn: &Connection, quote_id: &str) -> RepositoryResult<Vec<QuoteItem>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT product_name, description, quantity,
               unit_price_rmb, unit_weight_kg, unit_cbm, local_transport_rmb
        FROM quote_item
        WHERE quote_id = ?1
        ORDER BY position ASC
        "#,
    )?;
    let items = stmt
        .query_map(params![quote_id], |row| {
            Ok(QuoteItem {
                product_name: row.get(0)?,
                description: row.get(1)?,
                quantity: row.get(2)?,
                unit_price_rmb: row.get(3)?,
                unit_weight_kg: row.get(4)?,
                unit_cbm: row.get(5)?,
                local_transport_rmb: row.get(6)?,
            })
        })?
        .collect::<SqliteResult<Vec<_>>>()?;
    Ok(items)
}

fn find_one(conn: &Connection, sql: &str, key: &str) -> RepositoryResult<Option<Quote>> {
    let header = match conn.query_row(sql, params![key], map_row) {
        Ok(q) => q,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    with_items(conn, header).map(Some)
}

fn find_many(conn: &Connection, sql: &str, key: &str) -> RepositoryResult<Vec<Quote>> {
    let mut stmt = conn.prepare(sql)?;
    let headers = stmt
        .query_map(params![key], map_row)?
        .collect::<SqliteResult<Vec<_>>>()?;
    headers
        .into_iter()
        .map(|q| with_items(conn, q))
        .collect()
}

fn with_items(conn: &Connection, mut quote: Quote) -> RepositoryResult<Quote> {
    quote.items = load_items(conn, &quote.quote_id)?;
    Ok(quote)
}

/// 主表行映射（items 由 load_items 补齐）
fn map_row(row: &Row) -> SqliteResult<Quote> {
    let unit_str: String = row.get(7)?;
    let shipping_rate_unit = enum_column(7, &unit_str, ShippingRateUnit::parse(&unit_str))?;
    let purpose_str: String = row.get(14)?;
    let payment_purpose = enum_column(14, &purpose_str, PaymentPurpose::parse(&purpose_str))?;
    let deposit_enabled: i64 = row.get(12)?;
    let read_only: i64 = row.get(16)?;
    let created_at: String = row.get(25)?;
    let updated_at: String = row.get(26)?;

    Ok(Quote {
        quote_id: row.get(0)?,
        handoff_id: row.get(1)?,
        token: row.get(2)?,
        agent_id: row.get(3)?,
        items: Vec::new(),
        rates: RateConfig {
            exchange_rate_rmb: row.get(4)?,
            exchange_rate_usd: row.get(5)?,
            shipping_rate_usd: row.get(6)?,
            shipping_rate_unit,
            markup_percent: row.get(8)?,
            agent_percent: row.get(9)?,
            agent_commitment_percent: row.get(10)?,
            commitment_due: row.get(11)?,
            deposit_enabled: deposit_enabled != 0,
            deposit_percent: row.get(13)?,
        },
        payment_purpose,
        agent_note: row.get(15)?,
        read_only: read_only != 0,
        totals: QuoteTotals {
            total_product_rmb: row.get(17)?,
            total_weight_kg: row.get(18)?,
            total_cbm: row.get(19)?,
            total_product_ngn: row.get(20)?,
            total_shipping_usd: row.get(21)?,
            total_shipping_ngn: row.get(22)?,
            total_markup_ngn: row.get(23)?,
            total_due_ngn: row.get(24)?,
        },
        created_at: parse_ts(25, &created_at)?,
        updated_at: parse_ts(26, &updated_at)?,
        sent_at: parse_opt_ts(27, row.get(27)?)?,
        seq_no: row.get(28)?,
    })
}

fn map_payment_row(row: &Row) -> SqliteResult<QuotePayment> {
    let purpose_str: String = row.get(3)?;
    let recorded_at: String = row.get(5)?;
    Ok(QuotePayment {
        payment_id: row.get(0)?,
        quote_id: row.get(1)?,
        amount_ngn: row.get(2)?,
        purpose: enum_column(3, &purpose_str, PaymentPurpose::parse(&purpose_str))?,
        recorded_by: row.get(4)?,
        recorded_at: parse_ts(5, &recorded_at)?,
    })
}
