// ==========================================
// 采购撮合运营平台 - 费率配置读取 Trait
// ==========================================
// 职责: 定义报价/台账所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// 红线: 每次计算时读取，核心内不做无限期缓存
// ==========================================

use crate::domain::types::ShippingRateUnit;
use async_trait::async_trait;
use std::error::Error;

pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// RateConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait RateConfigReader: Send + Sync {
    // ===== 汇率 =====

    /// 1 RMB 折合结算币种
    ///
    /// # 默认值
    /// - 230
    async fn get_exchange_rate_rmb(&self) -> ConfigResult<f64>;

    /// 1 USD 折合结算币种
    ///
    /// # 默认值
    /// - 1600
    async fn get_exchange_rate_usd(&self) -> ConfigResult<f64>;

    // ===== 运费 =====

    /// 运费单价（USD / kg 或 USD / cbm）
    ///
    /// # 默认值
    /// - per_kg: 5
    /// - per_cbm: 350
    async fn get_shipping_rate_usd(&self, unit: ShippingRateUnit) -> ConfigResult<f64>;

    // ===== 比例 =====

    /// 加价比例（%）
    async fn get_markup_percent(&self) -> ConfigResult<f64>;

    /// 代理佣金比例（%）
    async fn get_agent_percent(&self) -> ConfigResult<f64>;

    /// 佣金锁定比例（%）
    async fn get_agent_commitment_percent(&self) -> ConfigResult<f64>;

    /// 定金比例（%）
    async fn get_deposit_percent(&self) -> ConfigResult<f64>;

    // ===== 提现 =====

    /// 最低提现金额
    async fn get_min_payout(&self) -> ConfigResult<f64>;

    /// 提现币种
    async fn get_payout_currency(&self) -> ConfigResult<String>;
}
