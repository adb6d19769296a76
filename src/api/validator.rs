// ==========================================
// 采购撮合运营平台 - 边界输入解析
// ==========================================
// 职责: 文本形式的金额/数量在进入计算前严格解析
// 红线: 解析失败返回 ValidationError 并指明字段，不做静默兜底
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::quote::{QuoteItem, RawQuoteItem};

/// 解析非负金额
///
/// # 规则
/// - 去除首尾空白与千分位逗号
/// - 空串视为 0（可选数值字段未填写）
/// - 非数字 / NaN / 无穷 / 负数 → ValidationError
pub fn parse_amount(field: &str, text: &str) -> ApiResult<f64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return Ok(0.0);
    }
    let value: f64 = cleaned
        .parse()
        .map_err(|_| ApiError::ValidationError(format!("{}不是有效数字: '{}'", field, text)))?;
    if !value.is_finite() {
        return Err(ApiError::ValidationError(format!(
            "{}不是有限数值: '{}'",
            field, text
        )));
    }
    if value < 0.0 {
        return Err(ApiError::ValidationError(format!(
            "{}不能为负数: {}",
            field, value
        )));
    }
    Ok(value)
}

/// 解析正金额（提现、收款）
pub fn parse_positive_amount(field: &str, text: &str) -> ApiResult<f64> {
    let value = parse_amount(field, text)?;
    if value <= 0.0 {
        return Err(ApiError::ValidationError(format!(
            "{}必须大于0: '{}'",
            field, text
        )));
    }
    Ok(value)
}

/// 解析数量（非负整数，必填）
pub fn parse_quantity(field: &str, text: &str) -> ApiResult<i64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ApiError::ValidationError(format!("{}不能为空", field)));
    }
    let value: i64 = trimmed
        .parse()
        .map_err(|_| ApiError::ValidationError(format!("{}必须为整数: '{}'", field, text)))?;
    if value < 0 {
        return Err(ApiError::ValidationError(format!(
            "{}不能为负数: {}",
            field, value
        )));
    }
    Ok(value)
}

/// 解析前端明细行
///
/// 字段名带行号（从 1 开始），便于定位
pub fn parse_raw_items(raw: &[RawQuoteItem]) -> ApiResult<Vec<QuoteItem>> {
    raw.iter()
        .enumerate()
        .map(|(idx, r)| {
            let row = idx + 1;
            Ok(QuoteItem {
                product_name: r.product_name.trim().to_string(),
                description: r
                    .description
                    .as_ref()
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty()),
                quantity: parse_quantity(&format!("items[{}].quantity", row), &r.quantity)?,
                unit_price_rmb: parse_amount(
                    &format!("items[{}].unit_price_rmb", row),
                    &r.unit_price_rmb,
                )?,
                unit_weight_kg: parse_amount(
                    &format!("items[{}].unit_weight_kg", row),
                    &r.unit_weight_kg,
                )?,
                unit_cbm: parse_amount(&format!("items[{}].unit_cbm", row), &r.unit_cbm)?,
                local_transport_rmb: parse_amount(
                    &format!("items[{}].local_transport_rmb", row),
                    &r.local_transport_rmb,
                )?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ErrorKind;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("amount", " 1,250.50 ").unwrap(), 1250.5);
        assert_eq!(parse_amount("amount", "").unwrap(), 0.0);

        for bad in ["abc", "NaN", "inf", "-3"] {
            let err = parse_amount("amount", bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "input={}", bad);
            assert!(err.to_string().contains("amount"));
        }

        assert!(parse_positive_amount("amount", "0").is_err());
        assert!(parse_positive_amount("amount", "").is_err());
    }

    #[test]
    fn test_parse_raw_items_names_offending_field() {
        let ok = RawQuoteItem {
            product_name: " Ceiling fan ".to_string(),
            description: Some("  ".to_string()),
            quantity: "2".to_string(),
            unit_price_rmb: "100".to_string(),
            unit_weight_kg: "1".to_string(),
            unit_cbm: "0.01".to_string(),
            local_transport_rmb: "10".to_string(),
        };
        let bad = RawQuoteItem {
            quantity: "2.5".to_string(),
            ..ok.clone()
        };

        let items = parse_raw_items(&[ok.clone()]).unwrap();
        assert_eq!(items[0].product_name, "Ceiling fan");
        assert_eq!(items[0].description, None);
        assert_eq!(items[0].quantity, 2);

        let err = parse_raw_items(&[ok, bad]).unwrap_err();
        assert!(err.to_string().contains("items[2].quantity"));
    }
}
