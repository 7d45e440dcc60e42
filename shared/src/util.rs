use rust_decimal::{Decimal, RoundingStrategy};

/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Monetary values are kept at 2 decimal places, half away from zero
pub const MONEY_DECIMAL_PLACES: u32 = 2;

/// Round a monetary amount to [`MONEY_DECIMAL_PLACES`]
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Treat blank strings coming off the wire as missing
pub(crate) fn deserialize_blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}
