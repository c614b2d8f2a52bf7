use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// -----------------------------------------------
// DOMAIN MODELS
// -----------------------------------------------

/// One calculate action: which ticker and which expiration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub ticker: String,
    /// `None` asks the provider for its nearest expiration.
    pub expiration: Option<NaiveDate>,
}

impl QuoteRequest {
    pub fn new(ticker: &str, expiration: Option<NaiveDate>) -> Self {
        Self {
            ticker: crate::app_config::normalize_ticker(ticker),
            expiration,
        }
    }

    /// Unix timestamp (seconds, midnight UTC) the provider uses for this expiration.
    pub fn expiration_ts(&self) -> Option<i64> {
        self.expiration
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc().timestamp())
    }
}

/// Calendar date (UTC) of a unix timestamp in seconds.
pub fn ts_to_date(ts: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp(ts, 0).map(|dt| dt.date_naive())
}

/// Calls and puts for one strike, joined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionRow {
    pub strike: f64,
    pub call_oi: u64,
    pub call_volume: u64,
    pub call_iv: Option<f64>,
    pub put_oi: u64,
    pub put_volume: u64,
    pub put_iv: Option<f64>,
}

impl OptionRow {
    pub fn empty(strike: f64) -> Self {
        Self {
            strike,
            call_oi: 0,
            call_volume: 0,
            call_iv: None,
            put_oi: 0,
            put_volume: 0,
            put_iv: None,
        }
    }

    /// Call open interest minus put open interest, saturating at the i64 range.
    pub fn d_oi(&self) -> i64 {
        let diff = self.call_oi as i128 - self.put_oi as i128;
        diff.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

/// An option row annotated with its Net GEX.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetGexRow {
    #[serde(flatten)]
    pub base: OptionRow,
    pub d_oi: i64,
    pub iv_used: f64,
    pub net_gex: f64,
}

/// The provider response reshaped for one expiration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub symbol: String,
    pub spot: f64,
    pub snapshot_ts: i64,
    pub expiration_ts: Option<i64>,
    pub expirations: Vec<i64>,
    pub rows: Vec<OptionRow>,
}

// -----------------------------------------------
// PROVIDER WIRE FORMAT (Yahoo v7 options)
// -----------------------------------------------

/// Top-level provider payload. RapidAPI serves either envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptionsEnvelope {
    #[serde(rename = "optionChain")]
    pub option_chain: Option<ChainNode>,

    pub body: Option<Vec<ChainResult>>,

    /// RapidAPI reports quota and subscription failures here with HTTP 200.
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainNode {
    pub result: Option<Vec<ChainResult>>,
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainResult {
    pub underlying_symbol: Option<String>,

    #[serde(default, deserialize_with = "de_opt_i64_vec")]
    pub expiration_dates: Option<Vec<i64>>,

    pub quote: Option<QuoteNode>,

    pub options: Option<Vec<OptionsBlock>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteNode {
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub regular_market_price: Option<f64>,

    #[serde(default, deserialize_with = "de_opt_f64")]
    pub regular_market_previous_close: Option<f64>,

    #[serde(default, deserialize_with = "de_opt_f64")]
    pub post_market_price: Option<f64>,

    #[serde(default, deserialize_with = "de_opt_f64")]
    pub pre_market_price: Option<f64>,

    #[serde(default, deserialize_with = "de_opt_i64")]
    pub regular_market_time: Option<i64>,
}

impl QuoteNode {
    /// First usable price in provider priority order.
    pub fn spot(&self) -> Option<f64> {
        [
            self.regular_market_price,
            self.regular_market_previous_close,
            self.post_market_price,
            self.pre_market_price,
        ]
        .into_iter()
        .flatten()
        .find(|p| p.is_finite() && *p > 0.0)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsBlock {
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub expiration_date: Option<i64>,

    pub calls: Option<Vec<OptionContract>>,

    pub puts: Option<Vec<OptionContract>>,
}

/// One call or put contract as the provider sends it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionContract {
    pub contract_symbol: Option<String>,

    #[serde(default, deserialize_with = "de_opt_f64")]
    pub strike: Option<f64>,

    #[serde(default, deserialize_with = "de_opt_f64")]
    pub open_interest: Option<f64>,

    #[serde(default, deserialize_with = "de_opt_f64")]
    pub volume: Option<f64>,

    #[serde(default, deserialize_with = "de_opt_f64")]
    pub implied_volatility: Option<f64>,
}

// -----------------------------------------------
// LENIENT NUMBER PARSING
// -----------------------------------------------

/// Numbers arrive as JSON numbers, numeric strings, or `{"raw": .., "fmt": ..}`.
pub fn value_as_f64(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Object(map) => map.get("raw").and_then(value_as_f64),
        _ => None,
    };
    n.filter(|x| x.is_finite())
}

fn de_opt_f64<'de, D>(d: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref().and_then(value_as_f64))
}

fn de_opt_i64<'de, D>(d: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref().and_then(value_as_f64).map(|x| x as i64))
}

fn de_opt_i64_vec<'de, D>(d: D) -> Result<Option<Vec<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Option::<Vec<Value>>::deserialize(d)?;
    Ok(v.map(|items| {
        items
            .iter()
            .filter_map(value_as_f64)
            .map(|x| x as i64)
            .collect()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expiration_ts_is_midnight_utc() {
        let req = QuoteRequest::new("spy", NaiveDate::from_ymd_opt(2025, 1, 17));
        assert_eq!(req.ticker, "SPY");
        assert_eq!(req.expiration_ts(), Some(1_737_072_000));
        assert_eq!(QuoteRequest::new("", None).expiration_ts(), None);
    }

    #[test]
    fn test_d_oi_saturates() {
        let row = OptionRow {
            call_oi: 9_300_000_000_000_000_000,
            put_oi: 2,
            ..OptionRow::empty(100.0)
        };
        assert_eq!(row.d_oi(), i64::MAX);

        let row = OptionRow {
            call_oi: 9_300_000_000_000_000_000,
            put_oi: u64::MAX,
            ..OptionRow::empty(100.0)
        };
        assert!(row.d_oi() < 0);
        assert_eq!(OptionRow { call_oi: 5, put_oi: 7, ..OptionRow::empty(1.0) }.d_oi(), -2);
    }

    #[test]
    fn test_lenient_numbers() {
        assert_eq!(value_as_f64(&json!(12)), Some(12.0));
        assert_eq!(value_as_f64(&json!(" 0.25 ")), Some(0.25));
        assert_eq!(value_as_f64(&json!({"raw": 450.5, "fmt": "450.50"})), Some(450.5));
        assert_eq!(value_as_f64(&json!("")), None);
        assert_eq!(value_as_f64(&json!(null)), None);
    }

    #[test]
    fn test_contract_accepts_strings_and_nulls() {
        let c: OptionContract = serde_json::from_value(json!({
            "contractSymbol": "SPY250117C00100000",
            "strike": "100",
            "openInterest": null,
            "volume": 12
        }))
        .unwrap();

        assert_eq!(c.strike, Some(100.0));
        assert_eq!(c.open_interest, None);
        assert_eq!(c.volume, Some(12.0));
        assert_eq!(c.implied_volatility, None);
    }

    #[test]
    fn test_spot_priority() {
        let q = QuoteNode {
            regular_market_price: Some(0.0),
            regular_market_previous_close: Some(99.5),
            post_market_price: Some(101.0),
            ..Default::default()
        };
        assert_eq!(q.spot(), Some(99.5));
        assert_eq!(QuoteNode::default().spot(), None);
    }
}
