use crate::error::ProviderError;
use crate::models::{ChainResult, ChainSnapshot, OptionContract, OptionRow, OptionsBlock, OptionsEnvelope, ts_to_date};
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Parse the provider body into the options envelope.
pub fn parse_envelope(body: &[u8]) -> Result<OptionsEnvelope, ProviderError> {
    serde_json::from_slice(body).map_err(|e| ProviderError::Payload(format!("options json parse: {}", e)))
}

/// Pick the first chain result from either envelope.
pub fn first_result(envelope: OptionsEnvelope) -> Result<ChainResult, ProviderError> {
    if let Some(result) = envelope
        .option_chain
        .and_then(|oc| oc.result)
        .and_then(|v| v.into_iter().next())
    {
        return Ok(result);
    }

    envelope
        .body
        .and_then(|v| v.into_iter().next())
        .ok_or_else(|| ProviderError::Payload("no option chain result in provider payload".to_string()))
}

/// Reshape one chain result into rows for the requested expiration.
///
/// With no requested expiration the first block is used (the provider puts
/// the nearest expiration there). A block is matched on its calendar date, so
/// expirations stamped at a time other than midnight UTC still match. No
/// matching block is an error; a matching block without contracts is zero rows.
pub fn extract_chain(
    symbol: &str,
    result: &ChainResult,
    requested: Option<NaiveDate>,
    now_ts: i64,
) -> Result<ChainSnapshot, ProviderError> {
    let quote = result.quote.clone().unwrap_or_default();
    let spot = quote.spot().unwrap_or(0.0);
    let snapshot_ts = quote.regular_market_time.filter(|t| *t > 0).unwrap_or(now_ts);

    let mut expirations = result.expiration_dates.clone().unwrap_or_default();
    expirations.sort_unstable();
    expirations.dedup();

    let blocks = result.options.as_deref().unwrap_or_default();
    let block = select_block(blocks, requested).ok_or_else(|| {
        let wanted = requested.map(|d| d.to_string()).unwrap_or_else(|| "nearest".to_string());
        warn!(symbol, expiration = %wanted, blocks = blocks.len(), "no option chain block for expiration");
        ProviderError::Payload(format!("no option chain for the requested expiration ({})", wanted))
    })?;

    let rows = normalize_rows(
        block.calls.as_deref().unwrap_or_default(),
        block.puts.as_deref().unwrap_or_default(),
    );

    let expiration_ts = block
        .expiration_date
        .or_else(|| requested.and_then(|d| d.and_hms_opt(0, 0, 0)).map(|dt| dt.and_utc().timestamp()))
        .or_else(|| expirations.first().copied());

    Ok(ChainSnapshot {
        symbol: result
            .underlying_symbol
            .clone()
            .unwrap_or_else(|| symbol.to_string())
            .to_uppercase(),
        spot,
        snapshot_ts,
        expiration_ts,
        expirations,
        rows,
    })
}

fn select_block(blocks: &[OptionsBlock], requested: Option<NaiveDate>) -> Option<&OptionsBlock> {
    match requested {
        None => blocks.first(),
        Some(date) => blocks
            .iter()
            .find(|b| b.expiration_date.and_then(ts_to_date) == Some(date))
            .or_else(|| blocks.iter().find(|b| b.expiration_date.is_none())),
    }
}

/// Join calls and puts on strike, sorted ascending.
///
/// Contracts without a usable strike are dropped. Missing open interest or
/// volume counts as zero; missing IV stays `None`.
pub fn normalize_rows(calls: &[OptionContract], puts: &[OptionContract]) -> Vec<OptionRow> {
    let mut by_strike: HashMap<u64, OptionRow> = HashMap::new();

    for (contracts, is_call) in [(calls, true), (puts, false)] {
        for contract in contracts {
            let Some(strike) = valid_strike(contract) else {
                debug!(contract = ?contract.contract_symbol, "skipping contract without a valid strike");
                continue;
            };

            let row = by_strike
                .entry(strike.to_bits())
                .or_insert_with(|| OptionRow::empty(strike));

            let oi = as_count(contract.open_interest);
            let volume = as_count(contract.volume);
            if is_call {
                row.call_oi = oi;
                row.call_volume = volume;
                row.call_iv = contract.implied_volatility;
            } else {
                row.put_oi = oi;
                row.put_volume = volume;
                row.put_iv = contract.implied_volatility;
            }
        }
    }

    let mut rows: Vec<OptionRow> = by_strike.into_values().collect();
    rows.sort_by(|a, b| a.strike.total_cmp(&b.strike));
    rows
}

fn valid_strike(contract: &OptionContract) -> Option<f64> {
    contract.strike.filter(|s| s.is_finite() && *s > 0.0)
}

fn as_count(value: Option<f64>) -> u64 {
    value.map(|v| v.max(0.0) as u64).unwrap_or(0)
}

/// Smallest expiration not older than `grace_secs`, else the smallest one.
pub fn nearest_expiration(expirations: &[i64], now_ts: i64, grace_secs: i64) -> Option<i64> {
    expirations
        .iter()
        .copied()
        .filter(|e| *e >= now_ts - grace_secs)
        .min()
        .or_else(|| expirations.iter().copied().min())
}
