use crate::debug::DebugState;
use crate::error::ProviderError;
use crate::models::{ChainSnapshot, QuoteRequest};
use crate::net_gex::{self, CalibrationParams, KSource, NetGexResult};
use crate::processor;
use crate::provider_client::{RawResponse, YahooOptionsClient};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

/// Everything one calculate action produces.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub request: QuoteRequest,
    pub snapshot: ChainSnapshot,
    pub result: NetGexResult,
    pub raw: RawResponse,
}

#[derive(Serialize)]
struct ResultDump<'a> {
    request: &'a QuoteRequest,
    snapshot_ts: i64,
    expiration_ts: Option<i64>,
    result: &'a NetGexResult,
}

/// Fetch → flatten → Net GEX for one request.
///
/// The response is recorded in the debug panel before it is validated so that
/// `raw.json` always mirrors what the provider sent. Errors are logged and
/// appended to the panel's error log; no partial rows are returned.
pub async fn analyze(
    client: &YahooOptionsClient,
    request: &QuoteRequest,
    k_source: KSource,
    params: &CalibrationParams,
    debug: &DebugState,
) -> Result<Analysis, ProviderError> {
    match run(client, request, k_source, params, debug).await {
        Ok(analysis) => Ok(analysis),
        Err(e) => {
            error!(ticker = %request.ticker, error = %e, "calculation failed");
            debug.log_error(format!("{}: {}", request.ticker, e)).await;
            Err(e)
        }
    }
}

async fn run(
    client: &YahooOptionsClient,
    request: &QuoteRequest,
    k_source: KSource,
    params: &CalibrationParams,
    debug: &DebugState,
) -> Result<Analysis, ProviderError> {
    let requested_ts = request.expiration_ts();
    let raw = client.fetch_options_raw(&request.ticker, requested_ts).await?;
    debug.record_response(&raw).await;
    info!(
        ticker = %request.ticker,
        status = raw.meta.status,
        bytes = raw.meta.bytes,
        elapsed_ms = raw.meta.elapsed_ms,
        "provider responded"
    );

    raw.validate()?;
    debug.dump_bytes("provider_raw", &raw.body);

    let envelope = processor::parse_envelope(&raw.body)?;
    let result = processor::first_result(envelope)?;

    let now = Utc::now().timestamp();
    let mut snapshot = processor::extract_chain(&request.ticker, &result, request.expiration, now)?;

    if snapshot.spot <= 0.0 {
        if let Some((spot, time)) = client.fetch_quote_spot(&request.ticker).await {
            snapshot.spot = spot;
            if let Some(t) = time.filter(|t| *t > 0) {
                snapshot.snapshot_ts = t;
            }
        }
    }

    let expiry_ts = snapshot.expiration_ts.unwrap_or(snapshot.snapshot_ts);
    let result = net_gex::calculate_net_gex(
        snapshot.spot,
        &snapshot.rows,
        expiry_ts,
        snapshot.snapshot_ts,
        k_source,
        params,
    );

    debug.dump_json(
        "net_gex_result",
        &ResultDump {
            request,
            snapshot_ts: snapshot.snapshot_ts,
            expiration_ts: snapshot.expiration_ts,
            result: &result,
        },
    );

    Ok(Analysis {
        request: request.clone(),
        snapshot,
        result,
        raw,
    })
}
