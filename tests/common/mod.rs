#![allow(dead_code)]

use httpmock::{Method::GET, Mock, MockServer};
use netgex::config::{self, ProviderConfig};

pub const TEST_HOST: &str = "yahoo-finance15.p.rapidapi.com";
pub const TEST_KEY: &str = "test-key";

/// 2025-01-17 00:00 UTC
pub const EXPIRY_TS: i64 = 1_737_072_000;
/// 2025-01-10 00:00 UTC
pub const SNAPSHOT_TS: i64 = 1_736_467_200;

/// SPY chain: strikes 100/105/110 with OI pairs (500,300), (200,200), (100,400).
/// Odd spacing on purpose: raw.json must match these bytes exactly.
pub const SPY_CHAIN: &str = r#"{"optionChain":{"result":[{"underlyingSymbol":"SPY",
  "expirationDates":[1737676800, 1737072000],
  "quote":{"regularMarketPrice":104.5,"regularMarketTime":1736467200},
  "options":[{"expirationDate":1737072000,
    "calls":[
      {"contractSymbol":"SPY250117C00100000","strike":100,"openInterest":500,"volume":40,"impliedVolatility":0.25},
      {"contractSymbol":"SPY250117C00105000","strike":105,"openInterest":200,"volume":25,"impliedVolatility":0.22},
      {"contractSymbol":"SPY250117C00110000","strike":110,"openInterest":100,"volume":5,"impliedVolatility":0.2}
    ],
    "puts":[
      {"contractSymbol":"SPY250117P00100000","strike":100,"openInterest":300,"volume":30,"impliedVolatility":0.27},
      {"contractSymbol":"SPY250117P00105000","strike":105,"openInterest":200,"volume":20,"impliedVolatility":0.24},
      {"contractSymbol":"SPY250117P00110000","strike":110,"openInterest":400,"volume":60,"impliedVolatility":0.3}
    ]}]}],"error":null}}"#;

/// Block for the expiration exists but lists no contracts.
pub const EMPTY_CHAIN: &str = r#"{"optionChain":{"result":[{"underlyingSymbol":"SPY",
  "expirationDates":[1737072000],
  "quote":{"regularMarketPrice":104.5,"regularMarketTime":1736467200},
  "options":[{"expirationDate":1737072000,"calls":[],"puts":[]}]}],"error":null}}"#;

/// No options block at all.
pub const NO_BLOCK_CHAIN: &str = r#"{"optionChain":{"result":[{"underlyingSymbol":"SPY",
  "expirationDates":[1737072000],
  "quote":{"regularMarketPrice":104.5,"regularMarketTime":1736467200},
  "options":[]}],"error":null}}"#;

/// Chain without any price in the quote block.
pub const NO_SPOT_CHAIN: &str = r#"{"optionChain":{"result":[{"underlyingSymbol":"SPY",
  "expirationDates":[1737072000],
  "quote":{},
  "options":[{"expirationDate":1737072000,
    "calls":[{"strike":100,"openInterest":10,"impliedVolatility":0.2}],
    "puts":[{"strike":100,"openInterest":4,"impliedVolatility":0.2}]}]}]}}"#;

pub fn provider_config(server: &MockServer) -> ProviderConfig {
    ProviderConfig::from_lookup(|name| match name {
        config::ENV_RAPIDAPI_HOST => Some(TEST_HOST.to_string()),
        config::ENV_RAPIDAPI_KEY => Some(TEST_KEY.to_string()),
        _ => None,
    })
    .unwrap()
    .with_base_url(server.base_url())
}

pub fn mock_chain<'a>(server: &'a MockServer, symbol: &str, body: &'a str) -> Mock<'a> {
    let path = config::options_path(symbol);
    server.mock(|when, then| {
        when.method(GET)
            .path(path)
            .header("x-rapidapi-host", TEST_HOST)
            .header("x-rapidapi-key", TEST_KEY);
        then.status(200)
            .header("content-type", "application/json")
            .body(body);
    })
}

pub fn mock_chain_for_date<'a>(server: &'a MockServer, symbol: &str, date: i64, body: &'a str) -> Mock<'a> {
    let path = config::options_path(symbol);
    server.mock(|when, then| {
        when.method(GET)
            .path(path)
            .query_param("date", date.to_string())
            .header("x-rapidapi-key", TEST_KEY);
        then.status(200)
            .header("content-type", "application/json")
            .body(body);
    })
}

pub fn mock_status<'a>(server: &'a MockServer, symbol: &str, status: u16, body: &'a str) -> Mock<'a> {
    let path = config::options_path(symbol);
    server.mock(|when, then| {
        when.method(GET).path(path);
        then.status(status).body(body);
    })
}
