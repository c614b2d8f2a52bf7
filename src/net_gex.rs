//! Net GEX per strike and calibration of the scale constant `k`.
//!
//! `net_gex = k × (call_oi − put_oi)`. When `k` is not fixed by the caller it is
//! calibrated as the open-interest weighted Black–Scholes gamma of the strikes
//! nearest to spot, scaled by spot, the contract multiplier and a display
//! divisor.

use crate::config;
use crate::models::{NetGexRow, OptionRow};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{info, warn};

/// Where `k` comes from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum KSource {
    Fixed(f64),
    Calibrated,
}

/// Knobs for calibrating `k`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParams {
    pub contract_multiplier: f64,
    pub scale_divisor: f64,
    pub core_size: usize,
    pub refine: bool,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            contract_multiplier: config::CONTRACT_MULTIPLIER,
            scale_divisor: config::SCALE_DIVISOR,
            core_size: config::CORE_SIZE,
            refine: false,
        }
    }
}

/// Values behind `k`, shown in the metrics block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetGexMetrics {
    pub spot: f64,
    pub t_years: f64,
    pub t_days: f64,
    pub iv_median_core: f64,
    pub gamma_avg: f64,
    pub k_raw: f64,
    pub k: f64,
    pub k_source: KSource,
    pub contract_multiplier: f64,
    pub scale_divisor: f64,
    pub core_size: usize,
    pub core_strikes: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetGexResult {
    pub rows: Vec<NetGexRow>,
    pub k: f64,
    pub metrics: NetGexMetrics,
}

// -----------------------------------------------
// CORE FORMULA
// -----------------------------------------------

/// `k × (call_oi − put_oi)` for a single row.
pub fn net_gex(row: &OptionRow, k: f64) -> f64 {
    k * row.d_oi() as f64
}

/// Annotate rows with their Net GEX. `iv_used` is the mean of the valid side IVs, or NaN.
pub fn apply_net_gex(rows: &[OptionRow], k: f64) -> Vec<NetGexRow> {
    rows.iter()
        .map(|row| NetGexRow {
            base: row.clone(),
            d_oi: row.d_oi(),
            iv_used: choose_iv(row.call_iv, row.put_iv).unwrap_or(f64::NAN),
            net_gex: net_gex(row, k),
        })
        .collect()
}

// -----------------------------------------------
// CALIBRATION HELPERS
// -----------------------------------------------

/// Timestamps above 1e12 are milliseconds.
fn in_seconds(ts: f64) -> f64 {
    if ts > 1e12 { ts / 1000.0 } else { ts }
}

/// `(T_years, T_days)` between snapshot and expiry. Years are floored at 1e-6.
pub fn time_to_expiry(snapshot_ts: f64, expiry_ts: f64) -> (f64, f64) {
    let seconds = (in_seconds(expiry_ts) - in_seconds(snapshot_ts)).max(0.0);
    let t_years = (seconds / config::SECONDS_PER_YEAR).max(config::MIN_YEARS_TO_EXPIRY);
    let t_days = seconds / config::SECONDS_PER_DAY;
    (t_years, t_days)
}

/// IV as a fraction, or `None` for sentinels and garbage.
pub fn normalize_iv(iv: Option<f64>) -> Option<f64> {
    let mut v = iv.filter(|v| v.is_finite())?;
    if v <= config::IV_SENTINEL_MAX {
        return None;
    }
    // percent
    if v > config::IV_MAX_FRACTION {
        v /= 100.0;
    }
    Some(v.clamp(config::IV_MIN_FRACTION, config::IV_MAX_FRACTION))
}

/// Mean of the valid side IVs.
pub fn choose_iv(call_iv: Option<f64>, put_iv: Option<f64>) -> Option<f64> {
    let sides: Vec<f64> = [call_iv, put_iv].into_iter().filter_map(normalize_iv).collect();
    if sides.is_empty() {
        None
    } else {
        Some(sides.iter().sum::<f64>() / sides.len() as f64)
    }
}

/// Standard normal PDF
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Black–Scholes gamma (same for calls and puts). Zero on degenerate inputs.
pub fn gamma_bs(spot: f64, strike: f64, sigma: f64, t_years: f64, rate: f64) -> f64 {
    if sigma <= 0.0 || t_years <= 0.0 || spot <= 0.0 || strike <= 0.0 {
        return 0.0;
    }
    let sqrt_t = t_years.sqrt();
    let d1 = ((spot / strike).ln() + (rate + 0.5 * sigma * sigma) * t_years) / (sigma * sqrt_t);
    let gamma = norm_pdf(d1) / (spot * sigma * sqrt_t);
    if gamma.is_finite() { gamma } else { 0.0 }
}

/// Upper median of the strikes' chosen IVs, 0.20 when none are usable.
fn iv_median(ivs: &[Option<f64>]) -> f64 {
    let mut valid: Vec<f64> = ivs.iter().flatten().copied().collect();
    if valid.is_empty() {
        return config::IV_FALLBACK;
    }
    valid.sort_by(f64::total_cmp);
    valid[valid.len() / 2]
}

// -----------------------------------------------
// FULL CALCULATION
// -----------------------------------------------

/// Net GEX table for one expiration, with `k` fixed or calibrated.
pub fn calculate_net_gex(
    spot: f64,
    rows: &[OptionRow],
    expiry_ts: i64,
    snapshot_ts: i64,
    k_source: KSource,
    params: &CalibrationParams,
) -> NetGexResult {
    let (t_years, t_days) = time_to_expiry(snapshot_ts as f64, expiry_ts as f64);

    let chosen: Vec<Option<f64>> = rows.iter().map(|r| choose_iv(r.call_iv, r.put_iv)).collect();
    let median = iv_median(&chosen);

    // ATM core
    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| {
        (rows[a].strike - spot)
            .abs()
            .total_cmp(&(rows[b].strike - spot).abs())
    });
    order.truncate(params.core_size.max(1));

    let mut w_sum = 0.0;
    let mut g_sum = 0.0;
    for &i in &order {
        let row = &rows[i];
        let w = row.call_oi as f64 + row.put_oi as f64 + 1.0;
        let sigma = chosen[i].unwrap_or(median);
        w_sum += w;
        g_sum += w * gamma_bs(spot, row.strike, sigma, t_years, 0.0);
    }
    let gamma_avg = if w_sum > 0.0 { g_sum / w_sum } else { 0.0 };

    let k_raw = gamma_avg * spot * params.contract_multiplier / params.scale_divisor;

    let k = match k_source {
        KSource::Fixed(k) => k,
        KSource::Calibrated if params.refine => refine_k(rows, k_raw),
        KSource::Calibrated => k_raw,
    };

    if spot <= 0.0 && k_source == KSource::Calibrated {
        warn!("spot price unavailable; calibrated k is zero");
    }

    let mut out = apply_net_gex(rows, k);
    for (row, iv) in out.iter_mut().zip(&chosen) {
        row.iv_used = iv.unwrap_or(median);
    }
    out.sort_by(|a, b| a.base.strike.total_cmp(&b.base.strike));

    let core_strikes: Vec<f64> = order.iter().map(|&i| rows[i].strike).collect();

    info!(
        spot,
        t_days,
        iv_median = median,
        gamma_avg,
        k,
        core = ?core_strikes,
        "net gex calculated"
    );

    NetGexResult {
        rows: out,
        k,
        metrics: NetGexMetrics {
            spot,
            t_years,
            t_days,
            iv_median_core: median,
            gamma_avg,
            k_raw,
            k,
            k_source,
            contract_multiplier: params.contract_multiplier,
            scale_divisor: params.scale_divisor,
            core_size: params.core_size,
            core_strikes,
        },
    }
}

/// Least-squares fit of `k` against `k_raw × dOI`.
fn refine_k(rows: &[OptionRow], k_raw: f64) -> f64 {
    let (num, den) = rows.iter().fold((0.0, 0.0), |(num, den), row| {
        let d = row.d_oi() as f64;
        (num + d * (k_raw * d), den + d * d)
    });
    if den > 0.0 { num / den } else { k_raw }
}
