use crate::analysis::Analysis;
use crate::debug::DebugSnapshot;
use crate::models::{NetGexRow, OptionRow, ts_to_date};
use chrono::{DateTime, NaiveDate, Utc};
use colored::Colorize;

// -----------------------------------------------
// FORMATTING HELPERS
// -----------------------------------------------

pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn fmt_date(ts: i64) -> String {
    ts_to_date(ts).map(|d| d.to_string()).unwrap_or_else(|| ts.to_string())
}

fn fmt_datetime(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn fmt_strike(strike: f64) -> String {
    if strike.fract() == 0.0 {
        format!("{:.0}", strike)
    } else {
        format!("{}", strike)
    }
}

fn fmt_iv(iv: Option<f64>) -> String {
    match iv {
        Some(v) if v.is_finite() => format!("{:.4}", v),
        _ => "-".to_string(),
    }
}

/// Net GEX for display: one decimal.
pub fn fmt_net_gex(v: f64) -> String {
    format!("{:.1}", v)
}

// -----------------------------------------------
// HTML PAGE
// -----------------------------------------------

/// Everything the page needs for one render pass.
pub struct PageView<'a> {
    pub ticker: &'a str,
    pub selected_expiration: Option<NaiveDate>,
    pub expirations: &'a [i64],
    pub fixed_k: Option<f64>,
    pub error: Option<String>,
    pub analysis: Option<&'a Analysis>,
    pub debug: &'a DebugSnapshot,
}

pub fn render_page(view: &PageView) -> String {
    let mut html = String::new();
    html.push_str(PAGE_HEAD);
    html.push_str("<h1>Net GEX calculator</h1>\n");
    html.push_str(&render_form(view));

    if let Some(err) = &view.error {
        html.push_str(&format!("<div class=\"error\">{}</div>\n", html_escape(err)));
    }

    if let Some(analysis) = view.analysis {
        let snap = &analysis.snapshot;
        let mut caption = format!("{} | Spot S = {:.3}", html_escape(&snap.symbol), snap.spot);
        caption.push_str(&format!(" | Snapshot = {}", fmt_datetime(snap.snapshot_ts)));
        if let Some(exp) = snap.expiration_ts {
            caption.push_str(&format!(" | Expiration = {}", fmt_date(exp)));
        }
        html.push_str(&format!("<p class=\"caption\">{}</p>\n", caption));

        html.push_str("<h2>Provider data</h2>\n");
        html.push_str(&render_provider_table(&snap.rows));

        html.push_str("<h2>Net GEX by strike</h2>\n");
        html.push_str(&render_net_gex_table(&analysis.result.rows));
        html.push_str(&render_chart(&analysis.result.rows, snap.spot, &snap.symbol));
        html.push_str(&render_metrics(analysis));
    }

    html.push_str(&render_debug_panel(view.debug, view.analysis));
    html.push_str("</body>\n</html>\n");
    html
}

fn render_form(view: &PageView) -> String {
    let mut form = String::from("<form method=\"get\" action=\"/\">\n");
    form.push_str(&format!(
        "<label>Ticker <input type=\"text\" name=\"ticker\" value=\"{}\"></label>\n",
        html_escape(view.ticker)
    ));

    form.push_str("<label>Expiration <select name=\"expiration\">\n");
    if view.expirations.is_empty() {
        form.push_str("<option value=\"\">nearest</option>\n");
    }
    for &ts in view.expirations {
        let Some(date) = ts_to_date(ts) else { continue };
        let selected = if view.selected_expiration == Some(date) { " selected" } else { "" };
        form.push_str(&format!("<option value=\"{}\"{}>{}</option>\n", date, selected, date));
    }
    form.push_str("</select></label>\n");

    let k_value = view.fixed_k.map(|k| k.to_string()).unwrap_or_default();
    form.push_str(&format!(
        "<label>k <input type=\"text\" name=\"k\" value=\"{}\" placeholder=\"calibrated\"></label>\n",
        html_escape(&k_value)
    ));
    form.push_str("<button type=\"submit\" name=\"calculate\" value=\"1\">Calculate</button>\n");
    form.push_str("</form>\n");
    form
}

pub fn render_provider_table(rows: &[OptionRow]) -> String {
    let mut t = String::from(
        "<table class=\"provider\">\n<tr><th>Strike</th><th>Call OI</th><th>Call volume</th><th>Call IV</th>\
         <th>Put OI</th><th>Put volume</th><th>Put IV</th></tr>\n",
    );
    for r in rows {
        t.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            fmt_strike(r.strike),
            r.call_oi,
            r.call_volume,
            fmt_iv(r.call_iv),
            r.put_oi,
            r.put_volume,
            fmt_iv(r.put_iv),
        ));
    }
    t.push_str("</table>\n");
    t
}

pub fn render_net_gex_table(rows: &[NetGexRow]) -> String {
    let mut t = String::from(
        "<table class=\"netgex\">\n<tr><th>Strike</th><th>Call OI</th><th>Call volume</th><th>Call IV</th>\
         <th>Put OI</th><th>Put volume</th><th>Put IV</th><th>&Delta;OI</th><th>IV used</th><th>Net GEX</th></tr>\n",
    );
    for r in rows {
        let class = if r.net_gex < 0.0 { "neg" } else { "pos" };
        t.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
             <td>{}</td><td>{}</td><td class=\"{}\">{}</td></tr>\n",
            fmt_strike(r.base.strike),
            r.base.call_oi,
            r.base.call_volume,
            fmt_iv(r.base.call_iv),
            r.base.put_oi,
            r.base.put_volume,
            fmt_iv(r.base.put_iv),
            r.d_oi,
            fmt_iv(Some(r.iv_used)),
            class,
            fmt_net_gex(r.net_gex),
        ));
    }
    t.push_str("</table>\n");
    t
}

const CHART_WIDTH: f64 = 900.0;
const CHART_HEIGHT: f64 = 320.0;
const CHART_PAD: f64 = 30.0;

/// Bar chart of Net GEX per strike: red below zero, blue above, orange spot line.
pub fn render_chart(rows: &[NetGexRow], spot: f64, ticker: &str) -> String {
    if rows.is_empty() {
        return "<p class=\"caption\">No data for the Net GEX chart.</p>\n".to_string();
    }

    let min_strike = rows.first().map(|r| r.base.strike).unwrap_or(0.0);
    let max_strike = rows.last().map(|r| r.base.strike).unwrap_or(0.0);
    let y_abs = rows
        .iter()
        .map(|r| r.net_gex.abs())
        .filter(|v| v.is_finite())
        .fold(0.0_f64, f64::max);
    let y_abs = if y_abs > 0.0 { y_abs * 1.2 } else { 1.0 };

    let plot_w = CHART_WIDTH - 2.0 * CHART_PAD;
    let plot_h = CHART_HEIGHT - 2.0 * CHART_PAD;
    let zero_y = CHART_PAD + plot_h / 2.0;
    let span = (max_strike - min_strike).max(f64::EPSILON);
    let x_of = |strike: f64| CHART_PAD + (strike - min_strike) / span * plot_w;
    let bar_w = (plot_w / rows.len() as f64 * 0.9).max(1.0);

    let mut svg = format!(
        "<svg class=\"chart\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n\
         <text x=\"{pad}\" y=\"18\" class=\"ticker\">{ticker}</text>\n\
         <line x1=\"{pad}\" y1=\"{zy}\" x2=\"{x2}\" y2=\"{zy}\" stroke=\"#888\"/>\n",
        w = CHART_WIDTH,
        h = CHART_HEIGHT,
        pad = CHART_PAD,
        ticker = html_escape(ticker),
        zy = zero_y,
        x2 = CHART_WIDTH - CHART_PAD,
    );

    for r in rows {
        let v = if r.net_gex.is_finite() { r.net_gex } else { 0.0 };
        let h = v.abs() / y_abs * (plot_h / 2.0);
        let y = if v >= 0.0 { zero_y - h } else { zero_y };
        let color = if v >= 0.0 { "#31c7ff" } else { "#ff3b30" };
        let x = if rows.len() == 1 { CHART_PAD + plot_w / 2.0 } else { x_of(r.base.strike) };
        svg.push_str(&format!(
            "<rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"{}\">\
             <title>Strike: {} Net GEX: {}</title></rect>\n",
            x - bar_w / 2.0,
            y,
            bar_w,
            h,
            color,
            fmt_strike(r.base.strike),
            fmt_net_gex(r.net_gex),
        ));
    }

    if spot > 0.0 && spot >= min_strike && spot <= max_strike {
        let x = x_of(spot);
        svg.push_str(&format!(
            "<line x1=\"{x:.1}\" y1=\"{top}\" x2=\"{x:.1}\" y2=\"{bottom}\" stroke=\"#f4a306\" stroke-width=\"2\"/>\n\
             <text x=\"{x:.1}\" y=\"{label}\" fill=\"#f4a306\" text-anchor=\"middle\">Price: {spot:.2}</text>\n",
            x = x,
            top = CHART_PAD,
            bottom = CHART_HEIGHT - CHART_PAD,
            label = CHART_PAD - 4.0,
            spot = spot,
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

fn render_metrics(analysis: &Analysis) -> String {
    let m = &analysis.result.metrics;
    let strikes: Vec<String> = m.core_strikes.iter().map(|s| fmt_strike(*s)).collect();
    format!(
        "<details class=\"metrics\"><summary>Calculation parameters</summary>\n<ul>\n\
         <li>k = {:.4} ({})</li>\n<li>k raw = {:.4}</li>\n<li>Gamma avg = {:.6e}</li>\n\
         <li>IV median (core) = {:.4}</li>\n<li>T (days) = {:.2}</li>\n<li>S = {:.3}</li>\n\
         <li>Core size = {}</li>\n<li>Core strikes = {}</li>\n\
         <li>M = {} / scale divisor = {}</li>\n</ul></details>\n",
        m.k,
        match m.k_source {
            crate::net_gex::KSource::Fixed(_) => "fixed",
            crate::net_gex::KSource::Calibrated => "calibrated",
        },
        m.k_raw,
        m.gamma_avg,
        m.iv_median_core,
        m.t_days,
        m.spot,
        m.core_size,
        strikes.join(", "),
        m.contract_multiplier,
        m.scale_divisor,
    )
}

fn render_debug_panel(debug: &DebugSnapshot, analysis: Option<&Analysis>) -> String {
    let mut panel = String::from("<details class=\"debug\"><summary>Debug</summary>\n");

    match &debug.last_request {
        Some(meta) => {
            let meta_json = serde_json::to_string_pretty(meta).unwrap_or_default();
            panel.push_str(&format!(
                "<h3>Last request</h3>\n<pre>{}</pre>\n",
                html_escape(&meta_json)
            ));
            panel.push_str("<p><a href=\"/api/raw.json\" download=\"raw.json\">Download raw.json</a>");
            if analysis.is_some() {
                panel.push_str(" | <a href=\"/api/net-gex.csv\">Download table (CSV)</a>");
            }
            panel.push_str("</p>\n");
        }
        None => panel.push_str("<p>No provider request yet.</p>\n"),
    }

    panel.push_str(
        "<p><a href=\"/api/log\">Download log file</a> | \
         <a href=\"/api/debug-file/latest\">Download latest debug file</a></p>\n",
    );

    // Shown for failed responses too; that is when the body matters most.
    if let Some(body) = &debug.raw_body {
        let pretty = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| serde_json::to_string_pretty(&v).ok())
            .unwrap_or_else(|| body.clone());
        panel.push_str(&format!("<h3>Raw JSON</h3>\n<pre class=\"raw\">{}</pre>\n", html_escape(&pretty)));
    }

    panel.push_str("<h3>Error log</h3>\n");
    if debug.errors.is_empty() {
        panel.push_str("<p>No errors.</p>\n");
    } else {
        panel.push_str("<ul class=\"errors\">\n");
        for e in debug.errors.iter().rev() {
            panel.push_str(&format!(
                "<li>{} {}</li>\n",
                e.at.format("%Y-%m-%d %H:%M:%S"),
                html_escape(&e.message)
            ));
        }
        panel.push_str("</ul>\n");
    }

    panel.push_str("</details>\n");
    panel
}

const PAGE_HEAD: &str = "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
<title>Net GEX calculator</title>\n<style>\n\
body { font-family: sans-serif; margin: 1.5em; }\n\
table { border-collapse: collapse; margin-bottom: 1em; }\n\
th, td { border: 1px solid #ccc; padding: 2px 8px; text-align: right; }\n\
.error { background: #fde2e1; color: #8a1c14; padding: 0.6em; margin: 0.6em 0; }\n\
.neg { color: #c62828; } .pos { color: #1565c0; }\n\
.caption { color: #555; }\n\
pre.raw { max-height: 30em; overflow: auto; background: #f6f6f6; }\n\
</style>\n</head>\n<body>\n";

// -----------------------------------------------
// CSV
// -----------------------------------------------

pub fn render_csv(rows: &[NetGexRow]) -> String {
    let mut csv = String::from("strike,call_oi,call_volume,call_iv,put_oi,put_volume,put_iv,d_oi,iv_used,net_gex\n");
    let opt = |v: Option<f64>| v.filter(|x| x.is_finite()).map(|x| x.to_string()).unwrap_or_default();
    for r in rows {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{}\n",
            r.base.strike,
            r.base.call_oi,
            r.base.call_volume,
            opt(r.base.call_iv),
            r.base.put_oi,
            r.base.put_volume,
            opt(r.base.put_iv),
            r.d_oi,
            opt(Some(r.iv_used)),
            fmt_net_gex(r.net_gex),
        ));
    }
    csv
}

// -----------------------------------------------
// TERMINAL
// -----------------------------------------------

pub fn render_terminal(analysis: &Analysis) -> String {
    let snap = &analysis.snapshot;
    let mut out = String::new();

    out.push_str(&format!("{}\n", "=".repeat(96).blue()));
    out.push_str(&format!(
        "{} {}  S = {:.3}  snapshot {}  expiration {}\n",
        "✓".green(),
        snap.symbol.yellow(),
        snap.spot,
        fmt_datetime(snap.snapshot_ts),
        snap.expiration_ts.map(fmt_date).unwrap_or_else(|| "-".to_string()),
    ));
    out.push_str(&format!("{}\n", "=".repeat(96).blue()));

    if analysis.result.rows.is_empty() {
        out.push_str(&format!("{} No strikes for this expiration\n", "ℹ".blue()));
        return out;
    }

    out.push_str(&format!(
        "{:>10} {:>9} {:>9} {:>8} {:>9} {:>9} {:>8} {:>9} {:>8} {:>12}\n",
        "strike", "call OI", "call vol", "call IV", "put OI", "put vol", "put IV", "dOI", "IV used", "Net GEX"
    ));
    for r in &analysis.result.rows {
        let gex = format!("{:>12}", fmt_net_gex(r.net_gex));
        let gex = if r.net_gex < 0.0 { gex.red() } else { gex.cyan() };
        out.push_str(&format!(
            "{:>10} {:>9} {:>9} {:>8} {:>9} {:>9} {:>8} {:>9} {:>8} {}\n",
            fmt_strike(r.base.strike),
            r.base.call_oi,
            r.base.call_volume,
            fmt_iv(r.base.call_iv),
            r.base.put_oi,
            r.base.put_volume,
            fmt_iv(r.base.put_iv),
            r.d_oi,
            fmt_iv(Some(r.iv_used)),
            gex,
        ));
    }

    let m = &analysis.result.metrics;
    out.push_str(&format!(
        "{} k = {:.4}  gamma avg = {:.6e}  IV median = {:.4}  T = {:.2} days\n",
        "ℹ".blue(),
        m.k,
        m.gamma_avg,
        m.iv_median_core,
        m.t_days
    ));
    out
}
