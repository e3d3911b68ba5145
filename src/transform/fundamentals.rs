//! Fundamentals normalization
//!
//! The upstream nests the instrument payload under the symbol key. All
//! ratio fields are rounded to 2 decimals. Instruments under the market-cap
//! floor get a minimal partial document - a deliberate cost-saving rule,
//! not an error path.

use crate::api::types::{Fundamental, Instrument};
use crate::error::{AppError, Result};
use crate::transform::price_history::round2;
use serde_json::{json, Value};

/// Market cap (in millions) below which only {symbol, marketCap} is kept.
pub const MARKET_CAP_FLOOR: f64 = 500.0;

/// Normalize a raw instruments payload into the persisted document.
pub fn normalize(body: &Value, symbol: &str) -> Result<Value> {
    // The payload is nested inside the symbol
    let payload = body.get(symbol).ok_or_else(|| {
        AppError::Decode(format!("instruments payload missing symbol key {}", symbol))
    })?;
    let mut instrument: Instrument = serde_json::from_value(payload.clone())?;

    // Floor check runs on the raw value: 499.999 is below the floor even
    // though it would round to 500.00 for storage.
    if instrument.fundamental.market_cap < MARKET_CAP_FLOOR {
        return Ok(json!({
            "symbol": symbol,
            "marketCap": round2(instrument.fundamental.market_cap),
        }));
    }

    instrument.fundamental.market_cap = round2(instrument.fundamental.market_cap);

    round_fundamental(&mut instrument.fundamental);
    Ok(serde_json::to_value(&instrument)?)
}

fn round_fundamental(f: &mut Fundamental) {
    f.high52 = round2(f.high52);
    f.low52 = round2(f.low52);
    f.dividend_amount = round2(f.dividend_amount);
    f.dividend_yield = round2(f.dividend_yield);
    f.pe_ratio = round2(f.pe_ratio);
    f.peg_ratio = round2(f.peg_ratio);
    f.pb_ratio = round2(f.pb_ratio);
    f.pr_ratio = round2(f.pr_ratio);
    f.pcf_ratio = round2(f.pcf_ratio);
    f.gross_margin_ttm = round2(f.gross_margin_ttm);
    f.gross_margin_mrq = round2(f.gross_margin_mrq);
    f.net_profit_margin_ttm = round2(f.net_profit_margin_ttm);
    f.net_profit_margin_mrq = round2(f.net_profit_margin_mrq);
    f.operating_margin_ttm = round2(f.operating_margin_ttm);
    f.operating_margin_mrq = round2(f.operating_margin_mrq);
    f.return_on_equity = round2(f.return_on_equity);
    f.return_on_assets = round2(f.return_on_assets);
    f.return_on_investment = round2(f.return_on_investment);
    f.quick_ratio = round2(f.quick_ratio);
    f.current_ratio = round2(f.current_ratio);
    f.interest_coverage = round2(f.interest_coverage);
    f.total_debt_to_capital = round2(f.total_debt_to_capital);
    f.lt_debt_to_equity = round2(f.lt_debt_to_equity);
    f.total_debt_to_equity = round2(f.total_debt_to_equity);
    f.eps_ttm = round2(f.eps_ttm);
    f.eps_change_percent_ttm = round2(f.eps_change_percent_ttm);
    f.eps_change_year = round2(f.eps_change_year);
    f.rev_change_ttm = round2(f.rev_change_ttm);
    f.market_cap_float = round2(f.market_cap_float);
    f.book_value_per_share = round2(f.book_value_per_share);
    f.dividend_pay_amount = round2(f.dividend_pay_amount);
    f.beta = round2(f.beta);
}
