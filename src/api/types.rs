//! Raw upstream payload types
//!
//! Field names mirror the upstream JSON exactly. Every numeric field is
//! defaulted because the upstream omits ratios it cannot compute for a
//! given instrument.

use serde::{Deserialize, Serialize};

/// Instrument payload from the fundamentals endpoint. The upstream nests
/// this one level deep under the symbol key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Instrument {
    pub fundamental: Fundamental,
    pub cusip: String,
    pub symbol: String,
    pub description: String,
    pub exchange: String,
}

/// The ~35 fundamental ratios and descriptive fields of an instrument.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Fundamental {
    pub symbol: String,
    pub high52: f64,
    pub low52: f64,
    pub dividend_amount: f64,
    pub dividend_yield: f64,
    pub dividend_date: String,
    pub pe_ratio: f64,
    pub peg_ratio: f64,
    pub pb_ratio: f64,
    pub pr_ratio: f64,
    pub pcf_ratio: f64,
    #[serde(rename = "grossMarginTTM")]
    pub gross_margin_ttm: f64,
    #[serde(rename = "grossMarginMRQ")]
    pub gross_margin_mrq: f64,
    #[serde(rename = "netProfitMarginTTM")]
    pub net_profit_margin_ttm: f64,
    #[serde(rename = "netProfitMarginMRQ")]
    pub net_profit_margin_mrq: f64,
    #[serde(rename = "operatingMarginTTM")]
    pub operating_margin_ttm: f64,
    #[serde(rename = "operatingMarginMRQ")]
    pub operating_margin_mrq: f64,
    pub return_on_equity: f64,
    pub return_on_assets: f64,
    pub return_on_investment: f64,
    pub quick_ratio: f64,
    pub current_ratio: f64,
    pub interest_coverage: f64,
    pub total_debt_to_capital: f64,
    pub lt_debt_to_equity: f64,
    pub total_debt_to_equity: f64,
    #[serde(rename = "epsTTM")]
    pub eps_ttm: f64,
    #[serde(rename = "epsChangePercentTTM")]
    pub eps_change_percent_ttm: f64,
    pub eps_change_year: f64,
    pub eps_change: i64,
    pub rev_change_year: i64,
    #[serde(rename = "revChangeTTM")]
    pub rev_change_ttm: f64,
    pub rev_change_in: i64,
    pub shares_outstanding: i64,
    pub market_cap_float: f64,
    pub market_cap: f64,
    pub book_value_per_share: f64,
    pub short_int_to_float: i64,
    pub short_int_day_to_cover: i64,
    #[serde(rename = "divGrowthRate3Year")]
    pub div_growth_rate_3_year: i64,
    pub dividend_pay_amount: f64,
    pub dividend_pay_date: String,
    pub beta: f64,
    #[serde(rename = "vol1DayAvg")]
    pub vol_1_day_avg: i64,
    #[serde(rename = "vol10DayAvg")]
    pub vol_10_day_avg: i64,
    #[serde(rename = "vol3MonthAvg")]
    pub vol_3_month_avg: i64,
}

/// One intraday bar from the price-history endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Candle {
    pub datetime: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Raw price-history payload: an ordered candle sequence per symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceHistory {
    pub symbol: String,
    pub candles: Vec<Candle>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fundamental_deserializes_upstream_names() {
        let raw = serde_json::json!({
            "symbol": "TSLA",
            "peRatio": 61.2,
            "grossMarginTTM": 25.0,
            "epsTTM": 3.1,
            "marketCap": 800000.0,
            "vol10DayAvg": 120000
        });
        let f: Fundamental = serde_json::from_value(raw).unwrap();
        assert_eq!(f.symbol, "TSLA");
        assert_eq!(f.pe_ratio, 61.2);
        assert_eq!(f.gross_margin_ttm, 25.0);
        assert_eq!(f.eps_ttm, 3.1);
        assert_eq!(f.vol_10_day_avg, 120000);
        // Omitted fields default rather than fail.
        assert_eq!(f.beta, 0.0);
    }

    #[test]
    fn test_price_history_preserves_candle_order() {
        let raw = serde_json::json!({
            "symbol": "MSFT",
            "candles": [
                { "datetime": 1, "open": 1.0, "high": 1.0, "low": 1.0, "close": 1.0, "volume": 10 },
                { "datetime": 2, "open": 2.0, "high": 2.0, "low": 2.0, "close": 2.0, "volume": 20 }
            ]
        });
        let ph: PriceHistory = serde_json::from_value(raw).unwrap();
        assert_eq!(ph.candles.len(), 2);
        assert_eq!(ph.candles[0].datetime, 1);
        assert_eq!(ph.candles[1].datetime, 2);
    }
}
