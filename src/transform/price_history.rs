//! Price-history normalization
//!
//! Adds a volume z-score to every candle so unusual intraday volume is
//! flaggable at query time. Candle order from the upstream is preserved.

use crate::api::types::PriceHistory;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// One normalized candle: rounded OHLC plus the volume z-score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedCandle {
    pub datetime: u64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    #[serde(rename = "volzscore")]
    pub vol_z_score: f64,
}

/// The persisted price-history document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPriceHistory {
    pub symbol: String,
    pub candles: Vec<NormalizedCandle>,
    pub mean_volume: i64,
    pub std_volume: i64,
}

/// Normalize a raw price history: OHLC rounded to 2 decimals, volume
/// z-score per candle rounded to 1 decimal, mean/std volume truncated to
/// integers. Population standard deviation over the whole window.
pub fn normalize(ph: &PriceHistory) -> Result<NormalizedPriceHistory> {
    if ph.candles.is_empty() {
        return Err(AppError::Decode(format!(
            "{}: price history has no candles",
            ph.symbol
        )));
    }

    let volumes: Vec<f64> = ph.candles.iter().map(|c| c.volume as f64).collect();
    let mean = volumes.iter().sum::<f64>() / volumes.len() as f64;
    let variance = volumes.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / volumes.len() as f64;
    let std = variance.sqrt();

    if std == 0.0 {
        return Err(AppError::Decode(format!(
            "{}: zero volume deviation across {} candles",
            ph.symbol,
            ph.candles.len()
        )));
    }

    let candles = ph
        .candles
        .iter()
        .map(|c| NormalizedCandle {
            datetime: c.datetime,
            open: round2(c.open),
            high: round2(c.high),
            low: round2(c.low),
            close: round2(c.close),
            volume: c.volume,
            vol_z_score: round1((c.volume as f64 - mean) / std),
        })
        .collect();

    Ok(NormalizedPriceHistory {
        symbol: ph.symbol.clone(),
        candles,
        mean_volume: mean as i64,
        std_volume: std as i64,
    })
}

pub(crate) fn round2(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

pub(crate) fn round1(n: f64) -> f64 {
    (n * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::Candle;

    fn candle(datetime: u64, volume: i64) -> Candle {
        Candle {
            datetime,
            open: 10.111,
            high: 10.556,
            low: 9.999,
            close: 10.333,
            volume,
        }
    }

    #[test]
    fn test_z_scores_for_known_volumes() {
        let ph = PriceHistory {
            symbol: "TSLA".into(),
            candles: vec![candle(1, 10), candle(2, 20), candle(3, 30)],
        };
        let doc = normalize(&ph).unwrap();

        // mean = 20, population std = sqrt(200/3) ~= 8.165
        assert_eq!(doc.mean_volume, 20);
        assert_eq!(doc.std_volume, 8);
        let z: Vec<f64> = doc.candles.iter().map(|c| c.vol_z_score).collect();
        assert_eq!(z, vec![-1.2, 0.0, 1.2]);
    }

    #[test]
    fn test_candle_order_preserved() {
        let ph = PriceHistory {
            symbol: "MSFT".into(),
            candles: vec![candle(30, 100), candle(10, 200), candle(20, 300)],
        };
        let doc = normalize(&ph).unwrap();
        let datetimes: Vec<u64> = doc.candles.iter().map(|c| c.datetime).collect();
        assert_eq!(datetimes, vec![30, 10, 20]);
    }

    #[test]
    fn test_ohlc_rounded_to_two_decimals() {
        let ph = PriceHistory {
            symbol: "NVDA".into(),
            candles: vec![candle(1, 10), candle(2, 20)],
        };
        let doc = normalize(&ph).unwrap();
        assert_eq!(doc.candles[0].open, 10.11);
        assert_eq!(doc.candles[0].high, 10.56);
        assert_eq!(doc.candles[0].low, 10.0);
        assert_eq!(doc.candles[0].close, 10.33);
    }

    #[test]
    fn test_empty_candles_rejected() {
        let ph = PriceHistory {
            symbol: "EMPTY".into(),
            candles: vec![],
        };
        assert!(matches!(normalize(&ph), Err(AppError::Decode(_))));
    }

    #[test]
    fn test_constant_volume_rejected() {
        let ph = PriceHistory {
            symbol: "FLAT".into(),
            candles: vec![candle(1, 50), candle(2, 50)],
        };
        assert!(matches!(normalize(&ph), Err(AppError::Decode(_))));
    }
}
