//! Work item and job dispatch table
//!
//! A work item is one (symbol, job) unit of pending processing. The job
//! determines which upstream endpoint is called, how the price-history
//! window is shaped, and which result table receives the normalized
//! document. The dispatch table is static - adding a job means adding an
//! enum variant and its `JobSpec`, not another string match.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Classification of what data a work item fetches and computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    /// Instrument fundamentals (~35 ratios), refreshed on a long cycle.
    Fundamentals,
    /// 15 days of 30-minute bars - longer trend research.
    MediumTrend,
    /// 14 hours of 15-minute bars - short trend analysis.
    ShortTrend,
    /// Same window as ShortTrend, kept as its own collection for the
    /// realtime signal consumers.
    Signals,
}

impl JobType {
    pub const ALL: [JobType; 4] = [
        JobType::Fundamentals,
        JobType::MediumTrend,
        JobType::ShortTrend,
        JobType::Signals,
    ];

    /// Stable name used as the queue/audit key and CLI argument.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Fundamentals => "fundamentals",
            JobType::MediumTrend => "medium-trend",
            JobType::ShortTrend => "short-trend",
            JobType::Signals => "signals",
        }
    }

    pub fn from_str(s: &str) -> Option<JobType> {
        JobType::ALL.iter().copied().find(|j| j.as_str() == s)
    }

    /// Static dispatch entry for this job.
    pub fn spec(&self) -> &'static JobSpec {
        match self {
            JobType::Fundamentals => &FUNDAMENTALS_SPEC,
            JobType::MediumTrend => &MEDIUM_TREND_SPEC,
            JobType::ShortTrend => &SHORT_TREND_SPEC,
            JobType::Signals => &SIGNALS_SPEC,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a work item in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Waiting for the API call phase.
    Pending,
    /// API call done; transform/load owns the item.
    InTransform,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pending => "pending",
            Stage::InTransform => "in-transform",
        }
    }

    pub fn from_str(s: &str) -> Option<Stage> {
        match s {
            "pending" => Some(Stage::Pending),
            "in-transform" => Some(Stage::InTransform),
            _ => None,
        }
    }
}

/// One (symbol, job) unit of work. Unique by that pair in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub symbol: String,
    pub job: JobType,
    pub stage: Stage,
}

impl WorkItem {
    pub fn new(symbol: impl Into<String>, job: JobType) -> Self {
        Self {
            symbol: symbol.into(),
            job,
            stage: Stage::Pending,
        }
    }
}

/// Which endpoint family a job calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `GET /instruments?projection=fundamental&symbol=X`
    Instruments,
    /// `GET /marketdata/{symbol}/pricehistory`
    PriceHistory,
}

/// Price-history window shape, resolved against a reference time.
#[derive(Debug, Clone, Copy)]
pub struct Window {
    /// Bar width in minutes.
    pub frequency_minutes: u32,
    /// Window length counted back from the end boundary.
    pub lookback: Lookback,
}

#[derive(Debug, Clone, Copy)]
pub enum Lookback {
    Days(i64),
    Hours(i64),
}

impl Window {
    /// Resolve the (startDate, endDate) pair in Unix milliseconds.
    ///
    /// The end boundary is the start of the day after `now`, so an intraday
    /// run always covers the full current session including extended hours.
    pub fn resolve(&self, now: DateTime<Utc>) -> (i64, i64) {
        let end = next_day(beginning_of_day(now));
        let start = match self.lookback {
            Lookback::Days(d) => end - Duration::days(d),
            Lookback::Hours(h) => end - Duration::hours(h),
        };
        (start.timestamp_millis(), end.timestamp_millis())
    }
}

/// Static per-job dispatch entry: endpoint, window, result table.
#[derive(Debug)]
pub struct JobSpec {
    pub endpoint: Endpoint,
    pub window: Option<Window>,
    /// Result-store table receiving the normalized document.
    pub result_table: &'static str,
}

static FUNDAMENTALS_SPEC: JobSpec = JobSpec {
    endpoint: Endpoint::Instruments,
    window: None,
    result_table: "fundamentals",
};

static MEDIUM_TREND_SPEC: JobSpec = JobSpec {
    endpoint: Endpoint::PriceHistory,
    window: Some(Window {
        frequency_minutes: 30,
        lookback: Lookback::Days(15),
    }),
    result_table: "medium_trend",
};

static SHORT_TREND_SPEC: JobSpec = JobSpec {
    endpoint: Endpoint::PriceHistory,
    window: Some(Window {
        frequency_minutes: 15,
        lookback: Lookback::Hours(14),
    }),
    result_table: "short_trend",
};

static SIGNALS_SPEC: JobSpec = JobSpec {
    endpoint: Endpoint::PriceHistory,
    window: Some(Window {
        frequency_minutes: 15,
        lookback: Lookback::Hours(14),
    }),
    result_table: "signals",
};

fn beginning_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc()
}

fn next_day(t: DateTime<Utc>) -> DateTime<Utc> {
    t + Duration::days(1)
}
