//! Bearer credential provider
//!
//! The credential lives in an externally managed JSON file holding the
//! access token, its issuance date, and a TTL. The provider caches the
//! token in memory and re-reads the file only once the cached value has
//! expired, so calling `fetch` per work item does not hammer the disk.

use crate::error::{AppError, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Credential file layout:
///
/// ```json
/// {
///   "headers": { "date": "Tue, 01 Aug 2023 14:00:00 +0000" },
///   "data": { "access_token": "...", "expires_in": 1800 }
/// }
/// ```
#[derive(Debug, Deserialize)]
struct TokenFile {
    headers: TokenHeaders,
    data: TokenData,
}

#[derive(Debug, Deserialize)]
struct TokenHeaders {
    /// RFC 2822 issuance timestamp, as returned by the auth endpoint.
    date: String,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    access_token: String,
    /// Lifetime in seconds from the issuance date.
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expiration: DateTime<Utc>,
}

/// Caching bearer-token provider backed by a credential file.
#[derive(Debug)]
pub struct TokenProvider {
    path: PathBuf,
    cached: Mutex<CachedToken>,
}

impl TokenProvider {
    /// Read the credential file and prime the cache. A missing or
    /// malformed file is fatal here - the worker cannot run without auth.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let cached = read_token(&path)?;
        Ok(Self {
            path,
            cached: Mutex::new(cached),
        })
    }

    /// Return the cached token, re-reading the backing file only when the
    /// cached value has expired.
    pub fn fetch(&self) -> Result<String> {
        let mut cached = self.cached.lock();
        if Utc::now() > cached.expiration {
            tracing::debug!("bearer token expired, re-reading {:?}", self.path);
            *cached = read_token(&self.path)?;
        }
        Ok(cached.value.clone())
    }
}

fn read_token(path: &Path) -> Result<CachedToken> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AppError::Token(format!("reading credential file {:?}: {}", path, e)))?;
    let file: TokenFile = serde_json::from_str(&raw)
        .map_err(|e| AppError::Token(format!("parsing credential file {:?}: {}", path, e)))?;
    let issued = DateTime::parse_from_rfc2822(&file.headers.date)
        .map_err(|e| AppError::Token(format!("parsing credential date: {}", e)))?
        .with_timezone(&Utc);
    Ok(CachedToken {
        value: file.data.access_token,
        expiration: issued + Duration::seconds(file.data.expires_in),
    })
}
