// src/handy/clock_sync.rs

//! Client/server clock offset estimation.
//!
//! The offset is measured by round-trip-delay compensated sampling of the
//! device server's clock and persisted to a small JSON file so that frequent
//! restarts within [`RESYNC_COOLDOWN_NS`] skip the network entirely.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use crate::error::Result;
use super::api::{DeviceApi, HandyClient};

pub const SEC_TO_NS: i64 = 1_000_000_000;
pub const RESYNC_COOLDOWN_NS: i64 = 3600 * SEC_TO_NS;

/// Wall clock of the machine running the player.
pub trait LocalClock {
    fn now_ms(&self) -> i64;
    fn now_ns(&self) -> i64;
}

pub struct SystemClock;

impl LocalClock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn now_ns(&self) -> i64 {
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    }
}

/// Anything that can report the remote server's current time in ms.
#[allow(async_fn_in_trait)]
pub trait TimeSource {
    async fn server_time(&self) -> Result<i64>;
}

impl TimeSource for HandyClient {
    async fn server_time(&self) -> Result<i64> {
        DeviceApi::server_time(self).await
    }
}

/// Believed `server_time - client_time`, fixed for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockOffset {
    pub offset_ms: f64,
}

impl ClockOffset {
    pub fn new(offset_ms: f64) -> Self {
        Self { offset_ms }
    }

    /// Estimated current time on the device server.
    pub fn server_time_ms<C: LocalClock>(&self, clock: &C) -> i64 {
        (clock.now_ms() as f64 + self.offset_ms) as i64
    }
}

/// On-disk form of the last estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockSyncCache {
    /// Nanoseconds since the epoch.
    pub last_saved: i64,
    #[serde(alias = "client_server_offset")]
    pub offset_ms: f64,
}

/// Takes one compensated sample: the server stamp is assumed to have been
/// taken halfway through the round trip.
pub async fn measure_offset<S: TimeSource, C: LocalClock>(source: &S, clock: &C) -> Result<f64> {
    let send_time = clock.now_ms();
    let server_time = source.server_time().await?;
    let receive_time = clock.now_ms();

    let rtd = (receive_time - send_time) as f64;
    let estimated_server_time = server_time as f64 + rtd / 2.0;
    Ok(estimated_server_time - receive_time as f64)
}

/// Mean of `n_samples` compensated samples. Any failed sample aborts.
pub async fn estimate_offset<S: TimeSource, C: LocalClock>(
    source: &S,
    clock: &C,
    n_samples: usize,
) -> Result<ClockOffset> {
    let n_samples = n_samples.max(1);
    info!("Calculating offset...");

    let mut aggregate = 0.0;
    for i in 0..n_samples {
        aggregate += measure_offset(source, clock).await?;
        debug!("Sample {}: aggregate offset = {:.2}ms", i, aggregate);
    }

    Ok(ClockOffset::new(aggregate / n_samples as f64))
}

/// Reads the cache file. A missing or unreadable file is `None`.
pub async fn load_cache(path: &Path) -> Option<ClockSyncCache> {
    let content = match fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Couldn't read time sync file {:?}: {}", path, e);
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!("Ignoring malformed time sync file {:?}: {}", path, e);
            None
        }
    }
}

/// Overwrites the cache file (created if absent).
pub async fn save_cache(path: &Path, cache: &ClockSyncCache) -> Result<()> {
    fs::write(path, serde_json::to_vec(cache)?).await?;
    Ok(())
}

/// Settles the offset for this run: reuse a fresh cache entry, otherwise
/// sample the server and rewrite the cache.
pub async fn resolve_offset<S: TimeSource, C: LocalClock>(
    cache_path: &Path,
    source: &S,
    clock: &C,
    n_samples: usize,
    force_resync: bool,
) -> Result<ClockOffset> {
    let cached = load_cache(cache_path).await;
    let last_saved = cached.map_or(0, |c| c.last_saved);

    if let Some(cache) = cached {
        if !force_resync && clock.now_ns().saturating_sub(last_saved) < RESYNC_COOLDOWN_NS {
            info!("Using cached offset: {:.2} ms", cache.offset_ms);
            return Ok(ClockOffset::new(cache.offset_ms));
        }
    }

    let offset = estimate_offset(source, clock, n_samples).await?;
    info!("Syncing complete, new offset: {:.2} ms", offset.offset_ms);

    let cache = ClockSyncCache {
        last_saved: clock.now_ns(),
        offset_ms: offset.offset_ms,
    };
    if let Err(e) = save_cache(cache_path, &cache).await {
        warn!("Couldn't save time sync file {:?}: {}", cache_path, e);
    }

    Ok(offset)
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::Cell;

    /// Manually advanced clock; `now_ns` tracks `now_ms`.
    #[derive(Default)]
    pub struct FakeClock {
        pub ms: Cell<i64>,
    }

    impl FakeClock {
        pub fn at(ms: i64) -> Self {
            Self { ms: Cell::new(ms) }
        }

        pub fn advance(&self, ms: i64) {
            self.ms.set(self.ms.get() + ms);
        }
    }

    impl LocalClock for FakeClock {
        fn now_ms(&self) -> i64 {
            self.ms.get()
        }

        fn now_ns(&self) -> i64 {
            self.ms.get() * 1_000_000
        }
    }
}
