use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackingService, OptimizePolicy, OptimizeStats};
use crate::config::OptimizeConfig;
use crate::error::Result;

/// Periodic compaction of locally materialized blobs
pub struct StorageOptimizer;

impl StorageOptimizer {
    pub async fn run_once(backend: &dyn BackingService, policy: &OptimizePolicy) -> Result<OptimizeStats> {
        let stats = backend.optimize_storage(policy).await?;
        tracing::info!(
            "Storage optimized: {} files removed, {} freed",
            stats.count,
            size_stringify(stats.size)
        );
        Ok(stats)
    }

    /// Start the interval loop; `None` when disabled
    pub fn start(
        backend: Arc<dyn BackingService>,
        config: &OptimizeConfig,
        shutdown: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        if !config.enabled {
            tracing::info!("Storage optimizer disabled");
            return None;
        }

        let policy = config.policy();
        let mut ticker = tokio::time::interval(config.interval());
        tracing::info!(
            "Storage optimizer every {}s (max {} / {} files)",
            config.interval_secs,
            size_stringify(policy.max_total_size),
            policy.max_files_count
        );

        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = Self::run_once(backend.as_ref(), &policy).await {
                            tracing::error!("Storage optimization failed: {}", e);
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        }))
    }
}

/// Human readable byte count
pub fn size_stringify(size: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", size)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
