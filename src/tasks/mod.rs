//! Background scheduled tasks.
//!
//! The core services never schedule themselves; the process decides which
//! sweeps to run. Call `spawn_all` once during startup.

use crate::config::TasksConfig;
use crate::services::PairedRetryService;

/// Spawn all configured background tasks.
///
/// A zero interval leaves the corresponding task disabled. Tasks are detached
/// via `tokio::spawn`; this function does not block.
pub fn spawn_all(tasks: &TasksConfig, paired_retry_service: PairedRetryService) {
    // 配对失效扫描
    if tasks.paired_sweep_interval_secs > 0 {
        let interval = std::time::Duration::from_secs(tasks.paired_sweep_interval_secs);
        let svc = paired_retry_service.clone();
        tokio::spawn(async move {
            loop {
                match svc.invalidate_paired().await {
                    Ok(n) if n > 0 => log::info!("Paired retry sweep disabled {n} tokens"),
                    Ok(_) => {}
                    Err(e) => log::error!("Failed to run paired retry sweep: {e:?}"),
                }
                tokio::time::sleep(interval).await;
            }
        });
    } else {
        log::info!("Paired retry sweep disabled (paired_sweep_interval_secs = 0)");
    }
}
