//! SNTP time synchronization.
//!
//! The sync wait is a setup-path blocking call and is bounded; steady-state
//! code never waits on it.

use std::time::Duration;

use anyhow::{bail, Result};
use esp_idf_svc::sntp::{EspSntp, SyncStatus};
use log::info;

/// Poll interval while waiting for the first synchronization.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Start SNTP and wait (bounded) for the clock to synchronize.
///
/// Returns the SNTP handle, which must be kept alive for periodic
/// resynchronization to continue.
pub fn sync_time(max_attempts: u32) -> Result<EspSntp<'static>> {
    info!("Initializing SNTP");
    let sntp = EspSntp::new_default()?;

    let mut attempt = 0;
    while sntp.get_sync_status() != SyncStatus::Completed {
        attempt += 1;
        if attempt >= max_attempts {
            bail!("system time not synchronized after {} attempts", max_attempts);
        }
        info!(
            "Waiting for system time to be set... ({}/{})",
            attempt, max_attempts
        );
        std::thread::sleep(POLL_INTERVAL);
    }

    info!("system time synchronized");
    Ok(sntp)
}
