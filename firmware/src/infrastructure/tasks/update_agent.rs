//! The recurring update task: probe, report, sleep, repeat.

use embassy_time::{Duration, Timer};
use esp_println::println;
use fleetlink_client::{Agent, ProbeOutcome};

use crate::infrastructure::platform::EspPlatform;
#[cfg(not(feature = "tls"))]
use crate::infrastructure::services::EspServerLink;
#[cfg(feature = "tls")]
use crate::infrastructure::services::TlsServerLink;

#[cfg(not(feature = "tls"))]
pub type UpdateAgent = Agent<EspServerLink, EspPlatform>;
#[cfg(feature = "tls")]
pub type UpdateAgent = Agent<TlsServerLink, EspPlatform>;

/// Runs one probe cycle, logs its outcome, and reschedules itself after the
/// current poll interval. Only an unconfirmed running image reboots the
/// device; after `UpdateInstalled` the reboot is left to an external actor.
#[embassy_executor::task]
pub async fn update_agent_task(agent: &'static mut UpdateAgent) {
    loop {
        match agent.probe().await {
            ProbeOutcome::UnconfirmedImage => {
                println!("update: running image is unconfirmed");
                println!("update: rebooting to the previous confirmed image");
                esp_hal::system::software_reset();
            }
            ProbeOutcome::NoUpdate => println!("update: no update found"),
            ProbeOutcome::CancelUpdate => println!("update: update canceled by the server"),
            ProbeOutcome::Ok => println!("update: image is already up to date"),
            ProbeOutcome::UpdateInstalled => {
                println!("update: update installed, please reboot");
            }
            ProbeOutcome::DownloadError => println!("update: download failed"),
            ProbeOutcome::NetworkingError => println!("update: network error"),
            ProbeOutcome::MetadataError => println!("update: metadata error"),
        }

        Timer::after(Duration::from_millis(u64::from(agent.poll_interval_ms()))).await;
    }
}
