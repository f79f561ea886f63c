//! # FleetLink Update Client
//!
//! `fleetlink-client` drives a firmware rollout against a FleetLink server
//! from the device side: poll, interpret the server's directives, stream a
//! new image into the alternate flash slot, arm the bootloader for a one-shot
//! test boot, and report back.
//!
//! The crate is `no_std` (plus `alloc` for the growable response buffer) and
//! talks to the board exclusively through the port traits in [`ports`]:
//! a [`ports::ServerLink`] for the HTTP session and a [`ports::DevicePlatform`]
//! for the bootloader, the image slot, the persisted action id, and the
//! device identity. That keeps the whole state machine host-testable against
//! scripted mocks.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut agent = Agent::new(link, platform, AgentConfig::new("esp32"));
//!
//! // Once, at boot: confirm the running image and erase the alternate slot.
//! boot_init(agent.platform_mut())?;
//!
//! loop {
//!     let outcome = agent.probe().await;
//!     // log the outcome, reboot on UnconfirmedImage
//!     sleep_ms(agent.poll_interval_ms()).await;
//! }
//! ```

#![no_std]

extern crate alloc;

pub mod agent;
pub mod collector;
pub mod download;
pub mod ports;

pub use agent::{Agent, AgentConfig, ProbeOutcome, boot_init};
pub use download::{DownloadState, DownloadStatus};
