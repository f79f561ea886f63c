//! # FleetLink Rollout Protocol Documents
//!
//! `fleetlink-ddi` provides a `no_std` compatible model of the rollout
//! server's device integration surface: the JSON documents exchanged during a
//! poll cycle and the rules for decoding the descriptors they carry.
//!
//! ## Features
//!
//! - **`no_std` & `no_alloc`:** payloads are borrowed from the response
//!   buffer; bounded copies use `heapless` collections
//! - **Wire-exact field names:** `_links`, `download-http`, `VIN` and friends
//!   are spelled the way the server spells them
//! - **Bounded extraction:** cancel/deployment bases and download paths are
//!   copied into fixed-capacity strings and rejected when they do not fit
//!
//! The update state machine that drives these documents lives in
//! `fleetlink-client`; board integration lives in the firmware package.

#![no_std]

pub mod descriptor;
pub mod messages;

/// Server-assigned identifier of a single rollout directed at this device.
pub type ActionId = i32;

/// Sentinel for "no action installed yet". Valid server ids are positive, so
/// the two can never collide.
pub const ACTION_ID_NONE: ActionId = -1;

/// Root path of the device integration API on the server (default tenant).
///
/// Artifact links pointing anywhere else are rejected; the agent only talks
/// to the one configured host.
pub const TENANT_BASE_PATH: &str = "/DEFAULT/controller/v1";

pub use descriptor::{DeploymentPlan, DescriptorError};
pub use messages::{
    ControlResponse,
    DeploymentResponse,
    Execution,
    Feedback,
    Finished,
    Status,
};
