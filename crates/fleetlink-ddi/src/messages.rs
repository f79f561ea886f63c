//! Rollout server JSON documents.
//!
//! These types match the exact JSON schema the server speaks. Incoming
//! documents borrow from the response buffer; outgoing feedback and config
//! bodies are rendered into a caller-provided status buffer.

use core::fmt::Write as _;

use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

use crate::ActionId;

/// Upper bound for chunks and artifacts accepted per deployment. The agent
/// only ever installs single-chunk, single-artifact deployments; anything
/// larger than this bound fails to decode.
pub const DEP_MAX_CHUNKS: usize = 4;
pub const DEP_MAX_ARTIFACTS: usize = 4;

/// Size of the buffer outgoing feedback/config bodies are rendered into.
pub const STATUS_BUFFER_SIZE: usize = 200;

/// One `{"href": "..."}` link object.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Href<'a> {
    #[serde(borrow)]
    pub href: &'a str,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PollingSleep<'a> {
    #[serde(borrow, default)]
    pub sleep: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Polling<'a> {
    #[serde(borrow, default)]
    pub polling: PollingSleep<'a>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ControlLinks<'a> {
    #[serde(borrow, default, rename = "deploymentBase")]
    pub deployment_base: Option<Href<'a>>,
    #[serde(borrow, default, rename = "cancelAction")]
    pub cancel_action: Option<Href<'a>>,
    #[serde(borrow, default, rename = "configData")]
    pub config_data: Option<Href<'a>>,
}

/// Top-level poll document: poll cadence plus the sub-resources the server
/// wants the device to visit.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ControlResponse<'a> {
    #[serde(borrow, default)]
    pub config: Polling<'a>,
    #[serde(borrow, default, rename = "_links")]
    pub links: ControlLinks<'a>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ArtifactHashes<'a> {
    #[serde(borrow, default)]
    pub sha1: Option<&'a str>,
    #[serde(borrow, default)]
    pub md5: Option<&'a str>,
    #[serde(borrow, default)]
    pub sha256: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ArtifactLinks<'a> {
    #[serde(borrow, default, rename = "download-http")]
    pub download_http: Option<Href<'a>>,
    #[serde(borrow, default, rename = "md5sum-http")]
    pub md5sum_http: Option<Href<'a>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Artifact<'a> {
    #[serde(borrow, default)]
    pub filename: Option<&'a str>,
    #[serde(borrow, default)]
    pub hashes: ArtifactHashes<'a>,
    pub size: u32,
    #[serde(borrow, default, rename = "_links")]
    pub links: ArtifactLinks<'a>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chunk<'a> {
    #[serde(borrow)]
    pub part: &'a str,
    #[serde(borrow, default)]
    pub version: Option<&'a str>,
    #[serde(borrow, default)]
    pub name: Option<&'a str>,
    #[serde(borrow)]
    pub artifacts: Vec<Artifact<'a>, DEP_MAX_ARTIFACTS>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentDetail<'a> {
    /// Download policy token ("skip", "attempt", "forced"). Advisory only.
    #[serde(borrow, default)]
    pub download: Option<&'a str>,
    /// Update policy token. Advisory only.
    #[serde(borrow, default)]
    pub update: Option<&'a str>,
    #[serde(borrow)]
    pub chunks: Vec<Chunk<'a>, DEP_MAX_CHUNKS>,
}

/// Deployment descriptor: one pending rollout for this device.
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentResponse<'a> {
    #[serde(borrow)]
    pub id: &'a str,
    #[serde(borrow)]
    pub deployment: DeploymentDetail<'a>,
}

/// Execution state reported back to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Execution {
    Closed,
    Proceeding,
    Canceled,
    Scheduled,
    Rejected,
    Resumed,
    None,
}

/// Final result reported back to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Finished {
    Success,
    Failure,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResult {
    pub finished: Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub execution: Execution,
    pub result: StatusResult,
}

impl Status {
    /// The status closing an interaction successfully.
    pub const fn closed_success() -> Self {
        Self {
            execution: Execution::Closed,
            result: StatusResult {
                finished: Finished::Success,
            },
        }
    }
}

/// Status report closing a cancel or deployment interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback<'a> {
    #[serde(borrow)]
    pub id: &'a str,
    #[serde(borrow, default)]
    pub time: &'a str,
    pub status: Status,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConfigData<'a> {
    #[serde(rename = "VIN")]
    pub vin: &'a str,
    #[serde(rename = "hwRevision")]
    pub hw_revision: &'a str,
}

/// Controller attributes pushed when the server links `configData`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConfigMessage<'a> {
    pub mode: &'a str,
    pub data: ConfigData<'a>,
    pub id: &'a str,
    pub time: &'a str,
    pub status: Status,
}

/// Body could not be rendered into the status buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeError;

/// Render a feedback body for the given action into `buf`, returning the
/// encoded length.
pub fn encode_feedback(
    id: ActionId,
    execution: Execution,
    finished: Finished,
    buf: &mut [u8],
) -> Result<usize, EncodeError> {
    let mut id_text: String<11> = String::new();
    let _ = write!(id_text, "{id}");
    let message = Feedback {
        id: id_text.as_str(),
        time: "",
        status: Status {
            execution,
            result: StatusResult { finished },
        },
    };
    serde_json_core::to_slice(&message, buf).map_err(|_| EncodeError)
}

/// Render the controller attributes body into `buf`, returning the encoded
/// length.
pub fn encode_config(
    device_id: &str,
    hw_revision: &str,
    buf: &mut [u8],
) -> Result<usize, EncodeError> {
    let message = ConfigMessage {
        mode: "merge",
        data: ConfigData {
            vin: device_id,
            hw_revision,
        },
        id: "",
        time: "",
        status: Status::closed_success(),
    };
    serde_json_core::to_slice(&message, buf).map_err(|_| EncodeError)
}
