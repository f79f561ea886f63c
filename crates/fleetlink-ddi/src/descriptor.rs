//! Decoding rules for server-supplied descriptors.
//!
//! The server embeds everything the device needs in hrefs and formatted
//! strings: the poll cadence, the cancel and deployment sub-resources, and
//! the artifact download path. All extraction here is bounded; suffixes that
//! do not fit their buffer are rejected rather than truncated.

use heapless::String;

use crate::messages::DeploymentResponse;
use crate::{ActionId, TENANT_BASE_PATH};

/// The poll sleep string is strictly `HH:MM:SS`.
pub const SLEEP_LENGTH: usize = 8;

/// Bounds on the href suffixes copied out of control and deployment
/// documents.
pub const CANCEL_BASE_SIZE: usize = 50;
pub const DEPLOYMENT_BASE_SIZE: usize = 50;
pub const DOWNLOAD_PATH_SIZE: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorError {
    /// The href does not contain the expected marker.
    MissingMarker,
    /// The suffix from the marker does not fit its buffer.
    SuffixTooLong,
    /// The embedded action id is missing, unparsable, or not positive.
    InvalidActionId,
    /// The deployment does not contain exactly one chunk.
    ChunkCount,
    /// The single chunk is not the application part.
    UnsupportedPart,
    /// The chunk does not contain exactly one artifact.
    ArtifactCount,
    /// The artifact does not fit the alternate slot.
    ArtifactTooBig,
    /// The artifact carries no `download-http` link.
    MissingDownloadLink,
}

/// Decode a poll sleep string into seconds.
///
/// Returns `None` for anything that is not exactly 8 characters or that
/// decodes to zero; the caller keeps its current interval in that case.
pub fn sleep_seconds(sleep: &str) -> Option<u32> {
    if sleep.len() != SLEEP_LENGTH {
        return None;
    }

    let hours: u32 = sleep.get(0..2)?.parse().ok()?;
    let minutes: u32 = sleep.get(3..5)?.parse().ok()?;
    let seconds: u32 = sleep.get(6..8)?.parse().ok()?;

    let total = hours * 3600 + minutes * 60 + seconds;
    (total > 0).then_some(total)
}

/// Extract the cancel sub-resource (`cancelAction/<id>`) and its action id
/// from a cancel href.
pub fn cancel_base(
    href: &str,
) -> Result<(String<CANCEL_BASE_SIZE>, ActionId), DescriptorError> {
    let start = href
        .find("cancelAction/")
        .ok_or(DescriptorError::MissingMarker)?;
    let suffix = &href[start..];
    if suffix.len() >= CANCEL_BASE_SIZE {
        return Err(DescriptorError::SuffixTooLong);
    }

    let id_text = suffix
        .split('/')
        .nth(1)
        .ok_or(DescriptorError::InvalidActionId)?;
    let id: ActionId = id_text
        .parse()
        .map_err(|_| DescriptorError::InvalidActionId)?;
    if id <= 0 {
        return Err(DescriptorError::InvalidActionId);
    }

    let mut base = String::new();
    let _ = base.push_str(suffix);
    Ok((base, id))
}

/// Extract the deployment sub-resource (`deploymentBase/<id>`) from a
/// deployment href.
pub fn deployment_base(
    href: &str,
) -> Result<String<DEPLOYMENT_BASE_SIZE>, DescriptorError> {
    let start = href
        .find("deploymentBase/")
        .ok_or(DescriptorError::MissingMarker)?;
    let suffix = &href[start..];
    if suffix.len() >= DEPLOYMENT_BASE_SIZE {
        return Err(DescriptorError::SuffixTooLong);
    }

    let mut base = String::new();
    let _ = base.push_str(suffix);
    Ok(base)
}

/// Everything the agent needs to run one install, validated against the
/// deployment constraints: a positive action id, exactly one `bApp` chunk
/// with exactly one artifact, an artifact that fits the alternate slot, and
/// a download link on the configured host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPlan {
    pub action_id: ActionId,
    pub size: usize,
    pub download_path: String<DOWNLOAD_PATH_SIZE>,
}

pub fn parse_deployment(
    response: &DeploymentResponse<'_>,
    slot_capacity: usize,
) -> Result<DeploymentPlan, DescriptorError> {
    let action_id: ActionId = response
        .id
        .parse()
        .map_err(|_| DescriptorError::InvalidActionId)?;
    if action_id <= 0 {
        return Err(DescriptorError::InvalidActionId);
    }

    if response.deployment.chunks.len() != 1 {
        return Err(DescriptorError::ChunkCount);
    }
    let chunk = &response.deployment.chunks[0];
    if chunk.part != "bApp" {
        return Err(DescriptorError::UnsupportedPart);
    }

    if chunk.artifacts.len() != 1 {
        return Err(DescriptorError::ArtifactCount);
    }
    let artifact = &chunk.artifacts[0];
    if artifact.size as usize > slot_capacity {
        return Err(DescriptorError::ArtifactTooBig);
    }

    // Only the default tenant on the configured server is supported; the
    // download is issued as a path against the same session.
    let href = artifact
        .links
        .download_http
        .as_ref()
        .map(|link| link.href)
        .ok_or(DescriptorError::MissingDownloadLink)?;
    let start = href
        .find(TENANT_BASE_PATH)
        .ok_or(DescriptorError::MissingMarker)?;
    let suffix = &href[start..];
    if suffix.len() >= DOWNLOAD_PATH_SIZE {
        return Err(DescriptorError::SuffixTooLong);
    }

    let mut download_path = String::new();
    let _ = download_path.push_str(suffix);
    Ok(DeploymentPlan {
        action_id,
        size: artifact.size as usize,
        download_path,
    })
}
