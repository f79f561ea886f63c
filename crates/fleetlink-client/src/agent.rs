//! The probe orchestrator: one full poll cycle against the rollout server.

use core::fmt::Write as _;

use fleetlink_ddi::messages::{
    self,
    ControlResponse,
    DeploymentResponse,
    Execution,
    Finished,
    STATUS_BUFFER_SIZE,
};
use fleetlink_ddi::{TENANT_BASE_PATH, descriptor};
use heapless::String;

use crate::collector::{DiscardSink, JsonCollector};
use crate::download::ImageDownload;
use crate::ports::{
    DevicePlatform,
    LinkError,
    Request,
    RequestKind,
    ServerLink,
    SinkError,
};

/// Upper bound for assembled request URLs.
pub const URL_BUFFER_SIZE: usize = 300;

/// Terminal result of one probe cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The offered deployment is already installed; acknowledged again.
    Ok,
    /// The server offered no deployment.
    NoUpdate,
    /// The server canceled a pending action; acknowledged.
    CancelUpdate,
    /// A new image is staged and the bootloader is armed.
    UpdateInstalled,
    /// The running image was never confirmed; the caller should reboot into
    /// the previous image.
    UnconfirmedImage,
    DownloadError,
    NetworkingError,
    MetadataError,
}

#[derive(Debug, Clone, Copy)]
pub struct AgentConfig {
    /// Board identifier interpolated into every URL.
    pub board: &'static str,
    /// Interval used until the server supplies one.
    pub poll_interval_ms: u32,
    /// Clamp for server-supplied intervals.
    pub poll_interval_min_ms: u32,
    pub poll_interval_max_ms: u32,
}

impl AgentConfig {
    pub const fn new(board: &'static str) -> Self {
        Self {
            board,
            poll_interval_ms: 300_000,
            poll_interval_min_ms: 120_000,
            poll_interval_max_ms: 43_200_000,
        }
    }
}

/// The device-side update agent.
///
/// Owns the server link and the device platform; `probe` runs one cycle and
/// keeps no state beyond the poll interval.
pub struct Agent<L: ServerLink, P: DevicePlatform> {
    link: L,
    platform: P,
    config: AgentConfig,
    poll_interval_ms: u32,
}

impl<L: ServerLink, P: DevicePlatform> Agent<L, P> {
    pub fn new(link: L, platform: P, config: AgentConfig) -> Self {
        let poll_interval_ms = config.poll_interval_ms;
        Self {
            link,
            platform,
            config,
            poll_interval_ms,
        }
    }

    /// Interval until the next cycle, in milliseconds.
    pub fn poll_interval_ms(&self) -> u32 {
        self.poll_interval_ms
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Run one full poll cycle and return its terminal outcome.
    ///
    /// On `UnconfirmedImage` no connection is opened; every other path opens
    /// one session, walks the request sequence, and closes it.
    pub async fn probe(&mut self) -> ProbeOutcome {
        if !self.platform.is_image_confirmed() {
            log::error!("the running image is not confirmed");
            return ProbeOutcome::UnconfirmedImage;
        }

        let Some(version) = self.platform.firmware_version() else {
            return ProbeOutcome::MetadataError;
        };
        let Some(device_id) = self.platform.device_id() else {
            return ProbeOutcome::MetadataError;
        };
        log::debug!("probing as {} (firmware {})", device_id, version);

        if self.link.connect().await.is_err() {
            log::error!("could not reach the rollout server");
            return ProbeOutcome::NetworkingError;
        }

        let outcome = self.cycle(device_id.as_str()).await;
        self.link.close().await;
        outcome
    }

    async fn cycle(&mut self, device_id: &str) -> ProbeOutcome {
        let mut url: String<URL_BUFFER_SIZE> = String::new();
        let mut status_buf = [0u8; STATUS_BUFFER_SIZE];

        // Control poll.
        url.clear();
        let _ = write!(url, "{TENANT_BASE_PATH}/{}-{}", self.config.board, device_id);

        let mut collector = JsonCollector::new();
        if let Err(err) = self
            .link
            .request(Request::get(&url, RequestKind::ControlPoll), &mut collector)
            .await
        {
            return outcome_for_link_error(err);
        }
        let Ok(body) = collector.finish() else {
            log::error!("control response length mismatch");
            return ProbeOutcome::MetadataError;
        };
        let Ok((control, _)) = serde_json_core::from_slice::<ControlResponse>(body) else {
            log::error!("control response parse error");
            return ProbeOutcome::MetadataError;
        };
        dump_control(&control);

        if let Some(sleep) = control.config.polling.sleep {
            self.update_poll_interval(sleep);
        }

        // A pending cancellation takes precedence over everything else.
        if let Some(link) = control.links.cancel_action {
            let (cancel, cancel_id) = match descriptor::cancel_base(link.href) {
                Ok(parts) => parts,
                Err(err) => {
                    log::error!("bad cancel href {}: {:?}", link.href, err);
                    return ProbeOutcome::MetadataError;
                }
            };

            url.clear();
            let _ = write!(
                url,
                "{TENANT_BASE_PATH}/{}-{}/{}/feedback",
                self.config.board, device_id, cancel
            );
            let Ok(len) = messages::encode_feedback(
                cancel_id,
                Execution::Closed,
                Finished::Success,
                &mut status_buf,
            ) else {
                return ProbeOutcome::MetadataError;
            };
            let mut sink = DiscardSink;
            if self
                .link
                .request(
                    Request::post(&url, &status_buf[..len], RequestKind::CancelFeedback),
                    &mut sink,
                )
                .await
                .is_err()
            {
                return ProbeOutcome::NetworkingError;
            }
            return ProbeOutcome::CancelUpdate;
        }

        // Push controller attributes when the server asks for them.
        if control.links.config_data.is_some() {
            url.clear();
            let _ = write!(
                url,
                "{TENANT_BASE_PATH}/{}-{}/configData",
                self.config.board, device_id
            );
            let Ok(len) = messages::encode_config(device_id, "3", &mut status_buf) else {
                return ProbeOutcome::MetadataError;
            };
            let mut sink = DiscardSink;
            if self
                .link
                .request(
                    Request::put(&url, &status_buf[..len], RequestKind::ConfigData),
                    &mut sink,
                )
                .await
                .is_err()
            {
                log::error!("unable to send controller attributes");
                return ProbeOutcome::NetworkingError;
            }
        }

        // Fetch the deployment descriptor, if any.
        let deployment_base = match control.links.deployment_base {
            None => return ProbeOutcome::NoUpdate,
            Some(link) => match descriptor::deployment_base(link.href) {
                Ok(base) => base,
                Err(err) => {
                    log::error!("bad deployment href {}: {:?}", link.href, err);
                    return ProbeOutcome::MetadataError;
                }
            },
        };

        url.clear();
        let _ = write!(
            url,
            "{TENANT_BASE_PATH}/{}-{}/{}",
            self.config.board, device_id, deployment_base
        );

        let mut deployment_body = JsonCollector::new();
        if let Err(err) = self
            .link
            .request(
                Request::get(&url, RequestKind::DeploymentBase),
                &mut deployment_body,
            )
            .await
        {
            return outcome_for_link_error(err);
        }
        let Ok(body) = deployment_body.finish() else {
            log::error!("deployment response length mismatch");
            return ProbeOutcome::MetadataError;
        };
        let Ok((deployment, _)) = serde_json_core::from_slice::<DeploymentResponse>(body)
        else {
            log::error!("deployment response parse error");
            return ProbeOutcome::MetadataError;
        };
        dump_deployment(&deployment);

        let slot_capacity = self.platform.alternate_slot_size();
        let plan = match descriptor::parse_deployment(&deployment, slot_capacity) {
            Ok(plan) => plan,
            Err(descriptor::DescriptorError::ArtifactTooBig) => {
                log::error!("artifact does not fit the alternate slot");
                return ProbeOutcome::DownloadError;
            }
            Err(err) => {
                log::error!("unable to parse deployment: {:?}", err);
                return ProbeOutcome::MetadataError;
            }
        };

        // An unchanged action id must not be installed again; just close the
        // interaction once more.
        let persisted = self.platform.load_action_id();
        if persisted == plan.action_id {
            log::info!(
                "preventing repeated attempt to install action {}",
                plan.action_id
            );
            url.clear();
            let _ = write!(
                url,
                "{TENANT_BASE_PATH}/{}-{}/deploymentBase/{}/feedback",
                self.config.board, device_id, plan.action_id
            );
            let Ok(len) = messages::encode_feedback(
                plan.action_id,
                Execution::Closed,
                Finished::Success,
                &mut status_buf,
            ) else {
                return ProbeOutcome::MetadataError;
            };
            let mut sink = DiscardSink;
            if self
                .link
                .request(
                    Request::post(
                        &url,
                        &status_buf[..len],
                        RequestKind::DeploymentFeedback,
                    ),
                    &mut sink,
                )
                .await
                .is_err()
            {
                return ProbeOutcome::NetworkingError;
            }
            return ProbeOutcome::Ok;
        }

        // Stream the artifact into the alternate slot.
        log::info!("ready to install update for action {}", plan.action_id);
        if self.platform.begin_image().is_err() {
            return ProbeOutcome::DownloadError;
        }
        let mut download = ImageDownload::new(&mut self.platform);
        match self
            .link
            .request(
                Request::get(&plan.download_path, RequestKind::ArtifactDownload),
                &mut download,
            )
            .await
        {
            Ok(()) => {}
            Err(LinkError::Aborted(SinkError::Write)) => {
                log::error!("flash write error");
                return ProbeOutcome::DownloadError;
            }
            Err(LinkError::Aborted(_)) => return ProbeOutcome::MetadataError,
            Err(_) => return ProbeOutcome::NetworkingError,
        }

        let state = download.state;
        if state.downloaded_size != state.http_content_size {
            log::error!(
                "download length mismatch ({} of {} bytes)",
                state.downloaded_size,
                state.http_content_size
            );
            return ProbeOutcome::MetadataError;
        }

        if self.platform.request_upgrade().is_err() {
            log::error!("could not arm the staged image");
            return ProbeOutcome::DownloadError;
        }
        if self.platform.store_action_id(plan.action_id).is_err() {
            // The image is already armed; losing the record only costs one
            // redundant feedback on a later cycle.
            log::warn!("failed to persist action id {}", plan.action_id);
        }
        ProbeOutcome::UpdateInstalled
    }

    fn update_poll_interval(&mut self, sleep: &str) {
        let Some(seconds) = descriptor::sleep_seconds(sleep) else {
            log::error!("invalid poll sleep: {}", sleep);
            return;
        };
        let millis = seconds.saturating_mul(1000).clamp(
            self.config.poll_interval_min_ms,
            self.config.poll_interval_max_ms,
        );
        if millis != self.poll_interval_ms {
            log::debug!("new poll sleep: {} ms", millis);
            self.poll_interval_ms = millis;
        }
    }
}

fn outcome_for_link_error(err: LinkError) -> ProbeOutcome {
    match err {
        LinkError::Aborted(SinkError::Overflow) => ProbeOutcome::MetadataError,
        LinkError::Aborted(SinkError::Write) => ProbeOutcome::DownloadError,
        _ => ProbeOutcome::NetworkingError,
    }
}

fn dump_control(control: &ControlResponse<'_>) {
    log::debug!("config.polling.sleep={:?}", control.config.polling.sleep);
    log::debug!(
        "_links.deploymentBase={:?}",
        control.links.deployment_base.map(|link| link.href)
    );
    log::debug!(
        "_links.configData={:?}",
        control.links.config_data.map(|link| link.href)
    );
    log::debug!(
        "_links.cancelAction={:?}",
        control.links.cancel_action.map(|link| link.href)
    );
}

fn dump_deployment(deployment: &DeploymentResponse<'_>) {
    log::debug!("id={}", deployment.id);
    log::debug!("deployment.download={:?}", deployment.deployment.download);
    log::debug!("deployment.update={:?}", deployment.deployment.update);
    if let Some(chunk) = deployment.deployment.chunks.first() {
        log::debug!(
            "chunks[0].part={} name={:?} version={:?}",
            chunk.part,
            chunk.name,
            chunk.version
        );
        if let Some(artifact) = chunk.artifacts.first() {
            log::debug!(
                "artifacts[0].filename={:?} size={}",
                artifact.filename,
                artifact.size
            );
            log::debug!(
                "artifacts[0].hashes sha1={:?} md5={:?} sha256={:?}",
                artifact.hashes.sha1,
                artifact.hashes.md5,
                artifact.hashes.sha256
            );
            log::debug!(
                "artifacts[0].download-http={:?}",
                artifact.links.download_http.map(|link| link.href)
            );
        }
    }
}

/// One-shot boot-time maintenance: log the persisted action id, and when the
/// running image is not confirmed yet, promote it and erase the alternate
/// slot so a fresh download starts clean.
pub fn boot_init<P: DevicePlatform>(platform: &mut P) -> Result<(), crate::ports::PlatformError> {
    let current = platform.load_action_id();
    log::debug!("persisted action id: {}", current);

    let confirmed = platform.is_image_confirmed();
    log::info!(
        "running image is {}confirmed",
        if confirmed { "" } else { "not " }
    );
    if !confirmed {
        platform.confirm_image()?;
        log::debug!("marked running image as confirmed");
        platform.erase_alternate_slot()?;
    }
    Ok(())
}
