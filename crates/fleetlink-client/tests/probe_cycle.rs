//! Full probe cycles against a scripted server and a mock platform.

use embassy_futures::block_on;
use fleetlink_client::ports::{
    ActionIdStore,
    BootControl,
    DeviceIdentity,
    DevicePlatform,
    ImageSink,
    LinkError,
    Method,
    PlatformError,
    Request,
    ResponseSink,
    ServerLink,
};
use fleetlink_client::{Agent, AgentConfig, ProbeOutcome, boot_init};
use fleetlink_ddi::{ACTION_ID_NONE, ActionId};

const BOARD: &str = "x";
const DEVICE_ID: &str = "dev01";

struct ScriptEntry {
    method: Method,
    path: &'static str,
    body: Vec<u8>,
    /// Body is delivered to the sink in slices of this size.
    chunk: usize,
}

impl ScriptEntry {
    fn new(method: Method, path: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method,
            path,
            body: body.into(),
            chunk: 128,
        }
    }

    fn chunked(mut self, chunk: usize) -> Self {
        self.chunk = chunk;
        self
    }
}

/// A server link that answers from a fixed script and records every request.
#[derive(Default)]
struct ScriptedLink {
    script: Vec<ScriptEntry>,
    next: usize,
    sent: Vec<(Method, String, Vec<u8>)>,
    connects: usize,
    closes: usize,
}

impl ScriptedLink {
    fn new(script: Vec<ScriptEntry>) -> Self {
        Self {
            script,
            ..Default::default()
        }
    }
}

impl ServerLink for ScriptedLink {
    async fn connect(&mut self) -> Result<(), LinkError> {
        self.connects += 1;
        Ok(())
    }

    async fn request(
        &mut self,
        request: Request<'_>,
        sink: &mut dyn ResponseSink,
    ) -> Result<(), LinkError> {
        let entry = self
            .script
            .get(self.next)
            .unwrap_or_else(|| panic!("unexpected request: {}", request.path));
        self.next += 1;

        assert_eq!(request.method, entry.method, "method for {}", request.path);
        assert_eq!(request.path, entry.path);
        self.sent.push((
            request.method,
            request.path.to_string(),
            request.body.unwrap_or(&[]).to_vec(),
        ));

        sink.on_content_length(entry.body.len());
        if entry.body.is_empty() {
            sink.on_body(&[], true).map_err(LinkError::Aborted)?;
            return Ok(());
        }

        let chunk = entry.chunk.max(1);
        let mut offset = 0;
        while offset < entry.body.len() {
            let end = (offset + chunk).min(entry.body.len());
            sink.on_body(&entry.body[offset..end], end == entry.body.len())
                .map_err(LinkError::Aborted)?;
            offset = end;
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.closes += 1;
    }
}

struct MockPlatform {
    confirmed: bool,
    slot_size: usize,
    stored: ActionId,
    written: Vec<u8>,
    flushed: bool,
    begin_calls: usize,
    upgrade_calls: usize,
    confirm_calls: usize,
    erase_calls: usize,
    store_calls: usize,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self {
            confirmed: true,
            slot_size: 0x1E_0000,
            stored: ACTION_ID_NONE,
            written: Vec::new(),
            flushed: false,
            begin_calls: 0,
            upgrade_calls: 0,
            confirm_calls: 0,
            erase_calls: 0,
            store_calls: 0,
        }
    }
}

impl BootControl for MockPlatform {
    fn is_image_confirmed(&mut self) -> bool {
        self.confirmed
    }

    fn confirm_image(&mut self) -> Result<(), PlatformError> {
        self.confirm_calls += 1;
        self.confirmed = true;
        Ok(())
    }

    fn erase_alternate_slot(&mut self) -> Result<(), PlatformError> {
        self.erase_calls += 1;
        Ok(())
    }

    fn alternate_slot_size(&mut self) -> usize {
        self.slot_size
    }

    fn request_upgrade(&mut self) -> Result<(), PlatformError> {
        self.upgrade_calls += 1;
        Ok(())
    }
}

impl ImageSink for MockPlatform {
    fn begin_image(&mut self) -> Result<(), PlatformError> {
        self.begin_calls += 1;
        self.written.clear();
        self.flushed = false;
        Ok(())
    }

    fn append_image(&mut self, chunk: &[u8], last: bool) -> Result<(), PlatformError> {
        self.written.extend_from_slice(chunk);
        if last {
            self.flushed = true;
        }
        Ok(())
    }

    fn image_bytes_written(&self) -> usize {
        self.written.len()
    }
}

impl ActionIdStore for MockPlatform {
    fn load_action_id(&mut self) -> ActionId {
        self.stored
    }

    fn store_action_id(&mut self, id: ActionId) -> Result<(), PlatformError> {
        self.store_calls += 1;
        self.stored = id;
        Ok(())
    }
}

impl DeviceIdentity for MockPlatform {
    fn device_id(&self) -> Option<heapless::String<32>> {
        heapless::String::try_from(DEVICE_ID).ok()
    }

    fn firmware_version(&self) -> Option<heapless::String<32>> {
        heapless::String::try_from("1.0.0").ok()
    }
}

impl DevicePlatform for MockPlatform {}

fn agent(
    script: Vec<ScriptEntry>,
    platform: MockPlatform,
) -> Agent<ScriptedLink, MockPlatform> {
    Agent::new(ScriptedLink::new(script), platform, AgentConfig::new(BOARD))
}

const POLL_PATH: &str = "/DEFAULT/controller/v1/x-dev01";

const FEEDBACK_CLOSED_SUCCESS_7: &str =
    r#"{"id":"7","time":"","status":{"execution":"closed","result":{"finished":"success"}}}"#;
const FEEDBACK_CLOSED_SUCCESS_42: &str =
    r#"{"id":"42","time":"","status":{"execution":"closed","result":{"finished":"success"}}}"#;

fn deployment_body(size: usize) -> String {
    format!(
        r#"{{"id":"42","deployment":{{"download":"forced","update":"forced","chunks":[{{"part":"bApp","version":"1.0.1","name":"core","artifacts":[{{"filename":"core.bin","hashes":{{"sha1":"da39a3ee","md5":"d41d8cd9","sha256":"e3b0c442"}},"size":{size},"_links":{{"download-http":{{"href":"https://srv:8080/DEFAULT/controller/v1/x-dev01/softwaremodules/7/artifacts/core.bin"}}}}}}]}}]}}}}"#
    )
}

#[test]
fn no_update_applies_server_sleep() {
    let script = vec![ScriptEntry::new(
        Method::Get,
        POLL_PATH,
        r#"{"config":{"polling":{"sleep":"00:05:00"}},"_links":{}}"#.as_bytes(),
    )];
    let mut agent = agent(script, MockPlatform::default());

    assert_eq!(block_on(agent.probe()), ProbeOutcome::NoUpdate);
    assert_eq!(agent.poll_interval_ms(), 300_000);
}

#[test]
fn server_sleep_is_clamped_to_the_configured_window() {
    let script = vec![
        ScriptEntry::new(
            Method::Get,
            POLL_PATH,
            r#"{"config":{"polling":{"sleep":"00:00:30"}},"_links":{}}"#.as_bytes(),
        ),
        ScriptEntry::new(
            Method::Get,
            POLL_PATH,
            r#"{"config":{"polling":{"sleep":"23:59:59"}},"_links":{}}"#.as_bytes(),
        ),
    ];
    let mut agent = agent(script, MockPlatform::default());

    assert_eq!(block_on(agent.probe()), ProbeOutcome::NoUpdate);
    assert_eq!(agent.poll_interval_ms(), 120_000);

    assert_eq!(block_on(agent.probe()), ProbeOutcome::NoUpdate);
    assert_eq!(agent.poll_interval_ms(), 43_200_000);
}

#[test]
fn malformed_sleep_keeps_the_current_interval() {
    let script = vec![ScriptEntry::new(
        Method::Get,
        POLL_PATH,
        r#"{"config":{"polling":{"sleep":"5m"}},"_links":{}}"#.as_bytes(),
    )];
    let mut agent = agent(script, MockPlatform::default());

    assert_eq!(block_on(agent.probe()), ProbeOutcome::NoUpdate);
    assert_eq!(agent.poll_interval_ms(), 300_000);
}

#[test]
fn cancellation_is_acknowledged() {
    let script = vec![
        ScriptEntry::new(
            Method::Get,
            POLL_PATH,
            r#"{"_links":{"cancelAction":{"href":"https://srv:8080/DEFAULT/controller/v1/x-dev01/cancelAction/7"}}}"#.as_bytes(),
        ),
        ScriptEntry::new(
            Method::Post,
            "/DEFAULT/controller/v1/x-dev01/cancelAction/7/feedback",
            &b""[..],
        ),
    ];
    let mut agent = agent(script, MockPlatform::default());

    assert_eq!(block_on(agent.probe()), ProbeOutcome::CancelUpdate);

    let link = agent_link(&agent);
    assert_eq!(link.sent.len(), 2);
    assert_eq!(
        std::str::from_utf8(&link.sent[1].2).unwrap(),
        FEEDBACK_CLOSED_SUCCESS_7
    );
}

#[test]
fn cancellation_takes_precedence_over_deployment() {
    let script = vec![
        ScriptEntry::new(
            Method::Get,
            POLL_PATH,
            r#"{"_links":{"cancelAction":{"href":"https://srv:8080/DEFAULT/controller/v1/x-dev01/cancelAction/7"},"deploymentBase":{"href":"https://srv:8080/DEFAULT/controller/v1/x-dev01/deploymentBase/42"}}}"#.as_bytes(),
        ),
        ScriptEntry::new(
            Method::Post,
            "/DEFAULT/controller/v1/x-dev01/cancelAction/7/feedback",
            &b""[..],
        ),
    ];
    let mut agent = agent(script, MockPlatform::default());

    assert_eq!(block_on(agent.probe()), ProbeOutcome::CancelUpdate);
    // The deployment descriptor was never fetched.
    assert_eq!(agent_link(&agent).sent.len(), 2);
    assert!(agent.platform().written.is_empty());
}

#[test]
fn malformed_cancel_href_is_a_metadata_error() {
    let script = vec![ScriptEntry::new(
        Method::Get,
        POLL_PATH,
        r#"{"_links":{"cancelAction":{"href":"https://srv:8080/nothing/here"}}}"#.as_bytes(),
    )];
    let mut agent = agent(script, MockPlatform::default());

    assert_eq!(block_on(agent.probe()), ProbeOutcome::MetadataError);
    assert_eq!(agent_link(&agent).sent.len(), 1);
}

#[test]
fn config_data_is_pushed_when_linked() {
    let script = vec![
        ScriptEntry::new(
            Method::Get,
            POLL_PATH,
            r#"{"_links":{"configData":{"href":"https://srv:8080/DEFAULT/controller/v1/x-dev01/configData"}}}"#.as_bytes(),
        ),
        ScriptEntry::new(
            Method::Put,
            "/DEFAULT/controller/v1/x-dev01/configData",
            &b""[..],
        ),
    ];
    let mut agent = agent(script, MockPlatform::default());

    assert_eq!(block_on(agent.probe()), ProbeOutcome::NoUpdate);

    let link = agent_link(&agent);
    assert_eq!(
        std::str::from_utf8(&link.sent[1].2).unwrap(),
        r#"{"mode":"merge","data":{"VIN":"dev01","hwRevision":"3"},"id":"","time":"","status":{"execution":"closed","result":{"finished":"success"}}}"#
    );
}

fn install_script(artifact: &[u8]) -> Vec<ScriptEntry> {
    vec![
        ScriptEntry::new(
            Method::Get,
            POLL_PATH,
            r#"{"_links":{"deploymentBase":{"href":"https://srv:8080/DEFAULT/controller/v1/x-dev01/deploymentBase/42"}}}"#.as_bytes(),
        ),
        ScriptEntry::new(
            Method::Get,
            "/DEFAULT/controller/v1/x-dev01/deploymentBase/42",
            deployment_body(artifact.len()).into_bytes(),
        ),
        ScriptEntry::new(
            Method::Get,
            "/DEFAULT/controller/v1/x-dev01/softwaremodules/7/artifacts/core.bin",
            artifact.to_vec(),
        )
        .chunked(100),
    ]
}

#[test]
fn fresh_deployment_is_installed() {
    let artifact = vec![0xA5u8; 1024];
    let mut agent = agent(install_script(&artifact), MockPlatform::default());

    assert_eq!(block_on(agent.probe()), ProbeOutcome::UpdateInstalled);

    let platform = agent.platform();
    assert_eq!(platform.written, artifact);
    assert!(platform.flushed);
    assert_eq!(platform.begin_calls, 1);
    assert_eq!(platform.upgrade_calls, 1);
    assert_eq!(platform.store_calls, 1);
    assert_eq!(platform.stored, 42);
    assert_eq!(agent_link(&agent).closes, 1);
}

#[test]
fn known_deployment_is_acknowledged_without_reinstall() {
    let script = vec![
        ScriptEntry::new(
            Method::Get,
            POLL_PATH,
            r#"{"_links":{"deploymentBase":{"href":"https://srv:8080/DEFAULT/controller/v1/x-dev01/deploymentBase/42"}}}"#.as_bytes(),
        ),
        ScriptEntry::new(
            Method::Get,
            "/DEFAULT/controller/v1/x-dev01/deploymentBase/42",
            deployment_body(1024).into_bytes(),
        ),
        ScriptEntry::new(
            Method::Post,
            "/DEFAULT/controller/v1/x-dev01/deploymentBase/42/feedback",
            &b""[..],
        ),
    ];
    let platform = MockPlatform {
        stored: 42,
        ..Default::default()
    };
    let mut agent = agent(script, platform);

    assert_eq!(block_on(agent.probe()), ProbeOutcome::Ok);

    let platform = agent.platform();
    assert!(platform.written.is_empty());
    assert_eq!(platform.begin_calls, 0);
    assert_eq!(platform.upgrade_calls, 0);
    assert_eq!(platform.stored, 42);

    let link = agent_link(&agent);
    assert_eq!(
        std::str::from_utf8(&link.sent[2].2).unwrap(),
        FEEDBACK_CLOSED_SUCCESS_42
    );
}

#[test]
fn unchanged_deployment_is_idempotent_across_cycles() {
    let one_cycle = || {
        vec![
            ScriptEntry::new(
                Method::Get,
                POLL_PATH,
                r#"{"_links":{"deploymentBase":{"href":"https://srv:8080/DEFAULT/controller/v1/x-dev01/deploymentBase/42"}}}"#.as_bytes(),
            ),
            ScriptEntry::new(
                Method::Get,
                "/DEFAULT/controller/v1/x-dev01/deploymentBase/42",
                deployment_body(1024).into_bytes(),
            ),
            ScriptEntry::new(
                Method::Post,
                "/DEFAULT/controller/v1/x-dev01/deploymentBase/42/feedback",
                &b""[..],
            ),
        ]
    };
    let mut script = one_cycle();
    script.extend(one_cycle());
    script.extend(one_cycle());

    let platform = MockPlatform {
        stored: 42,
        ..Default::default()
    };
    let mut agent = agent(script, platform);

    for _ in 0..3 {
        assert_eq!(block_on(agent.probe()), ProbeOutcome::Ok);
        assert!(agent.platform().written.is_empty());
        assert_eq!(agent.platform().upgrade_calls, 0);
        assert_eq!(agent.platform().stored, 42);
    }
}

#[test]
fn oversized_artifact_is_a_download_error() {
    let platform = MockPlatform {
        slot_size: 1024,
        ..Default::default()
    };
    let script = vec![
        ScriptEntry::new(
            Method::Get,
            POLL_PATH,
            r#"{"_links":{"deploymentBase":{"href":"https://srv:8080/DEFAULT/controller/v1/x-dev01/deploymentBase/42"}}}"#.as_bytes(),
        ),
        ScriptEntry::new(
            Method::Get,
            "/DEFAULT/controller/v1/x-dev01/deploymentBase/42",
            deployment_body(1025).into_bytes(),
        ),
    ];
    let mut agent = agent(script, platform);

    assert_eq!(block_on(agent.probe()), ProbeOutcome::DownloadError);

    let platform = agent.platform();
    assert!(platform.written.is_empty());
    assert_eq!(platform.begin_calls, 0);
    assert_eq!(platform.upgrade_calls, 0);
}

#[test]
fn unconfirmed_image_exits_before_any_networking() {
    let platform = MockPlatform {
        confirmed: false,
        ..Default::default()
    };
    let mut agent = agent(Vec::new(), platform);

    assert_eq!(block_on(agent.probe()), ProbeOutcome::UnconfirmedImage);

    let link = agent_link(&agent);
    assert_eq!(link.connects, 0);
    assert_eq!(link.sent.len(), 0);
}

#[test]
fn every_completed_cycle_closes_the_session() {
    let script = vec![ScriptEntry::new(
        Method::Get,
        POLL_PATH,
        r#"{"_links":{}}"#.as_bytes(),
    )];
    let mut agent = agent(script, MockPlatform::default());

    assert_eq!(block_on(agent.probe()), ProbeOutcome::NoUpdate);

    let link = agent_link(&agent);
    assert_eq!(link.connects, 1);
    assert_eq!(link.closes, 1);
}

#[test]
fn boot_init_confirms_a_fresh_image_and_erases_the_alternate_slot() {
    let mut platform = MockPlatform {
        confirmed: false,
        ..Default::default()
    };

    boot_init(&mut platform).unwrap();

    assert!(platform.confirmed);
    assert_eq!(platform.confirm_calls, 1);
    assert_eq!(platform.erase_calls, 1);
}

#[test]
fn boot_init_leaves_a_confirmed_image_alone() {
    let mut platform = MockPlatform::default();

    boot_init(&mut platform).unwrap();

    assert_eq!(platform.confirm_calls, 0);
    assert_eq!(platform.erase_calls, 0);
}

fn agent_link<'a>(
    agent: &'a Agent<ScriptedLink, MockPlatform>,
) -> &'a ScriptedLink {
    agent.link()
}
