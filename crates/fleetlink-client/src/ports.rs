//! Port traits between the update state machine and the board.
//!
//! The firmware package implements these against embassy-net, the esp-idf
//! bootloader data and raw flash; the integration tests implement them with
//! scripted mocks.

use fleetlink_ddi::ActionId;
use heapless::String;

pub const DEVICE_ID_MAX: usize = 32;
pub const VERSION_MAX: usize = 32;

/// Error from the device platform (bootloader, flash, persistent store).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformError {
    Boot,
    Flash,
    Storage,
}

/// Reason a response sink aborted the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    /// The response buffer could not grow.
    Overflow,
    /// The image writer rejected a chunk.
    Write,
}

/// Error from the server link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    Resolve,
    Connect,
    Io,
    /// The sink refused a body slice; the link closed the transfer.
    Aborted(SinkError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

/// What a request is for; the transport uses it for log labels only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    ControlPoll,
    CancelFeedback,
    ConfigData,
    DeploymentBase,
    DeploymentFeedback,
    ArtifactDownload,
}

/// One HTTP request of a probe cycle. JSON bodies are already rendered.
pub struct Request<'a> {
    pub method: Method,
    pub path: &'a str,
    pub body: Option<&'a [u8]>,
    pub kind: RequestKind,
}

impl<'a> Request<'a> {
    pub fn get(path: &'a str, kind: RequestKind) -> Self {
        Self {
            method: Method::Get,
            path,
            body: None,
            kind,
        }
    }

    pub fn post(path: &'a str, body: &'a [u8], kind: RequestKind) -> Self {
        Self {
            method: Method::Post,
            path,
            body: Some(body),
            kind,
        }
    }

    pub fn put(path: &'a str, body: &'a [u8], kind: RequestKind) -> Self {
        Self {
            method: Method::Put,
            path,
            body: Some(body),
            kind,
        }
    }
}

/// Receives a response body as it arrives.
///
/// `on_content_length` is called once, before the first slice. The last
/// slice carries `last == true`; an error return makes the link abort the
/// transfer and close the connection.
pub trait ResponseSink {
    fn on_content_length(&mut self, length: usize);
    fn on_body(&mut self, chunk: &[u8], last: bool) -> Result<(), SinkError>;
}

/// One (TLS) session to the rollout server, serving the requests of a single
/// probe cycle.
#[allow(async_fn_in_trait)]
pub trait ServerLink {
    async fn connect(&mut self) -> Result<(), LinkError>;
    async fn request(
        &mut self,
        request: Request<'_>,
        sink: &mut dyn ResponseSink,
    ) -> Result<(), LinkError>;
    async fn close(&mut self);
}

/// Identity of this device as the server knows it.
pub trait DeviceIdentity {
    fn device_id(&self) -> Option<String<DEVICE_ID_MAX>>;
    fn firmware_version(&self) -> Option<String<VERSION_MAX>>;
}

/// Bootloader primitives for the slotted image layout.
pub trait BootControl {
    fn is_image_confirmed(&mut self) -> bool;
    /// Promote the currently running image to permanent.
    fn confirm_image(&mut self) -> Result<(), PlatformError>;
    fn erase_alternate_slot(&mut self) -> Result<(), PlatformError>;
    fn alternate_slot_size(&mut self) -> usize;
    /// Arm a one-shot boot of the staged image; confirmation happens on the
    /// next successful boot.
    fn request_upgrade(&mut self) -> Result<(), PlatformError>;
}

/// Streaming writer into the alternate slot.
pub trait ImageSink {
    fn begin_image(&mut self) -> Result<(), PlatformError>;
    /// Append a chunk; `last` flushes any buffered tail.
    fn append_image(&mut self, chunk: &[u8], last: bool) -> Result<(), PlatformError>;
    fn image_bytes_written(&self) -> usize;
}

/// The persisted last-installed action id.
pub trait ActionIdStore {
    /// Returns [`fleetlink_ddi::ACTION_ID_NONE`] when nothing was installed
    /// yet.
    fn load_action_id(&mut self) -> ActionId;
    fn store_action_id(&mut self, id: ActionId) -> Result<(), PlatformError>;
}

/// Everything the state machine needs from the board.
pub trait DevicePlatform:
    BootControl + DeviceIdentity + ImageSink + ActionIdStore
{
}
