//! Plain-TCP session to the rollout server.

use embassy_net::{Stack, tcp::TcpSocket};
use embassy_time::{Duration, Timer};
use esp_println::println;
use fleetlink_client::ports::{LinkError, Request, ResponseSink, ServerLink};

use crate::config;
use crate::core::net::http::{self, ClientRequest};
use crate::infrastructure::drivers::resolve_host;

pub const RX_BUFFER_SIZE: usize = 2048;
pub const TX_BUFFER_SIZE: usize = 1024;

pub(crate) const RESOLVE_ATTEMPTS: u32 = 10;
pub(crate) const RESOLVE_RETRY_DELAY: Duration = Duration::from_millis(1);
pub(crate) const RECV_TIMEOUT: Duration = Duration::from_secs(300);

/// One connection per probe cycle; all requests of the cycle share it.
///
/// The socket buffers are owned by the task that drives the agent; the raw
/// pointers follow the single-owner assumption used elsewhere for flash.
pub struct EspServerLink {
    stack: Stack<'static>,
    rx_buffer: *mut [u8; RX_BUFFER_SIZE],
    tx_buffer: *mut [u8; TX_BUFFER_SIZE],
    socket: Option<TcpSocket<'static>>,
}

// Safety: the update agent task is the sole owner of the buffers and socket.
unsafe impl Send for EspServerLink {}

impl EspServerLink {
    pub fn new(
        stack: Stack<'static>,
        rx_buffer: &'static mut [u8; RX_BUFFER_SIZE],
        tx_buffer: &'static mut [u8; TX_BUFFER_SIZE],
    ) -> Self {
        Self {
            stack,
            rx_buffer,
            tx_buffer,
            socket: None,
        }
    }
}

/// Resolve the configured server, retrying briefly on transient DNS
/// failures.
pub(crate) async fn resolve_server(
    stack: Stack<'static>,
) -> Result<embassy_net::IpAddress, LinkError> {
    let mut attempts = RESOLVE_ATTEMPTS;
    loop {
        match resolve_host(stack, config::SERVER.host).await {
            Ok(address) => return Ok(address),
            Err(()) => {
                attempts -= 1;
                if attempts == 0 {
                    println!("update: could not resolve {}", config::SERVER.host);
                    return Err(LinkError::Resolve);
                }
                Timer::after(RESOLVE_RETRY_DELAY).await;
            }
        }
    }
}

impl ServerLink for EspServerLink {
    async fn connect(&mut self) -> Result<(), LinkError> {
        // Drop any previous socket before reusing the buffers.
        self.socket = None;

        // Safety: buffers are exclusively owned by this link and the
        // previous socket is gone.
        let rx_buffer = unsafe { &mut *self.rx_buffer };
        let tx_buffer = unsafe { &mut *self.tx_buffer };
        let mut socket = TcpSocket::new(self.stack, rx_buffer, tx_buffer);
        socket.set_timeout(Some(RECV_TIMEOUT));

        let address = resolve_server(self.stack).await?;
        if let Err(e) = socket.connect((address, config::SERVER.port)).await {
            socket.abort();
            println!("update: connect failed: {e:?}");
            return Err(LinkError::Connect);
        }

        self.socket = Some(socket);
        Ok(())
    }

    async fn request(
        &mut self,
        request: Request<'_>,
        sink: &mut dyn ResponseSink,
    ) -> Result<(), LinkError> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(LinkError::Io);
        };

        println!(
            "update: {:?}: {} {}",
            request.kind,
            request.method.as_str(),
            request.path
        );
        let client_request = ClientRequest {
            method: request.method,
            path: request.path,
            host: config::SERVER.host,
            body: request.body,
        };
        match http::exchange(socket, &client_request, sink).await {
            Ok(status) => {
                if status >= 400 {
                    println!("update: server answered {} for {:?}", status, request.kind);
                }
                Ok(())
            }
            Err(http::Error::Aborted(reason)) => Err(LinkError::Aborted(reason)),
            Err(_) => Err(LinkError::Io),
        }
    }

    async fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            socket.close();
        }
    }
}
