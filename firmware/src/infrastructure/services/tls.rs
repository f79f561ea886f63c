//! TLS session to the rollout server, with a pinned CA and SNI set to the
//! configured host.

use embassy_net::{Stack, tcp::TcpSocket};
use embedded_tls::{
    Aes128GcmSha256,
    Certificate,
    TlsConfig,
    TlsConnection,
    TlsContext,
    UnsecureProvider,
};
use esp_hal::rng::Trng;
use esp_println::println;
use fleetlink_client::ports::{LinkError, Request, ResponseSink, ServerLink};

use crate::config;
use crate::core::net::http::{self, ClientRequest};

use super::server_link::{RECV_TIMEOUT, RX_BUFFER_SIZE, TX_BUFFER_SIZE, resolve_server};

/// TLS record buffers; one full record each way.
pub const TLS_RECORD_SIZE: usize = 16_640;

/// Like `EspServerLink`, but with an `embedded-tls` session on top of the
/// socket. The handshake runs during `connect`, before the first request.
pub struct TlsServerLink {
    stack: Stack<'static>,
    rx_buffer: *mut [u8; RX_BUFFER_SIZE],
    tx_buffer: *mut [u8; TX_BUFFER_SIZE],
    read_record: *mut [u8; TLS_RECORD_SIZE],
    write_record: *mut [u8; TLS_RECORD_SIZE],
    rng: Trng<'static>,
    session: Option<TlsConnection<'static, TcpSocket<'static>, Aes128GcmSha256>>,
}

// Safety: the update agent task is the sole owner of the buffers and session.
unsafe impl Send for TlsServerLink {}

impl TlsServerLink {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stack: Stack<'static>,
        rx_buffer: &'static mut [u8; RX_BUFFER_SIZE],
        tx_buffer: &'static mut [u8; TX_BUFFER_SIZE],
        read_record: &'static mut [u8; TLS_RECORD_SIZE],
        write_record: &'static mut [u8; TLS_RECORD_SIZE],
        rng: Trng<'static>,
    ) -> Self {
        Self {
            stack,
            rx_buffer,
            tx_buffer,
            read_record,
            write_record,
            rng,
            session: None,
        }
    }
}

impl ServerLink for TlsServerLink {
    async fn connect(&mut self) -> Result<(), LinkError> {
        // Drop any previous session before reusing the buffers.
        self.session = None;

        // Safety: buffers are exclusively owned by this link and the
        // previous session is gone.
        let rx_buffer = unsafe { &mut *self.rx_buffer };
        let tx_buffer = unsafe { &mut *self.tx_buffer };
        let read_record = unsafe { &mut *self.read_record };
        let write_record = unsafe { &mut *self.write_record };

        let mut socket = TcpSocket::new(self.stack, rx_buffer, tx_buffer);
        socket.set_timeout(Some(RECV_TIMEOUT));

        let address = resolve_server(self.stack).await?;
        if let Err(e) = socket.connect((address, config::SERVER.port)).await {
            socket.abort();
            println!("update: connect failed: {e:?}");
            return Err(LinkError::Connect);
        }

        let tls_config = TlsConfig::new()
            .with_server_name(config::SERVER.host)
            .with_ca(Certificate::X509(config::CA_CERT_DER));
        let mut session = TlsConnection::new(socket, read_record, write_record);
        if let Err(e) = session
            .open(TlsContext::new(
                &tls_config,
                UnsecureProvider::new::<Aes128GcmSha256>(&mut self.rng),
            ))
            .await
        {
            println!("update: TLS handshake failed: {e:?}");
            return Err(LinkError::Connect);
        }

        self.session = Some(session);
        Ok(())
    }

    async fn request(
        &mut self,
        request: Request<'_>,
        sink: &mut dyn ResponseSink,
    ) -> Result<(), LinkError> {
        let Some(session) = self.session.as_mut() else {
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
        match http::exchange(session, &client_request, sink).await {
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
        if let Some(session) = self.session.take() {
            let _ = session.close().await;
        }
    }
}
