mod image_writer;
mod server_link;
#[cfg(feature = "tls")]
mod tls;

pub use image_writer::FlashImageWriter;
pub use server_link::{EspServerLink, RX_BUFFER_SIZE, TX_BUFFER_SIZE};
#[cfg(feature = "tls")]
pub use tls::{TLS_RECORD_SIZE, TlsServerLink};
