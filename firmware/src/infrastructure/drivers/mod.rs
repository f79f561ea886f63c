mod network;

pub use network::{init_network_stack, wait_for_connection};
pub(crate) use network::resolve_host;
