mod network;
mod update_agent;

pub use network::{network_runner_task, wifi_connection_task};
pub use update_agent::{UpdateAgent, update_agent_task};
