//! Compile-time device configuration.

pub struct ServerConfig {
    pub host: &'static str,
    pub port: u16,
}

pub struct PollConfig {
    pub default_ms: u32,
    pub min_ms: u32,
    pub max_ms: u32,
}

pub struct WifiConfig {
    pub ssid: &'static str,
    pub password: &'static str,
}

pub struct StorageConfig {
    pub action_id_offset: u32,
}

pub struct FirmwareConfig {
    pub version: &'static str,
}

/// Board identifier interpolated into server URLs.
pub const BOARD: &str = "esp32";

pub const SERVER: ServerConfig = ServerConfig {
    host: env!("FLEETLINK_SERVER_HOST"),
    port: 8080,
};

/// Poll cadence: 5 min default, server values clamped to [2 min, 720 min].
pub const POLL: PollConfig = PollConfig {
    default_ms: 300_000,
    min_ms: 120_000,
    max_ms: 43_200_000,
};

pub const WIFI: WifiConfig = WifiConfig {
    ssid: env!("WIFI_SSID"),
    password: env!("WIFI_PASSWORD"),
};

/// Base address of the `storage` partition (defined in partitions.csv).
pub const STORAGE: StorageConfig = StorageConfig {
    action_id_offset: 0x3F_0000,
};

pub const FIRMWARE: FirmwareConfig = FirmwareConfig {
    version: env!("CARGO_PKG_VERSION"),
};

/// Pinned CA for the server session, DER encoded.
#[cfg(feature = "tls")]
pub const CA_CERT_DER: &[u8] = include_bytes!(env!("FLEETLINK_CA_DER"));

/// Get the hardware ID from the last 4 bytes of the MAC address
pub fn hardware_id() -> u32 {
    let mac = esp_hal::efuse::Efuse::mac_address();
    u32::from_be_bytes([mac[2], mac[3], mac[4], mac[5]])
}
