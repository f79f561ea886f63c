#![no_std]
#![no_main]

use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};

use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::{clock::CpuClock, timer::timg::TimerGroup};
use esp_println::println;
use esp_storage::FlashStorage;
use static_cell::StaticCell;

use fleetlink_client::{Agent, AgentConfig, boot_init};
use fleetlink_esp_agent::config;
use fleetlink_esp_agent::infrastructure::drivers::{init_network_stack, wait_for_connection};
use fleetlink_esp_agent::infrastructure::platform::EspPlatform;
use fleetlink_esp_agent::infrastructure::services::{RX_BUFFER_SIZE, TX_BUFFER_SIZE};
use fleetlink_esp_agent::infrastructure::tasks::{
    UpdateAgent,
    network_runner_task,
    update_agent_task,
    wifi_connection_task,
};
use fleetlink_esp_agent::mk_static;

esp_bootloader_esp_idf::esp_app_desc!();

static FLASH_STORAGE: StaticCell<FlashStorage<'static>> = StaticCell::new();

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    esp_println::logger::init_logger_from_env();

    // Initialize hardware
    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    esp_alloc::heap_allocator!(size: 96 * 1024);

    // Start rtos
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Flash is shared between the boot manager, the image writer, and the
    // action-id store through a single owner pointer.
    let flash = FLASH_STORAGE.init(FlashStorage::new(peripherals.FLASH));
    let flash_ptr = flash as *mut FlashStorage<'static>;

    // Confirm the running image before anything else; an update that fails
    // here must not start polling.
    let platform = {
        let mut platform = EspPlatform::new(flash_ptr);
        if let Err(e) = boot_init(&mut platform) {
            println!("update: boot init failed: {e:?}");
            println!("update: agent will not start");
            loop {
                Timer::after(Duration::from_secs(60)).await;
            }
        }
        platform
    };

    // Bring up WiFi and wait for an address before polling.
    let (stack, runner, controller) = init_network_stack(peripherals.WIFI);
    spawner.spawn(wifi_connection_task(controller)).ok();
    spawner.spawn(network_runner_task(runner)).ok();

    println!("update: waiting for network");
    wait_for_connection(stack).await;
    println!(
        "update: polling {}:{} as {}-{:08x}",
        config::SERVER.host,
        config::SERVER.port,
        config::BOARD,
        config::hardware_id()
    );

    #[cfg(not(feature = "tls"))]
    let link = {
        use fleetlink_esp_agent::infrastructure::services::EspServerLink;
        EspServerLink::new(
            stack,
            mk_static!([u8; RX_BUFFER_SIZE], [0; RX_BUFFER_SIZE]),
            mk_static!([u8; TX_BUFFER_SIZE], [0; TX_BUFFER_SIZE]),
        )
    };
    #[cfg(feature = "tls")]
    let link = {
        use esp_hal::rng::Trng;
        use fleetlink_esp_agent::infrastructure::services::{TLS_RECORD_SIZE, TlsServerLink};
        TlsServerLink::new(
            stack,
            mk_static!([u8; RX_BUFFER_SIZE], [0; RX_BUFFER_SIZE]),
            mk_static!([u8; TX_BUFFER_SIZE], [0; TX_BUFFER_SIZE]),
            mk_static!([u8; TLS_RECORD_SIZE], [0; TLS_RECORD_SIZE]),
            mk_static!([u8; TLS_RECORD_SIZE], [0; TLS_RECORD_SIZE]),
            Trng::new(peripherals.RNG, peripherals.ADC1),
        )
    };

    let agent_config = AgentConfig {
        board: config::BOARD,
        poll_interval_ms: config::POLL.default_ms,
        poll_interval_min_ms: config::POLL.min_ms,
        poll_interval_max_ms: config::POLL.max_ms,
    };
    let agent = mk_static!(UpdateAgent, Agent::new(link, platform, agent_config));
    spawner.spawn(update_agent_task(agent)).ok();

    loop {
        Timer::after(Duration::from_secs(5)).await;
    }
}
