//! LightTower link - Main entry point
//!
//! On the board: opens NVS and the link UART, builds this board's items,
//! runs the setup pass and then polls the serial console.
//!
//! On a host: joins two simulated boards over an in-memory pipe and drives
//! the controller side from stdin through the same console.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use light_tower_link::console::{CommandContext, Console};
use light_tower_link::validity::{ComparatorType, ValidityChecker};
use light_tower_link::{
    logging, BuildError, Char, ConnectionStatus, ItemDirectory, KeyValueStore, LinkHandle,
    PersistConfig, RxTxType, SoundState, SyncItem, TimerService, UpdateStoreType, STRING_ITEM_LEN,
};
use tracing::{error, info};

/// Which end of the link this board is.
#[cfg_attr(target_os = "espidf", allow(dead_code))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    /// Settings side: pushes configuration, reads status.
    Controller,
    /// Audio/LED side: echoes configuration back, publishes status.
    Renderer,
}

/// Build the shared item set for one side of the link.
fn build_items(
    role: Role,
    link: &LinkHandle,
    timers: &Arc<TimerService>,
    store: &Arc<dyn KeyValueStore>,
) -> Result<ItemDirectory, BuildError> {
    let persist = PersistConfig::default();
    let mut dir = ItemDirectory::new();

    let (config_policy, status_policy) = match role {
        Role::Controller => (
            (RxTxType::TxOnChange, UpdateStoreType::OnRx),
            (RxTxType::RxOnly, UpdateStoreType::OnRx),
        ),
        Role::Renderer => (
            (RxTxType::RxEchoValue, UpdateStoreType::OnRx),
            (RxTxType::TxOnChangeWithHeartbeat, UpdateStoreType::OnTx),
        ),
    };

    let mut bt_source_en = SyncItem::builder("BT_Source_En", [false])
        .policy(config_policy.0, config_policy.1)
        .link(link.clone())
        .timers(Arc::clone(timers));
    let mut amplitude_gain = SyncItem::builder("Amplitude Gain", [1.0f32])
        .policy(config_policy.0, config_policy.1)
        .checker(ValidityChecker::range([(ComparatorType::GreaterOrEqual, 0.0)]))
        .link(link.clone())
        .timers(Arc::clone(timers));
    let mut fft_gain = SyncItem::builder("FFT Gain", [1.7f32])
        .policy(config_policy.0, config_policy.1)
        .checker(ValidityChecker::range([(ComparatorType::GreaterOrEqual, 0.0)]))
        .link(link.clone())
        .timers(Arc::clone(timers));
    let mut device_name = SyncItem::builder("Device_Name", [Char(0); STRING_ITEM_LEN])
        .policy(config_policy.0, config_policy.1)
        .link(link.clone())
        .timers(Arc::clone(timers));

    if role == Role::Renderer {
        bt_source_en = bt_source_en.persist(Arc::clone(store), persist);
        amplitude_gain = amplitude_gain.persist(Arc::clone(store), persist);
        fft_gain = fft_gain.persist(Arc::clone(store), persist);
        device_name = device_name.persist(Arc::clone(store), persist);
    }

    dir.add(bt_source_en.build()?);
    dir.add(amplitude_gain.build()?);
    dir.add(fft_gain.build()?);
    dir.add(device_name.build()?);

    dir.add(
        SyncItem::builder("Src_Conn_Stat", [ConnectionStatus::Disconnected])
            .policy(status_policy.0, status_policy.1)
            .period(Duration::from_millis(1000))
            .link(link.clone())
            .timers(Arc::clone(timers))
            .build()?,
    );
    dir.add(
        SyncItem::builder("Sound_State", [SoundState::LastingSilenceDetected])
            .policy(status_policy.0, status_policy.1)
            .period(Duration::from_millis(5000))
            .link(link.clone())
            .timers(Arc::clone(timers))
            .build()?,
    );

    Ok(dir)
}

/// Feed console input and print whatever the console wrote.
fn console_input(console: &mut Console, ctx: &CommandContext<'_>, bytes: &[u8]) {
    let mut out = String::new();
    for &b in bytes {
        let _ = console.process_byte(b, ctx, &mut out);
    }
    if !out.is_empty() {
        print!("{}", out);
        use std::io::Write;
        let _ = std::io::stdout().flush();
    }
}

#[cfg(target_os = "espidf")]
fn run() -> Result<(), Box<dyn Error>> {
    use std::io::Read;

    use esp_idf_svc::hal::peripherals::Peripherals;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use light_tower_link::config::nvs::NvsStore;
    use light_tower_link::hal::init_uart_link;
    use light_tower_link::{LinkConfig, TransportManager, UartConfig};

    let peripherals = Peripherals::take()?;
    let nvs = EspDefaultNvsPartition::take()?;
    let store: Arc<dyn KeyValueStore> = Arc::new(NvsStore::open(nvs)?);
    let timers = Arc::new(TimerService::start()?);

    let uart_config = UartConfig::default();
    let (reader, writer) = init_uart_link(
        peripherals.uart1,
        peripherals.pins.gpio17,
        peripherals.pins.gpio16,
        &uart_config,
    )?;

    let mut manager = TransportManager::new(LinkConfig::named("cpu1"));
    let link = manager.handle();
    let items = build_items(Role::Renderer, &link, &timers, &store)?;
    manager.start(reader, writer)?;
    let ready = items.setup_all();
    info!(ready, "board up");

    let links = [link];
    let ctx = CommandContext {
        items: &items,
        links: &links,
    };
    let mut console = Console::new();
    let mut banner = String::new();
    console.print_banner(&mut banner);
    print!("{}", banner);

    let mut stdin = std::io::stdin();
    let mut buf = [0u8; 64];
    loop {
        match stdin.read(&mut buf) {
            Ok(n) if n > 0 => console_input(&mut console, &ctx, &buf[..n]),
            _ => std::thread::sleep(Duration::from_millis(20)),
        }
    }
}

#[cfg(not(target_os = "espidf"))]
fn run() -> Result<(), Box<dyn Error>> {
    use std::io::BufRead;

    use light_tower_link::link::pipe::duplex;
    use light_tower_link::{LinkConfig, MemoryStore, TransportManager};

    let timers = Arc::new(TimerService::start()?);
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let (controller_end, renderer_end) = duplex();

    let mut controller = TransportManager::new(LinkConfig::named("controller"));
    let mut renderer = TransportManager::new(LinkConfig::named("renderer"));
    let controller_items = build_items(Role::Controller, &controller.handle(), &timers, &store)?;
    let renderer_items = build_items(Role::Renderer, &renderer.handle(), &timers, &store)?;

    controller.start(controller_end.reader, controller_end.writer)?;
    renderer.start(renderer_end.reader, renderer_end.writer)?;
    renderer_items.setup_all();
    controller_items.setup_all();

    if let Some(status) = renderer_items.find("Src_Conn_Stat") {
        status.set_string(ConnectionStatus::Connected.as_str());
    }

    let links = [controller.handle(), renderer.handle()];
    let ctx = CommandContext {
        items: &controller_items,
        links: &links,
    };
    let mut console = Console::new();
    let mut banner = String::new();
    console.print_banner(&mut banner);
    print!("{}", banner);

    for line in std::io::stdin().lock().lines() {
        let mut bytes = line?.into_bytes();
        bytes.push(b'\n');
        console_input(&mut console, &ctx, &bytes);
    }

    info!("stdin closed, shutting down");
    controller_items.teardown_all();
    renderer_items.teardown_all();
    Ok(())
}

fn main() {
    #[cfg(target_os = "espidf")]
    esp_idf_svc::sys::link_patches();

    logging::init("info");

    if let Err(e) = run() {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
