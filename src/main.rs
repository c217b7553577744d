#![no_std]
#![no_main]

// Required for ESP-IDF bootloader compatibility
// Use explicit parameters to ensure correct efuse block revision values
esp_bootloader_esp_idf::esp_app_desc!(
    env!("CARGO_PKG_VERSION"),  // version
    env!("CARGO_PKG_NAME"),     // project_name
    "00:00:00",                 // build_time
    "2025-01-01",               // build_date
    "0.0.0",                    // idf_ver (not using IDF)
    0x10000,                    // mmu_page_size (64KB)
    0,                          // min_efuse_blk_rev_full (accept all)
    u16::MAX                    // max_efuse_blk_rev_full (accept all)
);

use embassy_executor::Spawner;
use embassy_usb::class::cdc_acm::{CdcAcmClass, ControlChanged, State};
use embassy_usb::UsbDevice;
use esp_backtrace as _;
use esp_hal::otg_fs::asynch::{Config as OtgConfig, Driver};
use esp_hal::otg_fs::Usb;
use esp_hal::timer::timg::TimerGroup;
use esp_hal::uart::{Config as UartConfig, Uart};
use static_cell::StaticCell;

use cdc_uart_bridge::bridge::{Bridge, ChannelConfig, RelayChannel, BRIDGE_EVENTS};
use cdc_uart_bridge::config;
use cdc_uart_bridge::tasks;
use cdc_uart_bridge::uart::{bias_pins, EspUart, UartPins};
use cdc_uart_bridge::usb::cdc_io::{CdcReader, CdcWriter};
use cdc_uart_bridge::usb::CdcFifo;

/// FIFO type shared by the relay and one CDC port task
type RelayFifo = CdcFifo<{ config::usb::FIFO_SIZE }>;

/// Bridge over the two ESP32-S3 UARTs and their CDC FIFOs
type FirmwareBridge = Bridge<EspUart, &'static RelayFifo>;

/// Static executor for embassy
static EXECUTOR: StaticCell<esp_rtos::embassy::Executor> = StaticCell::new();

/// One FIFO pair per CDC interface
static CDC_FIFOS: [RelayFifo; config::relay::CHANNEL_COUNT] = [CdcFifo::new(), CdcFifo::new()];

/// USB descriptor and endpoint buffers
static EP_OUT_BUFFER: StaticCell<[u8; 1024]> = StaticCell::new();
static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static MSOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();

/// CDC-ACM class state, one per interface
static CDC_STATE0: StaticCell<State<'static>> = StaticCell::new();
static CDC_STATE1: StaticCell<State<'static>> = StaticCell::new();

/// Split handles for one CDC-ACM interface
struct CdcHandles {
    reader: CdcReader<'static, Driver<'static>>,
    writer: CdcWriter<'static, Driver<'static>>,
    control: ControlChanged<'static>,
}

impl CdcHandles {
    fn new(class: CdcAcmClass<'static, Driver<'static>>) -> Self {
        let (sender, receiver, control) = class.split_with_control();
        Self {
            reader: CdcReader::new(receiver),
            writer: CdcWriter::new(sender),
            control,
        }
    }
}

#[esp_hal::main]
fn main() -> ! {
    esp_println::logger::init_logger(log::LevelFilter::Info);

    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Initialise the RTOS scheduler with timer - MUST be done before any async operations
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let (tx0, rx0, pins0) = bias_pins(peripherals.GPIO17.into(), peripherals.GPIO18.into(), true);
    let uart0 = Uart::new(
        peripherals.UART1,
        UartConfig::default().with_baudrate(config::uart0::BAUD_RATE),
    )
    .expect("Failed to configure UART1")
    .with_tx(tx0)
    .with_rx(rx0);

    let (tx1, rx1, pins1) = bias_pins(peripherals.GPIO15.into(), peripherals.GPIO16.into(), true);
    let uart1 = Uart::new(
        peripherals.UART2,
        UartConfig::default().with_baudrate(config::uart1::BAUD_RATE),
    )
    .expect("Failed to configure UART2")
    .with_tx(tx1)
    .with_rx(rx1);

    let bridge = Bridge::new(
        [
            RelayChannel::new(
                0,
                EspUart::new(uart0, 1, pins0),
                &CDC_FIFOS[0],
                ChannelConfig {
                    pins: UartPins {
                        tx: config::uart0::TX_PIN,
                        rx: config::uart0::RX_PIN,
                        pull_up: true,
                    },
                    baud_rate: config::uart0::BAUD_RATE,
                },
            ),
            RelayChannel::new(
                1,
                EspUart::new(uart1, 2, pins1),
                &CDC_FIFOS[1],
                ChannelConfig {
                    pins: UartPins {
                        tx: config::uart1::TX_PIN,
                        rx: config::uart1::RX_PIN,
                        pull_up: true,
                    },
                    baud_rate: config::uart1::BAUD_RATE,
                },
            ),
        ],
        config::uart0::BAUD_RATE,
    );

    // USB OTG with two CDC-ACM interfaces
    let usb = Usb::new(peripherals.USB0, peripherals.GPIO20, peripherals.GPIO19);
    let driver = Driver::new(usb, EP_OUT_BUFFER.init([0; 1024]), OtgConfig::default());

    let mut usb_config = embassy_usb::Config::new(config::usb::VID, config::usb::PID);
    usb_config.manufacturer = Some(config::usb::MANUFACTURER);
    usb_config.product = Some(config::usb::PRODUCT);
    usb_config.serial_number = Some(config::usb::SERIAL_NUMBER);
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = config::usb::MAX_PACKET_SIZE as u8;
    // Composite device with interface association descriptors
    usb_config.device_class = 0xEF;
    usb_config.device_sub_class = 0x02;
    usb_config.device_protocol = 0x01;
    usb_config.composite_with_iads = true;

    let mut builder = embassy_usb::Builder::new(
        driver,
        usb_config,
        CONFIG_DESCRIPTOR.init([0; 256]),
        BOS_DESCRIPTOR.init([0; 256]),
        MSOS_DESCRIPTOR.init([0; 256]),
        CONTROL_BUF.init([0; 64]),
    );

    let packet_size = config::usb::MAX_PACKET_SIZE as u16;
    let cdc0 = CdcAcmClass::new(&mut builder, CDC_STATE0.init(State::new()), packet_size);
    let cdc1 = CdcAcmClass::new(&mut builder, CDC_STATE1.init(State::new()), packet_size);
    let usb_device = builder.build();

    let cdc0 = CdcHandles::new(cdc0);
    let cdc1 = CdcHandles::new(cdc1);

    // Create and run the embassy executor
    let executor = EXECUTOR.init(esp_rtos::embassy::Executor::new());
    executor.run(|spawner| {
        spawner.must_spawn(async_main(spawner, usb_device, cdc0, cdc1, bridge));
    })
}

#[embassy_executor::task]
async fn async_main(
    spawner: Spawner,
    usb_device: UsbDevice<'static, Driver<'static>>,
    cdc0: CdcHandles,
    cdc1: CdcHandles,
    bridge: FirmwareBridge,
) {
    spawner.must_spawn(usb_device_task(usb_device));
    spawner.must_spawn(cdc0_task(cdc0));
    spawner.must_spawn(cdc1_task(cdc1));
    spawner.must_spawn(bridge_task(bridge));
}

/// Task that runs the USB device stack
#[embassy_executor::task]
async fn usb_device_task(usb_device: UsbDevice<'static, Driver<'static>>) {
    tasks::usb_device_task(usb_device).await
}

/// Task that services CDC interface 0
#[embassy_executor::task]
async fn cdc0_task(cdc: CdcHandles) {
    tasks::cdc_port_task(0, cdc.reader, cdc.writer, cdc.control, &CDC_FIFOS[0], &BRIDGE_EVENTS)
        .await
}

/// Task that services CDC interface 1
#[embassy_executor::task]
async fn cdc1_task(cdc: CdcHandles) {
    tasks::cdc_port_task(1, cdc.reader, cdc.writer, cdc.control, &CDC_FIFOS[1], &BRIDGE_EVENTS)
        .await
}

/// Task that runs the relay loop
#[embassy_executor::task]
async fn bridge_task(bridge: FirmwareBridge) {
    tasks::bridge_task(bridge, &BRIDGE_EVENTS).await
}
