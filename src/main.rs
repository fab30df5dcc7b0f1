//! UART Listener firmware for RP2350A
//!
//! Listens on UART0 and UART1 (921600 baud) and appends each line, stamped
//! with the time it started, to its own text file on the SD card
//! (`LOGA####.TXT`, `LOGB####.TXT`).

#![no_std]
#![no_main]

mod sd_writer;

use sd_writer::{
    find_next_log_number, CortexMDelay, SdCs, SdSink, SdSpi, SdVolumeManager, UptimeClock,
};
use uart_listener::config::*;
use uart_listener::logfile::format_log_filename;
use uart_listener::{Channel, Listener, Source};

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::{UART0, UART1};
use embassy_rp::spi;
use embassy_rp::uart::{self, BufferedUart, BufferedUartRx, Config as UartConfig};
use embassy_rp::watchdog::Watchdog;
use embassy_time::{Duration, Timer};
use embedded_hal_bus::spi::ExclusiveDevice;
use embedded_io::{Read, ReadReady};
use embedded_sdmmc::{Mode, RawDirectory, RawFile, SdCard, VolumeIdx, VolumeManager};
use static_cell::StaticCell;

use {defmt_rtt as _, panic_probe as _};

bind_interrupts!(struct Irqs {
    UART0_IRQ => uart::BufferedInterruptHandler<UART0>;
    UART1_IRQ => uart::BufferedInterruptHandler<UART1>;
});

type UartChannel = Channel<UartSource, SdSink<'static>>;

/// Receive half of a buffered UART. A driver overrun is latched until the
/// channel has written its marker.
struct UartSource {
    rx: BufferedUartRx,
    overrun: bool,
}

impl UartSource {
    fn new(rx: BufferedUartRx) -> Self {
        Self { rx, overrun: false }
    }

    fn note_error(&mut self, e: uart::Error) {
        if matches!(e, uart::Error::Overrun) {
            self.overrun = true;
        } else {
            debug!("UART read error: {:?}", e);
        }
    }
}

impl Source for UartSource {
    fn available(&mut self) -> usize {
        match ReadReady::read_ready(&mut self.rx) {
            // The driver only says whether data is waiting; `read` returns
            // what is actually there without blocking.
            Ok(true) => UART_RX_BUF_SIZE,
            Ok(false) => 0,
            Err(e) => {
                self.note_error(e);
                0
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        match Read::read(&mut self.rx, buf) {
            Ok(n) => n,
            Err(e) => {
                self.note_error(e);
                0
            }
        }
    }

    fn overflowed(&self) -> bool {
        self.overrun
    }

    fn clear_overflow(&mut self) {
        self.overrun = false;
    }
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_rp::init(Default::default());
    info!("UART Listener starting...");

    // ── Watchdog ──────────────────────────────────────────────────────
    let mut watchdog = Watchdog::new(p.WATCHDOG);
    watchdog.start(Duration::from_millis(WATCHDOG_TIMEOUT_MS));

    // ── SPI ────────────────────────────────────────────────────────────
    let mut spi_config = spi::Config::default();
    spi_config.frequency = SD_SPI_INIT_FREQ;
    let spi1 = spi::Spi::new_blocking(p.SPI1, p.PIN_10, p.PIN_11, p.PIN_12, spi_config);
    let cs = Output::new(p.PIN_13, Level::High);

    // ── UART0 ───────────────────────────────────────────────────────────
    static TX_BUF0: StaticCell<[u8; 16]> = StaticCell::new();
    static RX_BUF0: StaticCell<[u8; UART_RX_BUF_SIZE]> = StaticCell::new();
    let tx_buf0 = &mut TX_BUF0.init([0; 16])[..];
    let rx_buf0 = &mut RX_BUF0.init([0; UART_RX_BUF_SIZE])[..];
    let mut uart0_config = UartConfig::default();
    uart0_config.baudrate = UART_BAUDRATE;
    let uart0 = BufferedUart::new(p.UART0, p.PIN_0, p.PIN_1, Irqs, tx_buf0, rx_buf0, uart0_config);
    let (_uart0_tx, uart0_rx) = uart0.split();

    // ── UART1 ──────────────────────────────────────────────────────────
    static TX_BUF1: StaticCell<[u8; 16]> = StaticCell::new();
    static RX_BUF1: StaticCell<[u8; UART_RX_BUF_SIZE]> = StaticCell::new();
    let tx_buf1 = &mut TX_BUF1.init([0; 16])[..];
    let rx_buf1 = &mut RX_BUF1.init([0; UART_RX_BUF_SIZE])[..];
    let mut uart1_config = UartConfig::default();
    uart1_config.baudrate = UART_BAUDRATE;
    let uart1 = BufferedUart::new(p.UART1, p.PIN_4, p.PIN_5, Irqs, tx_buf1, rx_buf1, uart1_config);
    let (_uart1_tx, uart1_rx) = uart1.split();

    // ── SD card ─────────────────────────────────────────────────────────
    let Some(volume_mgr) = init_sd(spi1, cs, &mut watchdog).await else {
        reboot("SD card unavailable").await
    };
    let root_dir = match volume_mgr.open_raw_volume(VolumeIdx(0)) {
        Ok(volume) => match volume_mgr.open_root_dir(volume) {
            Ok(dir) => dir,
            Err(e) => {
                error!("Failed to open root dir: {:?}", Debug2Format(&e));
                reboot("no root dir").await
            }
        },
        Err(e) => {
            error!("Failed to open volume: {:?}", Debug2Format(&e));
            reboot("no volume").await
        }
    };

    // ── Channels ────────────────────────────────────────────────────────
    static CHANNEL_A: StaticCell<UartChannel> = StaticCell::new();
    static CHANNEL_B: StaticCell<UartChannel> = StaticCell::new();

    let Some(channel_a) = open_channel(volume_mgr, root_dir, CHANNEL_A_TAG, uart0_rx) else {
        reboot("channel A").await
    };
    let channel_a = CHANNEL_A.init(channel_a);
    let Some(channel_b) = open_channel(volume_mgr, root_dir, CHANNEL_B_TAG, uart1_rx) else {
        reboot("channel B").await
    };
    let channel_b = CHANNEL_B.init(channel_b);

    let mut listener: Listener<'_, UptimeClock, 2> = Listener::new(UptimeClock);
    for channel in [channel_a, channel_b] {
        if listener.add(channel).is_err() {
            reboot("listener full").await
        }
    }

    info!("Recording");
    loop {
        listener.poll_once();
        watchdog.feed();
        embassy_futures::yield_now().await;
    }
}

/// Brings the card up at the slow clock, then switches to the working one.
async fn init_sd(
    spi: SdSpi,
    cs: SdCs,
    watchdog: &mut Watchdog,
) -> Option<&'static SdVolumeManager> {
    static VOLUME_MGR: StaticCell<SdVolumeManager> = StaticCell::new();

    let Ok(spi_device) = ExclusiveDevice::new(spi, cs, CortexMDelay) else {
        error!("Failed to create SPI device");
        return None;
    };
    let sd_card = SdCard::new(spi_device, CortexMDelay);

    let mut init_ok = false;
    for attempt in 1..=SD_INIT_RETRIES {
        watchdog.feed();
        info!("SD init attempt {}/{}...", attempt, SD_INIT_RETRIES);
        match sd_card.num_bytes() {
            Ok(bytes) => {
                info!("SD card: {} MB", bytes / (1024 * 1024));
                init_ok = true;
                break;
            }
            Err(e) => {
                warn!("SD init failed: {:?}", Debug2Format(&e));
                Timer::after(Duration::from_millis(500)).await;
                sd_card.mark_card_uninit();
            }
        }
    }
    if !init_ok {
        error!("SD card init failed after {} attempts", SD_INIT_RETRIES);
        return None;
    }

    sd_card.spi(|dev| dev.bus_mut().set_frequency(SD_SPI_WORK_FREQ));
    info!("SPI switched to {} Hz", SD_SPI_WORK_FREQ);

    Some(VOLUME_MGR.init(VolumeManager::new(sd_card, UptimeClock)))
}

/// Opens the next free `LOG<tag>####.TXT` and binds it to `rx`.
fn open_channel(
    volume_mgr: &'static SdVolumeManager,
    root_dir: RawDirectory,
    tag: u8,
    rx: BufferedUartRx,
) -> Option<UartChannel> {
    let num = find_next_log_number(volume_mgr, root_dir, tag);
    let name_bytes = format_log_filename(tag, num);
    let name = core::str::from_utf8(&name_bytes).ok()?;

    let file: RawFile =
        match volume_mgr.open_file_in_dir(root_dir, name, Mode::ReadWriteCreateOrTruncate) {
            Ok(file) => file,
            Err(e) => {
                error!("Failed to create {}: {:?}", name, Debug2Format(&e));
                return None;
            }
        };
    info!("Logging to {}", name);

    match Channel::new(
        UartSource::new(rx),
        SdSink::new(volume_mgr, file),
        DEFAULT_TERMINATORS,
    ) {
        Ok(channel) => Some(channel),
        Err(e) => {
            error!("Bad terminator set: {}", e);
            None
        }
    }
}

/// Stops feeding the watchdog, which resets the board.
async fn reboot(reason: &str) -> ! {
    error!("Fatal: {}. Watchdog reboot in {} ms", reason, WATCHDOG_TIMEOUT_MS);
    loop {
        Timer::after(Duration::from_secs(1)).await;
    }
}
