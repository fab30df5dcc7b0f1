//! SD card plumbing for the firmware: clock, file sink, log numbering

use embassy_rp::gpio::Output;
use embassy_rp::spi;
use embassy_time::Instant;
use embedded_hal::delay::DelayNs;
use embedded_hal_bus::spi::ExclusiveDevice;
use embedded_sdmmc::{
    BlockDevice, RawDirectory, RawFile, SdCard, SdCardError, TimeSource, Timestamp, VolumeManager,
};

use uart_listener::config::BOOT_EPOCH_SECS;
use uart_listener::logfile::parse_log_number;
use uart_listener::{Clock, DateTime};

pub type SdSpi = spi::Spi<'static, embassy_rp::peripherals::SPI1, spi::Blocking>;
pub type SdCs = Output<'static>;
pub type SdSpiDev = ExclusiveDevice<SdSpi, SdCs, CortexMDelay>;
pub type SdVolumeManager = VolumeManager<SdCard<SdSpiDev, CortexMDelay>, UptimeClock>;

/// Wall clock derived from uptime (no RTC on board).
/// Base date: `BOOT_EPOCH_SECS` + uptime offset, so files and records
/// still order correctly across one run.
#[derive(Clone, Copy)]
pub struct UptimeClock;

impl UptimeClock {
    fn epoch_micros(&self) -> u64 {
        BOOT_EPOCH_SECS * 1_000_000 + Instant::now().as_micros()
    }
}

impl Clock for UptimeClock {
    fn now(&self) -> DateTime {
        DateTime::from_epoch_micros(self.epoch_micros())
    }

    fn uptime_ms(&self) -> u64 {
        Instant::now().as_millis()
    }
}

impl TimeSource for UptimeClock {
    fn get_timestamp(&self) -> Timestamp {
        let now = self.now();
        Timestamp::from_calendar(now.year, now.month, now.day, now.hour, now.minute, now.second)
            .unwrap_or(Timestamp {
                year_since_1970: 55,
                zero_indexed_month: 0,
                zero_indexed_day: 0,
                hours: 0,
                minutes: 0,
                seconds: 0,
            })
    }
}

#[derive(Debug)]
pub struct SdError(pub embedded_sdmmc::Error<SdCardError>);

impl embedded_io::Error for SdError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

/// An open log file on the card. Every `flush` updates the directory entry.
pub struct SdSink<'a> {
    volume_mgr: &'a SdVolumeManager,
    file: RawFile,
}

impl<'a> SdSink<'a> {
    pub fn new(volume_mgr: &'a SdVolumeManager, file: RawFile) -> Self {
        Self { volume_mgr, file }
    }
}

impl embedded_io::ErrorType for SdSink<'_> {
    type Error = SdError;
}

impl embedded_io::Write for SdSink<'_> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, SdError> {
        self.volume_mgr.write(self.file, buf).map_err(SdError)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), SdError> {
        self.volume_mgr.flush_file(self.file).map_err(SdError)
    }
}

/// Find the next available log file number for `tag` by scanning root directory.
/// Uses Raw API to avoid complex type inference with wrapper types.
pub fn find_next_log_number<D, T, const DIRS: usize, const FILES: usize, const VOLS: usize>(
    volume_mgr: &VolumeManager<D, T, DIRS, FILES, VOLS>,
    root_dir: RawDirectory,
    tag: u8,
) -> u16
where
    D: BlockDevice,
    T: TimeSource,
    <D as BlockDevice>::Error: core::fmt::Debug,
{
    let mut max_num: u16 = 0;

    let _ = volume_mgr.iterate_dir(root_dir, |entry| {
        if let Some(num) = parse_log_number(entry.name.base_name(), entry.name.extension(), tag) {
            max_num = max_num.max(num);
        }
    });

    max_num.wrapping_add(1)
}

/// Minimal delay implementation using busy-wait (cortex-m)
pub struct CortexMDelay;

impl DelayNs for CortexMDelay {
    fn delay_ns(&mut self, ns: u32) {
        // At 150 MHz (RP2350), ~6.67 ns per cycle
        cortex_m::asm::delay(ns / 7 + 1);
    }
}
