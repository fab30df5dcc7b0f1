//! Configuration constants for the UART listener

/// Receive buffer per channel, refilled from the source every poll
pub const RX_BUFFER_SIZE: usize = 4096;

/// Output buffer per channel (flushed when full or on idle timeout)
pub const OUTPUT_BUFFER_SIZE: usize = 4096;

/// Pending terminator matches per channel
pub const TERMINATOR_QUEUE_LEN: usize = 128;

/// Flush the output buffer if a channel received nothing for this many ms
pub const IDLE_FLUSH_MS: u64 = 1000;

/// Node arena size of a terminator trie, root included
pub const MAX_TRIE_NODES: usize = 64;

/// Longest accepted terminator pattern (bounds the backtracking stack)
pub const MAX_TERMINATOR_LEN: usize = 16;

/// Channels a single listener can poll
pub const MAX_CHANNELS: usize = 4;

/// Room for one formatted timestamp
pub const STAMP_CAPACITY: usize = 64;

/// Timestamp prefix of every record, terminator and overflow line
pub const STAMP_FORMAT: &str = "%Y/%m/%d\t%H:%M:%S.%f\t";

/// Marker line tags
pub const TERM_TAG: &[u8] = b"*TERM*";
pub const UART_OVERFLOW_TAG: &[u8] = b"*UART OVERFLOW*";
pub const TERM_OVERFLOW_TAG: &[u8] = b"*TERM OVERFLOW*";

// ============================================================================
// Firmware (RP2350) settings
// ============================================================================

/// UART baudrate for both channels
pub const UART_BAUDRATE: u32 = 921_600;

/// Embassy BufferedUart RX ring size per channel (~11 ms at 921600 baud)
pub const UART_RX_BUF_SIZE: usize = 1024;

/// Terminators registered on both firmware channels
pub const DEFAULT_TERMINATORS: &[&[u8]] = &[b"\r\n", b"\n"];

/// Log file tags, one per UART: LOGA0001.TXT, LOGB0001.TXT, ...
pub const CHANNEL_A_TAG: u8 = b'A'; // UART0 RX (GPIO1)
pub const CHANNEL_B_TAG: u8 = b'B'; // UART1 RX (GPIO5)

/// Wall clock at boot, seconds since the Unix epoch (no RTC on board): 2025-01-01 00:00:00
pub const BOOT_EPOCH_SECS: u64 = 1_735_689_600;

/// SD SPI initialization frequency (slow for card init)
pub const SD_SPI_INIT_FREQ: u32 = 400_000;

/// SD SPI working frequency after init
pub const SD_SPI_WORK_FREQ: u32 = 16_000_000;

/// Max retries for SD card initialization
pub const SD_INIT_RETRIES: u8 = 3;

/// Watchdog period; the poll loop feeds it every sweep
pub const WATCHDOG_TIMEOUT_MS: u64 = 5000;
