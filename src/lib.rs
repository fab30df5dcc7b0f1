//! Serial line logger core.
//!
//! Bytes arriving on one or more UARTs are cut into records at configurable
//! terminator sequences, stamped with wall-clock time and written to a sink
//! (an SD card file on the board, a `Vec` in tests). Nothing here blocks or
//! allocates; the firmware binary supplies the drivers.

#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
#[macro_use]
mod fmt;

pub mod channel;
pub mod config;
pub mod detector;
pub mod error;
pub mod listener;
pub mod logfile;
pub mod time;
pub mod trie;
pub mod writer;

#[cfg(test)]
mod mock;

pub use channel::{Activity, Channel, Source};
pub use detector::{TerminatorEvent, Terminators};
pub use error::Error;
pub use listener::{ChannelHandle, Listener, Tick};
pub use time::{Clock, DateTime};
pub use trie::PatternTrie;
pub use writer::BufferedWriter;
