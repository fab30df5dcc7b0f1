//! Terminator detection front-end.

use crate::error::Error;
use crate::time::DateTime;
use crate::trie::PatternTrie;

/// A recognized record boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TerminatorEvent {
    /// Stream offset one past the terminator's last byte
    pub offset: u64,
    /// When the terminator's last byte was received
    pub timestamp: DateTime,
}

impl TerminatorEvent {
    pub(crate) const fn advanced(self) -> Self {
        Self {
            offset: self.offset + 1,
            timestamp: self.timestamp,
        }
    }
}

/// Picks the cheapest matcher for the registered terminator set.
pub enum Terminators {
    /// Nothing registered: the stream is one endless record
    Off,
    /// A single one-byte terminator, compared directly
    Byte(u8),
    Trie(PatternTrie),
}

impl Terminators {
    pub fn new(patterns: &[&[u8]]) -> Result<Self, Error> {
        let mut terminators = Self::Off;
        for pattern in patterns {
            terminators.register(pattern)?;
        }
        Ok(terminators)
    }

    /// Adds a terminator, upgrading to a trie once one byte no longer suffices.
    pub fn register(&mut self, pattern: &[u8]) -> Result<(), Error> {
        if pattern.is_empty() {
            return Err(Error::EmptyPattern);
        }

        match *self {
            Self::Trie(ref mut trie) => return trie.register(pattern),
            Self::Byte(existing) if pattern == [existing] => return Ok(()),
            Self::Off if pattern.len() == 1 => {
                *self = Self::Byte(pattern[0]);
                return Ok(());
            }
            _ => {}
        }

        let mut trie = PatternTrie::new();
        if let Self::Byte(existing) = *self {
            trie.register(&[existing])?;
        }
        trie.register(pattern)?;
        *self = Self::Trie(trie);
        Ok(())
    }

    /// Feeds the byte at stream `offset`. The matcher is rewound after a hit.
    pub fn feed(&mut self, byte: u8, offset: u64, now: DateTime) -> Option<TerminatorEvent> {
        match self {
            Self::Off => None,
            Self::Byte(terminator) => (byte == *terminator).then_some(TerminatorEvent {
                offset: offset + 1,
                timestamp: now,
            }),
            Self::Trie(trie) => {
                let event = trie.accept(byte, offset, now);
                if event.is_some() {
                    trie.reset();
                }
                event
            }
        }
    }

    /// Trailing bytes whose record is not decided yet; see [`PatternTrie::held_back`].
    pub fn held_back(&self) -> usize {
        match self {
            Self::Trie(trie) => trie.held_back(),
            Self::Off | Self::Byte(_) => 0,
        }
    }

    /// Drops any partial match.
    pub fn reset(&mut self) {
        if let Self::Trie(trie) = self {
            trie.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets(terminators: &mut Terminators, input: &[u8]) -> std::vec::Vec<u64> {
        input
            .iter()
            .enumerate()
            .filter_map(|(offset, &byte)| terminators.feed(byte, offset as u64, DateTime::default()))
            .map(|event| event.offset)
            .collect()
    }

    #[test]
    fn newline_terminator_in_hello_world() {
        let mut terminators = Terminators::new(&[b"\n"]).unwrap();
        assert!(matches!(terminators, Terminators::Byte(b'\n')));
        assert_eq!(offsets(&mut terminators, b"hello\nworld"), [6]);
    }

    #[test]
    fn no_patterns_never_match() {
        let mut terminators = Terminators::new(&[]).unwrap();
        assert!(matches!(terminators, Terminators::Off));
        assert!(offsets(&mut terminators, b"a\nb\r\n").is_empty());
    }

    #[test]
    fn second_pattern_upgrades_to_trie() {
        let mut terminators = Terminators::new(&[b"\n"]).unwrap();
        terminators.register(b"\n").unwrap();
        assert!(matches!(terminators, Terminators::Byte(_)));

        terminators.register(b"\r\n").unwrap();
        assert!(matches!(terminators, Terminators::Trie(_)));
        assert_eq!(offsets(&mut terminators, b"a\nb\r\nc"), [2, 5]);
    }

    #[test]
    fn rejects_empty_pattern() {
        assert_eq!(Terminators::new(&[b"\n", b""]).err(), Some(Error::EmptyPattern));
    }
}
