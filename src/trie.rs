//! Incremental multi-pattern matcher over a fixed node arena.
//!
//! Patterns are stored as a prefix tree. Nodes live in a `heapless::Vec`
//! and link to their first child and next sibling by index, so every node
//! has the same size and the arena never grows past `NODES`.
//!
//! Matching is one byte at a time. On a mismatch the cursor backs up
//! through the stack of visited nodes until it reaches a node that ends a
//! pattern (a shorter terminator that was a prefix of the partial match)
//! or the root. The mismatching byte is not retried from the node the
//! cursor falls back to, so overlapping inputs such as `aab` against the
//! pattern `ab` are not found. This is not Aho-Corasick and callers depend
//! on exactly this accept/reject behaviour.

use heapless::Vec;

use crate::config::{MAX_TERMINATOR_LEN, MAX_TRIE_NODES};
use crate::detector::TerminatorEvent;
use crate::error::Error;
use crate::time::DateTime;

type NodeId = u16;

const ROOT: NodeId = 0;

#[derive(Debug, Clone, Copy)]
struct Node {
    value: u8,
    end: bool,
    first_child: Option<NodeId>,
    next_sibling: Option<NodeId>,
}

impl Node {
    const fn new(value: u8, next_sibling: Option<NodeId>) -> Self {
        Self {
            value,
            end: false,
            first_child: None,
            next_sibling,
        }
    }
}

pub struct PatternTrie<const NODES: usize = MAX_TRIE_NODES, const DEPTH: usize = MAX_TERMINATOR_LEN> {
    nodes: Vec<Node, NODES>,
    cursor: NodeId,
    /// Parent of every node on the current path, with the step that left it
    stack: Vec<(NodeId, TerminatorEvent), DEPTH>,
    depth: usize,
}

impl<const NODES: usize, const DEPTH: usize> PatternTrie<NODES, DEPTH> {
    pub fn new() -> Self {
        const { assert!(NODES > 0 && NODES <= NodeId::MAX as usize + 1) };

        let mut nodes = Vec::new();
        // NODES >= 1, so the root always fits.
        nodes.push(Node::new(0, None)).ok();

        Self {
            nodes,
            cursor: ROOT,
            stack: Vec::new(),
            depth: 0,
        }
    }

    /// Adds an accepted byte sequence, sharing existing prefixes.
    ///
    /// Registering the same pattern twice is a no-op. Either the whole
    /// pattern is stored or the trie is left untouched.
    pub fn register(&mut self, pattern: &[u8]) -> Result<(), Error> {
        if pattern.is_empty() {
            return Err(Error::EmptyPattern);
        }
        if pattern.len() > DEPTH {
            return Err(Error::PatternTooLong);
        }
        if !self.is_idle() {
            return Err(Error::MatcherBusy);
        }

        let mut node = ROOT;
        let mut shared = 0;
        for &byte in pattern {
            match self.child(node, byte) {
                Some(child) => {
                    node = child;
                    shared += 1;
                }
                None => break,
            }
        }

        if self.nodes.len() + (pattern.len() - shared) > NODES {
            return Err(Error::Capacity);
        }

        for &byte in &pattern[shared..] {
            let id = NodeId::try_from(self.nodes.len()).map_err(|_| Error::Capacity)?;
            let sibling = self.nodes[usize::from(node)].first_child;
            self.nodes
                .push(Node::new(byte, sibling))
                .map_err(|_| Error::Capacity)?;
            self.nodes[usize::from(node)].first_child = Some(id);
            node = id;
        }

        self.nodes[usize::from(node)].end = true;
        self.depth = self.depth.max(pattern.len());
        Ok(())
    }

    /// Returns the cursor to the root. Must be called after every match.
    pub fn reset(&mut self) {
        self.cursor = ROOT;
        self.stack.clear();
    }

    /// Feeds the byte found at stream `offset`, received at `now`.
    ///
    /// A match reports the offset one past the last byte of the matched
    /// pattern together with the time that byte arrived. The cursor stays
    /// where it is; callers `reset` before feeding more bytes.
    pub fn accept(&mut self, byte: u8, offset: u64, now: DateTime) -> Option<TerminatorEvent> {
        let step = TerminatorEvent {
            offset,
            timestamp: now,
        };

        if let Some(child) = self.child(self.cursor, byte) {
            if self.stack.push((self.cursor, step)).is_err() {
                // Only reachable if reset() was skipped after a match.
                self.reset();
                return None;
            }
            self.cursor = child;
            let node = self.node(child);
            return (node.end && node.first_child.is_none()).then(|| step.advanced());
        }

        while !self.node(self.cursor).end {
            match self.stack.pop() {
                Some((parent, _)) => self.cursor = parent,
                None => break,
            }
        }

        if self.node(self.cursor).end {
            self.stack.last().map(|&(_, entered)| entered.advanced())
        } else {
            None
        }
    }

    /// Bytes of the current partial match that follow its deepest complete
    /// pattern. A mismatch would put the record boundary in front of them,
    /// so they cannot be written out until the match resolves.
    pub fn held_back(&self) -> usize {
        let path = self
            .stack
            .iter()
            .skip(1)
            .map(|&(parent, _)| parent)
            .chain(core::iter::once(self.cursor));
        path.enumerate()
            .filter(|&(_, id)| self.node(id).end)
            .last()
            .map_or(0, |(index, _)| self.stack.len() - (index + 1))
    }

    /// True while the cursor sits at the root.
    pub fn is_idle(&self) -> bool {
        self.cursor == ROOT && self.stack.is_empty()
    }

    /// Stored nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Length of the longest registered pattern
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn node(&self, id: NodeId) -> Node {
        self.nodes[usize::from(id)]
    }

    fn child(&self, parent: NodeId, value: u8) -> Option<NodeId> {
        let mut next = self.node(parent).first_child;
        while let Some(id) = next {
            let node = self.node(id);
            if node.value == value {
                return Some(id);
            }
            next = node.next_sibling;
        }
        None
    }
}

impl<const NODES: usize, const DEPTH: usize> Default for PatternTrie<NODES, DEPTH> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feeds `input` from offset 0, resetting after each match like the detector does.
    fn matches(trie: &mut PatternTrie, input: &[u8]) -> std::vec::Vec<u64> {
        let mut found = std::vec::Vec::new();
        for (offset, &byte) in input.iter().enumerate() {
            if let Some(event) = trie.accept(byte, offset as u64, DateTime::default()) {
                found.push(event.offset);
                trie.reset();
            }
        }
        found
    }

    fn trie_with(patterns: &[&[u8]]) -> PatternTrie {
        let mut trie = PatternTrie::new();
        for pattern in patterns {
            trie.register(pattern).unwrap();
        }
        trie
    }

    #[test]
    fn shares_prefixes_and_ignores_duplicates() {
        let mut trie = trie_with(&[b"\r\n", b"\r\r"]);
        assert_eq!(trie.len(), 4);
        trie.register(b"\r\n").unwrap();
        assert_eq!(trie.len(), 4);
        assert_eq!(trie.depth(), 2);
    }

    #[test]
    fn reports_offset_past_the_match() {
        let mut trie = trie_with(&[b"OK\r\n"]);
        assert_eq!(matches(&mut trie, b"xxOK\r\nOK\r\n"), [6, 10]);
    }

    #[test]
    fn match_keeps_timestamp_of_last_byte() {
        let mut trie = trie_with(&[b"ab"]);
        let first = DateTime { second: 1, ..DateTime::default() };
        let second = DateTime { second: 2, ..DateTime::default() };
        assert!(trie.accept(b'a', 10, first).is_none());
        let event = trie.accept(b'b', 11, second).unwrap();
        assert_eq!(event.offset, 12);
        assert_eq!(event.timestamp, second);
        assert!(!trie.is_idle());
    }

    #[test]
    fn falls_back_to_shorter_pattern_on_mismatch() {
        let mut trie = trie_with(&[b"\r", b"\r\n"]);
        // "\r" alone has children, so it only matches once the next byte breaks "\r\n"
        assert_eq!(matches(&mut trie, b"a\rb"), [2]);
        assert_eq!(matches(&mut trie, b"a\r\nb"), [3]);
    }

    #[test]
    fn holds_back_bytes_past_a_shorter_pattern() {
        let mut trie = trie_with(&[b"a", b"abc"]);
        assert_eq!(trie.held_back(), 0);

        assert_eq!(trie.accept(b'a', 0, DateTime::default()), None);
        assert_eq!(trie.held_back(), 0);
        assert_eq!(trie.accept(b'b', 1, DateTime::default()), None);
        assert_eq!(trie.held_back(), 1);

        // Falls back to "a": the boundary lands in front of the held byte.
        let event = trie.accept(b'x', 2, DateTime::default()).unwrap();
        assert_eq!(event.offset, 1);
    }

    #[test]
    fn nothing_is_held_without_a_shorter_pattern_on_the_path() {
        let mut trie = trie_with(&[b"\r\n", b"ab\r"]);
        trie.accept(b'a', 0, DateTime::default());
        trie.accept(b'b', 1, DateTime::default());
        assert_eq!(trie.held_back(), 0);
    }

    #[test]
    fn mismatching_byte_is_not_retried() {
        let mut trie = trie_with(&[b"ab"]);
        assert_eq!(matches(&mut trie, b"aab"), [] as [u64; 0]);
        assert_eq!(matches(&mut trie, b"aab ab"), [6]);
    }

    #[test]
    fn rejects_bad_patterns() {
        let mut trie: PatternTrie<4, 3> = PatternTrie::new();
        assert_eq!(trie.register(b""), Err(Error::EmptyPattern));
        assert_eq!(trie.register(b"abcd"), Err(Error::PatternTooLong));
        trie.register(b"abc").unwrap();
        assert_eq!(trie.register(b"x"), Err(Error::Capacity));
        // Failed registration leaves the trie untouched.
        assert_eq!(trie.len(), 4);
        trie.register(b"ab").unwrap();
    }

    #[test]
    fn register_requires_idle_matcher() {
        let mut trie = trie_with(&[b"ab"]);
        trie.accept(b'a', 0, DateTime::default());
        assert_eq!(trie.register(b"cd"), Err(Error::MatcherBusy));
        trie.reset();
        trie.register(b"cd").unwrap();
    }
}
