//! Fragment reassembly.
//!
//! Fragments are stored by their explicit index, never by arrival order;
//! the transport reorders datagrams freely. A frame is released to
//! decrypt only when every index is present and the concatenated length
//! matches the header's `encrypted_size`. Entries that trail the newest
//! completed sequence by more than one are purged so loss and
//! reordering cannot grow the table without bound.

use std::collections::HashMap;
use std::time::Instant;

use stream_protocol::FrameHeader;
use tracing::{debug, warn};

use crate::{PipelineError, PipelineResult};

/// Pending fragments for one frame.
struct ReassemblyEntry {
    fragments: Vec<Option<Vec<u8>>>,
    received: usize,
    expected_size: usize,
    last_update: Instant,
}

impl ReassemblyEntry {
    fn new(total: usize, expected_size: usize) -> Self {
        Self {
            fragments: vec![None; total],
            received: 0,
            expected_size,
            last_update: Instant::now(),
        }
    }
}

/// Reassembles encrypted frames from out-of-order fragments.
///
/// Owned by the receive loop; single-threaded by construction.
pub struct FrameAssembler {
    entries: HashMap<u32, ReassemblyEntry>,
    last_completed: Option<u32>,
    max_entries: usize,
}

impl FrameAssembler {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            last_completed: None,
            max_entries,
        }
    }

    /// Insert one fragment. Returns the full encrypted frame when this
    /// fragment completes it.
    ///
    /// A completed frame whose byte length disagrees with the header is
    /// dropped and reported as corrupt; the caller logs and continues.
    pub fn insert(&mut self, header: &FrameHeader, payload: &[u8]) -> PipelineResult<Option<Vec<u8>>> {
        let total = header.total_fragments as usize;
        if total == 0 {
            return Err(stream_protocol::ProtocolError::EmptyFrame.into());
        }
        if header.fragment_index >= header.total_fragments {
            return Err(stream_protocol::ProtocolError::FragmentIndexOutOfRange {
                index: header.fragment_index,
                total: header.total_fragments,
            }
            .into());
        }

        let expected_size = header.encrypted_size as usize;
        let entry = self
            .entries
            .entry(header.sequence)
            .or_insert_with(|| ReassemblyEntry::new(total, expected_size));

        // A header disagreement means the entry is poisoned (e.g. the
        // sequence number wrapped onto a half-dead entry); start over.
        if entry.fragments.len() != total || entry.expected_size != expected_size {
            warn!(
                "Frame {}: conflicting headers, resetting entry",
                header.sequence
            );
            *entry = ReassemblyEntry::new(total, expected_size);
        }

        let index = header.fragment_index as usize;
        if entry.fragments[index].is_none() {
            entry.fragments[index] = Some(payload.to_vec());
            entry.received += 1;
            entry.last_update = Instant::now();
        }

        if entry.received < total {
            self.enforce_capacity();
            return Ok(None);
        }

        // Complete: concatenate in index order and verify the length.
        let Some(entry) = self.entries.remove(&header.sequence) else {
            return Ok(None);
        };
        let mut encrypted = Vec::with_capacity(expected_size);
        for fragment in entry.fragments.into_iter().flatten() {
            encrypted.extend_from_slice(&fragment);
        }

        if encrypted.len() != expected_size {
            return Err(PipelineError::CorruptFrame {
                sequence: header.sequence,
                expected: expected_size,
                actual: encrypted.len(),
            });
        }

        self.last_completed = Some(header.sequence);
        self.purge_superseded(header.sequence);

        Ok(Some(encrypted))
    }

    /// Entries pending completion; exposed for tests and stats.
    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    /// Whether an entry for `sequence` is still pending.
    pub fn contains(&self, sequence: u32) -> bool {
        self.entries.contains_key(&sequence)
    }

    /// Drop entries trailing the newest completed sequence by more than
    /// one. Wraparound-safe: distance is computed modulo 2^32 and
    /// half-range disambiguates past from future.
    fn purge_superseded(&mut self, newest: u32) {
        self.entries.retain(|&sequence, _| {
            let behind = newest.wrapping_sub(sequence);
            let trails = behind > 1 && behind < u32::MAX / 2;
            if trails {
                debug!("Purging stale reassembly entry {}", sequence);
            }
            !trails
        });
    }

    /// Hard cap against pathological loss patterns where nothing
    /// completes: evict the least recently touched entries.
    fn enforce_capacity(&mut self) {
        while self.entries.len() > self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_update)
                .map(|(&sequence, _)| sequence);
            match oldest {
                Some(sequence) => {
                    warn!("Reassembly table full, evicting frame {}", sequence);
                    self.entries.remove(&sequence);
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_protocol::fragment_frame;

    fn deliver(
        assembler: &mut FrameAssembler,
        fragment: &[u8],
    ) -> PipelineResult<Option<Vec<u8>>> {
        let header = FrameHeader::decode(fragment).unwrap();
        assembler.insert(&header, &fragment[FrameHeader::SIZE..])
    }

    #[test]
    fn in_order_reassembly() {
        let mut assembler = FrameAssembler::new(64);
        let encrypted: Vec<u8> = (0..5000u32).map(|i| i as u8).collect();
        let fragments = fragment_frame(1.0, 0, &encrypted);
        assert_eq!(fragments.len(), 4);

        for fragment in &fragments[..3] {
            assert!(deliver(&mut assembler, fragment).unwrap().is_none());
        }
        let out = deliver(&mut assembler, &fragments[3]).unwrap().unwrap();
        assert_eq!(out, encrypted);
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn out_of_order_reassembly_is_byte_exact() {
        let mut assembler = FrameAssembler::new(64);
        let encrypted: Vec<u8> = (0..4000u32).map(|i| (i * 7) as u8).collect();
        let fragments = fragment_frame(1.0, 5, &encrypted);

        // Worst case: reversed arrival.
        let mut result = None;
        for fragment in fragments.iter().rev() {
            if let Some(done) = deliver(&mut assembler, fragment).unwrap() {
                result = Some(done);
            }
        }
        assert_eq!(result.unwrap(), encrypted);
    }

    #[test]
    fn duplicate_fragments_are_idempotent() {
        let mut assembler = FrameAssembler::new(64);
        let encrypted = vec![9u8; 3000];
        let fragments = fragment_frame(1.0, 2, &encrypted);

        assert!(deliver(&mut assembler, &fragments[0]).unwrap().is_none());
        assert!(deliver(&mut assembler, &fragments[0]).unwrap().is_none());
        assert!(deliver(&mut assembler, &fragments[1]).unwrap().is_none());
        let out = deliver(&mut assembler, &fragments[2]).unwrap().unwrap();
        assert_eq!(out, encrypted);
    }

    #[test]
    fn missing_fragment_never_completes() {
        let mut assembler = FrameAssembler::new(64);
        let fragments = fragment_frame(1.0, 7, &vec![1u8; 5000]);

        // Fragment 2 of 4 never arrives.
        for (i, fragment) in fragments.iter().enumerate() {
            if i == 2 {
                continue;
            }
            assert!(deliver(&mut assembler, fragment).unwrap().is_none());
        }
        assert!(assembler.contains(7));
    }

    #[test]
    fn completion_purges_superseded_entries() {
        let mut assembler = FrameAssembler::new(64);

        // Frame 7 stays incomplete.
        let seven = fragment_frame(1.0, 7, &vec![1u8; 5000]);
        for (i, fragment) in seven.iter().enumerate() {
            if i != 2 {
                deliver(&mut assembler, fragment).unwrap();
            }
        }
        assert!(assembler.contains(7));

        // Completing frame 8 keeps 7 (trails by exactly one)...
        let eight = fragment_frame(1.0, 8, &vec![2u8; 1000]);
        assert!(deliver(&mut assembler, &eight[0]).unwrap().is_some());
        assert!(assembler.contains(7));

        // ...completing frame 9 purges it.
        let nine = fragment_frame(1.0, 9, &vec![3u8; 1000]);
        assert!(deliver(&mut assembler, &nine[0]).unwrap().is_some());
        assert!(!assembler.contains(7));
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn sequence_wraparound_survives_gc() {
        let mut assembler = FrameAssembler::new(64);

        // Incomplete frame just before the wrap point.
        let old = fragment_frame(1.0, u32::MAX - 2, &vec![1u8; 3000]);
        deliver(&mut assembler, &old[0]).unwrap();

        // Complete u32::MAX, then 0, then 1 across the wrap.
        for sequence in [u32::MAX, 0, 1] {
            let fragments = fragment_frame(1.0, sequence, &vec![4u8; 500]);
            assert!(deliver(&mut assembler, &fragments[0]).unwrap().is_some());
        }

        // The pre-wrap entry trails by more than one and is gone.
        assert!(!assembler.contains(u32::MAX - 2));
    }

    #[test]
    fn length_mismatch_is_reported_corrupt() {
        let mut assembler = FrameAssembler::new(64);
        let encrypted = vec![5u8; 2000];
        let fragments = fragment_frame(1.0, 3, &encrypted);

        // Lie about the encrypted size on the wire.
        let mut first = FrameHeader::decode(&fragments[0]).unwrap();
        let mut second = FrameHeader::decode(&fragments[1]).unwrap();
        first.encrypted_size = 2100;
        second.encrypted_size = 2100;

        assembler
            .insert(&first, &fragments[0][FrameHeader::SIZE..])
            .unwrap();
        let err = assembler
            .insert(&second, &fragments[1][FrameHeader::SIZE..])
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::CorruptFrame {
                sequence: 3,
                expected: 2100,
                actual: 2000,
            }
        ));
        assert!(!assembler.contains(3));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut assembler = FrameAssembler::new(64);
        let header = FrameHeader {
            timestamp: 1.0,
            sequence: 0,
            fragment_index: 4,
            total_fragments: 4,
            encrypted_size: 100,
        };
        assert!(assembler.insert(&header, &[0u8; 10]).is_err());
    }

    #[test]
    fn capacity_cap_evicts_oldest() {
        let mut assembler = FrameAssembler::new(2);
        for sequence in 0..5u32 {
            // Two-fragment frames that never complete.
            let fragments = fragment_frame(1.0, sequence, &vec![0u8; 2000]);
            deliver(&mut assembler, &fragments[0]).unwrap();
        }
        assert!(assembler.pending() <= 2);
    }
}
