//! Gather / scatter / lookup / redundancy index assignment (spec §4.4.3).
//!
//! Re-run on any structural change to a module. Reserved slots are fixed by
//! the hardware and never reassigned: scatter 0 and gather 0 are NOPs,
//! gather 1 is the permanent "forward all" row the catch-all lookup rule
//! falls back to, and redundancy-table slot 0 is a NOP.

pub const SCATTER_START_IDX: u16 = 1;
pub const GATHER_START_IDX: u16 = 2;
pub const REDUNDANCY_START_IDX: u16 = 1;
pub const LOOKUP_START_IDX: u16 = 0;
pub const LOOKUP_FALLBACK_SLOT: u16 = 16;

use std::collections::HashSet;

use crate::arena::Arena;
use crate::error::{AcmError, AcmResult};
use crate::stream::{Stream, StreamId, StreamVariant};

/// Walks a module's stream list in insertion order and assigns gather,
/// scatter and lookup indices (module-scoped hardware resources), writing
/// them back onto each stream. `redundand_index` is handled separately by
/// [`assign_redundant_indices`] since a redundant pair spans two different
/// modules and must share one index. Returns an error if any hard resource
/// cap is exceeded, per the count limits validated independently in
/// [`crate::validate`].
pub fn assign_indices(streams: &Arena<Stream>, order: &[StreamId]) -> AcmResult<Vec<(StreamId, crate::stream::ComputedIndices)>> {
    let mut gather = GATHER_START_IDX;
    let mut scatter = SCATTER_START_IDX;
    let mut lookup = LOOKUP_START_IDX;
    let mut out = Vec::with_capacity(order.len());

    for &id in order {
        let stream = streams.get(id).map_err(|_| AcmError::Internal)?;
        let mut indices = stream.indices.clone();

        if stream.is_egress() {
            indices.gather_dma_index = Some(gather);
            gather += 1;
        }
        if stream.is_ingress() {
            indices.scatter_dma_index = Some(scatter);
            scatter += 1;
        }
        if matches!(stream.variant, StreamVariant::IngressTriggered | StreamVariant::RedundantRx) {
            if lookup >= LOOKUP_FALLBACK_SLOT {
                return Err(AcmError::TooManyLookupEntries);
            }
            indices.lookup_index = Some(lookup);
            lookup += 1;
        }
        out.push((id, indices));
    }
    Ok(out)
}

/// Assigns one shared `redundand_index` per redundant pair, walking modules
/// in configuration order. A pair's two `RedundantTx` members live in
/// different modules (spec §3's redundant-pair invariant), so this index
/// cannot be assigned per-module the way gather/scatter/lookup are — doing
/// so would hand each side of the pair an index based on its own module-
/// local position, which only matches by coincidence (spec §8: "each
/// carries the same `redundand_index` > 0").
pub fn assign_redundant_indices(streams: &Arena<Stream>, modules: &[Vec<StreamId>]) -> Vec<(StreamId, u16)> {
    let mut next = REDUNDANCY_START_IDX;
    let mut seen: HashSet<StreamId> = HashSet::new();
    let mut out = Vec::new();

    for stream_ids in modules {
        for &id in stream_ids {
            if seen.contains(&id) {
                continue;
            }
            let Ok(stream) = streams.get(id) else { continue };
            if !matches!(stream.variant, StreamVariant::RedundantTx | StreamVariant::RedundantRx) {
                continue;
            }
            let idx = next;
            next += 1;
            seen.insert(id);
            out.push((id, idx));
            if let Some(partner_id) = stream.reference_redundant {
                if seen.insert(partner_id) {
                    out.push((partner_id, idx));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::LookupEntry;

    #[test]
    fn reserved_slots_are_skipped_before_the_first_stream() {
        let mut arena: Arena<Stream> = Arena::new(1);
        let header = [0u8; 16];
        let id = arena.insert(Stream::new_ingress_triggered(LookupEntry::new(header, header, None, None, 0).unwrap()));
        let assigned = assign_indices(&arena, &[id]).unwrap();
        assert_eq!(assigned[0].1.scatter_dma_index, Some(SCATTER_START_IDX));
        assert_eq!(assigned[0].1.lookup_index, Some(LOOKUP_START_IDX));
    }

    #[test]
    fn egress_stream_gets_gather_index_starting_at_two() {
        let mut arena: Arena<Stream> = Arena::new(1);
        let id = arena.insert(Stream::new_time_triggered([1; 6], [0; 6], 100, 0).unwrap());
        let assigned = assign_indices(&arena, &[id]).unwrap();
        assert_eq!(assigned[0].1.gather_dma_index, Some(GATHER_START_IDX));
    }

    #[test]
    fn redundant_pair_across_modules_shares_one_index_regardless_of_local_position() {
        let mut arena: Arena<Stream> = Arena::new(1);
        let a = arena.insert(Stream::new_time_triggered([1; 6], [0; 6], 100, 0).unwrap());
        let b = arena.insert(Stream::new_time_triggered([2; 6], [0; 6], 100, 0).unwrap());
        // A second pair, inserted so each module's local position for its
        // member disagrees with the other module's position for its partner.
        let c = arena.insert(Stream::new_time_triggered([3; 6], [0; 6], 100, 0).unwrap());
        let d = arena.insert(Stream::new_time_triggered([4; 6], [0; 6], 100, 0).unwrap());
        for (x, y) in [(a, b), (c, d)] {
            arena.get_mut(x).unwrap().variant = StreamVariant::RedundantTx;
            arena.get_mut(y).unwrap().variant = StreamVariant::RedundantTx;
            arena.get_mut(x).unwrap().reference_redundant = Some(y);
            arena.get_mut(y).unwrap().reference_redundant = Some(x);
        }

        // Module 0 carries [a, d]; module 1 carries [c, b] — so b's local
        // position in module 1 (index 1, second) does not match a's local
        // position in module 0 (index 0, first), and the same goes for c/d.
        let modules = vec![vec![a, d], vec![c, b]];
        let assigned = assign_redundant_indices(&arena, &modules);
        let idx = |id: StreamId| assigned.iter().find(|(s, _)| *s == id).unwrap().1;
        assert_eq!(idx(a), idx(b));
        assert_eq!(idx(c), idx(d));
        assert_ne!(idx(a), idx(c));
        assert!(idx(a) >= REDUNDANCY_START_IDX);
    }
}
