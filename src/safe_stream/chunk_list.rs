//! Sending chunk bookkeeping for the safe-stream reliability layer
//! (`spec.md` §4.11): tracks outbound byte ranges sent but not yet
//! confirmed, on a modular ring relative to a rolling `begin` index.

use crate::time::{Instant, RingIndex};

/// One not-yet-confirmed outbound range, inclusive on both ends
/// (`spec.md` §3 `SendingChunk`).
#[derive(Debug, Clone, Copy)]
pub struct SendingChunk {
    pub begin_offset: RingIndex,
    pub end_offset: RingIndex,
    pub send_time: Instant,
    pub repeat_count: u16,
}

fn linear(begin: RingIndex, x: RingIndex) -> i64 {
    begin.forward_distance(x) as i64
}

/// `begin` is the caller's current confirmed-up-to reference, re-supplied on
/// every call since it advances independently of this list. Ranges never
/// intersect or touch each other once `Register` returns (`spec.md` §8
/// invariant 8).
#[derive(Default)]
pub struct SendingChunkList {
    ring_size: u32,
    chunks: Vec<SendingChunk>,
}

impl SendingChunkList {
    pub fn new(ring_size: u32) -> SendingChunkList {
        SendingChunkList {
            ring_size,
            chunks: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunks ordered earliest-first relative to `begin`.
    pub fn chunks(&self, begin: RingIndex) -> Vec<SendingChunk> {
        let mut out = self.chunks.clone();
        out.sort_by_key(|c| linear(begin, c.begin_offset));
        out
    }

    /// Registers a freshly sent range `[b, e]`. Touching or overlapping
    /// chunks are merged into one, `repeat_count` bumped to
    /// `max(prior) + 1`; a range strictly inside a single existing chunk
    /// splits it instead, leaving the interior as its own
    /// `repeat_count == 1` chunk (`spec.md` §4.11).
    pub fn register(&mut self, b: RingIndex, e: RingIndex, now: Instant, begin: RingIndex) {
        let lb = linear(begin, b);
        let le = linear(begin, e);

        let mut found = Vec::new();
        let mut rest = Vec::new();
        for chunk in self.chunks.drain(..) {
            let clb = linear(begin, chunk.begin_offset);
            let cle = linear(begin, chunk.end_offset);
            if lb <= cle + 1 && clb <= le + 1 {
                found.push((chunk, clb, cle));
            } else {
                rest.push(chunk);
            }
        }

        if found.len() == 1 {
            let (chunk, clb, cle) = found[0];
            let strictly_contained = clb <= lb && le <= cle && (clb < lb || le < cle);
            if strictly_contained {
                if clb < lb {
                    rest.push(SendingChunk {
                        begin_offset: chunk.begin_offset,
                        end_offset: b.add(self.ring_size - 1),
                        send_time: chunk.send_time,
                        repeat_count: chunk.repeat_count,
                    });
                }
                if le < cle {
                    rest.push(SendingChunk {
                        begin_offset: e.add(1),
                        end_offset: chunk.end_offset,
                        send_time: chunk.send_time,
                        repeat_count: chunk.repeat_count,
                    });
                }
                rest.push(SendingChunk {
                    begin_offset: b,
                    end_offset: e,
                    send_time: now,
                    repeat_count: 1,
                });
                self.chunks = rest;
                return;
            }
        }

        let max_repeat = found.iter().map(|(c, _, _)| c.repeat_count).max().unwrap_or(0);
        let merged_begin = std::iter::once((b, lb))
            .chain(found.iter().map(|(c, clb, _)| (c.begin_offset, *clb)))
            .min_by_key(|(_, d)| *d)
            .map(|(idx, _)| idx)
            .unwrap_or(b);
        let merged_end = std::iter::once((e, le))
            .chain(found.iter().map(|(c, _, cle)| (c.end_offset, *cle)))
            .max_by_key(|(_, d)| *d)
            .map(|(idx, _)| idx)
            .unwrap_or(e);

        rest.push(SendingChunk {
            begin_offset: merged_begin,
            end_offset: merged_end,
            send_time: now,
            repeat_count: max_repeat + 1,
        });
        self.chunks = rest;
    }

    /// Confirms every byte up to and including `ack`. Chunks entirely at or
    /// before `ack` are dropped; a chunk straddling `ack` has its
    /// `begin_offset` advanced past it, `repeat_count` unchanged.
    pub fn remove_up_to(&mut self, ack: RingIndex, begin: RingIndex) {
        let la = linear(begin, ack);
        let mut kept = Vec::with_capacity(self.chunks.len());
        for mut chunk in self.chunks.drain(..) {
            let cle = linear(begin, chunk.end_offset);
            if cle <= la {
                continue;
            }
            let clb = linear(begin, chunk.begin_offset);
            if clb <= la {
                chunk.begin_offset = ack.add(1);
            }
            kept.push(chunk);
        }
        self.chunks = kept;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Duration;

    const RING: u32 = 256;

    fn idx(v: u32) -> RingIndex {
        RingIndex::new(v, RING)
    }

    fn now() -> Instant {
        Instant::now()
    }

    fn bounds(list: &SendingChunkList, begin: RingIndex) -> Vec<(u32, u32, u16)> {
        list.chunks(begin)
            .iter()
            .map(|c| (c.begin_offset.value(), c.end_offset.value(), c.repeat_count))
            .collect()
    }

    #[test]
    fn disjoint_registers_stay_separate() {
        let mut list = SendingChunkList::new(RING);
        let begin = idx(0);
        list.register(idx(0), idx(5), now(), begin);
        list.register(idx(6), idx(10), now(), begin);
        list.register(idx(11), idx(20), now(), begin);
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn touching_registers_merge_and_bump_repeat() {
        let mut list = SendingChunkList::new(RING);
        let begin = idx(0);
        list.register(idx(0), idx(5), now(), begin);
        list.register(idx(6), idx(10), now(), begin);
        list.register(idx(11), idx(20), now(), begin);

        list.register(idx(0), idx(10), now(), begin);
        assert_eq!(list.len(), 2);
        let b = bounds(&list, begin);
        assert_eq!(b[0], (0, 10, 2));
    }

    #[test]
    fn full_span_register_merges_to_one_chunk() {
        let mut list = SendingChunkList::new(RING);
        let begin = idx(0);
        list.register(idx(0), idx(5), now(), begin);
        list.register(idx(6), idx(10), now(), begin);
        list.register(idx(11), idx(20), now(), begin);
        list.register(idx(0), idx(10), now(), begin);

        list.register(idx(0), idx(20), now(), begin);
        assert_eq!(list.len(), 1);
        let b = bounds(&list, begin);
        assert_eq!(b[0], (0, 20, 3));
    }

    #[test]
    fn interior_register_splits_into_three() {
        let mut list = SendingChunkList::new(RING);
        let begin = idx(0);
        list.register(idx(0), idx(5), now(), begin);
        list.register(idx(6), idx(10), now(), begin);
        list.register(idx(11), idx(20), now(), begin);
        list.register(idx(0), idx(10), now(), begin);
        list.register(idx(0), idx(20), now(), begin);

        list.register(idx(8), idx(14), now(), begin);
        assert_eq!(list.len(), 3);
        let b = bounds(&list, begin);
        assert_eq!(b, vec![(0, 7, 3), (8, 14, 1), (15, 20, 3)]);
    }

    #[test]
    fn remove_up_to_drops_and_trims() {
        let mut list = SendingChunkList::new(RING);
        let begin = idx(0);
        list.register(idx(0), idx(5), now(), begin);
        list.register(idx(6), idx(10), now(), begin);
        list.register(idx(11), idx(20), now(), begin);
        list.register(idx(0), idx(10), now(), begin);
        list.register(idx(0), idx(20), now(), begin);
        list.register(idx(8), idx(14), now(), begin);

        list.remove_up_to(idx(7), begin);
        assert_eq!(list.len(), 2);

        list.remove_up_to(idx(20), begin);
        assert!(list.is_empty());
    }

    #[test]
    fn straddling_ack_advances_begin_offset() {
        let mut list = SendingChunkList::new(RING);
        let begin = idx(0);
        list.register(idx(0), idx(20), now(), begin);

        list.remove_up_to(idx(10), begin);
        let b = bounds(&list, begin);
        assert_eq!(b, vec![(11, 20, 1)]);
    }

    #[test]
    fn repeat_count_field_survives_clone() {
        let chunk = SendingChunk {
            begin_offset: idx(0),
            end_offset: idx(5),
            send_time: now(),
            repeat_count: 4,
        };
        let copy = chunk;
        assert_eq!(copy.repeat_count, 4);
        let _ = Duration::from_secs(1);
    }

    /// Registers a batch of random (non-wrapping) ranges and checks the
    /// invariant `register`'s doc promises: no two resulting chunks overlap
    /// or touch, and their union covers every byte any input range covered.
    #[test]
    fn property_register_union_covers_every_byte_and_merges_adjacent() {
        use rand::Rng;
        use std::collections::BTreeSet;

        let mut rng = rand::rng();
        for _ in 0..100 {
            let mut list = SendingChunkList::new(RING);
            let begin = idx(0);
            let mut covered: BTreeSet<u32> = BTreeSet::new();

            let range_count = rng.random_range(1..20);
            for _ in 0..range_count {
                let b = rng.random_range(0..RING - 1);
                let e = rng.random_range(b..RING - 1);
                list.register(idx(b), idx(e), now(), begin);
                covered.extend(b..=e);
            }

            let chunks = bounds(&list, begin);
            let mut chunk_covered: BTreeSet<u32> = BTreeSet::new();
            for &(b, e, _) in &chunks {
                chunk_covered.extend(b..=e);
            }
            assert_eq!(chunk_covered, covered, "chunk union must match the union of registered ranges");

            for window in chunks.windows(2) {
                let (_, prev_end, _) = window[0];
                let (next_begin, _, _) = window[1];
                assert!(next_begin > prev_end + 1, "adjacent chunks must neither overlap nor touch: {window:?}");
            }
        }
    }
}
