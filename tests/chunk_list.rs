use linkcore::safe_stream::SendingChunkList;
use linkcore::time::{Instant, RingIndex};

const RING: u32 = 1024;

fn idx(v: u32) -> RingIndex {
    RingIndex::new(v, RING)
}

/// S5: register/split/confirm lifecycle from the spec walkthrough, exercised
/// through the crate's public API rather than the module's own unit tests.
#[test]
fn sending_chunk_list_lifecycle() {
    let mut chunks = SendingChunkList::new(RING);
    let begin = idx(0);
    let now = Instant::now();

    chunks.register(idx(0), idx(5), now, begin);
    chunks.register(idx(6), idx(10), now, begin);
    chunks.register(idx(11), idx(20), now, begin);
    assert_eq!(chunks.len(), 3);

    chunks.register(idx(0), idx(10), now, begin);
    assert_eq!(chunks.len(), 2);

    chunks.register(idx(0), idx(20), now, begin);
    assert_eq!(chunks.len(), 1);
    let whole = chunks.chunks(begin)[0];
    assert_eq!(whole.repeat_count, 3);

    chunks.register(idx(8), idx(14), now, begin);
    assert_eq!(chunks.len(), 3);

    chunks.remove_up_to(idx(7), begin);
    assert_eq!(chunks.len(), 2);

    chunks.remove_up_to(idx(20), begin);
    assert!(chunks.is_empty());
}
