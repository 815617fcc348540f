use crate::event::Event;
use std::collections::VecDeque;

/// Line-delimited staging buffer fed by a serial port's read event
/// (`spec.md` §4.7).
///
/// Bytes accumulate in `staging` until a `\r\n` is found; everything before
/// it becomes a completed line in `lines`, and `update_event` fires once per
/// batch of newly completed lines.
pub struct AtBuffer {
    staging: Vec<u8>,
    lines: VecDeque<String>,
    /// Index, relative to `lines.front()`, of the first line that arrived in
    /// the most recent `feed` call.
    update_event: Event<usize>,
}

impl AtBuffer {
    pub fn new() -> AtBuffer {
        AtBuffer {
            staging: Vec::new(),
            lines: VecDeque::new(),
            update_event: Event::new(),
        }
    }

    pub fn update_event(&self) -> Event<usize> {
        self.update_event.clone()
    }

    /// Appends raw bytes from the serial port, splitting on `\r\n`.
    pub fn feed(&mut self, bytes: &[u8]) {
        let before = self.lines.len();
        self.staging.extend_from_slice(bytes);
        loop {
            let Some(pos) = find_crlf(&self.staging) else { break };
            let line = String::from_utf8_lossy(&self.staging[..pos]).into_owned();
            self.staging.drain(..pos + 2);
            self.lines.push_back(line);
        }
        if self.lines.len() > before {
            self.update_event.emit(&before);
        }
    }

    pub fn lines(&self) -> &VecDeque<String> {
        &self.lines
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Finds the first line at index `>= from` that *contains* `pattern`
    /// (substring match, not prefix-only — `spec.md` §3: "`FindPattern`
    /// ... returns an iterator to the first line that contains `needle`").
    pub fn find_pattern(&self, pattern: &str, from: usize) -> Option<usize> {
        self.lines
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, line)| line.contains(pattern))
            .map(|(i, _)| i)
    }

    /// Discards lines `[0, upto)`; everything strictly before the newly
    /// arrived dispatch window is no longer retrievable.
    pub fn erase_up_to(&mut self, upto: usize) {
        for _ in 0..upto.min(self.lines.len()) {
            self.lines.pop_front();
        }
    }
}

impl Default for AtBuffer {
    fn default() -> Self {
        AtBuffer::new()
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_complete_lines_and_keeps_trailing_bytes() {
        let mut buf = AtBuffer::new();
        buf.feed(b"OK\r\n+CREG: 2\r\npart");
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.line(0), Some("OK"));
        assert_eq!(buf.line(1), Some("+CREG: 2"));

        buf.feed(b"ial\r\n");
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.line(2), Some("partial"));
    }

    #[test]
    fn find_pattern_matches_prefix() {
        let mut buf = AtBuffer::new();
        buf.feed(b"+CREG: 2\r\nOK\r\n");
        assert_eq!(buf.find_pattern("OK", 0), Some(1));
        assert_eq!(buf.find_pattern("+CREG", 0), Some(0));
        assert_eq!(buf.find_pattern("ERROR", 0), None);
    }

    #[test]
    fn erase_up_to_discards_prefix() {
        let mut buf = AtBuffer::new();
        buf.feed(b"a\r\nb\r\nc\r\n");
        buf.erase_up_to(2);
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.line(0), Some("c"));
    }

    /// Feeds the same line stream through an arbitrary number of arbitrary
    /// byte-boundary splits and checks the reassembled lines never depend on
    /// where those boundaries fell.
    #[test]
    fn fuzzed_feed_splits_reassemble_into_the_same_lines() {
        use rand::Rng;

        let mut rng = rand::rng();
        for _ in 0..200 {
            let line_count = rng.random_range(0..12);
            let lines: Vec<String> = (0..line_count)
                .map(|_| {
                    let len = rng.random_range(0..10);
                    (0..len)
                        .map(|_| (b'a' + rng.random_range(0..26u8)) as char)
                        .collect()
                })
                .collect();
            let mut wire = String::new();
            for line in &lines {
                wire.push_str(line);
                wire.push_str("\r\n");
            }
            let wire = wire.into_bytes();

            let mut buf = AtBuffer::new();
            let mut pos = 0;
            while pos < wire.len() {
                let remaining = wire.len() - pos;
                let chunk = rng.random_range(1..=remaining);
                buf.feed(&wire[pos..pos + chunk]);
                pos += chunk;
            }

            let got: Vec<&str> = buf.lines().iter().map(String::as_str).collect();
            let expected: Vec<&str> = lines.iter().map(String::as_str).collect();
            assert_eq!(got, expected);
        }
    }
}
