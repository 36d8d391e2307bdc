//! HTTP Range header handling for object reads.

/// A resolved byte range, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        false // inclusive ranges always span at least one byte
    }

    /// `Content-Range` header value for a 206 response.
    #[must_use]
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{total}", self.start, self.end)
    }
}

/// Parse `bytes=START-END`, `bytes=START-`, or `bytes=-SUFFIX` against an
/// object of `total_size` bytes. `None` means the range is unsatisfiable
/// (416); a malformed header is also treated as unsatisfiable.
#[must_use]
pub fn parse_range_header(range_header: &str, total_size: u64) -> Option<ByteRange> {
    let spec = range_header.trim().strip_prefix("bytes=")?;
    let (start_str, end_str) = spec.split_once('-')?;
    let start_str = start_str.trim();
    let end_str = end_str.trim();

    if total_size == 0 {
        return None;
    }
    if start_str.is_empty() && end_str.is_empty() {
        return None;
    }

    // Suffix range: last N bytes, clamped to the whole object.
    if start_str.is_empty() {
        let suffix_len: u64 = end_str.parse().ok()?;
        if suffix_len == 0 {
            return None;
        }
        let start = total_size.saturating_sub(suffix_len);
        return Some(ByteRange {
            start,
            end: total_size - 1,
        });
    }

    let start: u64 = start_str.parse().ok()?;
    if start >= total_size {
        return None;
    }

    // Open-ended range: from start to the last byte.
    if end_str.is_empty() {
        return Some(ByteRange {
            start,
            end: total_size - 1,
        });
    }

    let end: u64 = end_str.parse().ok()?;
    if start > end {
        return None;
    }
    Some(ByteRange {
        start,
        end: end.min(total_size - 1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_range() {
        let r = parse_range_header("bytes=2-5", 10).unwrap();
        assert_eq!((r.start, r.end), (2, 5));
        assert_eq!(r.len(), 4);
        assert_eq!(r.content_range(10), "bytes 2-5/10");
    }

    #[test]
    fn test_open_ended() {
        let r = parse_range_header("bytes=4-", 10).unwrap();
        assert_eq!((r.start, r.end), (4, 9));
    }

    #[test]
    fn test_suffix() {
        let r = parse_range_header("bytes=-3", 10).unwrap();
        assert_eq!((r.start, r.end), (7, 9));
        // Suffix longer than the object clamps to everything.
        let r = parse_range_header("bytes=-100", 10).unwrap();
        assert_eq!((r.start, r.end), (0, 9));
    }

    #[test]
    fn test_end_clamped() {
        let r = parse_range_header("bytes=5-999", 10).unwrap();
        assert_eq!((r.start, r.end), (5, 9));
    }

    #[test]
    fn test_unsatisfiable() {
        assert!(parse_range_header("bytes=20-", 10).is_none());
        assert!(parse_range_header("bytes=10-12", 10).is_none());
        assert!(parse_range_header("bytes=5-2", 10).is_none());
        assert!(parse_range_header("bytes=-0", 10).is_none());
        assert!(parse_range_header("bytes=-", 10).is_none());
        assert!(parse_range_header("chunks=0-1", 10).is_none());
        assert!(parse_range_header("bytes=a-b", 10).is_none());
        assert!(parse_range_header("bytes=0-0", 0).is_none());
    }
}
