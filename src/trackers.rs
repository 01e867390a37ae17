//! The two sibling Gazelle trackers and their source-flag metadata.

/// One of the two sibling trackers. RED torrents are searched for on OPS and
/// vice versa; `reciprocal` yields the other side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tracker {
    Red,
    Ops,
}

impl Tracker {
    /// Source flags that count as evidence a torrent originated here.
    pub fn source_flags_for_search(&self) -> &'static [&'static [u8]] {
        match self {
            Tracker::Red => &[b"RED", b"PTH"],
            Tracker::Ops => &[b"OPS", b"APL"],
        }
    }

    /// Source flags to try, in order, when probing this tracker for a
    /// sibling copy. The empty flag is a last resort for legacy uploads
    /// that carry no source.
    pub fn source_flags_for_creation(&self) -> &'static [&'static [u8]] {
        match self {
            Tracker::Red => &[b"RED", b"PTH", b""],
            Tracker::Ops => &[b"OPS", b"APL", b""],
        }
    }

    /// Substring of an announce URL that identifies this tracker.
    pub fn announce_fragment(&self) -> &'static [u8] {
        match self {
            Tracker::Red => b"flacsfor.me",
            Tracker::Ops => b"home.opsfet.ch",
        }
    }

    /// Directory-safe short name, also used in user-facing messages.
    pub fn site_shortname(&self) -> &'static str {
        match self {
            Tracker::Red => "RED",
            Tracker::Ops => "OPS",
        }
    }

    /// The sibling tracker.
    pub fn reciprocal(&self) -> Tracker {
        match self {
            Tracker::Red => Tracker::Ops,
            Tracker::Ops => Tracker::Red,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reciprocity() {
        assert_eq!(Tracker::Red.reciprocal(), Tracker::Ops);
        assert_eq!(Tracker::Ops.reciprocal(), Tracker::Red);
        assert_eq!(Tracker::Red.reciprocal().reciprocal(), Tracker::Red);
    }

    #[test]
    fn test_creation_flags_end_with_empty() {
        for tracker in [Tracker::Red, Tracker::Ops] {
            let flags = tracker.source_flags_for_creation();
            assert_eq!(*flags.last().unwrap(), b"");
        }
    }

    #[test]
    fn test_search_flags_exclude_empty() {
        for tracker in [Tracker::Red, Tracker::Ops] {
            assert!(!tracker.source_flags_for_search().contains(&&b""[..]));
        }
    }
}
