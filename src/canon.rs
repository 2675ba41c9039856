//! CIDR canonicalization: parse, deduplicate, collapse.
//!
//! Raw feed entries are turned into the minimal set of disjoint IPv4 blocks:
//! exact duplicates are dropped, adjacent blocks are merged into their
//! supernet, and blocks contained in another block are removed. The result is
//! ordered by network address, then prefix length.

use ipnet::Ipv4Net;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use thiserror::Error;

/// A canonical rule set: pairwise disjoint, non-mergeable IPv4 blocks.
///
/// `BTreeSet` gives set semantics plus a deterministic iteration order
/// (network address, then prefix length).
pub type CanonicalSet = BTreeSet<Ipv4Net>;

/// A feed entry that is not a valid IPv4 address or CIDR block.
///
/// Canonicalization is all-or-nothing: a single malformed entry aborts the
/// run rather than silently shrinking the allowlist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed IPv4 address or CIDR entry: {entry:?}")]
pub struct ParseError {
    pub entry: String,
}

/// Entry counts before and after collapsing, reported for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollapseStats {
    pub before: usize,
    pub after: usize,
}

impl CollapseStats {
    /// Percentage of entries eliminated by the collapse, if any were.
    pub fn reduction_percent(&self) -> Option<f64> {
        if self.before > self.after && self.before > 0 {
            Some((self.before - self.after) as f64 / self.before as f64 * 100.0)
        } else {
            None
        }
    }
}

/// Parse a single IP or CIDR string into its canonical network form.
///
/// Bare addresses become /32 blocks. Host bits are zeroed, so
/// `10.0.0.7/24` canonicalizes to `10.0.0.0/24`. IPv6 entries are rejected:
/// the feed layer separates address families before canonicalization, and
/// the two are never collapsed together.
pub fn parse_entry(entry: &str) -> Result<Ipv4Net, ParseError> {
    let trimmed = entry.trim();
    let net = if trimmed.contains('/') {
        trimmed.parse::<Ipv4Net>()
    } else {
        trimmed.parse::<Ipv4Addr>().map(Ipv4Net::from)
    };
    net.map(|n| n.trunc()).map_err(|_| ParseError {
        entry: entry.to_string(),
    })
}

/// Canonicalize a sequence of raw IP/CIDR strings.
///
/// Returns the canonical set together with before/after collapse counts.
/// An empty input yields an empty set, not an error.
pub fn canonicalize(entries: &[String]) -> Result<(CanonicalSet, CollapseStats), ParseError> {
    let mut parsed = Vec::with_capacity(entries.len());
    for entry in entries {
        parsed.push(parse_entry(entry)?);
    }
    let before = parsed.len();

    // Dedup first so aggregate works on unique blocks only.
    let unique: BTreeSet<Ipv4Net> = parsed.into_iter().collect();
    let nets: Vec<Ipv4Net> = unique.into_iter().collect();
    let set: CanonicalSet = Ipv4Net::aggregate(&nets).into_iter().collect();

    let stats = CollapseStats {
        before,
        after: set.len(),
    };
    Ok((set, stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(entries: &[&str]) -> (CanonicalSet, CollapseStats) {
        let owned: Vec<String> = entries.iter().map(|s| s.to_string()).collect();
        canonicalize(&owned).unwrap()
    }

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    #[test]
    fn test_adjacent_halves_merge() {
        let (set, stats) = canon(&["1.2.3.0/25", "1.2.3.128/25", "9.9.9.9/32"]);
        let expected: CanonicalSet = [net("1.2.3.0/24"), net("9.9.9.9/32")].into_iter().collect();
        assert_eq!(set, expected);
        assert_eq!(stats.before, 3);
        assert_eq!(stats.after, 2);
    }

    #[test]
    fn test_contained_block_dropped() {
        let (set, _) = canon(&["10.0.0.0/8", "10.1.2.0/24"]);
        let expected: CanonicalSet = [net("10.0.0.0/8")].into_iter().collect();
        assert_eq!(set, expected);
    }

    #[test]
    fn test_bare_ip_becomes_slash_32() {
        let (set, _) = canon(&["192.0.2.1"]);
        let expected: CanonicalSet = [net("192.0.2.1/32")].into_iter().collect();
        assert_eq!(set, expected);
    }

    #[test]
    fn test_host_bits_zeroed() {
        assert_eq!(parse_entry("10.0.0.7/24").unwrap(), net("10.0.0.0/24"));
    }

    #[test]
    fn test_duplicates_collapse_to_one() {
        let (set, stats) = canon(&["198.51.100.0/24", "198.51.100.0/24"]);
        assert_eq!(set.len(), 1);
        assert_eq!(stats.before, 2);
        assert_eq!(stats.after, 1);
    }

    #[test]
    fn test_empty_input_is_empty_set() {
        let (set, stats) = canon(&[]);
        assert!(set.is_empty());
        assert_eq!(stats.before, 0);
        assert_eq!(stats.after, 0);
    }

    #[test]
    fn test_lone_slash_32_stays_unmerged() {
        let (set, _) = canon(&["203.0.113.7/32", "203.0.113.9/32"]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_malformed_entry_names_offender() {
        let entries = vec!["1.2.3.0/24".to_string(), "not-a-cidr".to_string()];
        let err = canonicalize(&entries).unwrap_err();
        assert_eq!(err.entry, "not-a-cidr");
        assert!(err.to_string().contains("not-a-cidr"));
    }

    #[test]
    fn test_ipv6_entry_rejected() {
        assert!(parse_entry("2001:db8::/32").is_err());
        assert!(parse_entry("::1").is_err());
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        assert!(parse_entry("1.2.3.0/33").is_err());
        assert!(parse_entry("1.2.3/24").is_err());
    }

    #[test]
    fn test_idempotent_on_canonical_input() {
        let (first, _) = canon(&["1.2.3.0/25", "1.2.3.128/25", "10.0.0.0/8"]);
        let entries: Vec<String> = first.iter().map(|n| n.to_string()).collect();
        let (second, stats) = canonicalize(&entries).unwrap();
        assert_eq!(first, second);
        assert_eq!(stats.before, stats.after);
    }

    #[test]
    fn test_order_independent() {
        let (forward, _) = canon(&["1.2.3.128/25", "9.9.9.9", "1.2.3.0/25"]);
        let (reverse, _) = canon(&["1.2.3.0/25", "1.2.3.128/25", "9.9.9.9"]);
        assert_eq!(forward, reverse);
    }

    #[test]
    fn test_reduction_percent() {
        let stats = CollapseStats {
            before: 10,
            after: 5,
        };
        assert_eq!(stats.reduction_percent(), Some(50.0));

        let unchanged = CollapseStats {
            before: 5,
            after: 5,
        };
        assert_eq!(unchanged.reduction_percent(), None);

        let empty = CollapseStats {
            before: 0,
            after: 0,
        };
        assert_eq!(empty.reduction_percent(), None);
    }
}
