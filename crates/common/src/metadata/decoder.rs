//! Abstract reconstruction from an inverted index
//!
//! OpenAlex ships abstracts as `{"word": [positions...]}`. Rebuilding the text
//! means placing every word at each of its positions and reading the
//! positions back in ascending order.
//!
//! Two behaviors are kept as observed upstream and not verified against the
//! service's own guarantees:
//! - a position claimed by several words goes to the last one written
//!   ([`resolve_positions`]);
//! - positions that nobody claims are skipped, so a sparse index joins the
//!   surrounding words directly.

use serde_json::Value;
use std::collections::BTreeMap;

/// Returned when there is nothing to decode
pub const UNAVAILABLE: &str = "N/A";

/// Place each `(word, positions)` pair into an ordered position map.
///
/// Conflict policy: last write wins. Pairs are applied in iteration order, so
/// the caller decides which word is "later".
pub fn resolve_positions<'a, I, P>(pairs: I) -> BTreeMap<u32, &'a str>
where
    I: IntoIterator<Item = (&'a str, P)>,
    P: IntoIterator<Item = u32>,
{
    let mut by_position = BTreeMap::new();
    for (word, positions) in pairs {
        for position in positions {
            by_position.insert(position, word);
        }
    }
    by_position
}

/// Decode explicit pairs; empty input yields [`UNAVAILABLE`]
pub fn decode_pairs<'a, I, P>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, P)>,
    P: IntoIterator<Item = u32>,
{
    let by_position = resolve_positions(pairs);
    if by_position.is_empty() {
        return UNAVAILABLE.to_string();
    }
    by_position.into_values().collect::<Vec<_>>().join(" ")
}

/// Decode the `abstract_inverted_index` field of a work.
///
/// Words are applied in `serde_json::Map` iteration order (ascending key
/// order). Absent, empty or malformed input yields [`UNAVAILABLE`].
pub fn decode_inverted_index(index: Option<&Value>) -> String {
    let Some(Value::Object(map)) = index else {
        return UNAVAILABLE.to_string();
    };

    let mut pairs: Vec<(&str, Vec<u32>)> = Vec::with_capacity(map.len());
    for (word, positions) in map {
        let Some(positions) = positions.as_array() else {
            return UNAVAILABLE.to_string();
        };
        let mut parsed = Vec::with_capacity(positions.len());
        for position in positions {
            match position.as_u64().and_then(|p| u32::try_from(p).ok()) {
                Some(p) => parsed.push(p),
                None => return UNAVAILABLE.to_string(),
            }
        }
        pairs.push((word.as_str(), parsed));
    }

    decode_pairs(pairs)
}
