//! Order-preserving tuple keys.
//!
//! Every record lives under a string key built from a tuple of segments.
//! The encoding keeps tuple order under plain string comparison, so a
//! `[start, end)` range scan over encoded keys is a range scan over tuples.
//!
//! ```text
//! ("v1", "notes", "update", 42)  →  "v1"#"notes"#"update"#0000000042
//! ("v1_sv", "notes")             →  "v1_sv"#"notes"
//! ```
//!
//! String segments are quoted. Inside the quotes, every character up to and
//! including `$` is escaped as `$` followed by `'@' + c`, so the closing quote
//! sorts below any content character and no encoded string is a prefix of
//! another. Integer segments are zero-padded to the width of the clock
//! ceiling, which keeps them fixed-width and sorting after strings.

use crate::error::{StoreError, StoreResult};

/// Position of an update in a document's log.
pub type Clock = u32;

/// Exclusive upper bound of every update range scan.
pub const CLOCK_CEILING: Clock = u32::MAX;

/// Decimal digits needed to render [`CLOCK_CEILING`].
pub const CLOCK_WIDTH: usize = 10;

/// Namespace of update-log records.
pub const UPDATE_NAMESPACE: &str = "v1";
/// Namespace of cached state-vector records.
pub const STATE_VECTOR_NAMESPACE: &str = "v1_sv";
const UPDATE_TAG: &str = "update";

const DELIMITER: char = '#';
const QUOTE: char = '"';
const ESCAPE: char = '$';
const ESCAPE_OFFSET: u32 = '@' as u32;

/// One component of a storage key.
///
/// Ordering is derived: strings sort before integers at the same position,
/// which is what the encoding produces (`"` < `0`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    Str(String),
    Int(Clock),
}

impl From<&str> for Segment {
    fn from(s: &str) -> Self {
        Segment::Str(s.to_string())
    }
}

impl From<String> for Segment {
    fn from(s: String) -> Self {
        Segment::Str(s)
    }
}

impl From<Clock> for Segment {
    fn from(n: Clock) -> Self {
        Segment::Int(n)
    }
}

/// Encode a tuple into its order-preserving string form.
pub fn encode(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push(DELIMITER);
        }
        match segment {
            Segment::Str(s) => {
                out.push(QUOTE);
                for c in s.chars() {
                    if c <= ESCAPE {
                        out.push(ESCAPE);
                        // c <= '$', so the shifted value stays in ASCII
                        out.push(char::from_u32(c as u32 + ESCAPE_OFFSET).unwrap_or(ESCAPE));
                    } else {
                        out.push(c);
                    }
                }
                out.push(QUOTE);
            }
            Segment::Int(n) => {
                out.push_str(&format!("{n:0width$}", width = CLOCK_WIDTH));
            }
        }
    }
    out
}

/// Decode a key produced by [`encode`].
pub fn decode(key: &str) -> StoreResult<Vec<Segment>> {
    let corrupt = || StoreError::CorruptKey(key.to_string());
    let mut segments = Vec::new();
    let mut chars = key.chars().peekable();

    while chars.peek().is_some() {
        if !segments.is_empty() && chars.next() != Some(DELIMITER) {
            return Err(corrupt());
        }

        if chars.peek() == Some(&QUOTE) {
            chars.next();
            let mut value = String::new();
            loop {
                match chars.next() {
                    Some(QUOTE) => break,
                    Some(ESCAPE) => {
                        let escaped = chars.next().ok_or_else(corrupt)?;
                        let original = (escaped as u32)
                            .checked_sub(ESCAPE_OFFSET)
                            .and_then(char::from_u32)
                            .filter(|c| *c <= ESCAPE)
                            .ok_or_else(corrupt)?;
                        value.push(original);
                    }
                    Some(c) if c > ESCAPE => value.push(c),
                    _ => return Err(corrupt()),
                }
            }
            segments.push(Segment::Str(value));
        } else {
            let digits: String = chars.by_ref().take(CLOCK_WIDTH).collect();
            if digits.len() != CLOCK_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(corrupt());
            }
            let n = digits.parse::<Clock>().map_err(|_| corrupt())?;
            segments.push(Segment::Int(n));
        }
    }

    Ok(segments)
}

/// The `[start, end)` range holding every key that extends `prefix`.
pub fn prefix_range(prefix: &[Segment]) -> (String, String) {
    if prefix.is_empty() {
        return (String::new(), char::MAX.to_string());
    }
    let encoded = encode(prefix);
    // '$' is the character right after the delimiter.
    (format!("{encoded}{DELIMITER}"), format!("{encoded}$"))
}

/// Key of the update stored at `clock` for `name`.
pub fn update_key(name: &str, clock: Clock) -> String {
    encode(&[
        UPDATE_NAMESPACE.into(),
        name.into(),
        UPDATE_TAG.into(),
        clock.into(),
    ])
}

/// Key range of the updates for `name` with `from <= clock < to`.
pub fn update_range(name: &str, from: Clock, to: Clock) -> (String, String) {
    (update_key(name, from), update_key(name, to))
}

/// Extract the clock from an update key.
pub fn parse_update_clock(key: &str) -> StoreResult<Clock> {
    match decode(key)?.as_slice() {
        [Segment::Str(ns), Segment::Str(_), Segment::Str(tag), Segment::Int(clock)]
            if ns == UPDATE_NAMESPACE && tag == UPDATE_TAG =>
        {
            Ok(*clock)
        }
        _ => Err(StoreError::CorruptKey(key.to_string())),
    }
}

/// Key of the cached state vector for `name`.
pub fn state_vector_key(name: &str) -> String {
    encode(&[STATE_VECTOR_NAMESPACE.into(), name.into()])
}

/// Key range covering every state-vector record.
pub fn state_vector_range() -> (String, String) {
    prefix_range(&[STATE_VECTOR_NAMESPACE.into()])
}

/// Extract the document name from a state-vector key.
pub fn parse_state_vector_name(key: &str) -> StoreResult<String> {
    match decode(key)?.as_slice() {
        [Segment::Str(ns), Segment::Str(name)] if ns == STATE_VECTOR_NAMESPACE => {
            Ok(name.clone())
        }
        _ => Err(StoreError::CorruptKey(key.to_string())),
    }
}
