//! Byte-pattern swap engine.
//!
//! Each rule value is encoded as the little-endian bytes of a 32-bit integer
//! (the hex digits of `%08X` read back in reverse byte groups). For every rule,
//! the last occurrence of each encoding is located independently and the two
//! 4-byte windows are exchanged. Rules run in order, each on the previous
//! rule's output.

use memchr::memmem;

use crate::{
    domain::{PatchResult, PatternSide, SwapRule},
    errors::Error,
    Result,
};

/// Width of a swap window.
pub const WINDOW: usize = 4;

/// Encode a rule value into its 4-byte search pattern.
pub fn encode_value(value: u64) -> Option<[u8; WINDOW]> {
    u32::try_from(value).ok().map(u32::to_le_bytes)
}

/// Canonical hex form of an encoded value, e.g. `100` -> `"64000000"`.
pub fn encoded_hex(value: u64) -> Option<String> {
    encode_value(value).map(|b| b.iter().map(|x| format!("{x:02X}")).collect())
}

/// Offset of the last occurrence of `needle` in `haystack`.
pub fn last_index_of(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    memmem::rfind(haystack, needle)
}

/// Encode every rule up front so configuration errors surface before any byte moves.
fn encode_rules(rules: &[SwapRule]) -> Result<Vec<([u8; WINDOW], [u8; WINDOW])>> {
    rules
        .iter()
        .enumerate()
        .map(|(rule_index, rule)| {
            let encode = |side: PatternSide| {
                let value = rule.value(side);
                encode_value(value).ok_or(Error::InvalidPattern { rule_index, value })
            };
            Ok((
                encode(PatternSide::Original)?,
                encode(PatternSide::Replacement)?,
            ))
        })
        .collect()
}

/// Apply `rules` to a copy of `input`.
///
/// Fails with [`Error::PatternNotFound`] on the first rule whose pattern is
/// missing from the current buffer; no partially patched buffer is returned.
pub fn patch(input: &[u8], rules: &[SwapRule]) -> Result<PatchResult> {
    let patterns = encode_rules(rules)?;
    let mut buf = input.to_vec();

    for (rule_index, (original, replacement)) in patterns.iter().enumerate() {
        let a = last_index_of(&buf, original).ok_or(Error::PatternNotFound {
            rule_index,
            which: PatternSide::Original,
        })?;
        let b = last_index_of(&buf, replacement).ok_or(Error::PatternNotFound {
            rule_index,
            which: PatternSide::Replacement,
        })?;
        swap_windows(&mut buf, a, b);
    }

    Ok(PatchResult {
        bytes: buf,
        applied: patterns.len(),
    })
}

/// Exchange the windows at `a` and `b` using the pre-swap contents of both.
///
/// Overlapping windows are allowed; the write into the `a` window lands last.
fn swap_windows(buf: &mut [u8], a: usize, b: usize) {
    if a == b {
        return;
    }
    let mut wa = [0u8; WINDOW];
    let mut wb = [0u8; WINDOW];
    wa.copy_from_slice(&buf[a..a + WINDOW]);
    wb.copy_from_slice(&buf[b..b + WINDOW]);
    buf[b..b + WINDOW].copy_from_slice(&wa);
    buf[a..a + WINDOW].copy_from_slice(&wb);
}
