//! Base62 digits for generated document ids.

const DIGITS: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Render `n` in base 62, most significant digit first. Zero renders as "0".
///
/// The digit order keeps ids of equal width sorting the same way as their
/// counters, which the padded generator in `id.rs` relies on.
pub fn encode_u64(n: u64) -> String {
    let mut digits = Vec::with_capacity(11);
    let mut rest = n;
    loop {
        digits.push(DIGITS[(rest % 62) as usize]);
        rest /= 62;
        if rest == 0 {
            break;
        }
    }
    digits.iter().rev().map(|&d| char::from(d)).collect()
}
