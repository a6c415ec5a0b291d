//! Hex formatting for raw serial traffic in debug logs

use std::fmt::Write;

/// Encode bytes as space separated uppercase hex pairs
/// Example: [0x62, 0x62, 0x0A] -> "62 62 0A"
pub fn dump(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            result.push(' ');
        }
        // Writing to String buffer is infallible
        let _ = write!(&mut result, "{:02X}", byte);
    }
    result
}

/// Parse a hex string into bytes, ignoring whitespace and an optional `0x` prefix
///
/// Returns `None` on odd digit count or non-hex characters.
pub fn parse(text: &str) -> Option<Vec<u8>> {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: Vec<char> = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return None;
    }

    digits
        .chunks(2)
        .map(|pair| {
            let hi = pair[0].to_digit(16)?;
            let lo = pair[1].to_digit(16)?;
            Some((hi * 16 + lo) as u8)
        })
        .collect()
}
