use encoding_rs::WINDOWS_1252;

/// Turn fetched feed bytes into text. Never fails: a line that is not valid UTF-8
/// is read as Windows-1252, which maps every byte.
pub fn decode_feed_bytes(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    let mut result = String::with_capacity(bytes.len());
    for (i, line) in bytes.split(|&b| b == b'\n').enumerate() {
        if i > 0 {
            result.push('\n');
        }
        match std::str::from_utf8(line) {
            Ok(s) => result.push_str(s),
            Err(_) => {
                let (cow, _, _) = WINDOWS_1252.decode(line);
                result.push_str(&cow);
            }
        }
    }
    result
}

/// Length of the prefix of `bytes` that ends with the last newline, or 0 if there is none.
pub fn complete_lines_len(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .rposition(|&b| b == b'\n')
        .map(|pos| pos + 1)
        .unwrap_or(0)
}
