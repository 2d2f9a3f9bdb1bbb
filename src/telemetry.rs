// src/telemetry.rs - Temperature telemetry line scanner
//
// Firmware reports look like `ok T:200.5 /210.0 B:59.0/60 @:127`, but real
// devices also emit boot banners, partial lines and encoding glitches, so the
// scanner tolerates arbitrary junk and extracts whatever valid tokens exist.

/// One zone reading extracted from a telemetry line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneReading {
    /// Single-letter zone code as reported by the firmware (`T`, `B`, ...).
    pub zone_code: char,
    pub actual: f64,
    /// Target setpoint, present only when the firmware reports `actual/target`.
    pub target: Option<f64>,
}

/// Extract all `<A-Z>:<float>[/<float>]` tokens from a raw line, in order.
///
/// Never fails: malformed tokens are skipped individually and a line with no
/// valid tokens yields an empty vector.
pub fn parse_line(raw: &str) -> Vec<ZoneReading> {
    let bytes = raw.as_bytes();
    let len = bytes.len();
    let mut readings = Vec::new();
    let mut pos = 0;

    while pos < len {
        if !(bytes[pos].is_ascii_uppercase() && pos + 1 < len && bytes[pos + 1] == b':') {
            pos += 1;
            continue;
        }
        let zone_code = bytes[pos] as char;
        let mut cursor = pos + 2;
        cursor = skip_spaces(bytes, cursor);

        let Some((actual, after_actual)) = scan_number(bytes, raw, cursor) else {
            // Truncated token like "T:" with no digits; move past the colon.
            pos += 2;
            continue;
        };
        cursor = after_actual;

        // Optional `/target` part, with spaces tolerated around the slash.
        let mut target = None;
        let mut lookahead = skip_spaces(bytes, cursor);
        if lookahead < len && bytes[lookahead] == b'/' {
            lookahead = skip_spaces(bytes, lookahead + 1);
            if let Some((value, after_target)) = scan_number(bytes, raw, lookahead) {
                target = Some(value);
                cursor = after_target;
            }
        }

        readings.push(ZoneReading { zone_code, actual, target });
        pos = cursor;
    }

    readings
}

fn skip_spaces(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos] == b' ' {
        pos += 1;
    }
    pos
}

/// Scan `-?digits[.digits]` starting at `pos`. Returns the parsed value and
/// the position just past it, or `None` when no digits are present or the
/// text does not parse as f64.
fn scan_number(bytes: &[u8], raw: &str, pos: usize) -> Option<(f64, usize)> {
    let len = bytes.len();
    let start = pos;
    let mut cursor = pos;
    if cursor < len && bytes[cursor] == b'-' {
        cursor += 1;
    }
    let digits_start = cursor;
    while cursor < len && bytes[cursor].is_ascii_digit() {
        cursor += 1;
    }
    if cursor == digits_start {
        return None;
    }
    if cursor < len && bytes[cursor] == b'.' {
        cursor += 1;
        while cursor < len && bytes[cursor].is_ascii_digit() {
            cursor += 1;
        }
    }
    let value = raw[start..cursor].parse::<f64>().ok()?;
    Some((value, cursor))
}
