use log::debug;

/// Canonical zero timestamp, used as the fallback for empty or absent input.
pub const ZERO_TIMESTAMP: &str = "00:00:00.000";

/// Normalize an arbitrary timestamp-like string into `HH:MM:SS.mmm`.
///
/// Models emit timestamps in many shapes: raw seconds (`"123.456"`),
/// `MM:SS`, `MM:SS.mmm`, `HH:MM:SS`, even `HH:MM:SS:mmm`. This function is
/// total (it never fails) and idempotent: feeding a canonical string back in
/// returns it unchanged.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ZERO_TIMESTAMP.to_string();
    }

    // A bare decimal number with no colon is a raw seconds count.
    if is_bare_seconds(trimmed) {
        if let Ok(seconds) = trimmed.parse::<f64>() {
            return from_total_millis((seconds * 1000.0).round() as u64);
        }
    }

    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ':' || *c == '.')
        .collect();

    let components: Vec<&str> = cleaned
        .split([':', '.'])
        .filter(|part| !part.is_empty())
        .collect();

    if components.is_empty() {
        debug!("No timestamp components in {raw:?}, falling back to zero");
        return ZERO_TIMESTAMP.to_string();
    }

    let (hours, minutes, seconds, millis) = match components.len() {
        // HH:MM:SS:mmm (or more; extras ignored)
        n if n >= 4 => (components[0], components[1], components[2], components[3]),
        // Three components are ambiguous: MM:SS.mmm vs HH:MM:SS. A 3-digit
        // last component means milliseconds.
        3 => {
            if components[2].len() == 3 {
                ("0", components[0], components[1], components[2])
            } else {
                (components[0], components[1], components[2], "0")
            }
        }
        2 => ("0", components[0], components[1], "0"),
        _ => ("0", "0", components[0], "0"),
    };

    format!(
        "{}:{}:{}.{}",
        pad_clock(hours),
        pad_clock(minutes),
        pad_clock(seconds),
        pad_millis(millis)
    )
}

fn is_bare_seconds(input: &str) -> bool {
    !input.contains(':')
        && input.chars().any(|c| c.is_ascii_digit())
        && input.chars().all(|c| c.is_ascii_digit() || c == '.')
        && input.matches('.').count() <= 1
}

fn from_total_millis(total: u64) -> String {
    let millis = total % 1000;
    let seconds = (total / 1000) % 60;
    let minutes = (total / 60_000) % 60;
    let hours = total / 3_600_000;
    format!("{hours:02}:{minutes:02}:{seconds:02}.{millis:03}")
}

/// Left-zero-pad to two digits, keeping the first two characters.
fn pad_clock(field: &str) -> String {
    let padded = format!("{field:0>2}");
    padded[..2].to_string()
}

/// Right-zero-pad to three digits, keeping the first three characters.
fn pad_millis(field: &str) -> String {
    let padded = format!("{field:0<3}");
    padded[..3].to_string()
}
