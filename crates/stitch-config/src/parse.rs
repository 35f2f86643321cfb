use crate::OutputSize;

/// Parse a leading integer the way C `atoi` does: optional whitespace and
/// sign, then as many digits as are present. Garbage yields 0.
///
/// The flag reports whether the whole token was a well-formed integer.
pub fn parse_int_lenient(token: &str) -> (i64, bool) {
    let trimmed = token.trim_start();
    let bytes = trimmed.as_bytes();
    let mut idx = 0;
    let negative = match bytes.first() {
        Some(b'-') => {
            idx = 1;
            true
        }
        Some(b'+') => {
            idx = 1;
            false
        }
        _ => false,
    };
    let digits_start = idx;
    let mut value: i64 = 0;
    while let Some(b) = bytes.get(idx).filter(|b| b.is_ascii_digit()) {
        value = value.saturating_mul(10).saturating_add(i64::from(b - b'0'));
        idx += 1;
    }
    let had_digits = idx > digits_start;
    let clean = had_digits && trimmed[idx..].trim().is_empty();
    if !had_digits {
        return (0, false);
    }
    (if negative { -value } else { value }, clean)
}

/// `WIDTHxHEIGHT` with two positive integers.
pub fn parse_output_size(s: &str) -> Option<OutputSize> {
    let (w, h) = s.trim().split_once(['x', 'X'])?;
    let width: u32 = w.trim().parse().ok()?;
    let height: u32 = h.trim().parse().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some(OutputSize { width, height })
}

/// Hyphen separated frame numbers, e.g. `20-50-30`.
///
/// Malformed tokens become 0 and are returned alongside the parsed list.
pub fn parse_frame_indices(s: &str) -> (Vec<u64>, Vec<String>) {
    let mut indices = Vec::new();
    let mut malformed = Vec::new();
    if s.is_empty() {
        return (indices, malformed);
    }
    for token in s.split('-') {
        let (value, clean) = parse_int_lenient(token);
        if !clean {
            malformed.push(token.to_string());
        }
        indices.push(value.max(0) as u64);
    }
    (indices, malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_int() {
        assert_eq!(parse_int_lenient("42"), (42, true));
        assert_eq!(parse_int_lenient("  -7"), (-7, true));
        assert_eq!(parse_int_lenient("12abc"), (12, false));
        assert_eq!(parse_int_lenient("abc"), (0, false));
        assert_eq!(parse_int_lenient(""), (0, false));
        assert_eq!(parse_int_lenient("-"), (0, false));
    }

    #[test]
    fn test_output_size() {
        assert_eq!(
            parse_output_size("3840x1920"),
            Some(OutputSize {
                width: 3840,
                height: 1920
            })
        );
        assert_eq!(parse_output_size("0x960"), None);
        assert_eq!(parse_output_size("1920"), None);
        assert_eq!(parse_output_size("1920x960x2"), None);
        assert_eq!(parse_output_size("widexhigh"), None);
    }

    #[test]
    fn test_frame_indices() {
        let (indices, malformed) = parse_frame_indices("20-50-30");
        assert_eq!(indices, vec![20, 50, 30]);
        assert!(malformed.is_empty());

        let (indices, malformed) = parse_frame_indices("");
        assert!(indices.is_empty());
        assert!(malformed.is_empty());
    }

    // Malformed tokens export frame 0 instead of failing the build.
    #[test]
    fn test_frame_indices_malformed_token_becomes_zero() {
        let (indices, malformed) = parse_frame_indices("20-x-30");
        assert_eq!(indices, vec![20, 0, 30]);
        assert_eq!(malformed, vec!["x".to_string()]);

        let (indices, _) = parse_frame_indices("5--6");
        assert_eq!(indices, vec![5, 0, 6]);
    }
}
