//! Success-pattern matching and error classification for response lines.
//!
//! Matching is plain substring containment against the most recently read
//! line. For multi-alternative patterns the alternatives are tried in
//! declared order and the first hit is reported, so callers can tell which
//! form the module answered with (`Done` vs a downlink-bearing `PORT`
//! line, for instance).
//!
//! Classification is independent of matching: any line carrying the
//! case-insensitive marker `error` fails the command outright, even when
//! it also contains the configured success substring (`+RESET: ERROR`
//! structurally matches `+RESET:` but is still a failure).

use crate::command::ResponsePattern;

/// Test `line` against `pattern`, returning the first alternative that is
/// a substring of it.
pub fn match_line<'p>(line: &[u8], pattern: &'p ResponsePattern) -> Option<&'p str> {
    let text = String::from_utf8_lossy(line);
    pattern
        .alternatives()
        .iter()
        .find(|alt| text.contains(alt.as_str()))
        .map(String::as_str)
}

/// True when `line` carries the module's error marker, case-insensitive.
pub fn contains_error_marker(line: &[u8]) -> bool {
    line.windows(ERROR_MARKER.len())
        .any(|window| window.eq_ignore_ascii_case(ERROR_MARKER))
}

const ERROR_MARKER: &[u8] = b"error";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_pattern_substring_match() {
        let pattern = ResponsePattern::Single("+AT: OK".into());
        assert_eq!(match_line(b"+AT: OK", &pattern), Some("+AT: OK"));
        assert_eq!(match_line(b"noise +AT: OK trailing", &pattern), Some("+AT: OK"));
        assert_eq!(match_line(b"+AT: FAIL", &pattern), None);
    }

    #[test]
    fn test_alternatives_tried_in_declared_order() {
        let pattern =
            ResponsePattern::AnyOf(vec!["+MSG: Done".into(), "+MSG: PORT".into()]);
        assert_eq!(
            match_line(b"+MSG: PORT: 5; RX: \"AB\"", &pattern),
            Some("+MSG: PORT")
        );
        assert_eq!(match_line(b"+MSG: Done", &pattern), Some("+MSG: Done"));
        assert_eq!(match_line(b"+MSG: RXWIN1", &pattern), None);
    }

    #[test]
    fn test_first_alternative_wins_when_both_present() {
        let pattern = ResponsePattern::AnyOf(vec!["Done".into(), "PORT".into()]);
        assert_eq!(match_line(b"+MSG: PORT Done", &pattern), Some("Done"));
    }

    #[test]
    fn test_error_marker_is_case_insensitive() {
        assert!(contains_error_marker(b"+JOIN: ERROR"));
        assert!(contains_error_marker(b"+join: error(-1)"));
        assert!(contains_error_marker(b"+LW: Error"));
        assert!(!contains_error_marker(b"+JOIN: Done"));
        assert!(!contains_error_marker(b"+ERR: -12"));
    }
}
