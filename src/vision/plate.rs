//! Licence plate consensus
//!
//! Turns raw recognition candidates into at most one plate reading per region.
//! Plates follow a fixed national grammar: 2 letters (region), 1-2 digits
//! (sub-region), 0-3 letters (series) and 3-4 digits (serial), e.g. `TN38AB1234`.
//!
//! Candidates are scanned in engine order. The first one whose corrected text
//! matches the grammar wins outright; only when none does is the best-scoring
//! loosely plate-shaped candidate considered.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use crate::vision::TextCandidate;

/// Shortest text accepted as a plate
pub const MIN_PLATE_LEN: usize = 6;
/// Longest text accepted as a plate
pub const MAX_PLATE_LEN: usize = 12;

const PLATE_GRAMMAR: &str = r"^[A-Z]{2}[0-9]{1,2}[A-Z]{0,3}[0-9]{3,4}$";

fn plate_grammar() -> &'static Regex {
    static GRAMMAR: OnceLock<Regex> = OnceLock::new();
    GRAMMAR.get_or_init(|| Regex::new(PLATE_GRAMMAR).expect("plate grammar is a valid regex"))
}

/// A plate accepted from one region
#[derive(Debug, Clone, PartialEq)]
pub struct PlateReading {
    /// Normalized, corrected plate text
    pub text: String,
    /// Score of the candidate it came from
    pub score: f32,
    /// Whether the text passed the strict grammar
    pub strict: bool,
}

/// Letters commonly read where a digit belongs
fn letter_to_digit(c: char) -> Option<char> {
    match c {
        'O' | 'Q' => Some('0'),
        'I' => Some('1'),
        'J' => Some('3'),
        'A' => Some('4'),
        'G' => Some('6'),
        'S' => Some('5'),
        'B' => Some('8'),
        'Z' => Some('2'),
        _ => None,
    }
}

/// Digits commonly read where a letter belongs
fn digit_to_letter(c: char) -> Option<char> {
    match c {
        '0' => Some('O'),
        '1' => Some('I'),
        '3' => Some('J'),
        '4' => Some('A'),
        '6' => Some('G'),
        '5' => Some('S'),
        '8' => Some('B'),
        '2' => Some('Z'),
        _ => None,
    }
}

/// Uppercase and strip whitespace, hyphens and periods
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '.')
        .flat_map(char::to_uppercase)
        .collect()
}

/// Coerce each position toward the character class the grammar expects there.
///
/// Positions 0-1 become letters, 2-3 digits, the last four digits and anything
/// in between letters. Earlier rules take precedence on short strings.
pub fn format_license(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    chars
        .iter()
        .enumerate()
        .map(|(j, &c)| {
            let wants_digit = match j {
                0 | 1 => false,
                2 | 3 => true,
                _ if j + 4 >= len => true,
                _ => false,
            };
            let mapped = if wants_digit {
                letter_to_digit(c)
            } else {
                digit_to_letter(c)
            };
            mapped.unwrap_or(c)
        })
        .collect()
}

/// Strict grammar check on already corrected text
pub fn is_valid_plate(text: &str) -> bool {
    let text = normalize(text);
    let len = text.chars().count();
    if !(MIN_PLATE_LEN..=MAX_PLATE_LEN).contains(&len) {
        return false;
    }
    plate_grammar().is_match(&text)
}

/// Whether normalized text at least looks like a plate
fn is_plate_shaped(text: &str) -> bool {
    let len = text.chars().count();
    (MIN_PLATE_LEN..=MAX_PLATE_LEN).contains(&len) && text.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Selection policy over the candidates of one region
#[derive(Debug, Clone)]
pub struct PlatePolicy {
    /// Loose candidates must score strictly above this
    pub fallback_min_score: f32,
}

impl Default for PlatePolicy {
    fn default() -> Self {
        Self {
            fallback_min_score: 0.4,
        }
    }
}

impl PlatePolicy {
    pub fn new(fallback_min_score: f32) -> Self {
        Self { fallback_min_score }
    }

    /// Pick the plate for a region, if any candidate qualifies
    pub fn select(&self, candidates: &[TextCandidate]) -> Option<PlateReading> {
        let mut fallback: Option<PlateReading> = None;

        for candidate in candidates {
            if !candidate.score.is_finite() {
                debug!(text = %candidate.text, "skipping candidate without a usable score");
                continue;
            }
            let text = normalize(&candidate.text);
            let formatted = format_license(&text);

            if is_valid_plate(&formatted) {
                debug!(text = %formatted, score = candidate.score, "plate matched grammar");
                return Some(PlateReading {
                    text: formatted,
                    score: candidate.score,
                    strict: true,
                });
            }

            if is_plate_shaped(&text) {
                let best_score = fallback.as_ref().map(|f| f.score).unwrap_or(0.0);
                if candidate.score > best_score {
                    fallback = Some(PlateReading {
                        text: formatted,
                        score: candidate.score,
                        strict: false,
                    });
                }
            }
        }

        fallback.filter(|f| f.score > self.fallback_min_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(items: &[(&str, f32)]) -> Vec<TextCandidate> {
        items
            .iter()
            .map(|(text, score)| TextCandidate::new(*text, *score))
            .collect()
    }

    #[test]
    fn test_normalize_strips_separators() {
        assert_eq!(normalize("tn 38-ab.1234"), "TN38AB1234");
        assert_eq!(normalize("  ka\t01 "), "KA01");
    }

    #[test]
    fn test_canonical_plate_accepted_verbatim() {
        let reading = PlatePolicy::default()
            .select(&candidates(&[("TN38AB1234", 0.9)]))
            .unwrap();
        assert_eq!(reading.text, "TN38AB1234");
        assert!(reading.strict);
    }

    #[test]
    fn test_letter_in_serial_is_corrected() {
        assert_eq!(format_license("TN38ABI234"), "TN38AB1234");

        let reading = PlatePolicy::default()
            .select(&candidates(&[("TN38ABI234", 0.5)]))
            .unwrap();
        assert_eq!(reading.text, "TN38AB1234");
        assert!(reading.strict);
    }

    #[test]
    fn test_digits_in_region_code_are_corrected() {
        // 0 -> O and 1 -> I in the region, O -> 0 in the sub-region
        assert_eq!(format_license("01O8AB1234"), "OI08AB1234");
        // On an 8-character read the serial starts right after the sub-region
        assert_eq!(format_license("KA0IZ8S6"), "KA012856");
    }

    #[test]
    fn test_valid_grammar_shapes() {
        for plate in ["AB12CD1234", "AB12C1234", "TN38AB1234", "DL1C1234", "MH12ABC123"] {
            assert!(is_valid_plate(plate), "{plate} should be valid");
        }
    }

    #[test]
    fn test_length_outside_bounds_rejected_by_both_tiers() {
        let policy = PlatePolicy::default();
        for text in ["AB123", "A1", "AB12CDE12345678", "ABCDEFGHIJKLM"] {
            assert!(!is_valid_plate(&format_license(text)));
            assert!(policy.select(&candidates(&[(text, 0.99)])).is_none(), "{text}");
        }
    }

    #[test]
    fn test_correction_is_idempotent() {
        for text in [
            "TN38AB1234",
            "TN38ABI234",
            "0I3845ZZ",
            "AB12CD1234",
            "X7Y8Q9",
            "1234567890",
            "ABCDEFGHIJKL",
            "K",
            "",
        ] {
            let once = format_license(text);
            assert_eq!(format_license(&once), once, "not idempotent for {text}");
        }
    }

    #[test]
    fn test_first_grammar_match_wins_over_higher_score() {
        let reading = PlatePolicy::default()
            .select(&candidates(&[
                ("XX", 0.99),
                ("KA01AB1234", 0.45),
                ("TN38AB1234", 0.97),
            ]))
            .unwrap();
        assert_eq!(reading.text, "KA01AB1234");
        assert!((reading.score - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_fallback_keeps_best_loose_candidate() {
        // Neither matches the grammar once corrected (trailing letters survive)
        let reading = PlatePolicy::default()
            .select(&candidates(&[("ABCDEFXY", 0.5), ("HELLOWORLDX", 0.7)]))
            .unwrap();
        assert!(!reading.strict);
        assert!((reading.score - 0.7).abs() < 1e-6);
        assert_eq!(reading.text, format_license("HELLOWORLDX"));
    }

    #[test]
    fn test_fallback_requires_minimum_score() {
        let policy = PlatePolicy::default();
        assert!(policy.select(&candidates(&[("ABCDEFXY", 0.4)])).is_none());
        assert!(policy.select(&candidates(&[("ABCDEFXY", 0.41)])).is_some());
    }

    #[test]
    fn test_fallback_rejects_non_alphanumeric() {
        let policy = PlatePolicy::default();
        assert!(policy.select(&candidates(&[("ABC#EFXY", 0.9)])).is_none());
    }

    #[test]
    fn test_non_finite_scores_are_ignored() {
        let policy = PlatePolicy::default();
        assert!(policy.select(&candidates(&[("TN38AB1234", f32::NAN)])).is_none());
        assert!(policy.select(&candidates(&[("ABCDEFXY", f32::INFINITY)])).is_none());

        let reading = policy
            .select(&candidates(&[("TN38AB1234", f32::NAN), ("KA01AB1234", 0.6)]))
            .unwrap();
        assert_eq!(reading.text, "KA01AB1234");
    }

    #[test]
    fn test_no_candidates_yields_nothing() {
        assert!(PlatePolicy::default().select(&[]).is_none());
    }
}
