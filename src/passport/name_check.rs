//! Cross-check a recognized Chinese name against the MRZ romanization

use super::syllable::count_syllables;

/// Outcome of comparing a Chinese name with its passport romanization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameCheck {
    pub valid: bool,
    /// Syllables found in the romanization; 0 when there was nothing to check
    pub expected_length: usize,
}

impl NameCheck {
    fn skipped() -> Self {
        Self {
            valid: true,
            expected_length: 0,
        }
    }
}

/// Compare `chinese_name` with a `SURNAME/GIVEN[-GIVEN]` romanization.
///
/// Every romanized syllable should correspond to one Chinese character, so
/// a name with fewer characters than syllables has lost characters to OCR.
/// More characters than syllables is accepted. A romanization that is not
/// exactly two `/`-separated parts gives no signal and the name passes.
pub fn validate(chinese_name: &str, romanization: &str) -> NameCheck {
    if chinese_name.is_empty() || romanization.is_empty() {
        return NameCheck::skipped();
    }

    let upper = romanization.to_uppercase();
    let parts: Vec<&str> = upper.split('/').collect();
    let [surname, given] = parts.as_slice() else {
        return NameCheck::skipped();
    };

    let expected_length = count_syllables(surname) + count_syllables(given);
    let actual = chinese_name.chars().count();

    NameCheck {
        valid: actual >= expected_length,
        expected_length,
    }
}
