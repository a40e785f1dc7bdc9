//! Phonetic syllable counting for romanized Chinese names
//!
//! Used only as a proxy for how many characters a Chinese name should have,
//! so it favours being total and predictable over being linguistically exact.

use regex::Regex;
use std::sync::OnceLock;

/// Longest dictionary entry, in characters
const MAX_SYLLABLE_LEN: usize = 6;
/// Shortest dictionary entry, in characters
const MIN_SYLLABLE_LEN: usize = 2;

/// Syllables common in Taiwanese passport romanization (Wade-Giles, Tongyong
/// and Hanyu pinyin spellings mixed).
const SYLLABLES: &[&str] = &[
    "YING", "YANG", "WANG", "WONG", "CHANG", "ZHANG", "CHUNG", "ZHONG", "CHUANG", "ZHUANG",
    "CHIANG", "JIANG", "CHIEN", "JIAN", "CHIEH", "JIE", "CHIAO", "JIAO", "CHING", "JING",
    "CHENG", "ZHENG", "CHEN", "ZHEN", "HUANG", "HSIANG", "XIANG", "HSIAO", "XIAO", "HSIEH",
    "XIE", "HSIUNG", "XIONG", "KUANG", "GUANG", "KUAN", "GUAN", "KWANG", "LIANG", "LING",
    "LUNG", "LONG", "SHENG", "SHANG", "SHUANG", "SHUI", "TSUNG", "TSENG", "TZENG", "TSAI",
    "TZAI", "YUAN", "YUEN", "WEN", "WAN", "WEI", "WAI", "YEN", "YAN", "YAO", "YIN", "YOU",
    "YUN", "YUE", "CHU", "CHA", "CHE", "CHI", "CHO", "SHU", "SHA", "SHE", "SHI", "SHO", "ZHU",
    "ZHA", "ZHE", "ZHI", "ZHO", "ANG", "ENG", "ING", "ONG", "UNG", "HUA", "HUI", "HAO", "HOU",
    "HAN", "HEN", "HUN", "KAI", "KEI", "KUI", "KAN", "KEN", "KUN", "KAO", "KOU", "GAI", "GEI",
    "GUI", "GAN", "GEN", "GUN", "GAO", "GOU", "LAI", "LEI", "LUI", "LAN", "LEN", "LUN", "LAO",
    "LOU", "LIN", "LIU", "MAI", "MEI", "MAN", "MEN", "MIN", "MOU", "NAI", "NEI", "NAN", "NEN",
    "NIN", "NOU", "PAI", "PEI", "PAN", "PEN", "PIN", "POU", "TAI", "TEI", "TAN", "TEN", "TIN",
    "TOU", "TUN", "DAI", "DEI", "DAN", "DEN", "DIN", "DOU", "DUN", "SAI", "SAN", "SEN", "SIN",
    "SOU", "SUN", "ZAI", "ZAN", "ZEN", "ZIN", "ZOU", "ZUN", "CAI", "CAN", "CEN", "CIN", "COU",
    "CUN", "FAN", "FEN", "FOU", "FUN", "RAN", "REN", "ROU", "RUN", "RUI", "AN", "EN", "AI",
    "EI", "AO", "OU", "YA", "YE", "YI", "YO", "YU", "WA", "WO", "WU", "BA", "BI", "BO", "BU",
    "BE", "PA", "PI", "PO", "PU", "PE", "MA", "MI", "MO", "MU", "ME", "FA", "FI", "FO", "FU",
    "FE", "DA", "DI", "DO", "DU", "DE", "TA", "TI", "TO", "TU", "TE", "NA", "NI", "NO", "NU",
    "NE", "LA", "LI", "LO", "LU", "LE", "GA", "GI", "GO", "GU", "GE", "KA", "KI", "KO", "KU",
    "KE", "HA", "HI", "HO", "HU", "HE", "JA", "JI", "JO", "JU", "JE", "QA", "QI", "QO", "QU",
    "QE", "XA", "XI", "XO", "XU", "XE", "ZA", "ZI", "ZO", "ZU", "ZE", "CA", "CI", "CO", "CU",
    "CE", "SA", "SI", "SO", "SU", "SE", "RA", "RI", "RO", "RU", "RE",
];

fn vowel_group() -> &'static Regex {
    static VOWEL_GROUP: OnceLock<Regex> = OnceLock::new();
    VOWEL_GROUP.get_or_init(|| Regex::new(r"^[^AEIOU]*[AEIOU]+[NG]*").unwrap())
}

fn is_known_syllable(candidate: &str) -> bool {
    SYLLABLES.contains(&candidate)
}

/// Count the phonetic syllables in a romanized name part.
///
/// A hyphen is treated as an authoritative boundary (`WEN-YU` is two
/// syllables). Otherwise the longest dictionary syllable prefixing the
/// remainder is consumed repeatedly; when nothing in the dictionary fits,
/// everything up to and including the next vowel group (plus any trailing
/// `N`/`G`) counts as one syllable. Never returns less than 1.
pub fn count_syllables(s: &str) -> usize {
    let s = s.to_uppercase();

    if s.contains('-') {
        let parts = s.split('-').filter(|part| !part.is_empty()).count();
        return parts.max(1);
    }

    let mut count = 0;
    let mut remaining = s.as_str();

    while !remaining.is_empty() {
        if let Some(len) = longest_syllable_prefix(remaining) {
            count += 1;
            remaining = &remaining[len..];
            continue;
        }

        match vowel_group().find(remaining) {
            Some(m) if !m.is_empty() => {
                count += 1;
                remaining = &remaining[m.end()..];
            }
            _ => {
                // No vowel left: the rest is one (consonant-only) syllable
                count += 1;
                break;
            }
        }
    }

    count.max(1)
}

/// Byte length of the longest dictionary syllable that prefixes `s`.
fn longest_syllable_prefix(s: &str) -> Option<usize> {
    let upper = MAX_SYLLABLE_LEN.min(s.chars().count());
    (MIN_SYLLABLE_LEN..=upper).rev().find_map(|chars| {
        let end = s.char_indices().nth(chars).map_or(s.len(), |(i, _)| i);
        is_known_syllable(&s[..end]).then_some(end)
    })
}
