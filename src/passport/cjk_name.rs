//! Chinese name extraction from the CJK-oriented transcript
//!
//! The transcript is the whole data page as plain text, so the name has to
//! be told apart from field captions, the issuing authority and place names.
//! Three positional strategies are tried in order; the first that finds a
//! candidate wins.

use super::name_check;
use super::{Confidence, NameCandidate, NameSource};
use regex::Regex;
use std::sync::OnceLock;

/// Characters of context before the romanized surname searched for a name
const ROMANIZATION_WINDOW: usize = 50;

/// Index of the run picked by the frequency fallback when enough runs exist;
/// the first runs on a data page are usually headers.
const FREQUENCY_PICK: usize = 2;

/// Words printed on the data page that are never part of a personal name.
/// A candidate containing any of them is rejected.
const EXCLUDED_WORDS: &[&str] = &[
    "護照", "中華", "民國", "姓名", "國籍", "性別", "出生", "日期", "效期", "機關", "外交部",
    "台灣", "發照", "截止", "型式", "代碼", "持照", "簽名", "身分", "證號", "地址", "地點",
    "有效", "領事", "事務", "局長", "署長", "部長", "主任", "科長", "號碼", "編號", "頁碼",
    "登記", "註冊", "申請", "核發", "換發", "補發", "延期", "年月日", "出生地", "發照日",
    "截止日", "父", "母", "配偶", "役別", "住址", "臺北", "臺中", "臺南", "高雄", "新北",
    "桃園", "新竹", "嘉義", "彰化", "台北市", "新北市", "桃園市", "台中市", "台南市", "高雄市",
    "中國", "台北", "台中", "台南", "基隆", "宜蘭", "花蓮", "台東", "苗栗", "南投", "雲林",
    "屏東", "澎湖", "金門", "連江", "緊急", "聯絡", "聯絡人",
];

/// Characters that OCR tends to hallucinate into names; common function
/// words that almost never appear in a given name.
const ARTIFACT_CHARS: &[char] = &[
    '仔', '佬', '的', '是', '在', '了', '有', '個', '這', '那', '和', '與', '或', '為', '被', '把',
    '給', '讓', '著', '過',
];

fn cjk_run() -> &'static Regex {
    static CJK_RUN: OnceLock<Regex> = OnceLock::new();
    CJK_RUN.get_or_init(|| Regex::new(r"[\x{4e00}-\x{9fff}]{2,4}").unwrap())
}

fn standalone_cjk_line() -> &'static Regex {
    static STANDALONE: OnceLock<Regex> = OnceLock::new();
    STANDALONE.get_or_init(|| Regex::new(r"^[\x{4e00}-\x{9fff}]{2,4}$").unwrap())
}

fn name_label() -> &'static Regex {
    static NAME_LABEL: OnceLock<Regex> = OnceLock::new();
    NAME_LABEL.get_or_init(|| Regex::new(r"(?i)Name|姓名|Given names").unwrap())
}

fn printed_latin_name() -> &'static Regex {
    static LATIN_NAME: OnceLock<Regex> = OnceLock::new();
    LATIN_NAME.get_or_init(|| Regex::new(r"^[A-Z]+,\s*[A-Z-]+").unwrap())
}

/// Inputs shared by every extraction strategy
struct Context<'a> {
    text: &'a str,
    romanization: Option<&'a str>,
}

type Strategy = fn(&Context<'_>) -> Option<String>;

const STRATEGIES: &[(&str, Strategy)] = &[
    ("label", label_anchored),
    ("romanization", romanization_anchored),
    ("frequency", frequency_fallback),
];

/// Extract the most likely Chinese name from `cjk_text`.
///
/// `romanization` is the `SURNAME/GIVEN` form from the MRZ when known; it
/// anchors the second strategy and cross-checks the result's length.
pub fn extract(cjk_text: Option<&str>, romanization: Option<&str>) -> Option<NameCandidate> {
    let text = cjk_text.filter(|t| !t.trim().is_empty())?;
    let ctx = Context { text, romanization };

    let (strategy, name) = STRATEGIES
        .iter()
        .find_map(|(label, strategy)| strategy(&ctx).map(|name| (*label, name)))?;

    let confidence = assess(&name, romanization);
    tracing::debug!(
        "Chinese name candidate {} via {} strategy ({:?})",
        name,
        strategy,
        confidence
    );

    Some(NameCandidate {
        text: name,
        confidence,
        source: NameSource::Cjk,
    })
}

fn assess(name: &str, romanization: Option<&str>) -> Confidence {
    if name.chars().any(|c| ARTIFACT_CHARS.contains(&c)) {
        return Confidence::Low;
    }
    match romanization {
        Some(r) if !name_check::validate(name, r).valid => Confidence::Low,
        _ => Confidence::High,
    }
}

fn is_excluded(candidate: &str) -> bool {
    EXCLUDED_WORDS.iter().any(|word| candidate.contains(word))
}

/// The name printed on the line after the `Name` caption, or inline on the
/// `SURNAME, GIVEN` line if that comes first.
fn label_anchored(ctx: &Context<'_>) -> Option<String> {
    let mut after_label = false;

    for line in ctx.text.lines().map(str::trim) {
        if name_label().is_match(line) {
            after_label = true;
            continue;
        }
        if !after_label {
            continue;
        }

        if standalone_cjk_line().is_match(line) && !is_excluded(line) {
            return Some(line.to_string());
        }

        if printed_latin_name().is_match(line) {
            // Past the point where the Chinese name is printed
            return cjk_run()
                .find(line)
                .map(|m| m.as_str())
                .filter(|candidate| !is_excluded(candidate))
                .map(str::to_string);
        }
    }

    None
}

/// The last Chinese run shortly before the romanized surname.
fn romanization_anchored(ctx: &Context<'_>) -> Option<String> {
    let surname = ctx.romanization?.split('/').next()?.trim().to_ascii_uppercase();
    if surname.is_empty() {
        return None;
    }

    // ASCII uppercasing keeps byte offsets aligned with the original text
    let position = ctx.text.to_ascii_uppercase().find(&surname)?;
    let before = &ctx.text[..position];
    let window_start = before
        .char_indices()
        .rev()
        .nth(ROMANIZATION_WINDOW - 1)
        .map_or(0, |(i, _)| i);

    cjk_run()
        .find_iter(&before[window_start..])
        .map(|m| m.as_str())
        .filter(|candidate| !is_excluded(candidate))
        .last()
        .map(str::to_string)
}

/// Any plausible Chinese run, skipping the likely headers at the top.
fn frequency_fallback(ctx: &Context<'_>) -> Option<String> {
    let runs: Vec<&str> = cjk_run()
        .find_iter(ctx.text)
        .map(|m| m.as_str())
        .filter(|candidate| !is_excluded(candidate))
        .collect();

    let pick = if runs.len() > FREQUENCY_PICK {
        runs.get(FREQUENCY_PICK)
    } else {
        runs.first()
    };
    pick.map(|name| name.to_string())
}
