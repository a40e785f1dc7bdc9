//! TD3 machine-readable zone decoding
//!
//! OCR engines hand back the MRZ mixed in with the rest of the page, in any
//! line order and with arbitrary whitespace, so decoding works on a
//! whitespace-stripped transcript and searches for each line independently.
//! When line 2 cannot be matched as a whole, individual fields are mined
//! from the raw text instead.

use super::{LatinName, MrzFields, Sex};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

fn line1_pattern() -> &'static Regex {
    static LINE1: OnceLock<Regex> = OnceLock::new();
    LINE1.get_or_init(|| Regex::new(r"P<([A-Z]{3})([A-Z<]+)").unwrap())
}

/// Line 1 with the filler after the document code misread as `I`
fn line1_relaxed_pattern() -> &'static Regex {
    static LINE1_RELAXED: OnceLock<Regex> = OnceLock::new();
    LINE1_RELAXED.get_or_init(|| Regex::new(r"P[<I]([A-Z]{3})([A-Z<]+)").unwrap())
}

fn line2_pattern() -> &'static Regex {
    static LINE2: OnceLock<Regex> = OnceLock::new();
    LINE2.get_or_init(|| {
        Regex::new(r"(\d{9})(\d)([A-Z]{3})(\d{6})(\d)([MF])(\d{6})(\d)([A-Z0-9<]+)").unwrap()
    })
}

fn twn_national_id_pattern() -> &'static Regex {
    static TWN_ID: OnceLock<Regex> = OnceLock::new();
    TWN_ID.get_or_init(|| Regex::new(r"[A-Z]\d{9}").unwrap())
}

fn bare_document_number_pattern() -> &'static Regex {
    static DOC_NUMBER: OnceLock<Regex> = OnceLock::new();
    DOC_NUMBER.get_or_init(|| Regex::new(r"\d{9}").unwrap())
}

fn bare_national_id_pattern() -> &'static Regex {
    static NATIONAL_ID: OnceLock<Regex> = OnceLock::new();
    NATIONAL_ID.get_or_init(|| Regex::new(r"(?i)[A-Z][12]\d{8}").unwrap())
}

fn printed_date_pattern() -> &'static Regex {
    static PRINTED_DATE: OnceLock<Regex> = OnceLock::new();
    PRINTED_DATE.get_or_init(|| {
        Regex::new(r"(?i)(\d{1,2})\s*(JAN|FEB|MAR|APR|MAY|JUN|JUL|AUG|SEP|OCT|NOV|DEC)\s*(\d{4})")
            .unwrap()
    })
}

fn printed_name_pattern() -> &'static Regex {
    static PRINTED_NAME: OnceLock<Regex> = OnceLock::new();
    PRINTED_NAME.get_or_init(|| Regex::new(r"(?i)^([A-Z]{2,}),\s*([A-Z][A-Z-]+)$").unwrap())
}

fn name_label_pattern() -> &'static Regex {
    static NAME_LABEL: OnceLock<Regex> = OnceLock::new();
    NAME_LABEL.get_or_init(|| Regex::new(r"(?i)name|surname|given").unwrap())
}

/// Printed dates before this year are taken as birth dates
const LATEST_PRINTED_BIRTH_YEAR: i32 = 2010;
/// Printed dates from this year on are taken as expiry dates
const EARLIEST_PRINTED_EXPIRY_YEAR: i32 = 2020;

/// Fields read from MRZ line 2
#[derive(Debug, Clone, Default, PartialEq)]
struct Line2 {
    document_number: String,
    nationality: String,
    birth_date: Option<NaiveDate>,
    sex: Option<Sex>,
    expiry_date: Option<NaiveDate>,
    optional_data: String,
}

/// Decode MRZ fields from the MRZ-oriented transcript, falling back to the
/// CJK-oriented transcript for line 1.
pub fn decode(primary_text: &str, secondary_text: Option<&str>) -> MrzFields {
    let primary = strip_whitespace(primary_text);
    let secondary = secondary_text.map(strip_whitespace);

    let mut fields = MrzFields::default();

    let texts: Vec<&str> = [Some(primary.as_str()), secondary.as_deref()]
        .into_iter()
        .flatten()
        .collect();

    // An exact `P<` in either transcript beats a relaxed `PI` match, which
    // would otherwise fire on words such as PINGTUNG in the printed fields.
    let line1 = [line1_pattern(), line1_relaxed_pattern()]
        .into_iter()
        .find_map(|pattern| texts.iter().find_map(|text| parse_line1(pattern, text)));

    if let Some((nationality, name)) = line1 {
        tracing::debug!("MRZ line 1 decoded: {} {:?}", nationality, name);
        fields.nationality = Some(nationality);
        fields.name = Some(name);
    }

    match parse_line2(&primary) {
        Some(line2) => {
            tracing::debug!("MRZ line 2 decoded: document {}", line2.document_number);
            apply_line2(&mut fields, line2);
        }
        None => {
            tracing::debug!("MRZ line 2 not found, mining fields from raw text");
            apply_fallback(&mut fields, &primary, primary_text);
        }
    }

    fields
}

/// Resolve a two-digit MRZ year: above 50 is 19xx, otherwise 20xx.
pub fn resolve_year(yy: u32) -> i32 {
    if yy > 50 {
        1900 + yy as i32
    } else {
        2000 + yy as i32
    }
}

/// Parse an MRZ `YYMMDD` date. Returns `None` for impossible calendar dates.
pub fn parse_mrz_date(yymmdd: &str) -> Option<NaiveDate> {
    if yymmdd.len() != 6 || !yymmdd.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let yy: u32 = yymmdd[0..2].parse().ok()?;
    let mm: u32 = yymmdd[2..4].parse().ok()?;
    let dd: u32 = yymmdd[4..6].parse().ok()?;
    NaiveDate::from_ymd_opt(resolve_year(yy), mm, dd)
}

/// Find a printed `SURNAME, GIVEN-NAMES` line in a transcript.
///
/// Label lines (anything mentioning name/surname/given) are skipped so the
/// field caption is never mistaken for the value.
pub fn find_printed_name(text: &str) -> Option<LatinName> {
    text.lines()
        .map(str::trim)
        .filter(|line| !name_label_pattern().is_match(line))
        .find_map(|line| {
            let caps = printed_name_pattern().captures(line)?;
            Some(LatinName::new(
                caps[1].to_uppercase(),
                Some(caps[2].to_uppercase()),
            ))
        })
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn parse_line1(pattern: &Regex, text: &str) -> Option<(String, LatinName)> {
    let caps = pattern.captures(text)?;
    let nationality = caps[1].to_string();
    let payload = &caps[2];

    let mut parts = payload.split("<<");
    let surname = parts.next().unwrap_or_default().replace('<', "");
    let given = parts
        .next()
        .map(|given| given.replace('<', "-").trim_end_matches('-').to_string())
        .filter(|given| !given.is_empty());

    if surname.is_empty() {
        return None;
    }

    Some((nationality, LatinName::new(surname, given)))
}

fn parse_line2(text: &str) -> Option<Line2> {
    let caps = line2_pattern().captures(text)?;
    Some(Line2 {
        document_number: caps[1].to_string(),
        nationality: caps[3].to_string(),
        birth_date: parse_mrz_date(&caps[4]),
        sex: Sex::from_mrz(&caps[6]),
        expiry_date: parse_mrz_date(&caps[7]),
        optional_data: caps[9].to_string(),
    })
}

fn apply_line2(fields: &mut MrzFields, line2: Line2) {
    fields.document_number = Some(line2.document_number);
    if fields.nationality.is_none() {
        fields.nationality = Some(line2.nationality);
    }
    fields.birth_date = line2.birth_date;
    fields.sex = line2.sex;
    fields.expiry_date = line2.expiry_date;

    if fields.nationality.as_deref() == Some("TWN") {
        let optional = line2.optional_data.replace('<', "");
        fields.national_id = twn_national_id_pattern()
            .find(&optional)
            .map(|m| m.as_str().to_string());
    }
}

/// Fill unset fields from loose patterns anywhere in the transcript.
fn apply_fallback(fields: &mut MrzFields, stripped: &str, raw: &str) {
    if fields.document_number.is_none() {
        fields.document_number = bare_document_number_pattern()
            .find(stripped)
            .map(|m| m.as_str().to_string());
    }

    if fields.national_id.is_none() {
        if let Some(m) = bare_national_id_pattern().find(stripped) {
            let id = m.as_str().to_uppercase();
            if fields.sex.is_none() {
                fields.sex = Sex::from_national_id(&id);
            }
            fields.national_id = Some(id);
        }
    }

    for caps in printed_date_pattern().captures_iter(raw) {
        let Some(date) = parse_printed_date(&caps[1], &caps[2], &caps[3]) else {
            continue;
        };
        let year = date.year();
        if year >= EARLIEST_PRINTED_EXPIRY_YEAR && fields.expiry_date.is_none() {
            fields.expiry_date = Some(date);
        } else if year < LATEST_PRINTED_BIRTH_YEAR && fields.birth_date.is_none() {
            fields.birth_date = Some(date);
        }
    }
}

fn parse_printed_date(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    let month = match month.to_uppercase().as_str() {
        "JAN" => 1,
        "FEB" => 2,
        "MAR" => 3,
        "APR" => 4,
        "MAY" => 5,
        "JUN" => 6,
        "JUL" => 7,
        "AUG" => 8,
        "SEP" => 9,
        "OCT" => 10,
        "NOV" => 11,
        "DEC" => 12,
        _ => return None,
    };
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, day.parse().ok()?)
}
