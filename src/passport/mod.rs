//! Passport text parsing
//!
//! Turns the plain-text transcripts of the two OCR providers into a customer
//! record. Nothing in here performs I/O: every step is a pure function of the
//! transcripts, so the whole chain is deterministic and testable offline.

pub mod cjk_name;
pub mod mrz;
pub mod name_check;
pub mod reconcile;
pub mod syllable;

use chrono::NaiveDate;
use serde::Serialize;

/// Sex as printed in the MRZ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    /// Parse the MRZ sex marker (`M` / `F`)
    pub fn from_mrz(marker: &str) -> Option<Self> {
        match marker {
            "M" | "m" => Some(Self::Male),
            "F" | "f" => Some(Self::Female),
            _ => None,
        }
    }

    /// Infer sex from a Taiwanese national ID: the second character is 1
    /// for men and 2 for women.
    pub fn from_national_id(id: &str) -> Option<Self> {
        match id.chars().nth(1)? {
            '1' => Some(Self::Male),
            _ => Some(Self::Female),
        }
    }

    /// Label used in customer records
    pub fn label(&self) -> &'static str {
        match self {
            Self::Male => "男",
            Self::Female => "女",
        }
    }
}

/// A Latin-script name as it appears in the MRZ or the printed fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatinName {
    pub surname: String,
    /// Given names with hyphens between components (`LI-HUI`)
    pub given_hyphenated: Option<String>,
}

impl LatinName {
    pub fn new(surname: impl Into<String>, given_hyphenated: Option<String>) -> Self {
        Self {
            surname: surname.into(),
            given_hyphenated,
        }
    }

    /// Given names with the component separators removed (`LIHUI`)
    pub fn given_names(&self) -> Option<String> {
        self.given_hyphenated.as_ref().map(|g| g.replace('-', ""))
    }

    /// `SURNAME/GIVEN`, or the surname alone
    pub fn romanization(&self) -> String {
        match self.given_names() {
            Some(given) => format!("{}/{}", self.surname, given),
            None => self.surname.clone(),
        }
    }

    /// `SURNAME/GI-VEN`, keeping the syllable boundaries the MRZ encodes
    pub fn romanization_with_hyphens(&self) -> String {
        match &self.given_hyphenated {
            Some(given) => format!("{}/{}", self.surname, given),
            None => self.surname.clone(),
        }
    }

    /// `SURNAME GIVEN`
    pub fn display(&self) -> String {
        match self.given_names() {
            Some(given) => format!("{} {}", self.surname, given),
            None => self.surname.clone(),
        }
    }

    /// `SURNAME, GI-VEN`, the way the name is printed on the data page
    pub fn print_form(&self) -> String {
        match &self.given_hyphenated {
            Some(given) => format!("{}, {}", self.surname, given),
            None => self.surname.clone(),
        }
    }
}

/// Fields decoded from the machine-readable zone. Any of them may be missing
/// when the transcript is partial.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MrzFields {
    /// ICAO three-letter country code
    pub nationality: Option<String>,
    pub name: Option<LatinName>,
    /// Nine-digit passport number
    pub document_number: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<Sex>,
    pub expiry_date: Option<NaiveDate>,
    /// Taiwanese national ID from the optional data field
    pub national_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Low,
}

/// Where a name candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NameSource {
    Mrz,
    Cjk,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCandidate {
    pub text: String,
    pub confidence: Confidence,
    pub source: NameSource,
}

/// Customer data extracted from one passport image
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRecord {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub english_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passport_romanization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passport_name_print: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passport_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nationality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passport_expiry_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,
    pub phone: String,
    pub name_source: NameSource,
    pub name_confidence: Confidence,
}

/// Parse both transcripts of one passport image into a customer record.
///
/// `primary_text` is the MRZ-oriented transcript, `secondary_text` the
/// CJK-oriented one (absent when the CJK provider was not called).
pub fn parse_passport_text(
    primary_text: &str,
    secondary_text: Option<&str>,
    file_name: &str,
) -> CustomerRecord {
    let fields = mrz::decode(primary_text, secondary_text);

    let printed_name = if fields.name.is_none() {
        mrz::find_printed_name(primary_text)
    } else {
        None
    };

    let romanization = fields
        .name
        .as_ref()
        .or(printed_name.as_ref())
        .map(LatinName::romanization_with_hyphens);

    let candidate = cjk_name::extract(secondary_text, romanization.as_deref());

    reconcile::reconcile(&fields, printed_name.as_ref(), candidate.as_ref(), file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin_name_forms() {
        let name = LatinName::new("LIN", Some("LI-HUI".to_string()));
        assert_eq!(name.given_names().as_deref(), Some("LIHUI"));
        assert_eq!(name.romanization(), "LIN/LIHUI");
        assert_eq!(name.romanization_with_hyphens(), "LIN/LI-HUI");
        assert_eq!(name.display(), "LIN LIHUI");
        assert_eq!(name.print_form(), "LIN, LI-HUI");
    }

    #[test]
    fn test_surname_only_forms() {
        let name = LatinName::new("SUZUKI", None);
        assert_eq!(name.romanization(), "SUZUKI");
        assert_eq!(name.display(), "SUZUKI");
    }

    #[test]
    fn test_sex_from_national_id() {
        assert_eq!(Sex::from_national_id("A123456789"), Some(Sex::Male));
        assert_eq!(Sex::from_national_id("G220796971"), Some(Sex::Female));
        assert_eq!(Sex::from_national_id("G"), None);
        assert_eq!(Sex::Female.label(), "女");
    }

    #[test]
    fn test_parse_full_passport() {
        let mrz_text = "REPUBLIC OF CHINA\n\
                        P<TWNLIN<<LI<HUI<<<<<<<<<<<<<<<<<<<<<<<<<<<<\n\
                        3141148363TWN6012111F2610254G220796971<<<32";
        let cjk_text = "中華民國護照\n姓名 / Name\n林麗惠\nLIN, LI-HUI";

        let record = parse_passport_text(mrz_text, Some(cjk_text), "lin.jpg");

        assert_eq!(record.name, "林麗惠");
        assert_eq!(record.english_name.as_deref(), Some("LIN LIHUI"));
        assert_eq!(record.passport_romanization.as_deref(), Some("LIN/LIHUI"));
        assert_eq!(record.passport_number.as_deref(), Some("314114836"));
        assert_eq!(record.sex.as_deref(), Some("女"));
        assert_eq!(record.national_id.as_deref(), Some("G220796971"));
        assert_eq!(record.name_source, NameSource::Cjk);
        assert_eq!(record.name_confidence, Confidence::High);
    }

    #[test]
    fn test_parse_printed_name_without_mrz() {
        let record = parse_passport_text("PASSPORT\nCHEN, MEI-LING\n", None, "chen.png");
        assert_eq!(record.name, "CHEN MEILING");
        assert_eq!(record.passport_romanization.as_deref(), Some("CHEN/MEILING"));
        assert_eq!(record.name_source, NameSource::Fallback);
    }

    #[test]
    fn test_parse_nothing_recognized() {
        let record = parse_passport_text("", None, "scan_001.jpeg");
        assert_eq!(record.name, "scan_001");
        assert_eq!(record.passport_number, None);
    }
}
