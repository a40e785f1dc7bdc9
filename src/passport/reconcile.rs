//! Merge MRZ fields and the Chinese name candidate into a customer record

use super::{Confidence, CustomerRecord, LatinName, MrzFields, NameCandidate, NameSource};
use std::path::Path;

/// Build the customer record for one image.
///
/// The display name is chosen by fixed precedence:
/// 1. a high-confidence Chinese name, as is;
/// 2. a low-confidence Chinese name with the romanization appended in
///    parentheses, so the record is visibly marked for review;
/// 3. the MRZ romanization;
/// 4. a Latin name printed elsewhere on the page (`printed_name`);
/// 5. the file name without its extension.
pub fn reconcile(
    fields: &MrzFields,
    printed_name: Option<&LatinName>,
    candidate: Option<&NameCandidate>,
    file_name: &str,
) -> CustomerRecord {
    let latin = fields.name.as_ref().or(printed_name);
    let chosen = choose_name(fields.name.as_ref(), printed_name, candidate, file_name);

    CustomerRecord {
        name: chosen.text,
        english_name: latin.map(LatinName::display),
        passport_romanization: latin.map(LatinName::romanization),
        passport_name_print: latin.map(LatinName::print_form),
        passport_number: fields.document_number.clone(),
        nationality: fields.nationality.clone(),
        sex: fields.sex.map(|sex| sex.label().to_string()),
        date_of_birth: fields.birth_date,
        passport_expiry_date: fields.expiry_date,
        national_id: fields.national_id.clone(),
        phone: String::new(),
        name_source: chosen.source,
        name_confidence: chosen.confidence,
    }
}

fn choose_name(
    mrz_name: Option<&LatinName>,
    printed_name: Option<&LatinName>,
    candidate: Option<&NameCandidate>,
    file_name: &str,
) -> NameCandidate {
    let latin = mrz_name.or(printed_name);

    match (candidate, latin) {
        (Some(c), _) if c.confidence == Confidence::High => c.clone(),
        (Some(c), Some(latin)) => NameCandidate {
            text: format!("{}({})", c.text, latin.romanization()),
            confidence: Confidence::Low,
            source: NameSource::Cjk,
        },
        // Nothing to pair a doubtful candidate with; show it as recognized
        (Some(c), None) => c.clone(),
        (None, _) => {
            if let Some(name) = mrz_name {
                NameCandidate {
                    text: name.display(),
                    confidence: Confidence::High,
                    source: NameSource::Mrz,
                }
            } else if let Some(name) = printed_name {
                NameCandidate {
                    text: name.display(),
                    confidence: Confidence::Low,
                    source: NameSource::Fallback,
                }
            } else {
                NameCandidate {
                    text: file_stem(file_name),
                    confidence: Confidence::Low,
                    source: NameSource::Fallback,
                }
            }
        }
    }
}

fn file_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string())
}
