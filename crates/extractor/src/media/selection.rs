//! Format ranking.
//!
//! Pure functions over a format list: no I/O and no hidden state, so the same
//! input always ranks the same way.

use std::cmp::Ordering;

use super::format::Format;

/// Order two formats best-first: higher preference, then higher quality.
fn compare_formats(a: &Format, b: &Format) -> Ordering {
    b.preference()
        .cmp(&a.preference())
        .then_with(|| b.quality().cmp(&a.quality()))
}

/// Return formats best-first. Equal formats keep their discovery order
/// because `sort_by` is stable.
pub fn sort_formats(formats: &[Format]) -> Vec<&Format> {
    let mut sorted: Vec<&Format> = formats.iter().collect();
    sorted.sort_by(|a, b| compare_formats(a, b));
    sorted
}

/// Pick the best format, if any.
pub fn select_best(formats: &[Format]) -> Option<&Format> {
    sort_formats(formats).first().copied()
}

/// Pick the lowest quality format. Ties go to the earliest discovered.
pub fn select_worst(formats: &[Format]) -> Option<&Format> {
    formats
        .iter()
        .enumerate()
        .min_by(|(ia, a), (ib, b)| a.quality().cmp(&b.quality()).then(ia.cmp(ib)))
        .map(|(_, format)| format)
}

/// Find a format by its id.
pub fn select_by_id<'a>(formats: &'a [Format], format_id: &str) -> Option<&'a Format> {
    formats.iter().find(|f| f.format_id() == format_id)
}
