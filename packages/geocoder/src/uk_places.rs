//! Offline table of UK towns and cities.
//!
//! Consulted only after every remote geocoder has failed, so a search for
//! a well-known place still lands somewhere sensible when postcodes.io,
//! Google and Nominatim are unreachable.

use planning_pulse_search_models::Coordinates;

/// Town centre coordinates, keyed by lowercase name.
pub static UK_PLACES: &[(&str, Coordinates)] = &[
    ("london", Coordinates::new(51.5074, -0.1278)),
    ("westminster", Coordinates::new(51.4975, -0.1357)),
    ("camden", Coordinates::new(51.5290, -0.1255)),
    ("hackney", Coordinates::new(51.5450, -0.0553)),
    ("islington", Coordinates::new(51.5362, -0.1033)),
    ("greenwich", Coordinates::new(51.4826, -0.0077)),
    ("croydon", Coordinates::new(51.3762, -0.0982)),
    ("birmingham", Coordinates::new(52.4862, -1.8904)),
    ("manchester", Coordinates::new(53.4808, -2.2426)),
    ("liverpool", Coordinates::new(53.4084, -2.9916)),
    ("leeds", Coordinates::new(53.8008, -1.5491)),
    ("sheffield", Coordinates::new(53.3811, -1.4701)),
    ("bristol", Coordinates::new(51.4545, -2.5879)),
    ("newcastle upon tyne", Coordinates::new(54.9783, -1.6178)),
    ("newcastle", Coordinates::new(54.9783, -1.6178)),
    ("nottingham", Coordinates::new(52.9548, -1.1581)),
    ("leicester", Coordinates::new(52.6369, -1.1398)),
    ("coventry", Coordinates::new(52.4068, -1.5197)),
    ("bradford", Coordinates::new(53.7960, -1.7594)),
    ("southampton", Coordinates::new(50.9097, -1.4044)),
    ("portsmouth", Coordinates::new(50.8198, -1.0880)),
    ("brighton", Coordinates::new(50.8225, -0.1372)),
    ("plymouth", Coordinates::new(50.3755, -4.1427)),
    ("reading", Coordinates::new(51.4543, -0.9781)),
    ("oxford", Coordinates::new(51.7520, -1.2577)),
    ("cambridge", Coordinates::new(52.2053, 0.1218)),
    ("norwich", Coordinates::new(52.6309, 1.2974)),
    ("york", Coordinates::new(53.9600, -1.0873)),
    ("hull", Coordinates::new(53.7676, -0.3274)),
    ("stoke-on-trent", Coordinates::new(53.0027, -2.1794)),
    ("derby", Coordinates::new(52.9225, -1.4746)),
    ("exeter", Coordinates::new(50.7184, -3.5339)),
    ("bath", Coordinates::new(51.3758, -2.3599)),
    ("milton keynes", Coordinates::new(52.0406, -0.7594)),
    ("cardiff", Coordinates::new(51.4816, -3.1791)),
    ("swansea", Coordinates::new(51.6214, -3.9436)),
    ("edinburgh", Coordinates::new(55.9533, -3.1883)),
    ("glasgow", Coordinates::new(55.8642, -4.2518)),
    ("aberdeen", Coordinates::new(57.1497, -2.0943)),
    ("dundee", Coordinates::new(56.4620, -2.9707)),
    ("belfast", Coordinates::new(54.5973, -5.9301)),
];

/// City used when nothing else matches.
pub const DEFAULT_PLACE: &str = "london";

/// Finds a place by exact name, then by whole-word match in either
/// direction.
///
/// Names are compared word by word, splitting on anything that is not a
/// letter or digit, so "Solihull" does not match Hull. Matches prefer the
/// longest table name whose words appear in the term
/// (`"flats in Newcastle upon Tyne"` → Newcastle upon Tyne). Otherwise a
/// table name may start with the term at a word boundary, which needs a
/// term of at least four characters (`"Edinbur"` → Edinburgh).
#[must_use]
pub fn lookup(term: &str) -> Option<(&'static str, Coordinates)> {
    let needle = term.trim().to_lowercase();
    let needle_words = words(&needle);
    if needle_words.is_empty() {
        return None;
    }

    if let Some(&(name, coords)) = UK_PLACES.iter().find(|(name, _)| *name == needle) {
        return Some((name, coords));
    }

    let contained = UK_PLACES
        .iter()
        .filter(|(name, _)| contains_words(&needle_words, &words(name)))
        .max_by_key(|(name, _)| name.len());
    if let Some(&(name, coords)) = contained {
        return Some((name, coords));
    }

    if needle.chars().count() < 4 {
        return None;
    }
    UK_PLACES
        .iter()
        .find(|(name, _)| starts_at_word(&words(name), &needle_words))
        .map(|&(name, coords)| (name, coords))
}

fn words(s: &str) -> Vec<&str> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Whether `needle` appears as consecutive whole words in `haystack`.
fn contains_words(haystack: &[&str], needle: &[&str]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|window| window == needle)
}

/// Whether `name` has a run of words equal to `needle`, the last needle
/// word only needing to be a prefix.
fn starts_at_word(name: &[&str], needle: &[&str]) -> bool {
    let Some((last, leading)) = needle.split_last() else {
        return false;
    };
    name.windows(needle.len()).any(|window| {
        window[..leading.len()] == *leading && window[leading.len()].starts_with(*last)
    })
}
