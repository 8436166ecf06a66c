//! Identity-key normalization.
//!
//! The three sources disagree on feature-artist folding, trailing remix
//! qualifiers and multi-artist ordering, so a track is identified by a small
//! set of normalized forms rather than one canonical string. Two tracks are
//! the same identity if any form of one equals any form of the other.
//!
//! Everything here is pure: no I/O, no locale-dependent behavior.

use std::sync::LazyLock;

use itertools::Itertools;
use regex::Regex;
use shared::track::TrackRef;

static RE_WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static RE_PAREN_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[(\[][^)\]]*[)\]]\s*$").unwrap());
static RE_ARTIST_JOIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:feat\.?|ft\.?|featuring|with|and|x|vs\.?)\s+|\s*[,&+]\s*").unwrap()
});

/// The ordered, deduplicated set of normalized forms for one
/// (artist, title) pair, most specific first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySet {
    primary: String,
    forms: Vec<String>,
}

impl KeySet {
    /// The case-folded form, stable across literal casing differences.
    /// Accumulator maps and queue entries are keyed by this.
    pub fn primary(&self) -> &str {
        &self.primary
    }

    pub fn forms(&self) -> &[String] {
        &self.forms
    }

    /// Same identity iff the form sets intersect.
    pub fn matches(&self, other: &KeySet) -> bool {
        self.forms
            .iter()
            .any(|f| other.forms.iter().any(|g| f == g))
    }
}

fn squash(s: &str) -> String {
    RE_WS.replace_all(s.trim(), " ").into_owned()
}

fn strip_qualifier(title: &str) -> String {
    let stripped = RE_PAREN_SUFFIX.replace(title, "");
    let stripped = stripped.trim();
    // A title that is nothing but a qualifier keeps its literal form.
    if stripped.is_empty() {
        title.trim().to_string()
    } else {
        stripped.to_string()
    }
}

fn fold_artists(artist: &str) -> String {
    let mut names: Vec<String> = RE_ARTIST_JOIN
        .split(artist)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        return artist.to_string();
    }
    names.sort();
    names.join(", ")
}

fn form(artist: &str, title: &str) -> String {
    format!("{artist}|{title}")
}

/// Derive the identity forms for an (artist, title) pair, most specific to
/// most general: literal, case-folded, qualifier-stripped, and the deep form
/// (feature credits split, artist names sorted, qualifier stripped).
///
/// Always non-empty, even for empty inputs.
pub fn normalize(artist: &str, title: &str) -> KeySet {
    let artist = squash(artist);
    let title = squash(title);

    let literal = form(&artist, &title);
    let folded = literal.to_lowercase();

    let artist_lc = artist.to_lowercase();
    let title_lc = title.to_lowercase();
    let stripped = form(&artist_lc, &strip_qualifier(&title_lc));
    let deep = form(&fold_artists(&artist_lc), &strip_qualifier(&title_lc));

    let forms = [literal, folded.clone(), stripped, deep]
        .into_iter()
        .unique()
        .collect();

    KeySet {
        primary: folded,
        forms,
    }
}

pub fn normalize_ref(track: &TrackRef) -> KeySet {
    normalize(&track.artist, &track.title)
}

pub fn identity_matches(a: &TrackRef, b: &TrackRef) -> bool {
    normalize_ref(a).matches(&normalize_ref(b))
}
