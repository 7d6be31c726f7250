//! Normalization of scraped and catalog artist/title strings.
//!
//! Radio tracklists are typed by hand: featured artists, remixers, edit names
//! and dedications all end up inside the artist or title field. Everything here
//! reduces those strings to comparable lowercase ASCII keys.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Version annotations stripped from titles before comparison (applied in order).
pub static TITLE_NOISE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // "- Remastered 2011", "(2011 Remaster)"
        Regex::new(r"(?i)\s*[-–—/]\s*(?:\d{4}\s+)?(?:digital\s+)?remaster(?:ed)?(?:\s+\d{4})?\s*$").unwrap(),
        Regex::new(r"(?i)\s*[\(\[](?:\d{4}\s+)?(?:digital\s+)?remaster(?:ed)?(?:\s+(?:version|\d{4}))?[\)\]]").unwrap(),
        // "(feat. X)", "[ft. Y]"
        Regex::new(r"(?i)\s*[\(\[](?:feat\.?|ft\.?|featuring)\s+[^)\]]+[\)\]]").unwrap(),
        // "Song feat. X" without brackets
        Regex::new(r"(?i)\s+(?:feat\.?|ft\.?|featuring)\s+.+$").unwrap(),
        // "- Single Version", "- LP Version", "- Radio Edit", "- Original Mix"
        Regex::new(r#"(?i)\s*[-–—]\s*(?:single|lp|album|radio|7["']?|12["']?)\s+(?:version|edit|mix)\s*$"#).unwrap(),
        Regex::new(r"(?i)\s*[-–—]\s*original\s+mix\s*$").unwrap(),
        // "(Mono)", "[Stereo]", "(Bonus Track)"
        Regex::new(r"(?i)\s*[\(\[](?:mono|stereo|bonus(?:\s+track)?|explicit|clean)[\)\]]").unwrap(),
    ]
});

/// Matches track number prefixes like "03 - ", "Track 5 - ", "01. "
pub static TRACK_NUMBER_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:track\s*)?\d{1,3}\s*[-–—.]\s+").unwrap());

/// Any bracketed segment: "(Dedicated To Bill Evans)", "[Presence Radio Edit]"
pub static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*[\(\[][^\)\]]*[\)\]]").unwrap());

/// Trailing dash subtitle: "Song - Presence Remix"
pub static DASH_SUBTITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+[-–—]\s+.+$").unwrap());

/// Featured artist tail inside an artist field: "A, ft. B, C" / "A feat. B"
pub static FEATURING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:^|,?\s+)(?:feat\.?|ft\.?|featuring)\s+(.+)$").unwrap());

/// Remixer segment inside an artist field: "(A & B Remix)"
pub static REMIXER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(\s*([^)]+?)\s+(?:remix|rework|edit|dub|version)\s*\)").unwrap());

/// Multi-artist separator: &, /, ",", +, x, vs, and, with
pub static ARTIST_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*(?:[&/,•+×;]|\s(?:x|vs\.?|and|with)\s)\s*").unwrap()
});

/// Live/remix/demo markers distinguishing a variant from the original recording.
pub static VARIANT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\blive\b").unwrap(),
        Regex::new(r"(?i)\bremix(?:ed)?\b").unwrap(),
        Regex::new(r"(?i)\brework\b").unwrap(),
        Regex::new(r"(?i)\bdub\b").unwrap(),
        Regex::new(r"(?i)\bdemo\b").unwrap(),
        Regex::new(r"(?i)\bacoustic\b").unwrap(),
        Regex::new(r"(?i)\binstrumental\b").unwrap(),
        Regex::new(r"(?i)\bkaraoke\b").unwrap(),
        Regex::new(r"(?i)\bcover\b").unwrap(),
    ]
});

/// Regex to collapse multiple whitespace into single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());

/// Numbers and roman numerals inside a title key: "pattern 3", "quadrant dub ii"
pub static NUMBERING_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d+|x{0,3}(?:ix|iv|v?i{1,3}|v)|x{1,3})$").unwrap());

/// Everything that is not a letter, digit or space after ASCII folding.
pub static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9 ]+").unwrap());

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Unicode combining marks (accents left over after NFKD).
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF | 0xFE20..=0xFE2F)
}

/// Fold Unicode text to lowercase ASCII.
/// e.g., "Björk" → "bjork", "Sébastien Tellier" → "sebastien tellier"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

/// Straighten curly quotes and spell out ampersands.
pub fn normalize_punctuation(s: &str) -> String {
    let result = s
        .replace(['\u{2018}', '\u{2019}', '\u{00B4}', '\u{0060}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2013}', '\u{2014}'], "-")
        .replace(" & ", " and ");
    MULTI_SPACE.replace_all(&result, " ").to_string()
}

/// Reduce folded text to space-separated words.
fn to_key(s: &str) -> String {
    let folded = fold_to_ascii(s).replace('\'', "");
    let words = NON_WORD.replace_all(&folded, " ");
    words.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Normalize a title for matching, keeping subtitles that identify the work.
/// Strips track numbers, remaster tags, featured credits and release-format edits.
pub fn normalize_title(title: &str) -> String {
    let mut result = normalize_punctuation(title);
    result = TRACK_NUMBER_PREFIX.replace(&result, "").to_string();

    for pattern in TITLE_NOISE_PATTERNS.iter() {
        result = pattern.replace_all(&result, "").to_string();
    }

    let mut key = to_key(&result);
    if key.starts_with("the ") && key.len() > 6 {
        key = key[4..].to_string();
    }
    key
}

/// Title with every parenthetical and dash subtitle removed.
/// e.g., "September Fifteenth (Dedicated To Bill Evans)" → "september fifteenth"
///       "Ready - Presence Radio Edit" → "ready"
pub fn core_title(title: &str) -> String {
    let punct = normalize_punctuation(title);
    let without_number = TRACK_NUMBER_PREFIX.replace(&punct, "");
    let without_parens = PARENTHETICAL.replace_all(&without_number, "");
    let without_dash = DASH_SUBTITLE.replace(&without_parens, "");

    let core = normalize_title(&without_dash);
    if core.is_empty() {
        // Title was nothing but a parenthetical, e.g. "(Untitled)"
        normalize_title(title)
    } else {
        core
    }
}

/// Normalize a single artist name.
/// Strips "The" prefix/suffix and folds to ASCII.
pub fn normalize_artist(artist: &str) -> String {
    let mut key = to_key(&normalize_punctuation(artist));

    if key.starts_with("the ") {
        key = key[4..].to_string();
    }
    if let Some(stripped) = key.strip_suffix(" the") {
        // "Scorpions, The" folds to "scorpions the"
        key = stripped.to_string();
    }
    key
}

/// Artist field split into its roles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtistCredits {
    pub primary: Vec<String>,
    pub featured: Vec<String>,
    pub remixers: Vec<String>,
}

impl ArtistCredits {
    /// Primary and featured artists, normalized. Remixers are not performers.
    pub fn performers(&self) -> impl Iterator<Item = &String> {
        self.primary.iter().chain(self.featured.iter())
    }
}

fn split_names(s: &str) -> Vec<String> {
    ARTIST_SEPARATOR
        .split(s)
        .map(normalize_artist)
        .filter(|a| !a.is_empty())
        .collect()
}

/// Split a composed artist field into primary, featured and remixing artists.
///
/// Handles the scraper's "A, B, ft. C, D, (E Remix)" shape as well as catalog
/// strings like "A & B feat. C".
pub fn split_artists(artist: &str) -> ArtistCredits {
    let mut credits = ArtistCredits::default();
    let mut rest = normalize_punctuation(artist);

    for caps in REMIXER.captures_iter(&rest.clone()) {
        credits.remixers.extend(split_names(&caps[1]));
    }
    rest = REMIXER.replace_all(&rest, "").to_string();

    // Featured credits run to the end of the field.
    if let Some(caps) = FEATURING.captures(&rest.clone()) {
        credits.featured = split_names(&caps[1]);
        if let Some(m) = caps.get(0) {
            rest.truncate(m.start());
        }
    }

    credits.primary = split_names(&rest);

    // Names like "Hall and Oates" would be split by the separator; keep the
    // whole field as an extra primary alias so exact duo names still match.
    let whole = normalize_artist(&rest);
    if credits.primary.len() > 1 && !whole.is_empty() && !credits.primary.contains(&whole) {
        credits.primary.push(whole);
    }
    credits
}

/// First listed artist in display form (for composing queries).
pub fn primary_artist_display(artist: &str) -> String {
    let cleaned = REMIXER.replace_all(artist, "");
    let head = match FEATURING.find(&cleaned) {
        Some(m) => &cleaned[..m.start()],
        None => &cleaned[..],
    };
    head.split(',').next().unwrap_or("").trim().to_string()
}

/// Title in display form with brackets removed (for composing queries).
pub fn title_display(title: &str) -> String {
    let without = PARENTHETICAL.replace_all(title, "");
    let trimmed = MULTI_SPACE.replace_all(without.trim(), " ").to_string();
    if trimmed.is_empty() {
        title.trim().to_string()
    } else {
        trimmed
    }
}

/// Numbering tokens of a title key, in order.
/// e.g., "1 1" → ["1", "1"], "quadrant dub ii" → ["ii"]
pub fn numbering(key: &str) -> Vec<&str> {
    key.split_whitespace().filter(|t| NUMBERING_TOKEN.is_match(t)).collect()
}

pub fn has_variant_marker(text: &str) -> bool {
    VARIANT_PATTERNS.iter().any(|p| p.is_match(text))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title_basic() {
        assert_eq!(normalize_title("03 - Song Name"), "song name");
        assert_eq!(normalize_title("Track (2021 Remaster)"), "track");
        assert_eq!(normalize_title("Hit - Single Version"), "hit");
        assert_eq!(normalize_title("Song feat. Someone"), "song");
    }

    #[test]
    fn test_normalize_title_keeps_work_subtitle() {
        assert_eq!(
            normalize_title("September Fifteenth (Dedicated To Bill Evans)"),
            "september fifteenth dedicated to bill evans"
        );
    }

    #[test]
    fn test_core_title() {
        assert_eq!(core_title("September Fifteenth (Dedicated To Bill Evans)"), "september fifteenth");
        assert_eq!(core_title("Ready (Presence Radio Edit)"), "ready");
        assert_eq!(core_title("Ready - Presence Remix"), "ready");
        assert_eq!(core_title("(Untitled)"), "untitled");
    }

    #[test]
    fn test_normalize_artist_basic() {
        assert_eq!(normalize_artist("The Beatles"), "beatles");
        assert_eq!(normalize_artist("Scorpions, The"), "scorpions");
        assert_eq!(normalize_artist("Björk"), "bjork");
    }

    #[test]
    fn test_fold_to_ascii() {
        assert_eq!(fold_to_ascii("Motörhead"), "motorhead");
        assert_eq!(fold_to_ascii("Beyoncé"), "beyonce");
    }

    #[test]
    fn test_normalize_punctuation() {
        assert_eq!(normalize_punctuation("Can\u{2019}t Stop"), "Can't Stop");
        assert_eq!(normalize_punctuation("Rock & Roll"), "Rock and Roll");
    }

    #[test]
    fn test_split_artists_scraper_shape() {
        let credits = split_artists("Charles Webster, ft. Thandi Draai, (Presence Remix)");
        assert_eq!(credits.primary, vec!["charles webster"]);
        assert_eq!(credits.featured, vec!["thandi draai"]);
        assert_eq!(credits.remixers, vec!["presence"]);
    }

    #[test]
    fn test_split_artists_multiple_primary() {
        let credits = split_artists("Alice Coltrane, Pharoah Sanders");
        assert!(credits.primary.contains(&"alice coltrane".to_string()));
        assert!(credits.primary.contains(&"pharoah sanders".to_string()));
        assert!(credits.featured.is_empty());
    }

    #[test]
    fn test_split_artists_keeps_duo_alias() {
        let credits = split_artists("Hall & Oates");
        assert!(credits.primary.contains(&"hall".to_string()));
        assert!(credits.primary.contains(&"hall and oates".to_string()));
    }

    #[test]
    fn test_split_artists_catalog_shape() {
        let credits = split_artists("Drake feat. Rihanna");
        assert_eq!(credits.primary, vec!["drake"]);
        assert_eq!(credits.featured, vec!["rihanna"]);
    }

    #[test]
    fn test_primary_artist_display() {
        assert_eq!(
            primary_artist_display("Charles Webster, ft. Thandi Draai, (Presence Remix)"),
            "Charles Webster"
        );
        assert_eq!(primary_artist_display("Pat Metheny"), "Pat Metheny");
    }

    #[test]
    fn test_title_display() {
        assert_eq!(title_display("Ready (Presence Radio Edit)"), "Ready");
        assert_eq!(title_display("(Untitled)"), "(Untitled)");
    }

    #[test]
    fn test_numbering() {
        assert_eq!(numbering(&core_title("Pattern 3")), vec!["3"]);
        assert_eq!(numbering(&core_title("1/1")), vec!["1", "1"]);
        assert_eq!(numbering(&core_title("Quadrant Dub II")), vec!["ii"]);
        assert_eq!(numbering("xiv vi ix x"), vec!["xiv", "vi", "ix", "x"]);
        assert!(numbering("september fifteenth").is_empty());
        assert!(numbering("vixen mix").is_empty());
    }

    #[test]
    fn test_variant_marker() {
        assert!(has_variant_marker("Ready (Presence Remix)"));
        assert!(has_variant_marker("So What - Live"));
        assert!(!has_variant_marker("September Fifteenth"));
    }
}
