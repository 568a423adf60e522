//! Normalization of local file names into comparison keys.
//!
//! CRITICAL: the normalized form doubles as the search query sent to the
//! catalog, and as the left-hand side of every similarity comparison. It must
//! stay idempotent: `normalize(normalize(x)) == normalize(x)`.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

/// Extensions recognized as audio files by the listing provider.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "wav", "m4a", "ogg", "aac", "wma", "aiff", "opus", "alac",
];

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Matches a trailing audio extension: "Song.mp3", "Song.FLAC"
pub static FILE_EXTENSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\.(?:{})$", AUDIO_EXTENSIONS.join("|"))).unwrap()
});

/// "Artist - Title" separator
pub const ARTIST_TITLE_SEPARATOR: &str = " - ";

/// Punctuation and special characters dropped from names.
pub static SPECIAL_CHARACTERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[()\[\]{},.!?:;\-_+=/\\|<>@#$%^*~`]").unwrap());

/// Collapses whitespace runs into a single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Normalize a raw file name for searching and matching.
/// e.g., "Queen - Bohemian Rhapsody (Remastered).mp3" → "queen bohemian rhapsody remastered"
pub fn normalize(raw: &str) -> String {
    let result = FILE_EXTENSION.replace(raw, "");
    let result = result.replace(ARTIST_TITLE_SEPARATOR, " ");
    let result = SPECIAL_CHARACTERS.replace_all(&result, "").to_lowercase();
    MULTI_SPACE.replace_all(&result, " ").trim().to_string()
}

/// Check if a character is a Unicode combining mark (diacritical mark).
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF | 0xFE20..=0xFE2F)
}

/// Fold Unicode text to lowercase ASCII by applying NFKD decomposition and
/// removing combining marks, then transliterating what is left.
/// e.g., "Beyoncé" → "beyonce", "Björk" → "bjork"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

/// Whether a listed file name carries a recognized audio extension.
pub fn is_audio_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize("Queen - Bohemian Rhapsody.mp3"), "queen bohemian rhapsody");
        assert_eq!(normalize("AC_DC - Back In Black.flac"), "acdc back in black");
        assert_eq!(normalize("Song (feat. Someone) [Live].MP3"), "song feat someone live");
    }

    #[test]
    fn test_normalize_strips_only_known_extension() {
        assert_eq!(normalize("Mr. Brightside.mp3"), "mr brightside");
        assert_eq!(normalize("Track.txt"), "tracktxt");
        // Only one suffix is stripped; the inner dot is then dropped
        assert_eq!(normalize("Track.mp3.mp3"), "trackmp3");
    }

    #[test]
    fn test_normalize_collapses_separators() {
        assert_eq!(normalize("Artist  -  Title"), "artist title");
        assert_eq!(normalize("Artist - (Title)"), "artist title");
        assert_eq!(normalize("  Artist ( Title )  "), "artist title");
        assert_eq!(normalize("a-b"), "ab");
    }

    #[test]
    fn test_normalize_removes_full_special_set() {
        let all = "()[]{},.!?:;-_+=/\\|<>@#$%^*~`";
        assert_eq!(normalize(&format!("x{}y", all)), "xy");
        // Apostrophes and ampersands are kept
        assert_eq!(normalize("Don't Stop & Go"), "don't stop & go");
    }

    #[test]
    fn test_normalize_idempotent() {
        let inputs = [
            "Queen - Bohemian Rhapsody.mp3",
            "Track.mp3.mp3",
            "  A  -  B - C  .flac",
            "Beyoncé - Halo (Live).m4a",
            "",
            "---",
            "İstanbul - Şarkı.ogg",
            "x.MP3",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", input);
        }
    }

    #[test]
    fn test_fold_to_ascii() {
        assert_eq!(fold_to_ascii("Björk"), "bjork");
        assert_eq!(fold_to_ascii("Motörhead"), "motorhead");
        assert_eq!(fold_to_ascii("Beyoncé"), "beyonce");
    }

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file("song.mp3"));
        assert!(is_audio_file("song.FLAC"));
        assert!(!is_audio_file("cover.jpg"));
        assert!(!is_audio_file("mp3"));
        assert!(!is_audio_file("log.csv"));
    }
}
