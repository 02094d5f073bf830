//! Path segment sanitizer
//!
//! Turns arbitrary artist/album/file names into filesystem-safe, length
//! bounded path segments: best-effort transliteration to ASCII, spaces to
//! underscores, a fixed character whitelist and truncation that keeps the
//! file extension.

use unicode_normalization::UnicodeNormalization;

/// Maximum length of a sanitized segment
pub const SANITIZE_MAXLEN: usize = 255;

/// Names that are not portable as file names regardless of extension
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn is_allowed(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_')
}

/// Sanitize `text` into a safe path segment. Never fails; may return "".
pub fn sanitize(text: &str) -> String {
    let cleaned: String = text
        .nfd()
        .filter(|ch| ch.is_ascii())
        .map(|ch| if ch == ' ' { '_' } else { ch })
        .filter(|&ch| is_allowed(ch))
        .collect();

    if cleaned.len() <= SANITIZE_MAXLEN {
        return cleaned;
    }

    // Everything left is ASCII, so byte slicing is on char boundaries
    let (stem, ext) = split_extension(&cleaned);
    if ext.len() >= SANITIZE_MAXLEN {
        return cleaned[..SANITIZE_MAXLEN].to_string();
    }
    let max_stem_len = SANITIZE_MAXLEN - ext.len();
    format!("{}{}", &stem[..max_stem_len.min(stem.len())], ext)
}

/// Split a name into stem and extension (including the dot).
///
/// Leading dots belong to the stem, so `.hidden` has no extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if name[..idx].chars().any(|c| c != '.') => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

/// Stricter portability check applied to sanitized output file names
pub fn is_portable_file_name(name: &str) -> bool {
    if name.is_empty() || name.len() > SANITIZE_MAXLEN {
        return false;
    }
    if name == "." || name == ".." || name.ends_with('.') || name.ends_with(' ') {
        return false;
    }
    if !name.chars().all(is_allowed) {
        return false;
    }
    let base = name.split('.').next().unwrap_or("");
    if base.is_empty() {
        return false;
    }
    !RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(base))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only_whitelist(s: &str) -> bool {
        s.chars().all(is_allowed)
    }

    #[test]
    fn test_transliterates_accents_and_replaces_spaces() {
        assert_eq!(sanitize("Sigur Rós"), "Sigur_Ros");
        assert_eq!(sanitize("Mauk Tenieb - Esiön"), "Mauk_Tenieb_-_Esion");
    }

    #[test]
    fn test_drops_characters_outside_whitelist() {
        assert_eq!(sanitize("a/b\\c:d*e?f\"g<h>i|j"), "abcdefghij");
        assert_eq!(sanitize("(20k123)"), "20k123");
        assert_eq!(sanitize("日本語"), "");
    }

    #[test]
    fn test_truncates_long_stem_preserving_extension() {
        let long = format!("{}.opus", "x".repeat(400));
        let out = sanitize(&long);
        assert_eq!(out.len(), SANITIZE_MAXLEN);
        assert!(out.ends_with(".opus"));
    }

    #[test]
    fn test_truncates_when_extension_alone_is_too_long() {
        let long = format!("a.{}", "y".repeat(400));
        let out = sanitize(&long);
        assert_eq!(out.len(), SANITIZE_MAXLEN);
    }

    #[test]
    fn test_output_always_bounded_and_whitelisted() {
        let inputs = [
            "",
            " ",
            "Ærøskøbing — Ω ≈ ç √ ∫",
            "...",
            "01 - Intro (Live) [Remastered].mp3",
            &"é ".repeat(300),
            &"ab.".repeat(200),
        ];
        for input in inputs {
            let out = sanitize(input);
            assert!(out.len() <= SANITIZE_MAXLEN, "too long for {:?}", input);
            assert!(only_whitelist(&out), "bad chars in {:?}", out);
        }
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("01-a.mp3"), ("01-a", ".mp3"));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
        assert_eq!(split_extension("noext"), ("noext", ""));
        assert_eq!(split_extension("a.b.ogg"), ("a.b", ".ogg"));
    }

    #[test]
    fn test_portable_file_names() {
        assert!(is_portable_file_name("01-intro.mp3"));
        assert!(!is_portable_file_name(""));
        assert!(!is_portable_file_name(".mp3."));
        assert!(!is_portable_file_name("CON.mp3"));
        assert!(!is_portable_file_name("lpt1"));
        assert!(!is_portable_file_name(".."));
        assert!(!is_portable_file_name(".mp3"));
    }
}
