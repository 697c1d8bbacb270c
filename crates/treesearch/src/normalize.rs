//! Text normalization for fuzzy and word matching.
//!
//! Names and query words pass through the same pipeline so they compare in
//! a common form:
//! 1. Spacing voiced sound marks following kana become combining marks
//! 2. NFKC composition (full/half width folding, precomposed kana)
//! 3. Uppercasing
//! 4. Mode specific folding
//!    - `Fuzzy`: hiragana to katakana, long vowel mark to `-`, whitespace removed
//!    - `Word`: whitespace and kana script kept, leading zeros of digit runs dropped
//!
//! Results are memoized in a time-expiring cache (`cache`). The cache only
//! saves work; `normalize()` is the source of truth.

mod cache;

use std::sync::Arc;

use unicode_normalization::UnicodeNormalization;

use crate::config::EngineConfig;
pub use cache::NormalizeCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NormalizeMode {
    Fuzzy,
    Word,
}

const COMBINING_VOICED_MARK: char = '\u{3099}';
const COMBINING_SEMI_VOICED_MARK: char = '\u{309A}';
const SPACING_VOICED_MARK: char = '\u{309B}';
const SPACING_SEMI_VOICED_MARK: char = '\u{309C}';
const LONG_VOWEL_MARK: char = '\u{30FC}';

/// Normalizes `text` for the given mode without consulting any cache.
pub fn normalize(text: &str, mode: NormalizeMode) -> String {
    let composed: String = compose_voiced_marks(text).nfkc().collect();
    let mut out = String::with_capacity(composed.len());
    for ch in composed.chars().flat_map(char::to_uppercase) {
        match mode {
            NormalizeMode::Fuzzy => {
                if ch.is_whitespace() {
                    continue;
                }
                if ch == LONG_VOWEL_MARK {
                    out.push('-');
                } else {
                    out.push(hiragana_to_katakana(ch));
                }
            }
            NormalizeMode::Word => out.push(ch),
        }
    }
    match mode {
        NormalizeMode::Fuzzy => out,
        NormalizeMode::Word => strip_leading_zeros(&out),
    }
}

fn compose_voiced_marks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous: Option<char> = None;
    for ch in text.chars() {
        let mapped = match ch {
            SPACING_VOICED_MARK if previous.is_some_and(is_kana) => COMBINING_VOICED_MARK,
            SPACING_SEMI_VOICED_MARK if previous.is_some_and(is_kana) => {
                COMBINING_SEMI_VOICED_MARK
            }
            other => other,
        };
        out.push(mapped);
        previous = Some(ch);
    }
    out
}

fn hiragana_to_katakana(ch: char) -> char {
    if ('\u{3041}'..='\u{3096}').contains(&ch) || ('\u{309D}'..='\u{309E}').contains(&ch) {
        char::from_u32(ch as u32 + 0x60).unwrap_or(ch)
    } else {
        ch
    }
}

/// Drops leading zeros of every ASCII digit run, keeping a single `0` for
/// all-zero runs.
fn strip_leading_zeros(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        let run_started = out.chars().next_back().is_some_and(|c| c.is_ascii_digit());
        if ch == '0' && !run_started && chars.peek().is_some_and(char::is_ascii_digit) {
            continue;
        }
        out.push(ch);
    }
    out
}

fn is_kana(ch: char) -> bool {
    is_hiragana(ch) || is_katakana(ch)
}

fn is_hiragana(ch: char) -> bool {
    ('\u{3041}'..='\u{309F}').contains(&ch)
}

fn is_katakana(ch: char) -> bool {
    ('\u{30A0}'..='\u{30FF}').contains(&ch) || ('\u{FF66}'..='\u{FF9F}').contains(&ch)
}

fn is_ideograph(ch: char) -> bool {
    ('\u{4E00}'..='\u{9FFF}').contains(&ch)
        || ('\u{3400}'..='\u{4DBF}').contains(&ch)
        || ('\u{F900}'..='\u{FAFF}').contains(&ch)
        || ch == '\u{3005}'
}

/// Script class used to decide word boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    Digit,
    Hiragana,
    Katakana,
    Ideograph,
    Letter,
    Other,
}

pub fn char_class(ch: char) -> CharClass {
    if ch.is_ascii_digit() || ch.is_numeric() {
        CharClass::Digit
    } else if is_hiragana(ch) {
        CharClass::Hiragana
    } else if is_katakana(ch) || ch == LONG_VOWEL_MARK {
        CharClass::Katakana
    } else if is_ideograph(ch) {
        CharClass::Ideograph
    } else if ch.is_alphabetic() {
        CharClass::Letter
    } else {
        CharClass::Other
    }
}

/// Returns true if a word boundary sits before the char at byte offset `at`.
pub fn is_word_boundary(text: &str, at: usize) -> bool {
    if at == 0 || at >= text.len() {
        return true;
    }
    let before = text[..at].chars().next_back();
    let after = text[at..].chars().next();
    match (before, after) {
        (Some(before), Some(after)) => char_class(before) != char_class(after),
        _ => true,
    }
}

/// Cached front end to `normalize()`, shared by the filter engine and trees.
#[derive(Debug)]
pub struct TextNormalizer {
    fuzzy: Option<NormalizeCache>,
    word: Option<NormalizeCache>,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl TextNormalizer {
    pub fn from_config(config: &EngineConfig) -> Self {
        let make = || {
            config.normalize_cache_enabled.then(|| {
                NormalizeCache::new(
                    config.normalize_cache_expiry(),
                    config.normalize_cache_sweep(),
                )
            })
        };
        Self {
            fuzzy: make(),
            word: make(),
        }
    }

    /// A normalizer that always recomputes.
    pub fn uncached() -> Self {
        Self {
            fuzzy: None,
            word: None,
        }
    }

    pub fn fuzzy(&self, text: &str) -> Arc<str> {
        self.normalize(text, NormalizeMode::Fuzzy)
    }

    pub fn word(&self, text: &str) -> Arc<str> {
        self.normalize(text, NormalizeMode::Word)
    }

    pub fn normalize(&self, text: &str, mode: NormalizeMode) -> Arc<str> {
        let cache = match mode {
            NormalizeMode::Fuzzy => self.fuzzy.as_ref(),
            NormalizeMode::Word => self.word.as_ref(),
        };
        match cache {
            Some(cache) => cache.get_or_insert_with(text, || normalize(text, mode)),
            None => Arc::from(normalize(text, mode)),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.fuzzy.as_ref().map_or(0, NormalizeCache::len)
            + self.word.as_ref().map_or(0, NormalizeCache::len)
    }
}
