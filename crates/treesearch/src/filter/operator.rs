//! Compiled match rules for a single key.

use std::cmp::Ordering;
use std::sync::Arc;

use memchr::memmem;
use regex::{Regex, RegexBuilder};

use super::property::Property;
use super::SearchItem;
use crate::error::ParseError;
use crate::normalize::{is_word_boundary, TextNormalizer};
use crate::query::{OperatorKind, SearchValue};

#[derive(Debug, Clone)]
pub enum Matcher {
    /// Case-sensitive literal substring on the raw text.
    Exact(memmem::Finder<'static>),
    /// Word-normalized substring anchored at script-class boundaries.
    Word(Arc<str>),
    /// Fuzzy-normalized substring.
    Fuzzy(Arc<str>),
    Regex(Regex),
    Compare {
        operator: OperatorKind,
        reference: SearchValue,
    },
}

impl Matcher {
    pub fn compile(
        operator: OperatorKind,
        property: Property,
        word: &str,
        normalizer: &TextNormalizer,
    ) -> Result<Self, ParseError> {
        let matcher = match operator {
            OperatorKind::Exact => Matcher::Exact(memmem::Finder::new(word.as_bytes()).into_owned()),
            OperatorKind::Word => Matcher::Word(normalizer.word(word)),
            OperatorKind::Fuzzy => Matcher::Fuzzy(normalizer.fuzzy(word)),
            OperatorKind::Regex | OperatorKind::RegexIgnoreCase => {
                let regex = RegexBuilder::new(word)
                    .case_insensitive(operator == OperatorKind::RegexIgnoreCase)
                    .build()
                    .map_err(|error| ParseError::BadRegex {
                        pattern: word.to_string(),
                        message: error.to_string(),
                    })?;
                Matcher::Regex(regex)
            }
            OperatorKind::Lt
            | OperatorKind::Le
            | OperatorKind::Eq
            | OperatorKind::Ne
            | OperatorKind::Ge
            | OperatorKind::Gt => Matcher::Compare {
                operator,
                reference: SearchValue::parse(property.value_kind(), word)?,
            },
        };
        Ok(matcher)
    }

    pub fn matches<T: SearchItem>(
        &self,
        property: Property,
        item: &T,
        normalizer: &TextNormalizer,
    ) -> bool {
        match self {
            Matcher::Exact(finder) => {
                let text = property.text(item);
                finder.find(text.as_bytes()).is_some()
            }
            Matcher::Word(needle) => {
                if property == Property::Text {
                    word_match(item.word_name(), needle)
                } else {
                    word_match(&normalizer.word(&property.text(item)), needle)
                }
            }
            Matcher::Fuzzy(needle) => {
                if property == Property::Text {
                    memmem::find(item.fuzzy_name().as_bytes(), needle.as_bytes()).is_some()
                } else {
                    let hay = normalizer.fuzzy(&property.text(item));
                    memmem::find(hay.as_bytes(), needle.as_bytes()).is_some()
                }
            }
            Matcher::Regex(regex) => regex.is_match(&property.text(item)),
            Matcher::Compare {
                operator,
                reference,
            } => match property.value(item) {
                Some(value) => compare(*operator, value.compare(reference)),
                None => false,
            },
        }
    }
}

fn compare(operator: OperatorKind, ordering: Ordering) -> bool {
    match operator {
        OperatorKind::Lt => ordering == Ordering::Less,
        OperatorKind::Le => ordering != Ordering::Greater,
        OperatorKind::Eq => ordering == Ordering::Equal,
        OperatorKind::Ne => ordering != Ordering::Equal,
        OperatorKind::Ge => ordering != Ordering::Less,
        OperatorKind::Gt => ordering == Ordering::Greater,
        _ => false,
    }
}

/// Finds `needle` in `hay` starting and ending on a word boundary.
fn word_match(hay: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    memmem::find_iter(hay.as_bytes(), needle.as_bytes()).any(|start| {
        let end = start + needle.len();
        hay.is_char_boundary(start)
            && hay.is_char_boundary(end)
            && is_word_boundary(hay, start)
            && is_word_boundary(hay, end)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_match_requires_boundaries() {
        assert!(word_match("FILE1.TXT", "FILE"));
        assert!(word_match("FILE1.TXT", "1"));
        assert!(!word_match("FILE10.TXT", "1"));
        assert!(!word_match("PROFILE", "FILE"));
        assert!(word_match("ほんヤク", "ヤク"));
        assert!(!word_match("ほんやく", "やく"));
    }

    #[test]
    fn comparison_table() {
        assert!(compare(OperatorKind::Lt, Ordering::Less));
        assert!(compare(OperatorKind::Le, Ordering::Equal));
        assert!(!compare(OperatorKind::Gt, Ordering::Equal));
        assert!(compare(OperatorKind::Ne, Ordering::Greater));
        assert!(compare(OperatorKind::Ge, Ordering::Greater));
    }

    #[test]
    fn bad_regex_names_the_pattern() {
        let error = Matcher::compile(
            OperatorKind::Regex,
            Property::Text,
            "(unclosed",
            &TextNormalizer::uncached(),
        )
        .unwrap_err();
        assert!(matches!(error, ParseError::BadRegex { ref pattern, .. } if pattern == "(unclosed"));
    }

    #[test]
    fn comparisons_parse_their_reference_by_property_kind() {
        let normalizer = TextNormalizer::uncached();
        assert!(Matcher::compile(OperatorKind::Gt, Property::Size, "1K", &normalizer).is_ok());
        assert_eq!(
            Matcher::compile(OperatorKind::Gt, Property::Size, "big", &normalizer).unwrap_err(),
            ParseError::BadInteger("big".into())
        );
        assert_eq!(
            Matcher::compile(OperatorKind::Eq, Property::IsDirectory, "perhaps", &normalizer)
                .unwrap_err(),
            ParseError::BadBoolean("perhaps".into())
        );
    }
}
