//! Query language parser.
//!
//! A query is a sequence of words, quoted phrases and options. Options start
//! with the marker character (`/` by default) and modify the next word:
//!
//! ```text
//! report /not draft /since -7days "final copy"
//! ```
//!
//! Bare words become fuzzy matches on the item text, phrases become exact
//! matches. Each emitted key is handed to a validator before it is accepted
//! so malformed values fail at parse time instead of during a search.

mod fsm;
mod key;
mod options;
mod value;

use std::sync::Arc;

pub use key::{to_query_string, Conjunction, OperatorKind, SearchKey, DEFAULT_PROPERTY};
pub use options::{OptionRegistry, OptionRegistryBuilder, SearchOption};
pub use value::{SearchValue, ValueKind};

use crate::config::DEFAULT_OPTION_MARKER;
use crate::error::ParseError;
use fsm::Token;

/// Modifiers collected from options, consumed by the next word.
#[derive(Debug, Default)]
struct PendingKey {
    conjunction: Option<Conjunction>,
    property: Option<String>,
    operator: Option<OperatorKind>,
}

impl PendingKey {
    fn apply(&mut self, option: SearchOption) {
        match option {
            SearchOption::Conjunction(c) => self.conjunction = Some(c),
            SearchOption::Property(p) => self.property = Some(p),
            SearchOption::Operator(o) => self.operator = Some(o),
        }
    }

    fn take_key(&mut self, word: String, default_operator: OperatorKind) -> SearchKey {
        let pending = std::mem::take(self);
        SearchKey {
            word,
            conjunction: pending.conjunction.unwrap_or_default(),
            property: pending
                .property
                .unwrap_or_else(|| key::DEFAULT_PROPERTY.to_string()),
            operator: pending.operator.unwrap_or(default_operator),
            is_exclude: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryParser {
    registry: Arc<OptionRegistry>,
    marker: char,
}

impl QueryParser {
    pub fn new(registry: Arc<OptionRegistry>, marker: char) -> Self {
        Self { registry, marker }
    }

    pub fn with_properties<'a>(properties: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(
            Arc::new(OptionRegistry::standard(properties)),
            DEFAULT_OPTION_MARKER,
        )
    }

    pub fn marker(&self) -> char {
        self.marker
    }

    pub fn registry(&self) -> &OptionRegistry {
        &self.registry
    }

    /// Parses without value validation.
    pub fn parse(&self, query: &str) -> Result<Vec<SearchKey>, ParseError> {
        self.parse_with(query, |_| Ok(()))
    }

    /// Parses `query`, running `validate` on every key as it is emitted.
    pub fn parse_with(
        &self,
        query: &str,
        mut validate: impl FnMut(&SearchKey) -> Result<(), ParseError>,
    ) -> Result<Vec<SearchKey>, ParseError> {
        let mut keys = Vec::new();
        let mut pending = PendingKey::default();
        fsm::run::<ParseError>(query, |token| {
            let key = match token {
                Token::Word(word) => {
                    if let Some(name) = word.strip_prefix(self.marker) {
                        for option in self.registry.resolve(name)? {
                            pending.apply(option);
                        }
                        return Ok(());
                    }
                    pending.take_key(word, OperatorKind::Fuzzy)
                }
                Token::Phrase(phrase) => pending.take_key(phrase, OperatorKind::Exact),
            };
            validate(&key)?;
            keys.push(key);
            Ok(())
        })?;
        Ok(keys)
    }

    pub fn to_query_string(&self, keys: &[SearchKey]) -> String {
        to_query_string(keys, self.marker)
    }
}
