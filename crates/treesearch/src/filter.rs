//! Filter engine: compiles search keys and applies them to items.
//!
//! Keys fold left to right over each item:
//! - `And` narrows the running result
//! - `Or` re-admits items from the unfiltered set
//! - `Not` subtracts matches
//! - `PreOr` is unioned after the fold, independent of position
//!
//! Pinned items are set aside before the fold and always lead the result.

mod operator;
mod property;

use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Local};

pub use operator::Matcher;
pub use property::{Property, PropertySet};

use crate::cancel::CancellationToken;
use crate::config::DEFAULT_OPTION_MARKER;
use crate::error::ParseError;
use crate::normalize::TextNormalizer;
use crate::query::{Conjunction, OptionRegistry, QueryParser, SearchKey};

/// Read access to anything the filter engine can match.
pub trait SearchItem {
    fn name(&self) -> &str;
    fn fuzzy_name(&self) -> &str;
    fn word_name(&self) -> &str;
    fn is_dir(&self) -> bool;
    fn is_pinned(&self) -> bool;
    fn size(&self) -> u64;
    fn modified(&self) -> Option<DateTime<Local>>;
    fn path(&self) -> Cow<'_, Path>;
}

#[derive(Debug, Clone)]
pub struct CompiledKey {
    pub conjunction: Conjunction,
    pub property: Property,
    pub matcher: Matcher,
    pub is_exclude: bool,
}

#[derive(Debug)]
pub struct FilterEngine {
    normalizer: Arc<TextNormalizer>,
    properties: PropertySet,
    parser: QueryParser,
}

impl FilterEngine {
    pub fn new(normalizer: Arc<TextNormalizer>, properties: &[Property], marker: char) -> Self {
        let properties = PropertySet::new(properties);
        let registry = OptionRegistry::standard(properties.names());
        Self {
            normalizer,
            properties,
            parser: QueryParser::new(Arc::new(registry), marker),
        }
    }

    /// Built-in properties, default marker, uncached normalizer.
    pub fn basic() -> Self {
        Self::new(
            Arc::new(TextNormalizer::uncached()),
            &Property::BUILTIN,
            DEFAULT_OPTION_MARKER,
        )
    }

    pub fn parser(&self) -> &QueryParser {
        &self.parser
    }

    pub fn normalizer(&self) -> &Arc<TextNormalizer> {
        &self.normalizer
    }

    /// Parses `query`, compiling every key as it is emitted so bad values
    /// are reported here rather than at search time.
    pub fn parse(&self, query: &str) -> Result<Vec<SearchKey>, ParseError> {
        self.parser
            .parse_with(query, |key| self.compile_key(key).map(drop))
    }

    pub fn compile_key(&self, key: &SearchKey) -> Result<CompiledKey, ParseError> {
        let property = self
            .properties
            .get(&key.property)
            .ok_or_else(|| ParseError::UnknownOption(format!("p.{}", key.property)))?;
        let matcher = Matcher::compile(key.operator, property, &key.word, &self.normalizer)?;
        Ok(CompiledKey {
            conjunction: key.conjunction,
            property,
            matcher,
            is_exclude: key.is_exclude,
        })
    }

    pub fn compile(&self, keys: &[SearchKey]) -> Result<CompiledQuery, ParseError> {
        let keys = keys
            .iter()
            .map(|key| self.compile_key(key))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CompiledQuery {
            keys,
            normalizer: self.normalizer.clone(),
        })
    }

    /// Parses and compiles in one step.
    pub fn compile_query(&self, query: &str) -> Result<CompiledQuery, ParseError> {
        let keys = self.parse(query)?;
        self.compile(&keys)
    }
}

#[derive(Debug, Clone)]
pub struct CompiledQuery {
    keys: Vec<CompiledKey>,
    normalizer: Arc<TextNormalizer>,
}

impl CompiledQuery {
    /// True when the user supplied no keys of their own.
    pub fn is_empty(&self) -> bool {
        self.keys.iter().all(|key| key.is_exclude)
    }

    pub fn keys(&self) -> &[CompiledKey] {
        &self.keys
    }

    /// Prepends a caller-injected key, e.g. directory exclusion.
    pub fn with_leading(mut self, key: CompiledKey) -> Self {
        self.keys.insert(0, key);
        self
    }

    /// Appends a caller-injected key that applies after the user's keys.
    pub fn with_trailing(mut self, key: CompiledKey) -> Self {
        self.keys.push(key);
        self
    }

    /// Folds the keys over a single unpinned item.
    pub fn matches<T: SearchItem>(&self, item: &T) -> bool {
        let test = |key: &CompiledKey| key.matcher.matches(key.property, item, &self.normalizer);
        let mut current = true;
        let mut has_pre_or = false;
        for key in &self.keys {
            match key.conjunction {
                Conjunction::And => {
                    if current {
                        current = test(key);
                    }
                }
                Conjunction::Or => {
                    if !current {
                        current = test(key);
                    }
                }
                Conjunction::Not => {
                    if current {
                        current = !test(key);
                    }
                }
                Conjunction::PreOr => has_pre_or = true,
            }
        }
        if current || !has_pre_or {
            return current;
        }
        self.keys
            .iter()
            .filter(|key| key.conjunction == Conjunction::PreOr)
            .any(test)
    }

    /// Whether `item` belongs in a result, counting the pin rule.
    pub fn admits<T: SearchItem>(&self, item: &T) -> bool {
        if item.is_pinned() {
            return true;
        }
        !self.is_empty() && self.matches(item)
    }

    /// Filters `items`, pinned items first. Returns `None` if canceled.
    pub fn evaluate<'a, T: SearchItem>(
        &self,
        items: &'a [T],
        cancel: &CancellationToken,
    ) -> Option<Vec<&'a T>> {
        let (pinned, body): (Vec<&T>, Vec<&T>) = items.iter().partition(|item| item.is_pinned());
        let mut results = pinned;
        if self.is_empty() {
            return Some(results);
        }
        for (i, item) in body.into_iter().enumerate() {
            cancel.is_cancelled_sparse(i)?;
            if self.matches(item) {
                results.push(item);
            }
        }
        Some(results)
    }
}
