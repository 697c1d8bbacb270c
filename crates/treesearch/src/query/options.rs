//! Registry of query options and their aliases.

use fnv::FnvHashMap;

use super::key::{Conjunction, OperatorKind};
use crate::error::ParseError;

/// What a single option sets on the pending key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOption {
    Conjunction(Conjunction),
    Property(String),
    Operator(OperatorKind),
}

/// Option names map to exactly one `SearchOption`; aliases expand to one or
/// more option names. Lookups are ASCII case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct OptionRegistry {
    options: FnvHashMap<String, SearchOption>,
    aliases: FnvHashMap<String, Vec<String>>,
}

impl OptionRegistry {
    pub fn builder() -> OptionRegistryBuilder {
        OptionRegistryBuilder::default()
    }

    /// The standard options with the given property names.
    pub fn standard<'a>(properties: impl IntoIterator<Item = &'a str>) -> Self {
        let mut builder = Self::builder();
        for conjunction in Conjunction::ALL {
            builder = builder.conjunction(conjunction.option_name(), conjunction);
        }
        for operator in OperatorKind::ALL {
            builder = builder.operator(operator.option_name(), operator);
        }
        for property in properties {
            builder = builder.property(property);
        }
        builder
            .alias("m0", &["exact"])
            .alias("m1", &["word"])
            .alias("m2", &["fuzzy"])
            .alias("since", &["p.date", "m.gt"])
            .alias("until", &["p.date", "m.lt"])
            .build()
    }

    /// Resolves an option name, expanding aliases.
    pub fn resolve(&self, name: &str) -> Result<Vec<SearchOption>, ParseError> {
        let lower = name.to_ascii_lowercase();
        if let Some(option) = self.options.get(&lower) {
            return Ok(vec![option.clone()]);
        }
        let Some(targets) = self.aliases.get(&lower) else {
            return Err(ParseError::UnknownOption(name.to_string()));
        };
        targets
            .iter()
            .map(|target| {
                self.options
                    .get(target)
                    .cloned()
                    .ok_or_else(|| ParseError::UnknownOption(name.to_string()))
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct OptionRegistryBuilder {
    registry: OptionRegistry,
}

impl OptionRegistryBuilder {
    pub fn conjunction(mut self, name: &str, conjunction: Conjunction) -> Self {
        self.registry
            .options
            .insert(name.to_ascii_lowercase(), SearchOption::Conjunction(conjunction));
        self
    }

    pub fn operator(mut self, name: &str, operator: OperatorKind) -> Self {
        self.registry
            .options
            .insert(name.to_ascii_lowercase(), SearchOption::Operator(operator));
        self
    }

    /// Registers `p.<name>`. The key keeps the property's own spelling.
    pub fn property(mut self, name: &str) -> Self {
        self.registry.options.insert(
            format!("p.{}", name.to_ascii_lowercase()),
            SearchOption::Property(name.to_string()),
        );
        self
    }

    pub fn alias(mut self, name: &str, targets: &[&str]) -> Self {
        self.registry.aliases.insert(
            name.to_ascii_lowercase(),
            targets.iter().map(|t| t.to_ascii_lowercase()).collect(),
        );
        self
    }

    pub fn build(self) -> OptionRegistry {
        self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> OptionRegistry {
        OptionRegistry::standard(["text", "date", "isDirectory"])
    }

    #[test]
    fn resolves_case_insensitively() {
        let registry = registry();
        assert_eq!(
            registry.resolve("NOT").unwrap(),
            vec![SearchOption::Conjunction(Conjunction::Not)]
        );
        assert_eq!(
            registry.resolve("p.isdirectory").unwrap(),
            vec![SearchOption::Property("isDirectory".into())]
        );
    }

    #[test]
    fn aliases_expand_to_several_options() {
        let registry = registry();
        assert_eq!(
            registry.resolve("since").unwrap(),
            vec![
                SearchOption::Property("date".into()),
                SearchOption::Operator(OperatorKind::Gt)
            ]
        );
        assert_eq!(
            registry.resolve("m1").unwrap(),
            vec![SearchOption::Operator(OperatorKind::Word)]
        );
    }

    #[test]
    fn unknown_option_names_the_token() {
        assert_eq!(
            registry().resolve("bogus"),
            Err(ParseError::UnknownOption("bogus".into()))
        );
    }
}
