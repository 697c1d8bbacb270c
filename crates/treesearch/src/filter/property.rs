//! Item properties that search keys can target.

use std::borrow::Cow;

use super::SearchItem;
use crate::query::{SearchValue, ValueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    Text,
    Date,
    IsDirectory,
    IsPinned,
    Size,
    Path,
}

impl Property {
    /// Available to every consumer.
    pub const BUILTIN: [Property; 2] = [Property::Text, Property::Date];

    /// Registered by the index search wrapper.
    pub const INDEX: [Property; 6] = [
        Property::Text,
        Property::Date,
        Property::IsDirectory,
        Property::IsPinned,
        Property::Size,
        Property::Path,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Property::Text => "text",
            Property::Date => "date",
            Property::IsDirectory => "isDirectory",
            Property::IsPinned => "isPinned",
            Property::Size => "size",
            Property::Path => "path",
        }
    }

    pub fn value_kind(self) -> ValueKind {
        match self {
            Property::Text | Property::Path => ValueKind::String,
            Property::Date => ValueKind::DateTime,
            Property::IsDirectory | Property::IsPinned => ValueKind::Bool,
            Property::Size => ValueKind::Integer,
        }
    }

    /// Text form used by the string operators.
    pub fn text<T: SearchItem>(self, item: &T) -> Cow<'_, str> {
        match self {
            Property::Text => Cow::Borrowed(item.name()),
            Property::Path => match item.path() {
                Cow::Borrowed(path) => path.to_string_lossy(),
                Cow::Owned(path) => Cow::Owned(path.to_string_lossy().into_owned()),
            },
            Property::Date => Cow::Owned(
                item.modified()
                    .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default(),
            ),
            Property::IsDirectory => Cow::Borrowed(bool_text(item.is_dir())),
            Property::IsPinned => Cow::Borrowed(bool_text(item.is_pinned())),
            Property::Size => Cow::Owned(item.size().to_string()),
        }
    }

    /// Typed value used by the comparison operators. `None` if unknown.
    pub fn value<T: SearchItem>(self, item: &T) -> Option<SearchValue> {
        match self {
            Property::Text => Some(SearchValue::String(item.name().to_string())),
            Property::Path => Some(SearchValue::String(
                item.path().to_string_lossy().into_owned(),
            )),
            Property::Date => item.modified().map(SearchValue::date),
            Property::IsDirectory => Some(SearchValue::Bool(item.is_dir())),
            Property::IsPinned => Some(SearchValue::Bool(item.is_pinned())),
            Property::Size => i64::try_from(item.size()).ok().map(SearchValue::Integer),
        }
    }
}

fn bool_text(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// The properties a filter engine accepts, looked up case-insensitively.
#[derive(Debug, Clone)]
pub struct PropertySet {
    properties: Vec<Property>,
}

impl PropertySet {
    pub fn new(properties: &[Property]) -> Self {
        let mut unique: Vec<Property> = Vec::with_capacity(properties.len());
        for &property in Property::BUILTIN.iter().chain(properties) {
            if !unique.contains(&property) {
                unique.push(property);
            }
        }
        Self { properties: unique }
    }

    pub fn get(&self, name: &str) -> Option<Property> {
        self.properties
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.properties.iter().map(|p| p.name())
    }
}

impl Default for PropertySet {
    fn default() -> Self {
        Self::new(&Property::BUILTIN)
    }
}
