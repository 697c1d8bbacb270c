use std::fmt;

/// How a key combines with the results accumulated before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Conjunction {
    #[default]
    And,
    Or,
    Not,
    /// Unioned from the unfiltered set after every other key.
    PreOr,
}

impl Conjunction {
    pub const ALL: [Conjunction; 4] = [
        Conjunction::And,
        Conjunction::Or,
        Conjunction::Not,
        Conjunction::PreOr,
    ];

    pub fn option_name(self) -> &'static str {
        match self {
            Conjunction::And => "and",
            Conjunction::Or => "or",
            Conjunction::Not => "not",
            Conjunction::PreOr => "preor",
        }
    }
}

/// Match rule applied to one property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OperatorKind {
    Exact,
    Word,
    #[default]
    Fuzzy,
    Regex,
    RegexIgnoreCase,
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
}

impl OperatorKind {
    pub const ALL: [OperatorKind; 11] = [
        OperatorKind::Exact,
        OperatorKind::Word,
        OperatorKind::Fuzzy,
        OperatorKind::Regex,
        OperatorKind::RegexIgnoreCase,
        OperatorKind::Lt,
        OperatorKind::Le,
        OperatorKind::Eq,
        OperatorKind::Ne,
        OperatorKind::Ge,
        OperatorKind::Gt,
    ];

    pub fn option_name(self) -> &'static str {
        match self {
            OperatorKind::Exact => "exact",
            OperatorKind::Word => "word",
            OperatorKind::Fuzzy => "fuzzy",
            OperatorKind::Regex => "re",
            OperatorKind::RegexIgnoreCase => "ire",
            OperatorKind::Lt => "m.lt",
            OperatorKind::Le => "m.le",
            OperatorKind::Eq => "m.eq",
            OperatorKind::Ne => "m.ne",
            OperatorKind::Ge => "m.ge",
            OperatorKind::Gt => "m.gt",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            OperatorKind::Lt
                | OperatorKind::Le
                | OperatorKind::Eq
                | OperatorKind::Ne
                | OperatorKind::Ge
                | OperatorKind::Gt
        )
    }
}

pub const DEFAULT_PROPERTY: &str = "text";

/// One parsed query term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchKey {
    pub word: String,
    pub conjunction: Conjunction,
    pub property: String,
    pub operator: OperatorKind,
    /// Injected by the caller rather than typed by the user; not serialized.
    pub is_exclude: bool,
}

impl SearchKey {
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            conjunction: Conjunction::And,
            property: DEFAULT_PROPERTY.to_string(),
            operator: OperatorKind::Fuzzy,
            is_exclude: false,
        }
    }

    pub fn with_conjunction(mut self, conjunction: Conjunction) -> Self {
        self.conjunction = conjunction;
        self
    }

    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = property.into();
        self
    }

    pub fn with_operator(mut self, operator: OperatorKind) -> Self {
        self.operator = operator;
        self
    }

    pub fn excluded(mut self) -> Self {
        self.is_exclude = true;
        self
    }
}

impl fmt::Display for SearchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{:?}",
            self.conjunction.option_name(),
            self.property,
            self.operator.option_name(),
            self.word
        )
    }
}

/// Renders keys back into query text that parses to the same keys.
///
/// Keys marked `is_exclude` are skipped. Words containing a double quote
/// cannot be represented and are written as-is.
pub fn to_query_string(keys: &[SearchKey], marker: char) -> String {
    let mut parts: Vec<String> = Vec::new();
    for key in keys.iter().filter(|key| !key.is_exclude) {
        if key.conjunction != Conjunction::And {
            parts.push(format!("{marker}{}", key.conjunction.option_name()));
        }
        if key.property != DEFAULT_PROPERTY {
            parts.push(format!("{marker}p.{}", key.property));
        }
        let quoted = key.word.is_empty()
            || key.word.chars().any(char::is_whitespace)
            || key.word.starts_with(marker);
        let implied = if quoted {
            OperatorKind::Exact
        } else {
            OperatorKind::Fuzzy
        };
        if key.operator != implied {
            parts.push(format!("{marker}{}", key.operator.option_name()));
        }
        if quoted {
            parts.push(format!("\"{}\"", key.word));
        } else {
            parts.push(key.word.clone());
        }
    }
    parts.join(" ")
}
