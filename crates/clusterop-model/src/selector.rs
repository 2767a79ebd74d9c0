//! Label and field selectors.
//!
//! Label selectors accept the equality and set based grammar:
//! `key=value`, `key==value`, `key!=value`, `key`, `!key`,
//! `key in (a,b)` and `key notin (a,b)`, joined by commas.
//! Field selectors accept `field=value`, `field==value` and `field!=value`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::core::Spec;
use crate::meta::ResourceObject;

pub type Labels = BTreeMap<String, String>;
pub type Fields = BTreeMap<String, String>;

pub const FIELD_NAME: &str = "metadata.name";
pub const FIELD_NAMESPACE: &str = "metadata.namespace";

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorParseError {
    #[error("empty key in selector term: {0:?}")]
    EmptyKey(String),
    #[error("unbalanced parenthesis in selector: {0:?}")]
    UnbalancedParenthesis(String),
    #[error("invalid selector term: {0:?}")]
    InvalidTerm(String),
    #[error("operator not supported by field selector: {0:?}")]
    UnsupportedFieldOperator(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Equals(String),
    NotEquals(String),
    In(BTreeSet<String>),
    NotIn(BTreeSet<String>),
    Exists,
    DoesNotExist,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub key: String,
    pub operator: Operator,
}

impl Requirement {
    pub fn new(key: impl Into<String>, operator: Operator) -> Self {
        Self {
            key: key.into(),
            operator,
        }
    }

    fn matches(&self, set: &BTreeMap<String, String>) -> bool {
        let value = set.get(&self.key);
        match &self.operator {
            Operator::Equals(expected) => value == Some(expected),
            Operator::NotEquals(expected) => value != Some(expected),
            Operator::In(values) => value.is_some_and(|v| values.contains(v)),
            Operator::NotIn(values) => !value.is_some_and(|v| values.contains(v)),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |values: &BTreeSet<String>| values.iter().cloned().collect::<Vec<_>>().join(",");
        match &self.operator {
            Operator::Equals(value) => write!(f, "{}={}", self.key, value),
            Operator::NotEquals(value) => write!(f, "{}!={}", self.key, value),
            Operator::In(values) => write!(f, "{} in ({})", self.key, join(values)),
            Operator::NotIn(values) => write!(f, "{} notin ({})", self.key, join(values)),
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

/// conjunction of label requirements, empty selector matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    /// selector requiring every label in set to be equal
    pub fn from_set<K, V>(set: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            requirements: set
                .into_iter()
                .map(|(k, v)| Requirement::new(k, Operator::Equals(v.into())))
                .collect(),
        }
    }

    pub fn add(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl FromStr for LabelSelector {
    type Err = SelectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut requirements = vec![];
        for term in split_terms(s)? {
            requirements.push(parse_label_term(&term)?);
        }
        Ok(Self { requirements })
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", terms.join(","))
    }
}

/// conjunction of field equality requirements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    requirements: Vec<Requirement>,
}

impl FieldSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn from_set<K, V>(set: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            requirements: set
                .into_iter()
                .map(|(k, v)| Requirement::new(k, Operator::Equals(v.into())))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// value required for field, if selector pins it with equality
    pub fn required_value(&self, field: &str) -> Option<&str> {
        self.requirements
            .iter()
            .find_map(|r| match &r.operator {
                Operator::Equals(value) if r.key == field => Some(value.as_str()),
                _ => None,
            })
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        self.requirements.iter().all(|r| r.matches(fields))
    }
}

impl FromStr for FieldSelector {
    type Err = SelectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut requirements = vec![];
        for term in split_terms(s)? {
            let requirement = parse_label_term(&term)?;
            match requirement.operator {
                Operator::Equals(_) | Operator::NotEquals(_) => requirements.push(requirement),
                _ => return Err(SelectorParseError::UnsupportedFieldOperator(term)),
            }
        }
        Ok(Self { requirements })
    }
}

impl fmt::Display for FieldSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", terms.join(","))
    }
}

/// fields every object exposes to field selectors
pub fn default_fields<S: Spec>(obj: &ResourceObject<S>, namespace_scoped: bool) -> Fields {
    let mut fields = Fields::new();
    fields.insert(FIELD_NAME.to_owned(), obj.metadata.name.clone());
    if namespace_scoped {
        fields.insert(FIELD_NAMESPACE.to_owned(), obj.metadata.namespace.clone());
    }
    fields
}

/// split on commas that are not inside parenthesis
fn split_terms(s: &str) -> Result<Vec<String>, SelectorParseError> {
    let mut terms = vec![];
    let mut depth = 0i32;
    let mut current = String::new();
    for c in s.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(SelectorParseError::UnbalancedParenthesis(s.to_owned()));
                }
                current.push(c);
            }
            ',' if depth == 0 => {
                terms.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if depth != 0 {
        return Err(SelectorParseError::UnbalancedParenthesis(s.to_owned()));
    }
    terms.push(current);

    Ok(terms
        .into_iter()
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
        .collect())
}

fn parse_label_term(term: &str) -> Result<Requirement, SelectorParseError> {
    let non_empty = |key: &str| {
        let key = key.trim();
        if key.is_empty() {
            Err(SelectorParseError::EmptyKey(term.to_owned()))
        } else {
            Ok(key.to_owned())
        }
    };

    if let Some(key) = term.strip_prefix('!') {
        return Ok(Requirement::new(non_empty(key)?, Operator::DoesNotExist));
    }
    if let Some((key, value)) = term.split_once("!=") {
        return Ok(Requirement::new(
            non_empty(key)?,
            Operator::NotEquals(value.trim().to_owned()),
        ));
    }
    if let Some((key, value)) = term.split_once("==") {
        return Ok(Requirement::new(
            non_empty(key)?,
            Operator::Equals(value.trim().to_owned()),
        ));
    }
    if let Some((key, value)) = term.split_once('=') {
        return Ok(Requirement::new(
            non_empty(key)?,
            Operator::Equals(value.trim().to_owned()),
        ));
    }
    if let Some(open) = term.find('(') {
        let head: Vec<&str> = term[..open].split_whitespace().collect();
        let close = term
            .rfind(')')
            .ok_or_else(|| SelectorParseError::UnbalancedParenthesis(term.to_owned()))?;
        let values: BTreeSet<String> = term[open + 1..close]
            .split(',')
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .collect();
        return match head.as_slice() {
            [key, "in"] => Ok(Requirement::new(*key, Operator::In(values))),
            [key, "notin"] => Ok(Requirement::new(*key, Operator::NotIn(values))),
            _ => Err(SelectorParseError::InvalidTerm(term.to_owned())),
        };
    }
    if term.contains(char::is_whitespace) {
        return Err(SelectorParseError::InvalidTerm(term.to_owned()));
    }

    Ok(Requirement::new(non_empty(term)?, Operator::Exists))
}
