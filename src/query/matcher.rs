use regex::Regex;
use serde_json::Value;
use crate::core::error::Result;

/// One entry of a test set
#[derive(Debug, Clone)]
pub enum TestValue {
    Literal(String),  // Exact string equality
    Pattern(Regex),   // Regex search anywhere in the value
}

impl TestValue {
    pub fn literal(value: impl Into<String>) -> Self {
        TestValue::Literal(value.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self> {
        Ok(TestValue::Pattern(Regex::new(pattern)?))
    }

    /// Literals only ever match strings. Patterns match strings, and numbers
    /// or booleans through their JSON text.
    pub fn test(&self, value: &Value) -> bool {
        match self {
            TestValue::Literal(literal) => matches!(value, Value::String(s) if s == literal),
            TestValue::Pattern(regex) => match value {
                Value::String(s) => regex.is_match(s),
                Value::Number(n) => regex.is_match(&n.to_string()),
                Value::Bool(b) => regex.is_match(if *b { "true" } else { "false" }),
                Value::Null | Value::Array(_) | Value::Object(_) => false,
            },
        }
    }
}

/// Set of literals and patterns; a value matches if any entry does
#[derive(Debug, Clone, Default)]
pub struct TestSet {
    values: Vec<TestValue>,
}

impl TestSet {
    pub fn new(values: Vec<TestValue>) -> Self {
        TestSet { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn matches(&self, value: &Value) -> bool {
        self.values.iter().any(|test| test.test(value))
    }
}

impl FromIterator<TestValue> for TestSet {
    fn from_iter<I: IntoIterator<Item = TestValue>>(iter: I) -> Self {
        TestSet { values: iter.into_iter().collect() }
    }
}

/// Walk a dot-separated key path.
///
/// Objects are indexed by key and arrays by decimal position. Stepping into
/// anything else, or a missing key or index, gives `None`.
pub fn resolve_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = document;

    for section in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(section)?,
            Value::Array(items) => items.get(section.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

pub fn document_matches(document: &Value, path: &str, tests: &TestSet) -> bool {
    resolve_path(document, path).is_some_and(|value| tests.matches(value))
}
