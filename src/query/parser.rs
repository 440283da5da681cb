use crate::core::error::{Error, Result};
use crate::query::matcher::{TestSet, TestValue};

/// Prefix tagging a literal test value on the wire
pub const LITERAL_TAG: &str = "str:";
/// Prefix tagging a regex test value on the wire
pub const PATTERN_TAG: &str = "regex:";

/// Turn tagged strings (`str:abc`, `regex:^a`) into a test set
pub fn parse_test_values<S: AsRef<str>>(values: &[S]) -> Result<TestSet> {
    values.iter().map(|value| parse_test_value(value.as_ref())).collect()
}

pub fn parse_test_value(value: &str) -> Result<TestValue> {
    if let Some(literal) = value.strip_prefix(LITERAL_TAG) {
        return Ok(TestValue::literal(literal));
    }

    if let Some(pattern) = value.strip_prefix(PATTERN_TAG) {
        return TestValue::pattern(pattern);
    }

    Err(Error::invalid_argument(format!(
        "test value '{}' must start with '{}' or '{}'",
        value, LITERAL_TAG, PATTERN_TAG
    )))
}
