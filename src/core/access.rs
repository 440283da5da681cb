use crate::core::error::{Error, Result};
use crate::core::types::Meta;

/// Check a caller's token against a database's metadata.
///
/// Public databases accept any caller. Protected ones need the exact
/// token, ignoring surrounding whitespace.
pub fn authorize(database: &str, meta: &Meta, token: Option<&str>) -> Result<()> {
    let required = match &meta.auth {
        Some(required) => required,
        None => return Ok(()),
    };

    match token.map(str::trim) {
        None | Some("") => Err(Error::access_denied(format!(
            "database '{}' expects an authentication token",
            database
        ))),
        Some(token) if token == required => Ok(()),
        Some(_) => Err(Error::access_denied(format!(
            "token does not grant access to database '{}'",
            database
        ))),
    }
}
