use crate::core::error::{Error, Result};

/// Separator between hierarchy levels in a persister key
pub const SEPARATOR: char = '/';

/// Final segment of a database's metadata key
pub const META_SEGMENT: &str = "meta.json";

/// Top-level name the local persister stages partial writes under
pub const STAGING_SEGMENT: &str = ".staging";

/// Key builders for the `<database>/<collection>/<id>` hierarchy.
///
/// Every name is validated before a key is produced, so two distinct
/// (database, collection, id) triples never share a key.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyScheme;

impl KeyScheme {
    pub fn database_key(database: &str) -> Result<String> {
        validate_database(database)?;
        Ok(database.to_string())
    }

    pub fn meta_key(database: &str) -> Result<String> {
        validate_database(database)?;
        Ok(format!("{}{}{}", database, SEPARATOR, META_SEGMENT))
    }

    pub fn collection_key(database: &str, collection: &str) -> Result<String> {
        validate_database(database)?;
        validate_collection(collection)?;
        Ok(format!("{}{}{}", database, SEPARATOR, collection))
    }

    pub fn document_key(database: &str, collection: &str, id: &str) -> Result<String> {
        let prefix = Self::collection_key(database, collection)?;
        validate_segment("document id", id)?;
        Ok(format!("{}{}{}", prefix, SEPARATOR, id))
    }
}

fn validate_database(database: &str) -> Result<()> {
    validate_segment("database", database)?;
    if database == STAGING_SEGMENT {
        return Err(Error::invalid_argument(format!(
            "database name '{}' is reserved",
            STAGING_SEGMENT
        )));
    }
    Ok(())
}

fn validate_collection(collection: &str) -> Result<()> {
    validate_segment("collection", collection)?;
    if collection == META_SEGMENT {
        return Err(Error::invalid_argument(format!(
            "collection name '{}' is reserved",
            META_SEGMENT
        )));
    }
    Ok(())
}

/// Reject names that could escape their level of the hierarchy
pub fn validate_segment(what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_argument(format!("{} name must not be empty", what)));
    }

    if name == "." || name == ".." {
        return Err(Error::invalid_argument(format!("{} name '{}' is not allowed", what, name)));
    }

    if let Some(c) = name
        .chars()
        .find(|c| *c == SEPARATOR || *c == '\\' || c.is_control())
    {
        return Err(Error::invalid_argument(format!(
            "{} name '{}' contains forbidden character {:?}",
            what, name, c
        )));
    }

    Ok(())
}

/// Split a persister key back into its segments
pub fn segments(key: &str) -> impl Iterator<Item = &str> {
    key.split(SEPARATOR).filter(|segment| !segment.is_empty())
}
