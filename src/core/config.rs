use std::env;
use std::path::PathBuf;

/// Environment variable overriding the local data root
pub const DATA_ROOT_ENV: &str = "DEADBASE_DATA_ROOT";
/// Environment variable overriding the default id field
pub const ID_FIELD_ENV: &str = "DEADBASE_ID_FIELD";

pub const DEFAULT_ID_FIELD: &str = "id";

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_path: PathBuf,  // Root directory of the local persister
    pub id_field: String,       // Field holding a document's id on set
}

impl Config {
    /// Read overrides from the process environment.
    ///
    /// An unset `DEADBASE_DATA_ROOT` resolves to `<cwd>/data`.
    pub fn from_env() -> Self {
        let storage_path = match env::var_os(DATA_ROOT_ENV) {
            Some(root) if !root.is_empty() => PathBuf::from(root),
            _ => env::current_dir()
                .map(|cwd| cwd.join("data"))
                .unwrap_or_else(|_| PathBuf::from("./data")),
        };

        let id_field = env::var(ID_FIELD_ENV)
            .ok()
            .filter(|field| !field.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ID_FIELD.to_string());

        Config { storage_path, id_field }
    }

    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = path.into();
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: PathBuf::from("./data"),
            id_field: DEFAULT_ID_FIELD.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_local_data_directory() {
        let config = Config::default();
        assert_eq!(config.storage_path, PathBuf::from("./data"));
        assert_eq!(config.id_field, "id");
    }

    #[test]
    fn storage_path_can_be_overridden() {
        let config = Config::default().with_storage_path("/tmp/deadbase");
        assert_eq!(config.storage_path, PathBuf::from("/tmp/deadbase"));
        assert_eq!(config.id_field, DEFAULT_ID_FIELD);
    }
}
