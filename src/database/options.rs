use url::Url;

use crate::database::constants::DATABASE_PLUGIN_NAME;
use crate::database::error::{invalid_argument, DatabaseResult};

/// Configuration of a [`Database`](crate::database::Database) instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseOptions {
    /// Store identifier. `None` (or empty) selects the default store.
    pub database_url: Option<String>,
    /// Plugin name every bridge call is addressed to.
    pub plugin_name: String,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            database_url: None,
            plugin_name: DATABASE_PLUGIN_NAME.to_string(),
        }
    }
}

impl DatabaseOptions {
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_plugin_name(mut self, name: impl Into<String>) -> Self {
        self.plugin_name = name.into();
        self
    }

    pub(crate) fn validate(&self) -> DatabaseResult<()> {
        if self.plugin_name.trim().is_empty() {
            return Err(invalid_argument("plugin name cannot be empty"));
        }
        match self.database_url.as_deref() {
            None | Some("") => Ok(()),
            Some(raw) => Url::parse(raw)
                .map(|_| ())
                .map_err(|err| invalid_argument(format!("invalid database URL '{raw}': {err}"))),
        }
    }

    /// The URL exactly as it travels over the bridge; empty for the default store.
    pub(crate) fn store_url(&self) -> String {
        self.database_url.clone().unwrap_or_default()
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn default_targets_default_store() {
        let options = DatabaseOptions::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.store_url(), "");
        assert_eq!(options.plugin_name, "FirebaseDatabase");
    }

    #[test]
    fn url_is_validated_but_kept_verbatim() {
        let options =
            DatabaseOptions::default().with_database_url("https://demo-default-rtdb.example.com");
        assert!(options.validate().is_ok());
        assert_eq!(options.store_url(), "https://demo-default-rtdb.example.com");

        let err = DatabaseOptions::default()
            .with_database_url("not a url")
            .validate()
            .unwrap_err();
        assert_eq!(err.code_str(), "database/invalid-argument");
    }

    #[test]
    fn empty_plugin_name_is_rejected() {
        let err = DatabaseOptions::default()
            .with_plugin_name(" ")
            .validate()
            .unwrap_err();
        assert_eq!(err.code_str(), "database/invalid-argument");
    }
}
