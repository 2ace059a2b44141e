//! Storage URL parsing

use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::study::error::StorageError;

/// Schemes of SQL servers that are recognised but not provided.
const SERVER_SCHEMES: &[&str] = &["mysql", "postgresql", "postgres", "mssql", "oracle"];

/// A parsed storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageUrl {
    /// Embedded database file: `sqlite:///relative.db` or `sqlite:////abs/path.db`.
    Sqlite(PathBuf),
}

fn url_regex() -> &'static Regex {
    static URL: OnceLock<Regex> = OnceLock::new();
    URL.get_or_init(|| {
        Regex::new(r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.\-]*)://(?P<rest>.*)$")
            .expect("storage url regex is valid")
    })
}

impl StorageUrl {
    pub fn parse(url: &str) -> Result<Self, StorageError> {
        let caps = url_regex()
            .captures(url.trim())
            .ok_or_else(|| StorageError::InvalidUrl(url.to_string()))?;

        let scheme = caps["scheme"].to_lowercase();
        // Dialect suffixes such as "mysql+pymysql" select drivers of the same backend.
        let backend = scheme.split('+').next().unwrap_or(&scheme).to_string();
        let rest = &caps["rest"];

        match backend.as_str() {
            "sqlite" => {
                // sqlite:///x.db -> "/x.db" -> "x.db"; sqlite:////abs.db -> "//abs.db" -> "/abs.db"
                let path = rest
                    .strip_prefix('/')
                    .ok_or_else(|| StorageError::InvalidUrl(url.to_string()))?;
                if path.is_empty() {
                    return Err(StorageError::InvalidUrl(url.to_string()));
                }
                Ok(Self::Sqlite(PathBuf::from(path)))
            }
            server if SERVER_SCHEMES.contains(&server) => Err(StorageError::ServerBackend {
                url: url.to_string(),
                scheme,
            }),
            _ => Err(StorageError::UnsupportedBackend {
                url: url.to_string(),
                scheme,
            }),
        }
    }
}
