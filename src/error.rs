//! Custom error types for foodome

use thiserror::Error;

/// Main error type for foodome operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Crawl error: {0}")]
    Crawl(String),

    /// A compound natural key (name, foodb_id or hmdb_id) was inserted twice.
    /// Catalogs enumerate each entity once per run, so this is surfaced
    /// rather than tolerated.
    #[error("Duplicate compound: {name}")]
    DuplicateCompound { name: String },

    /// The stored FooDB id for a name-matched compound disagrees with the
    /// FooDB id embedded in the HMDB record.
    #[error(
        "Identity conflict for {hmdb_id} ({name}): database holds FooDB id {stored:?}, page embeds {parsed}"
    )]
    IdentityConflict {
        hmdb_id: String,
        name: String,
        stored: Option<String>,
        parsed: String,
    },

    #[error("Crawl ordering violation: {0}")]
    CrawlOrder(String),
}

/// Result type alias for foodome
pub type Result<T> = std::result::Result<T, Error>;
