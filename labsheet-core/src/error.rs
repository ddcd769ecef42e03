#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("spreadsheet not found: {0}")]
    SpreadsheetNotFound(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("invalid collection name: {0}")]
    InvalidCollection(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<opendal::Error> for StoreError {
    fn from(e: opendal::Error) -> Self {
        match e.kind() {
            opendal::ErrorKind::PermissionDenied => StoreError::Unauthorized(e.to_string()),
            _ => StoreError::Transport(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Transport(format!("malformed collection payload: {}", e))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid identifier '{0}': use letters, digits, '_' or '-'")]
    InvalidIdentifier(String),

    #[error("duplicate template type '{0}'")]
    DuplicateTemplateType(String),

    #[error("duplicate key '{key}' in template '{template}'")]
    DuplicateKey { template: String, key: String },

    #[error("duplicate column '{column}' in table '{table}' of template '{template}'")]
    DuplicateColumn {
        template: String,
        table: String,
        column: String,
    },

    #[error("radio field '{key}' in template '{template}' declares no options")]
    RadioWithoutOptions { template: String, key: String },

    #[error("autofill field '{key}' in template '{template}' has no known source")]
    UnknownAutofillSource { template: String, key: String },

    #[error("layout of template '{template}' references unknown {kind} '{key}'")]
    UnknownLayoutReference {
        template: String,
        kind: &'static str,
        key: String,
    },

    #[error("store target is not configured")]
    StoreTargetMissing,

    #[error("invalid store target '{target}': {reason}")]
    InvalidStoreTarget { target: String, reason: String },

    #[error("operator '{0}' is not in the configured roster")]
    UnknownOperator(String),

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FormError {
    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("field '{0}' is filled automatically and cannot be edited")]
    ReadOnly(String),

    #[error("field '{key}' is a {kind} field")]
    WrongKind { key: String, kind: &'static str },

    #[error("'{value}' is not an option of field '{key}'")]
    OptionNotAllowed { key: String, value: String },

    #[error("row {index} is out of range for table '{table}' ({len} rows)")]
    RowOutOfRange {
        table: String,
        index: usize,
        len: usize,
    },

    #[error("column '{column}' of table '{table}' expects a {expected} value")]
    CellType {
        table: String,
        column: String,
        expected: &'static str,
    },

    #[error("column '{column}' of table '{table}' is required")]
    RequiredCell { table: String, column: String },

    #[error("field '{0}' only accepts finite numbers")]
    NotFinite(String),

    #[error("form '{found}' does not belong to template '{expected}'")]
    TemplateMismatch { expected: String, found: String },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no credential available, sign in first")]
    MissingCredential,

    #[error("credential is stale and carries no refresh token")]
    NoRefreshToken,

    #[error("credential refresh failed: {0}")]
    Refresh(String),
}
