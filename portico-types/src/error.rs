use thiserror::Error;

/// Error returned when an identity or endpoint string cannot be parsed
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("identity `{0}` ends with a dangling escape")]
    DanglingEscape(String),

    #[error("identity `{0}` contains more than one unescaped `/`")]
    TooManySlashes(String),

    #[error("endpoint list `{0}` contains an empty endpoint")]
    EmptyEndpoint(String),

    #[error("endpoint `{0}` has an unterminated quote")]
    UnterminatedQuote(String),

    #[error("endpoint `{endpoint}`: invalid transport `{transport}`")]
    InvalidTransport { endpoint: String, transport: String },

    #[error("endpoint `{endpoint}`: option `{option}` requires an argument")]
    MissingArgument { endpoint: String, option: String },

    #[error("endpoint `{endpoint}`: unknown option `{option}`")]
    UnknownOption { endpoint: String, option: String },

    #[error("endpoint `{endpoint}`: invalid port `{value}`")]
    InvalidPort { endpoint: String, value: String },

    #[error("endpoint `{endpoint}`: invalid timeout `{value}`")]
    InvalidTimeout { endpoint: String, value: String },
}
