use std::fmt;

/// Which part of a serialized-weights document was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatErrorKind {
    /// Input was empty or whitespace only.
    Empty,
    /// Input is not well-formed text in the weights grammar.
    Syntax,
    /// A required key is absent.
    MissingField,
    /// A value has the wrong rank, is ragged, or disagrees with another field's size.
    Shape,
    /// A token where a finite number was expected.
    Numeric,
}

impl fmt::Display for FormatErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FormatErrorKind::Empty => "empty input",
            FormatErrorKind::Syntax => "syntax error",
            FormatErrorKind::MissingField => "missing field",
            FormatErrorKind::Shape => "bad shape",
            FormatErrorKind::Numeric => "invalid number",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub enum Error {
    DimensionMismatch(String),
    InvalidWeightsFormat {
        field: String,
        kind: FormatErrorKind,
        detail: String,
    },
    InvalidConfig(String),
    InvalidData(String),
    NonFiniteLoss {
        epoch: usize,
    },
    Io(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn format(
        field: impl Into<String>,
        kind: FormatErrorKind,
        detail: impl Into<String>,
    ) -> Self {
        Error::InvalidWeightsFormat {
            field: field.into(),
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DimensionMismatch(msg) => write!(f, "dimension mismatch: {msg}"),
            Error::InvalidWeightsFormat {
                field,
                kind,
                detail,
            } => write!(f, "invalid weights format at {field}: {kind}: {detail}"),
            Error::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Error::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Error::NonFiniteLoss { epoch } => {
                write!(f, "loss became non-finite at epoch {epoch}")
            }
            Error::Io(msg) => write!(f, "i/o error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}
