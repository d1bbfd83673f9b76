use std::path::PathBuf;
use thiserror::Error;

/// Everything that can abort a run.
///
/// Malformed citation markers and documents without citations are not
/// errors; they never reach this type.
#[derive(Error, Debug)]
pub enum CitedupError {
    #[error("cannot read {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("not a valid document package: {0}")]
    Package(#[from] zip::result::ZipError),

    #[error("document package has no {0} part")]
    MissingPart(&'static str),

    #[error("malformed document XML: {0}")]
    Xml(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("output path {0} is the input document; refusing to overwrite it")]
    SameAsInput(PathBuf),

    #[error("report and annotated copy would both be written to {0}")]
    OutputClash(PathBuf),

    #[error("annotation plan refers to unknown citation #{0}")]
    UnknownOccurrence(usize),
}

impl From<quick_xml::Error> for CitedupError {
    fn from(err: quick_xml::Error) -> Self {
        CitedupError::Xml(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CitedupError>;
