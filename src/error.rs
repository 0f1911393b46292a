use thiserror::Error;

#[derive(Error, Debug)]
pub enum IcdataError {
    #[error("No corner {0} in the cage")]
    NoCorner(String),
    #[error("No side {0} in the corner")]
    NoSide(String),
    #[error("Different mouse registered as {name}: {details}")]
    DifferentMouse { name: String, details: String },
    #[error("Unable to insert into a frozen dataset")]
    UnableToInsertIntoFrozen,
    #[error("Unknown attribute {path} of {kind}")]
    UnknownAttribute { kind: &'static str, path: String },
    #[error("Duration of an incomplete event cannot be calculated")]
    DurationCannotBeCalculated,
    #[error("Ambiguous timezone change: {0}")]
    AmbiguousTimezoneChange(String),
    #[error("Malformed {table} data: {message}")]
    Malformed { table: &'static str, message: String },
    #[error("Archive error: {0}")]
    Archive(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IcdataError>;

// Helper conversions
impl From<csv::Error> for IcdataError {
    fn from(e: csv::Error) -> Self {
        Self::Malformed { table: "tabular", message: e.to_string() }
    }
}

impl From<zip::result::ZipError> for IcdataError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Archive(e.to_string())
    }
}

impl From<quick_xml::Error> for IcdataError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Malformed { table: "xml", message: e.to_string() }
    }
}
