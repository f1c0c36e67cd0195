/// Structural problems in a course document. The whole document is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("document is empty")]
    Empty,

    #[error("line {line}: expected `Course Title: <title>`, found {found:?}")]
    MissingTitle { line: usize, found: String },

    #[error("line {line}: course title is empty")]
    EmptyTitle { line: usize },

    #[error("line {line}: unrecognized header {found:?}")]
    MalformedHeader { line: usize, found: String },

    #[error("line {line}: invalid lesson number {value:?}")]
    InvalidLessonNumber { line: usize, value: String },

    #[error("line {line}: lesson {number} appears more than once")]
    DuplicateLesson { line: usize, number: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),

    #[cfg(feature = "pdf")]
    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("index error: {0}")]
    Index(#[from] crate::error::IndexError),
}
