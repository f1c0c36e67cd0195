mod text;
#[cfg(feature = "pdf")]
mod pdf;

use std::path::Path;

#[cfg(feature = "pdf")]
pub use pdf::PdfLoader;
pub use text::TextLoader;

use super::error::DocumentError;
use crate::vector_store::BoxFuture;

/// Default maximum file size: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Raw course text read from disk, before parsing.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub source: String,
    pub content: String,
}

pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> BoxFuture<'_, Result<SourceDocument, DocumentError>>;

    fn supported_extensions(&self) -> &[&str];
}

/// Pick the loader responsible for `path` by extension.
#[must_use]
pub fn loader_for(path: &Path) -> Option<Box<dyn DocumentLoader>> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let text = TextLoader::default();
    if text.supported_extensions().contains(&ext.as_str()) {
        return Some(Box::new(text));
    }
    #[cfg(feature = "pdf")]
    {
        let pdf = PdfLoader::default();
        if pdf.supported_extensions().contains(&ext.as_str()) {
            return Some(Box::new(pdf));
        }
    }
    None
}

pub(crate) async fn check_size(path: &Path, max_size: u64) -> Result<(), DocumentError> {
    let meta = tokio::fs::metadata(path).await?;
    if meta.len() > max_size {
        return Err(DocumentError::FileTooLarge(meta.len()));
    }
    Ok(())
}
