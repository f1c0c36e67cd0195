use std::path::Path;

use super::{DEFAULT_MAX_FILE_SIZE, DocumentLoader, SourceDocument, check_size};
use crate::course::error::DocumentError;
use crate::vector_store::BoxFuture;

/// Extracts the text layer of a PDF; the result must still follow the course
/// document format.
pub struct PdfLoader {
    pub max_file_size: u64,
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for PdfLoader {
    fn load(&self, path: &Path) -> BoxFuture<'_, Result<SourceDocument, DocumentError>> {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            let path = tokio::fs::canonicalize(&path).await?;
            check_size(&path, max_size).await?;

            let source = path.display().to_string();
            let content = tokio::task::spawn_blocking(move || {
                pdf_extract::extract_text(&path).map_err(|e| DocumentError::Pdf(e.to_string()))
            })
            .await
            .map_err(|e| DocumentError::Io(std::io::Error::other(e)))??;

            Ok(SourceDocument { source, content })
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn garbage_pdf_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.pdf");
        std::fs::write(&file, b"not a pdf").unwrap();

        let result = PdfLoader::default().load(&file).await;
        assert!(result.is_err());
    }
}
