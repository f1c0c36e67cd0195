use std::path::Path;

use super::{DEFAULT_MAX_FILE_SIZE, DocumentLoader, SourceDocument, check_size};
use crate::course::error::DocumentError;
use crate::vector_store::BoxFuture;

pub struct TextLoader {
    pub max_file_size: u64,
}

impl Default for TextLoader {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentLoader for TextLoader {
    fn load(&self, path: &Path) -> BoxFuture<'_, Result<SourceDocument, DocumentError>> {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            let path = tokio::fs::canonicalize(&path).await?;
            check_size(&path, max_size).await?;
            let bytes = tokio::fs::read(&path).await?;
            Ok(SourceDocument {
                source: path.display().to_string(),
                content: String::from_utf8_lossy(&bytes).into_owned(),
            })
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["txt", "md", "markdown"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("course1_script.txt");
        std::fs::write(&file, "Course Title: Intro to Testing\n").unwrap();

        let doc = TextLoader::default().load(&file).await.unwrap();
        assert_eq!(doc.content, "Course Title: Intro to Testing\n");
        let canonical = std::fs::canonicalize(&file).unwrap();
        assert_eq!(doc.source, canonical.display().to_string());
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("latin1.txt");
        std::fs::write(&file, b"Caf\xe9").unwrap();

        let doc = TextLoader::default().load(&file).await.unwrap();
        assert!(doc.content.starts_with("Caf"));
        assert!(doc.content.contains('\u{fffd}'));
    }

    #[tokio::test]
    async fn load_nonexistent_file() {
        let result = TextLoader::default()
            .load(Path::new("/nonexistent/file.txt"))
            .await;
        assert!(matches!(result, Err(DocumentError::Io(_))));
    }

    #[tokio::test]
    async fn file_too_large_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("big.txt");
        std::fs::write(&file, "x").unwrap();

        let loader = TextLoader { max_file_size: 0 };
        let result = loader.load(&file).await;
        assert!(matches!(result, Err(DocumentError::FileTooLarge(1))));
    }
}
