//! Document loading.
//!
//! Turns source files into per-page text records. PDFs yield one record per
//! page (0-based); plain text and markdown yield a single page 0.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::RagError;

const PDF_EXTENSIONS: [&str; 1] = ["pdf"];
const TEXT_EXTENSIONS: [&str; 3] = ["txt", "md", "markdown"];

/// Text of one page (or of a whole unpaginated document).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    pub source: String,
    pub page: u32,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Pdf,
    Text,
}

fn document_kind(path: &Path) -> Option<DocumentKind> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    if PDF_EXTENSIONS.contains(&ext.as_str()) {
        Some(DocumentKind::Pdf)
    } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        Some(DocumentKind::Text)
    } else {
        None
    }
}

pub fn is_supported(path: &Path) -> bool {
    document_kind(path).is_some()
}

#[derive(Debug, Clone, Default)]
pub struct DocumentLoader;

impl DocumentLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load every supported document under `dir`, recursively, in sorted path
    /// order. Sources are paths relative to `dir`. A missing directory is empty.
    pub async fn load_dir(&self, dir: &Path) -> Result<Vec<PageText>, RagError> {
        if !dir.exists() {
            tracing::debug!("Document directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }

        let root = dir.to_path_buf();
        let mut files = tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            collect_files(&root, &mut files).map(|()| files)
        })
        .await
        .map_err(|e| RagError::DocumentLoad(format!("Task join error: {}", e)))??;
        files.sort();

        let mut pages = Vec::new();
        for path in files {
            if !is_supported(&path) {
                tracing::debug!("Skipping unsupported file {}", path.display());
                continue;
            }
            let source = path
                .strip_prefix(dir)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            pages.extend(self.load_file(&path, &source).await?);
        }

        tracing::info!("Loaded {} pages from {}", pages.len(), dir.display());
        Ok(pages)
    }

    pub async fn load_file(&self, path: &Path, source: &str) -> Result<Vec<PageText>, RagError> {
        let kind = document_kind(path)
            .ok_or_else(|| RagError::UnsupportedDocument(path.display().to_string()))?;
        let bytes = tokio::fs::read(path).await?;
        self.load_bytes(kind, bytes, source).await
    }

    /// Parse an upload held in memory; the kind comes from `source`'s extension.
    pub async fn load_upload(&self, bytes: Vec<u8>, source: &str) -> Result<Vec<PageText>, RagError> {
        let kind = document_kind(Path::new(source))
            .ok_or_else(|| RagError::UnsupportedDocument(source.to_string()))?;
        self.load_bytes(kind, bytes, source).await
    }

    async fn load_bytes(
        &self,
        kind: DocumentKind,
        bytes: Vec<u8>,
        source: &str,
    ) -> Result<Vec<PageText>, RagError> {
        match kind {
            DocumentKind::Text => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                Ok(vec![PageText {
                    source: source.to_string(),
                    page: 0,
                    text,
                }])
            }
            DocumentKind::Pdf => {
                let source = source.to_string();
                tokio::task::spawn_blocking(move || extract_pdf_pages(&bytes, &source))
                    .await
                    .map_err(|e| RagError::DocumentLoad(format!("Task join error: {}", e)))?
            }
        }
    }
}

/// Symlinks are not followed, so a link back up the tree cannot recurse forever.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), RagError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let path = entry.path();
        if file_type.is_symlink() {
            tracing::debug!("Skipping symlink {}", path.display());
        } else if file_type.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn extract_pdf_pages(bytes: &[u8], source: &str) -> Result<Vec<PageText>, RagError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| RagError::DocumentLoad(format!("{}: {}", source, e)))?;

    let mut pages = Vec::new();
    // get_pages is keyed by 1-based page number, in page order
    for page_number in doc.get_pages().keys() {
        let text = match doc.extract_text(&[*page_number]) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Failed to extract page {} of {}: {}", page_number, source, e);
                String::new()
            }
        };
        pages.push(PageText {
            source: source.to_string(),
            page: page_number - 1,
            text,
        });
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_directory_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let pages = DocumentLoader::new()
            .load_dir(&tmp.path().join("nope"))
            .await
            .unwrap();
        assert!(pages.is_empty());
    }

    #[tokio::test]
    async fn text_files_load_as_page_zero_in_sorted_order() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b.txt"), "second").unwrap();
        std::fs::write(tmp.path().join("a.md"), "# first").unwrap();
        std::fs::write(tmp.path().join("image.png"), [0u8, 1, 2]).unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("nested").join("c.txt"), "third").unwrap();

        let pages = DocumentLoader::new().load_dir(tmp.path()).await.unwrap();

        let sources: Vec<&str> = pages.iter().map(|p| p.source.as_str()).collect();
        assert_eq!(sources, vec!["a.md", "b.txt", "nested/c.txt"]);
        assert!(pages.iter().all(|p| p.page == 0));
        assert_eq!(pages[1].text, "second");
    }

    #[tokio::test]
    async fn unsupported_single_file_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sheet.xlsx");
        std::fs::write(&path, "data").unwrap();

        let err = DocumentLoader::new()
            .load_file(&path, "sheet.xlsx")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::UnsupportedDocument(_)));
    }

    #[tokio::test]
    async fn corrupt_pdf_reports_load_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.pdf");
        std::fs::write(&path, "not really a pdf").unwrap();

        let err = DocumentLoader::new()
            .load_file(&path, "broken.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::DocumentLoad(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinked_directories_are_not_followed() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("nested").join("c.txt"), "third").unwrap();
        std::fs::write(tmp.path().join("a.txt"), "first").unwrap();
        // points back at the root
        std::os::unix::fs::symlink(tmp.path(), tmp.path().join("nested").join("loop")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("a.txt"), tmp.path().join("alias.txt")).unwrap();

        let pages = DocumentLoader::new().load_dir(tmp.path()).await.unwrap();

        let sources: Vec<&str> = pages.iter().map(|p| p.source.as_str()).collect();
        assert_eq!(sources, vec!["a.txt", "nested/c.txt"]);
    }

    #[tokio::test]
    async fn upload_kind_follows_the_name() {
        let loader = DocumentLoader::new();

        let pages = loader.load_upload(b"hello".to_vec(), "notes.md").await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].source, "notes.md");
        assert_eq!(pages[0].text, "hello");

        let err = loader.load_upload(b"garbage".to_vec(), "report.pdf").await.unwrap_err();
        assert!(matches!(err, RagError::DocumentLoad(_)));

        let err = loader.load_upload(b"data".to_vec(), "sheet.xlsx").await.unwrap_err();
        assert!(matches!(err, RagError::UnsupportedDocument(_)));
    }

    #[test]
    fn supported_extensions_are_case_insensitive() {
        assert!(is_supported(Path::new("Report.PDF")));
        assert!(is_supported(Path::new("notes.md")));
        assert!(!is_supported(Path::new("archive.zip")));
        assert!(!is_supported(Path::new("README")));
    }
}
