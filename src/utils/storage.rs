use std::path::{Component, Path, PathBuf};

use actix_web::http::header::DispositionType;
use chrono::Utc;
use mime::Mime;
use tokio::fs;
use uuid::Uuid;

use crate::message::AppError;

pub const DEFAULT_FOLDER: &str = "general";
pub const UPLOAD_FOLDERS: [&str; 4] = ["items", "borrowing-letters", "avatars", "general"];

pub const ALLOWED_EXTENSIONS: [&str; 12] = [
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".pdf", ".doc", ".docx", ".txt", ".zip",
    ".rar",
];

/// A file written under the upload root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub file_name: String,
    /// `folder/file_name`, relative to the upload root.
    pub relative_path: String,
}

/// Local disk storage rooted at the configured upload directory.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
    max_file_size: u64,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>, max_file_size: u64) -> Self {
        Storage {
            root: root.into(),
            max_file_size,
        }
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub async fn ensure_folders(&self) -> std::io::Result<()> {
        for folder in UPLOAD_FOLDERS {
            fs::create_dir_all(self.root.join(folder)).await?;
        }
        Ok(())
    }

    /// Maps a client supplied relative path to a location inside the upload root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, AppError> {
        let path = Path::new(relative);
        let is_plain = !relative.is_empty()
            && path.components().all(|c| matches!(c, Component::Normal(_)));

        if !is_plain {
            return Err(AppError::bad_request("Invalid file path"));
        }
        Ok(self.root.join(path))
    }

    pub async fn save(&self, folder: &str, extension: &str, bytes: &[u8]) -> std::io::Result<StoredFile> {
        let dir = self.root.join(folder);
        fs::create_dir_all(&dir).await?;

        let file_name = unique_file_name(extension);
        fs::write(dir.join(&file_name), bytes).await?;

        Ok(StoredFile {
            relative_path: format!("{folder}/{file_name}"),
            file_name,
        })
    }

    pub async fn read(&self, relative: &str) -> Result<Option<Vec<u8>>, AppError> {
        let path = self.resolve(relative)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes a stored file. Returns `false` when nothing was there.
    pub async fn remove(&self, relative: &str) -> Result<bool, AppError> {
        let path = self.resolve(relative)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Disk cleanup after the database row is already gone; failures are only logged.
    pub async fn remove_best_effort(&self, relative: &str) {
        match self.remove(relative).await {
            Ok(true) => tracing::debug!(path = relative, "removed stored file"),
            Ok(false) => tracing::warn!(path = relative, "stored file already missing"),
            Err(e) => tracing::warn!(path = relative, error = %e, "failed to remove stored file"),
        }
    }
}

/// Folder names are a single `[A-Za-z0-9_-]` segment; blank means the default folder.
pub fn validate_folder(folder: Option<&str>) -> Result<String, AppError> {
    let folder = folder.map(str::trim).filter(|f| !f.is_empty()).unwrap_or(DEFAULT_FOLDER);
    let valid = folder
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(folder.to_string())
    } else {
        Err(AppError::bad_request(format!("Invalid folder: {folder}")))
    }
}

/// Lower-cased extension including the dot, e.g. `.pdf`.
pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
}

pub fn is_allowed_extension(extension: &str) -> bool {
    ALLOWED_EXTENSIONS.contains(&extension)
}

/// `<unix-millis>-<random>` plus the extension.
pub fn unique_file_name(extension: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let random = Uuid::new_v4().simple().to_string();
    format!("{millis}-{}{extension}", &random[..13])
}

pub fn mime_for_extension(extension: &str) -> Mime {
    mime_guess::from_ext(extension.trim_start_matches('.')).first_or_octet_stream()
}

/// Images and PDFs open in the browser unless a download is asked for.
pub fn disposition_for(mime: &Mime, download: bool) -> DispositionType {
    let viewable = mime.type_() == mime::IMAGE || *mime == mime::APPLICATION_PDF;
    if viewable && !download {
        DispositionType::Inline
    } else {
        DispositionType::Attachment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage() -> Storage {
        let root = std::env::temp_dir().join(format!("lab-inventory-{}", Uuid::new_v4()));
        Storage::new(root, 1024)
    }

    #[test]
    fn resolve_rejects_traversal() {
        let storage = Storage::new("/srv/uploads", 10);
        assert!(storage.resolve("../etc/passwd").is_err());
        assert!(storage.resolve("items/../../secret").is_err());
        assert!(storage.resolve("/etc/passwd").is_err());
        assert!(storage.resolve("./items/a.png").is_err());
        assert!(storage.resolve("").is_err());
        assert_eq!(
            storage.resolve("items/a.png").unwrap(),
            PathBuf::from("/srv/uploads/items/a.png")
        );
    }

    #[test]
    fn folder_validation() {
        assert_eq!(validate_folder(None).unwrap(), "general");
        assert_eq!(validate_folder(Some("  ")).unwrap(), "general");
        assert_eq!(validate_folder(Some("borrowing-letters")).unwrap(), "borrowing-letters");
        assert!(validate_folder(Some("../x")).is_err());
        assert!(validate_folder(Some("a/b")).is_err());
    }

    #[test]
    fn extensions_are_lowercased_with_dot() {
        assert_eq!(extension_of("Report.PDF").as_deref(), Some(".pdf"));
        assert_eq!(extension_of("archive.tar.gz").as_deref(), Some(".gz"));
        assert_eq!(extension_of("README"), None);
        assert!(is_allowed_extension(".docx"));
        assert!(!is_allowed_extension(".exe"));
    }

    #[test]
    fn unique_names_keep_extension_and_differ() {
        let a = unique_file_name(".png");
        let b = unique_file_name(".png");
        assert!(a.ends_with(".png"));
        let millis: i64 = a.split('-').next().unwrap().parse().unwrap();
        assert!(millis > 1_600_000_000_000);
        assert_ne!(a, b);
    }

    #[test]
    fn mime_inference() {
        assert_eq!(mime_for_extension(".jpeg"), mime::IMAGE_JPEG);
        assert_eq!(mime_for_extension(".pdf"), mime::APPLICATION_PDF);
        assert_eq!(mime_for_extension(".svg").essence_str(), "image/svg+xml");
        assert_eq!(mime_for_extension(".txt"), mime::TEXT_PLAIN);
        assert_eq!(mime_for_extension(".doc").essence_str(), "application/msword");
        assert_eq!(mime_for_extension(".no-such-ext"), mime::APPLICATION_OCTET_STREAM);
    }

    #[test]
    fn disposition_rules() {
        assert_eq!(disposition_for(&mime::IMAGE_PNG, false), DispositionType::Inline);
        assert_eq!(disposition_for(&mime::APPLICATION_PDF, false), DispositionType::Inline);
        assert_eq!(disposition_for(&mime::IMAGE_PNG, true), DispositionType::Attachment);
        assert_eq!(disposition_for(&mime::TEXT_PLAIN, false), DispositionType::Attachment);
    }

    #[tokio::test]
    async fn save_read_and_remove() {
        let storage = temp_storage();
        storage.ensure_folders().await.unwrap();

        let stored = storage.save("items", ".txt", b"hello").await.unwrap();
        assert!(stored.relative_path.starts_with("items/"));
        assert_eq!(
            storage.read(&stored.relative_path).await.unwrap(),
            Some(b"hello".to_vec())
        );

        assert!(storage.remove(&stored.relative_path).await.unwrap());
        assert!(!storage.remove(&stored.relative_path).await.unwrap());
        assert_eq!(storage.read(&stored.relative_path).await.unwrap(), None);
    }
}
