//! Loading a local file as a message attachment.

use std::error::Error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::config::data::path_display;
use crate::core::config::settings::UserSettings;
use crate::core::message::FileAttachment;

/// Extensions whose content is read as text and sent to the model.
pub const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "csv", "json", "py", "js", "jsx", "ts", "tsx", "html", "css", "md", "xml", "yml", "yaml",
];

#[derive(Debug)]
pub enum AttachmentError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    TooLarge {
        filename: String,
        size: u64,
        limit: u64,
    },
    TypeNotAllowed {
        filename: String,
        extension: String,
    },
}

impl fmt::Display for AttachmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentError::Read { path, source } => {
                write!(f, "Failed to read {}: {}", path_display(path), source)
            }
            AttachmentError::TooLarge {
                filename,
                size,
                limit,
            } => write!(
                f,
                "{filename} is {} which exceeds the {} limit",
                format_file_size(*size),
                format_file_size(*limit)
            ),
            AttachmentError::TypeNotAllowed {
                filename,
                extension,
            } if extension.is_empty() => {
                write!(f, "{filename} has no extension and cannot be attached")
            }
            AttachmentError::TypeNotAllowed {
                filename,
                extension,
            } => write!(f, "Files of type .{extension} are not allowed ({filename})"),
        }
    }
}

impl Error for AttachmentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AttachmentError::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A file read from disk and checked against the user's limits.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAttachment {
    pub path: PathBuf,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    pub bytes: Vec<u8>,
    /// Present for recognized text extensions
    pub text_content: Option<String>,
}

impl PendingAttachment {
    pub fn load(path: &Path, settings: &UserSettings) -> Result<Self, AttachmentError> {
        let read_error = |source| AttachmentError::Read {
            path: path.to_path_buf(),
            source,
        };

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let extension = extension_of(&filename);

        if !settings.is_file_type_allowed(&extension) || extension.is_empty() {
            return Err(AttachmentError::TypeNotAllowed {
                filename,
                extension,
            });
        }

        let size = fs::metadata(path).map_err(read_error)?.len();
        if size > settings.max_file_size {
            return Err(AttachmentError::TooLarge {
                filename,
                size,
                limit: settings.max_file_size,
            });
        }

        let bytes = fs::read(path).map_err(read_error)?;
        let text_content = is_text_extension(&extension)
            .then(|| String::from_utf8_lossy(&bytes).into_owned());
        debug!(filename = %filename, size, text = text_content.is_some(), "Loaded attachment");

        Ok(Self {
            path: path.to_path_buf(),
            mime_type: mime_type_for(&extension).to_string(),
            filename,
            size: bytes.len() as u64,
            bytes,
            text_content,
        })
    }

    /// Metadata shown alongside the user message before it is uploaded.
    pub fn to_attachment(&self) -> FileAttachment {
        FileAttachment {
            id: None,
            message_id: None,
            filename: self.filename.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size,
            text_content: self.text_content.clone(),
            url: None,
        }
    }
}

pub fn extension_of(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

pub fn is_text_extension(extension: &str) -> bool {
    TEXT_EXTENSIONS.contains(&extension)
}

pub fn mime_type_for(extension: &str) -> &'static str {
    match extension {
        "txt" => "text/plain",
        "csv" => "text/csv",
        "json" => "application/json",
        "py" => "text/x-python",
        "js" | "jsx" => "text/javascript",
        "ts" | "tsx" => "text/typescript",
        "html" => "text/html",
        "css" => "text/css",
        "md" => "text/markdown",
        "xml" => "application/xml",
        "yml" | "yaml" => "application/yaml",
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Replace every character outside `[A-Za-z0-9.-]` with `_`.
pub fn sanitize_storage_name(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `{user_id}/{epoch_millis}_{sanitized_name}`
pub fn storage_path(user_id: &str, epoch_millis: i64, filename: &str) -> String {
    format!("{user_id}/{epoch_millis}_{}", sanitize_storage_name(filename))
}

/// Human-readable size with at most two decimals, e.g. `1.5 KB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn loads_text_files_with_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notas.MD");
        fs::write(&path, "# título").unwrap();

        let pending = PendingAttachment::load(&path, &UserSettings::default()).unwrap();
        assert_eq!(pending.filename, "notas.MD");
        assert_eq!(pending.mime_type, "text/markdown");
        assert_eq!(pending.size, "# título".len() as u64);
        assert_eq!(pending.text_content.as_deref(), Some("# título"));

        let attachment = pending.to_attachment();
        assert_eq!(attachment.filename, "notas.MD");
        assert!(attachment.url.is_none());
    }

    #[test]
    fn binary_types_carry_no_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.png");
        fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let pending = PendingAttachment::load(&path, &UserSettings::default()).unwrap();
        assert_eq!(pending.mime_type, "image/png");
        assert!(pending.text_content.is_none());
        assert_eq!(pending.bytes.len(), 4);
    }

    #[test]
    fn rejects_disallowed_and_oversized_files() {
        let dir = TempDir::new().unwrap();
        let exe = dir.path().join("tool.exe");
        fs::write(&exe, "MZ").unwrap();
        assert!(matches!(
            PendingAttachment::load(&exe, &UserSettings::default()),
            Err(AttachmentError::TypeNotAllowed { .. })
        ));

        let bare = dir.path().join("Makefile");
        fs::write(&bare, "all:").unwrap();
        assert!(matches!(
            PendingAttachment::load(&bare, &UserSettings::default()),
            Err(AttachmentError::TypeNotAllowed { .. })
        ));

        let big = dir.path().join("big.txt");
        fs::write(&big, vec![b'a'; 2048]).unwrap();
        let settings = UserSettings {
            max_file_size: 1024,
            ..UserSettings::default()
        };
        let err = PendingAttachment::load(&big, &settings).unwrap_err();
        assert_eq!(err.to_string(), "big.txt is 2 KB which exceeds the 1 KB limit");
    }

    #[test]
    fn missing_files_are_read_errors() {
        let dir = TempDir::new().unwrap();
        let err = PendingAttachment::load(&dir.path().join("gone.txt"), &UserSettings::default())
            .unwrap_err();
        assert!(matches!(err, AttachmentError::Read { .. }));
    }

    #[test]
    fn storage_names_are_sanitized() {
        assert_eq!(sanitize_storage_name("relatório final (v2).pdf"), "relat_rio_final__v2_.pdf");
        assert_eq!(
            storage_path("user-1", 1_700_000_000_000, "a b.txt"),
            "user-1/1700000000000_a_b.txt"
        );
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1500), "1.46 KB");
        assert_eq!(format_file_size(50 * 1024 * 1024), "50 MB");
    }

    #[test]
    fn extension_handles_dotfiles() {
        assert_eq!(extension_of("archive.tar.GZ"), "gz");
        assert_eq!(extension_of(".bashrc"), "");
        assert_eq!(extension_of("README"), "");
    }
}
