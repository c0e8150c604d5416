//! Upload checks performed on the in-memory file, before any workspace exists.

use crate::error::InputRejection;

pub const MAX_ORIGINAL_FILENAME_LEN: usize = 200;

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    // Some browsers send this for pptx
    "application/octet-stream",
];

/// The two accepted presentation container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckKind {
    /// OLE2 compound document
    Ppt,
    /// Office Open XML (zip)
    Pptx,
}

impl DeckKind {
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "ppt" => Some(DeckKind::Ppt),
            "pptx" => Some(DeckKind::Pptx),
            _ => None,
        }
    }

    pub fn magic(&self) -> &'static [u8; 4] {
        match self {
            DeckKind::Ppt => &[0xD0, 0xCF, 0x11, 0xE0],
            DeckKind::Pptx => &[0x50, 0x4B, 0x03, 0x04],
        }
    }

    pub fn matches_signature(&self, data: &[u8]) -> bool {
        data.starts_with(self.magic())
    }
}

/// An upload as received at the boundary.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Validate an upload. Order: size, name length, extension, MIME, signature.
pub fn validate_upload(upload: &Upload, max_bytes: u64) -> Result<DeckKind, InputRejection> {
    let size = upload.data.len() as u64;
    if size > max_bytes {
        return Err(InputRejection::TooLarge { size, max: max_bytes });
    }

    if upload.filename.len() > MAX_ORIGINAL_FILENAME_LEN {
        return Err(InputRejection::FilenameTooLong(upload.filename.len()));
    }

    let extension = upload
        .filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_string())
        .unwrap_or_default();
    let kind = DeckKind::from_filename(&upload.filename)
        .ok_or(InputRejection::Extension(extension))?;

    let content_type = upload.content_type.clone().unwrap_or_default();
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if !ALLOWED_MIME_TYPES.contains(&essence.as_str()) {
        return Err(InputRejection::MimeType(content_type));
    }

    if !kind.matches_signature(&upload.data) {
        return Err(InputRejection::Signature);
    }

    Ok(kind)
}
