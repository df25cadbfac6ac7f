//! Upload rules for project attachments.

use crate::error::{AppError, Result};

pub const ALLOWED_EXTENSIONS: [&str; 5] = ["pdf", "doc", "docx", "xls", "xlsx"];

/// Check an upload against the size ceiling and the extension allow-list.
/// `size` is the number of bytes actually received. Returns the normalized
/// (lowercase) extension.
pub fn validate_upload(original_name: &str, size: usize, max_bytes: usize) -> Result<String> {
    if original_name.trim().is_empty() {
        return Err(AppError::validation("file", "The file must have a name"));
    }
    if size == 0 {
        return Err(AppError::validation("file", "The file is empty"));
    }
    if size > max_bytes {
        return Err(AppError::validation(
            "file",
            format!(
                "The file may not be greater than {} kilobytes",
                max_bytes / 1024
            ),
        ));
    }

    let extension = extension_of(original_name).ok_or_else(|| {
        AppError::validation(
            "file",
            format!("The file must be of type: {}", ALLOWED_EXTENSIONS.join(", ")),
        )
    })?;
    Ok(extension)
}

fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    let ext = ext.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

pub fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

/// Strip directory parts and characters that would break a
/// `Content-Disposition` header.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    base.chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect::<String>()
        .trim()
        .to_string()
}

/// `attachment` disposition with an ASCII fallback name and the exact
/// UTF-8 name in `filename*`.
pub fn content_disposition(name: &str) -> String {
    let name = sanitize_filename(name);
    let fallback: String = name
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .collect();

    let mut encoded = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }

    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}
