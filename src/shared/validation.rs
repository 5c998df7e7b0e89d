use lazy_static::lazy_static;
use regex::Regex;
use validator::ValidationError;

lazy_static! {
    /// Photo references accepted on a report
    /// - Valid: "https://cdn.example.org/a.jpg", "blob:http://localhost/uuid", "data:image/png;base64,AAA"
    /// - Invalid: "photo.jpg", "ftp://host/a.jpg", "javascript:alert(1)"
    pub static ref PHOTO_URI_REGEX: Regex =
        Regex::new(r"^(?:https?://\S+|blob:\S+|data:image/[a-zA-Z0-9.+-]+[;,]\S*)$").unwrap();
}

/// Rejects empty and whitespace-only strings
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message("must not be blank".into()));
    }
    Ok(())
}

pub fn photo_uris(photos: &[String]) -> Result<(), ValidationError> {
    match photos.iter().find(|p| !PHOTO_URI_REGEX.is_match(p)) {
        Some(bad) => {
            let mut error = ValidationError::new("photo_uri")
                .with_message("photos must be http(s), blob or data:image URIs".into());
            error.add_param("value".into(), bad);
            Err(error)
        }
        None => Ok(()),
    }
}
