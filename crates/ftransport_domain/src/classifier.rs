use thiserror::Error;

use crate::model::{DriveType, UrlValidation};

const GOOGLE_DOMAINS: &[&str] = &["drive.google.com", "docs.google.com"];
const ONEDRIVE_DOMAINS: &[&str] = &[
    "onedrive.live.com",
    "onedrive.com",
    "1drv.ms",
    "sharepoint.com",
];
const DROPBOX_DOMAINS: &[&str] = &["dropbox.com", "db.tt"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("invalid URL format: {0}")]
    Malformed(String),
    #[error("unable to detect drive type from URL: {0}")]
    UnrecognizedProvider(String),
}

/// Determine which provider a share URL belongs to by matching its host
/// against the known domain lists.
pub fn detect_drive_type(url: &str) -> Result<DriveType, ClassifyError> {
    let host = host_of(url).ok_or_else(|| ClassifyError::Malformed(url.to_string()))?;

    if GOOGLE_DOMAINS.iter().any(|d| host.contains(d)) {
        return Ok(DriveType::GoogleDrive);
    }
    if ONEDRIVE_DOMAINS.iter().any(|d| host.contains(d)) {
        return Ok(DriveType::Onedrive);
    }
    if DROPBOX_DOMAINS.iter().any(|d| host.contains(d)) {
        return Ok(DriveType::Dropbox);
    }

    Err(ClassifyError::UnrecognizedProvider(url.to_string()))
}

/// Structural validation of a share URL. Accessibility is not probed here;
/// the flag is reserved for a live connectivity check in front of the
/// provider API.
pub fn validate_drive_url(url: &str) -> UrlValidation {
    match detect_drive_type(url) {
        Ok(drive_type) => UrlValidation {
            valid: true,
            drive_type: Some(drive_type),
            accessible: true,
            error_message: None,
        },
        Err(err) => UrlValidation {
            valid: false,
            drive_type: None,
            accessible: false,
            error_message: Some(err.to_string()),
        },
    }
}

/// Lowercased host portion of a URL, or None when the scheme or host is
/// missing.
fn host_of(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("://")?;
    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .filter(|a| !a.is_empty())?;
    let host = authority
        .rsplit_once('@')
        .map(|(_, h)| h)
        .unwrap_or(authority);
    let host = host.split(':').next().unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_google_drive_urls() {
        assert_eq!(
            detect_drive_type("https://drive.google.com/drive/folders/XYZ123"),
            Ok(DriveType::GoogleDrive)
        );
        assert_eq!(
            detect_drive_type("https://docs.google.com/folder/abc"),
            Ok(DriveType::GoogleDrive)
        );
    }

    #[test]
    fn classifies_onedrive_and_dropbox_urls() {
        assert_eq!(
            detect_drive_type("https://onedrive.live.com/?id=root"),
            Ok(DriveType::Onedrive)
        );
        assert_eq!(
            detect_drive_type("https://contoso.sharepoint.com/sites/files"),
            Ok(DriveType::Onedrive)
        );
        assert_eq!(
            detect_drive_type("https://www.dropbox.com/sh/abc"),
            Ok(DriveType::Dropbox)
        );
        assert_eq!(
            detect_drive_type("https://db.tt/abc"),
            Ok(DriveType::Dropbox)
        );
    }

    #[test]
    fn host_match_is_case_insensitive() {
        assert_eq!(
            detect_drive_type("https://Drive.Google.Com/drive/folders/XYZ"),
            Ok(DriveType::GoogleDrive)
        );
    }

    #[test]
    fn unknown_host_is_rejected() {
        let err = detect_drive_type("https://unknown-cloud.example.com/folder").unwrap_err();
        assert!(matches!(err, ClassifyError::UnrecognizedProvider(_)));
    }

    #[test]
    fn missing_scheme_is_malformed() {
        let err = detect_drive_type("drive.google.com/folders/XYZ").unwrap_err();
        assert!(matches!(err, ClassifyError::Malformed(_)));
    }

    #[test]
    fn validate_reports_structured_result() {
        let ok = validate_drive_url("https://drive.google.com/drive/folders/XYZ123");
        assert!(ok.valid);
        assert!(ok.accessible);
        assert_eq!(ok.drive_type, Some(DriveType::GoogleDrive));
        assert!(ok.error_message.is_none());

        let bad = validate_drive_url("https://unknown-cloud.example.com/folder");
        assert!(!bad.valid);
        assert!(!bad.accessible);
        assert!(bad.drive_type.is_none());
        assert!(bad.error_message.is_some());

        let malformed = validate_drive_url("not a url");
        assert!(!malformed.valid);
        assert!(malformed.error_message.unwrap().contains("invalid URL format"));
    }
}
