/// What a scanned code turned out to contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanPayload {
    Email(String),
    Text(String),
}

impl ScanPayload {
    pub fn email(&self) -> Option<&str> {
        match self {
            ScanPayload::Email(address) => Some(address),
            ScanPayload::Text(_) => None,
        }
    }
}

/// Classify decoded QR text.
///
/// `mailto:` links yield their address (query part dropped), bare addresses
/// are recognised, anything else is kept verbatim.
pub fn classify(raw: &str) -> ScanPayload {
    let trimmed = raw.trim();

    if let Some(rest) = trimmed.strip_prefix("mailto:") {
        let address = rest.split('?').next().unwrap_or_default().trim();
        if !address.is_empty() {
            return ScanPayload::Email(address.to_string());
        }
    }

    if is_email(trimmed) {
        return ScanPayload::Email(trimmed.to_string());
    }

    ScanPayload::Text(raw.to_string())
}

/// `local@domain.tld` with no whitespace and exactly one `@`.
pub fn is_email(candidate: &str) -> bool {
    if candidate.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = candidate.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    if local.is_empty() {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailto_is_stripped() {
        assert_eq!(
            classify("mailto:parent@example.com"),
            ScanPayload::Email("parent@example.com".to_string())
        );
        assert_eq!(
            classify("mailto:parent@example.com?subject=hi"),
            ScanPayload::Email("parent@example.com".to_string())
        );
    }

    #[test]
    fn test_plain_email() {
        assert_eq!(
            classify(" hello@example.com "),
            ScanPayload::Email("hello@example.com".to_string())
        );
    }

    #[test]
    fn test_other_text_is_kept() {
        assert_eq!(
            classify("https://example.com/student/42"),
            ScanPayload::Text("https://example.com/student/42".to_string())
        );
        assert_eq!(classify("mailto:"), ScanPayload::Text("mailto:".to_string()));
    }

    #[test]
    fn test_is_email_edges() {
        assert!(is_email("a@b.co"));
        assert!(!is_email("a@b."));
        assert!(!is_email("a@.b"));
        assert!(!is_email("@b.co"));
        assert!(!is_email("a@b@c.co"));
        assert!(!is_email("a b@c.co"));
    }
}
