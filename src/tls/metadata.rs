use serde::Serialize;

/// Server certificate details read during the inspection handshake
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CertificateInfo {
    /// Certificate subject DN
    pub subject: String,
    /// Certificate issuer DN
    pub issuer: String,
    /// Expiry timestamp (RFC 3339)
    pub not_after: String,
    /// Days until certificate expiration (negative if expired)
    pub expiry_days: i64,
}

impl CertificateInfo {
    /// Subject and issuer are equal for self-signed certificates
    #[must_use]
    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer
    }

    #[must_use]
    pub const fn is_expired(&self) -> bool {
        self.expiry_days < 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_info_default() {
        let info = CertificateInfo::default();
        assert!(info.subject.is_empty());
        assert!(info.issuer.is_empty());
        assert_eq!(info.expiry_days, 0);
        assert!(!info.is_expired());
    }

    #[test]
    fn test_certificate_info_self_signed() {
        let info = CertificateInfo {
            subject: "CN=db.internal".to_string(),
            issuer: "CN=db.internal".to_string(),
            not_after: "2030-01-01T00:00:00Z".to_string(),
            expiry_days: 365,
        };
        assert!(info.is_self_signed());

        let issued = CertificateInfo {
            issuer: "CN=Internal CA".to_string(),
            ..info
        };
        assert!(!issued.is_self_signed());
    }

    #[test]
    fn test_certificate_info_expired() {
        let info = CertificateInfo {
            expiry_days: -3,
            ..Default::default()
        };
        assert!(info.is_expired());
    }
}
