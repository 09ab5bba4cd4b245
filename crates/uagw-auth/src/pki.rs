//! Client certificate trust store
//!
//! X.509 parsing and chain validation are the protocol stack's job. What the
//! gateway owns is the trust decision for a certificate it has been handed,
//! which is a lookup in the PKI folder layout shared with the stack:
//!
//! ```text
//! pki/
//! ├── own/certs        server certificate
//! ├── own/private      server private key
//! ├── trusted/certs    explicitly trusted client certificates
//! ├── rejected/certs   refused client certificates (operator moves them to trusted/)
//! └── issuers/certs    CA certificates
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info, warn};
use uagw_core::CertificateInfo;

use crate::error::PkiError;

/// Sub-directories created below the PKI root
pub const PKI_SUBDIRS: [&str; 5] = [
    "own/certs",
    "own/private",
    "trusted/certs",
    "rejected/certs",
    "issuers/certs",
];

/// Extensions a stored certificate may carry
const CERT_EXTENSIONS: [&str; 2] = ["der", "pem"];

/// Trust state of a client certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateVerdict {
    Trusted,
    Rejected,
    /// Not seen before; the policy decides
    Unknown,
}

/// Trust lookup for client certificates
pub trait CertificateVerifier: Send + Sync {
    fn verdict(&self, certificate: &CertificateInfo) -> CertificateVerdict;

    /// Remember a certificate that was refused because it was unknown
    fn record_rejected(&self, _certificate: &CertificateInfo) -> Result<(), PkiError> {
        Ok(())
    }
}

/// Filesystem trust store rooted at a PKI directory
#[derive(Debug, Clone)]
pub struct PkiDirectory {
    root: PathBuf,
}

impl PkiDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trusted_dir(&self) -> PathBuf {
        self.root.join("trusted").join("certs")
    }

    pub fn rejected_dir(&self) -> PathBuf {
        self.root.join("rejected").join("certs")
    }

    /// Create the five PKI sub-directories if missing.
    ///
    /// Idempotent; returns the directories that were actually created.
    pub fn ensure(&self) -> Result<Vec<PathBuf>, PkiError> {
        let mut created = Vec::new();
        for sub in PKI_SUBDIRS {
            let dir = sub
                .split('/')
                .fold(self.root.clone(), |path, part| path.join(part));
            if dir.is_dir() {
                continue;
            }
            std::fs::create_dir_all(&dir).map_err(|source| PkiError::Io {
                path: dir.clone(),
                source,
            })?;
            info!(dir = %dir.display(), "Created PKI directory");
            created.push(dir);
        }
        Ok(created)
    }

    fn stored_in(dir: &Path, thumbprint: &str) -> bool {
        CERT_EXTENSIONS
            .iter()
            .any(|ext| dir.join(format!("{}.{}", thumbprint, ext)).is_file())
    }
}

/// Lowercase a thumbprint and make sure it is plain hex, so it can only
/// ever name a file inside the store.
fn normalize_thumbprint(thumbprint: &str) -> Result<String, PkiError> {
    if !thumbprint.is_empty() && thumbprint.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(thumbprint.to_ascii_lowercase())
    } else {
        Err(PkiError::InvalidThumbprint(thumbprint.to_string()))
    }
}

impl CertificateVerifier for PkiDirectory {
    fn verdict(&self, certificate: &CertificateInfo) -> CertificateVerdict {
        let thumbprint = match normalize_thumbprint(&certificate.thumbprint) {
            Ok(thumbprint) => thumbprint,
            Err(e) => {
                warn!(error = %e, subject = %certificate.subject, "Treating certificate as rejected");
                return CertificateVerdict::Rejected;
            }
        };
        // rejected wins if an operator left a copy in both folders
        if Self::stored_in(&self.rejected_dir(), &thumbprint) {
            CertificateVerdict::Rejected
        } else if Self::stored_in(&self.trusted_dir(), &thumbprint) {
            CertificateVerdict::Trusted
        } else {
            CertificateVerdict::Unknown
        }
    }

    fn record_rejected(&self, certificate: &CertificateInfo) -> Result<(), PkiError> {
        let thumbprint = normalize_thumbprint(&certificate.thumbprint)?;
        let Some(der) = certificate.der.as_deref() else {
            debug!(
                thumbprint = %certificate.thumbprint,
                "No DER bytes for refused certificate, not recorded"
            );
            return Ok(());
        };
        let path = self.rejected_dir().join(format!("{}.der", thumbprint));
        std::fs::write(&path, der).map_err(|source| PkiError::Io {
            path: path.clone(),
            source,
        })?;
        info!(
            thumbprint = %certificate.thumbprint,
            subject = %certificate.subject,
            path = %path.display(),
            "Recorded refused client certificate"
        );
        Ok(())
    }
}

/// In-memory trust list keyed by thumbprint
#[derive(Debug, Default)]
pub struct TrustList {
    trusted: HashSet<String>,
    rejected: RwLock<HashSet<String>>,
}

impl TrustList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trust(mut self, thumbprint: &str) -> Self {
        self.trusted.insert(thumbprint.to_ascii_lowercase());
        self
    }

    pub fn reject(self, thumbprint: &str) -> Self {
        self.rejected.write().insert(thumbprint.to_ascii_lowercase());
        self
    }

    pub fn is_rejected(&self, thumbprint: &str) -> bool {
        self.rejected
            .read()
            .contains(&thumbprint.to_ascii_lowercase())
    }
}

impl CertificateVerifier for TrustList {
    fn verdict(&self, certificate: &CertificateInfo) -> CertificateVerdict {
        let thumbprint = certificate.thumbprint.to_ascii_lowercase();
        if self.rejected.read().contains(&thumbprint) {
            CertificateVerdict::Rejected
        } else if self.trusted.contains(&thumbprint) {
            CertificateVerdict::Trusted
        } else {
            CertificateVerdict::Unknown
        }
    }

    fn record_rejected(&self, certificate: &CertificateInfo) -> Result<(), PkiError> {
        self.rejected
            .write()
            .insert(certificate.thumbprint.to_ascii_lowercase());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_creates_all_subdirs_once() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pki = PkiDirectory::new(tmp.path().join("pki"));

        let created = pki.ensure().unwrap();
        assert_eq!(created.len(), PKI_SUBDIRS.len());
        for sub in PKI_SUBDIRS {
            assert!(pki.root().join(sub).is_dir(), "missing {}", sub);
        }

        let created = pki.ensure().unwrap();
        assert!(created.is_empty());
    }

    #[test]
    fn test_ensure_fills_in_missing_dirs() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("trusted/certs")).unwrap();

        let created = PkiDirectory::new(tmp.path()).ensure().unwrap();
        assert_eq!(created.len(), PKI_SUBDIRS.len() - 1);
    }

    #[test]
    fn test_verdict_from_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pki = PkiDirectory::new(tmp.path());
        pki.ensure().unwrap();

        std::fs::write(pki.trusted_dir().join("aa11.der"), b"cert").unwrap();
        std::fs::write(pki.rejected_dir().join("bb22.pem"), b"cert").unwrap();

        assert_eq!(
            pki.verdict(&CertificateInfo::new("AA11", "CN=hmi")),
            CertificateVerdict::Trusted
        );
        assert_eq!(
            pki.verdict(&CertificateInfo::new("bb22", "CN=rogue")),
            CertificateVerdict::Rejected
        );
        assert_eq!(
            pki.verdict(&CertificateInfo::new("cc33", "CN=new")),
            CertificateVerdict::Unknown
        );
    }

    #[test]
    fn test_record_rejected_writes_der() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pki = PkiDirectory::new(tmp.path());
        pki.ensure().unwrap();

        let mut cert = CertificateInfo::new("dd44", "CN=new");
        cert.der = Some(vec![0x30, 0x82]);
        pki.record_rejected(&cert).unwrap();

        assert_eq!(pki.verdict(&cert), CertificateVerdict::Rejected);
        assert_eq!(
            std::fs::read(pki.rejected_dir().join("dd44.der")).unwrap(),
            vec![0x30, 0x82]
        );
    }

    #[test]
    fn test_record_rejected_refuses_path_like_thumbprint() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pki = PkiDirectory::new(tmp.path().join("pki"));
        pki.ensure().unwrap();

        for bad in ["../../escape", "ab/cd", "", "zz11"] {
            let cert = CertificateInfo {
                thumbprint: bad.to_string(),
                subject: "CN=rogue".to_string(),
                der: Some(vec![0x30]),
            };
            assert!(matches!(
                pki.record_rejected(&cert),
                Err(PkiError::InvalidThumbprint(_))
            ));
            assert_eq!(pki.verdict(&cert), CertificateVerdict::Rejected);
        }
        assert!(!tmp.path().join("escape.der").exists());
        assert_eq!(std::fs::read_dir(pki.rejected_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_directory_verdict_ignores_thumbprint_case() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pki = PkiDirectory::new(tmp.path());
        pki.ensure().unwrap();
        std::fs::write(pki.trusted_dir().join("aa11.der"), b"cert").unwrap();

        let cert = CertificateInfo {
            thumbprint: "AA11".to_string(),
            subject: "CN=hmi".to_string(),
            der: None,
        };
        assert_eq!(pki.verdict(&cert), CertificateVerdict::Trusted);
    }

    #[test]
    fn test_trust_list_verdict_ignores_thumbprint_case() {
        let list = TrustList::new().trust("ab12").reject("cd34");
        let upper = |thumbprint: &str| CertificateInfo {
            thumbprint: thumbprint.to_string(),
            subject: "CN=x".to_string(),
            der: None,
        };
        assert_eq!(list.verdict(&upper("AB12")), CertificateVerdict::Trusted);
        assert_eq!(list.verdict(&upper("CD34")), CertificateVerdict::Rejected);

        list.record_rejected(&upper("EF56")).unwrap();
        assert!(list.is_rejected("ef56"));
    }

    #[test]
    fn test_trust_list() {
        let list = TrustList::new().trust("AA").reject("bb");
        assert_eq!(
            list.verdict(&CertificateInfo::new("aa", "CN=a")),
            CertificateVerdict::Trusted
        );
        assert_eq!(
            list.verdict(&CertificateInfo::new("BB", "CN=b")),
            CertificateVerdict::Rejected
        );

        let unknown = CertificateInfo::new("cc", "CN=c");
        assert_eq!(list.verdict(&unknown), CertificateVerdict::Unknown);
        list.record_rejected(&unknown).unwrap();
        assert!(list.is_rejected("CC"));
    }
}
