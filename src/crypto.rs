//! Streaming encryption of backup archives.
//!
//! Artifacts are encrypted with the age format in passphrase mode. The
//! plaintext provider exists for deployments that encrypt at another layer.

use std::io::{self, Read, Write};

use crate::config::{Config, SymmetricKey};
use crate::error::EncryptionError;

/// Turns a plaintext archive stream into the stored artifact stream and back
pub trait Encryption: Send + Sync {
    /// File name suffix of the stored archive, including the leading dot
    fn archive_suffix(&self) -> &'static str;

    /// Copy `plaintext` into `out` encrypted under `key`, returning the plaintext length
    fn encrypt(
        &self,
        key: &SymmetricKey,
        plaintext: &mut dyn Read,
        out: &mut dyn Write,
    ) -> Result<u64, EncryptionError>;

    /// Inverse of [`Encryption::encrypt`]
    fn decrypt(
        &self,
        key: &SymmetricKey,
        ciphertext: &mut dyn Read,
        out: &mut dyn Write,
    ) -> Result<u64, EncryptionError>;
}

/// Pick the provider the configuration asks for
pub fn provider(config: &Config) -> Result<Box<dyn Encryption>, EncryptionError> {
    if !config.encryption {
        return Ok(Box::new(Plaintext));
    }

    #[cfg(feature = "encryption")]
    {
        Ok(Box::new(AgeEncryption))
    }

    #[cfg(not(feature = "encryption"))]
    {
        Err(EncryptionError::Unavailable)
    }
}

#[cfg(feature = "encryption")]
pub use self::age_provider::AgeEncryption;

#[cfg(feature = "encryption")]
mod age_provider {
    use super::*;
    use age::secrecy::Secret;

    /// Passphrase-based age encryption
    #[derive(Debug, Clone, Copy, Default)]
    pub struct AgeEncryption;

    impl Encryption for AgeEncryption {
        fn archive_suffix(&self) -> &'static str {
            ".tar.age"
        }

        fn encrypt(
            &self,
            key: &SymmetricKey,
            plaintext: &mut dyn Read,
            out: &mut dyn Write,
        ) -> Result<u64, EncryptionError> {
            let encryptor =
                age::Encryptor::with_user_passphrase(Secret::new(key.expose().to_owned()));
            let mut writer = encryptor.wrap_output(out).map_err(io::Error::other)?;
            let copied = io::copy(plaintext, &mut writer)?;
            writer.finish()?;
            Ok(copied)
        }

        fn decrypt(
            &self,
            key: &SymmetricKey,
            ciphertext: &mut dyn Read,
            out: &mut dyn Write,
        ) -> Result<u64, EncryptionError> {
            let decryptor = match age::Decryptor::new(ciphertext).map_err(decrypt_error)? {
                age::Decryptor::Passphrase(decryptor) => decryptor,
                _ => {
                    return Err(EncryptionError::Decrypt {
                        reason: "artifact is not passphrase-encrypted".to_string(),
                    })
                }
            };

            let mut reader = decryptor
                .decrypt(&Secret::new(key.expose().to_owned()), None)
                .map_err(decrypt_error)?;
            Ok(io::copy(&mut reader, out)?)
        }
    }

    fn decrypt_error(err: age::DecryptError) -> EncryptionError {
        EncryptionError::Decrypt {
            reason: err.to_string(),
        }
    }
}

/// Stores archives unencrypted
#[derive(Debug, Clone, Copy, Default)]
pub struct Plaintext;

impl Encryption for Plaintext {
    fn archive_suffix(&self) -> &'static str {
        ".tar"
    }

    fn encrypt(
        &self,
        _key: &SymmetricKey,
        plaintext: &mut dyn Read,
        out: &mut dyn Write,
    ) -> Result<u64, EncryptionError> {
        Ok(io::copy(plaintext, out)?)
    }

    fn decrypt(
        &self,
        _key: &SymmetricKey,
        ciphertext: &mut dyn Read,
        out: &mut dyn Write,
    ) -> Result<u64, EncryptionError> {
        Ok(io::copy(ciphertext, out)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_selection() {
        let mut config = Config::default();
        config.encryption = false;
        assert_eq!(provider(&config).unwrap().archive_suffix(), ".tar");
    }

    #[test]
    fn test_plaintext_copies_stream() {
        let key = SymmetricKey::default();
        let mut out: Vec<u8> = Vec::new();
        let copied = Plaintext
            .encrypt(&key, &mut b"ibdata".as_slice(), &mut out)
            .unwrap();
        assert_eq!(copied, 6);
        assert_eq!(out, b"ibdata");
    }

    #[cfg(feature = "encryption")]
    #[test]
    fn test_age_encrypts_and_decrypts() {
        let key = SymmetricKey::new("hello");
        let plaintext = b"xtrabackup stream contents".repeat(100);

        let mut ciphertext: Vec<u8> = Vec::new();
        AgeEncryption
            .encrypt(&key, &mut plaintext.as_slice(), &mut ciphertext)
            .unwrap();
        assert!(ciphertext.starts_with(b"age-encryption.org/v1"));
        assert!(!ciphertext
            .windows(b"xtrabackup".len())
            .any(|w| w == b"xtrabackup"));

        let mut decrypted: Vec<u8> = Vec::new();
        AgeEncryption
            .decrypt(&key, &mut ciphertext.as_slice(), &mut decrypted)
            .unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[cfg(feature = "encryption")]
    #[test]
    fn test_age_rejects_wrong_key() {
        let mut ciphertext: Vec<u8> = Vec::new();
        AgeEncryption
            .encrypt(
                &SymmetricKey::new("right"),
                &mut b"secret".as_slice(),
                &mut ciphertext,
            )
            .unwrap();

        let mut sink: Vec<u8> = Vec::new();
        let err = AgeEncryption
            .decrypt(
                &SymmetricKey::new("wrong"),
                &mut ciphertext.as_slice(),
                &mut sink,
            )
            .unwrap_err();
        assert!(matches!(err, EncryptionError::Decrypt { .. }));
    }
}
