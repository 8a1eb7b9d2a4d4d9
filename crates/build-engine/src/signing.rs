//! Release Signing
//!
//! Keystore generation with `keytool`, and the per-project signing setup that
//! is handed to Gradle as `-PANDROID_SIGNING_*` properties.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use droid_lite_core::{CoreError, SecretStore, StateStore};

use crate::BuildError;

pub const KEYSTORE_CONFIG_KEY: &str = "android.signing.keystore";
pub const STORE_PASSWORD_KEY: &str = "android.signing.storePassword";
pub const KEY_PASSWORD_KEY: &str = "android.signing.keyPassword";

const MIN_PASSWORD_LEN: usize = 6;

/// Certificate fields for a new signing key
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    pub alias: String,
    pub store_password: String,
    pub key_password: String,
    pub validity_days: u32,
    pub common_name: String,
    pub organizational_unit: String,
    pub organization: String,
    pub locality: String,
    pub state: String,
    /// Two-letter country code
    pub country: String,
}

impl Default for CertificateInfo {
    fn default() -> Self {
        Self {
            alias: "release".to_string(),
            store_password: String::new(),
            key_password: String::new(),
            validity_days: 10000,
            common_name: String::new(),
            organizational_unit: String::new(),
            organization: String::new(),
            locality: String::new(),
            state: String::new(),
            country: String::new(),
        }
    }
}

impl CertificateInfo {
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.alias.trim().is_empty() {
            return Err(BuildError::InvalidCertificate("key alias is required".into()));
        }
        if self.store_password.len() < MIN_PASSWORD_LEN {
            return Err(BuildError::InvalidCertificate(format!(
                "keystore password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if self.key_password.len() < MIN_PASSWORD_LEN {
            return Err(BuildError::InvalidCertificate(format!(
                "key password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if self.validity_days == 0 {
            return Err(BuildError::InvalidCertificate("validity must be at least one day".into()));
        }
        if !self.country.is_empty()
            && !(self.country.len() == 2 && self.country.chars().all(|c| c.is_ascii_alphabetic()))
        {
            return Err(BuildError::InvalidCertificate(
                "country must be a two-letter code".into(),
            ));
        }
        Ok(())
    }

    /// X.500 name from the non-empty fields, e.g. "CN=Jane, O=Acme, C=US"
    pub fn distinguished_name(&self) -> String {
        [
            ("CN", &self.common_name),
            ("OU", &self.organizational_unit),
            ("O", &self.organization),
            ("L", &self.locality),
            ("ST", &self.state),
            ("C", &self.country),
        ]
        .iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(key, value)| format!("{}={}", key, value.trim()))
        .collect::<Vec<_>>()
        .join(", ")
    }

    fn keytool_args(&self, keystore: &Path) -> Vec<String> {
        vec![
            "-genkeypair".to_string(),
            "-v".to_string(),
            "-keystore".to_string(),
            keystore.to_string_lossy().to_string(),
            "-alias".to_string(),
            self.alias.clone(),
            "-keyalg".to_string(),
            "RSA".to_string(),
            "-keysize".to_string(),
            "2048".to_string(),
            "-validity".to_string(),
            self.validity_days.to_string(),
            "-storepass".to_string(),
            self.store_password.clone(),
            "-keypass".to_string(),
            self.key_password.clone(),
            "-dname".to_string(),
            self.distinguished_name(),
        ]
    }
}

/// Generate a new keystore
pub async fn generate_keystore(
    keytool: &Path,
    keystore: &Path,
    cert: &CertificateInfo,
) -> Result<(), BuildError> {
    cert.validate()?;

    if keystore.exists() {
        return Err(BuildError::SigningError(format!(
            "{} already exists",
            keystore.display()
        )));
    }
    if let Some(parent) = keystore.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    info!("Generating keystore: {:?}", keystore);

    let output = Command::new(keytool)
        .args(cert.keytool_args(keystore))
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let message = if stderr.trim().is_empty() { stdout } else { stderr };
        return Err(BuildError::SigningError(format!(
            "keytool failed: {}",
            message.trim()
        )));
    }

    info!("Keystore generated successfully");
    Ok(())
}

/// Keystore location saved for a project (passwords live in the secret store)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeystoreConfig {
    pub keystore_path: PathBuf,
    pub key_alias: String,
}

/// Everything Gradle needs to sign a release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningProperties {
    pub store_file: PathBuf,
    pub key_alias: String,
    pub store_password: String,
    pub key_password: String,
}

impl SigningProperties {
    pub fn gradle_args(&self) -> Vec<String> {
        vec![
            format!("-PANDROID_SIGNING_STORE_FILE={}", self.store_file.display()),
            format!("-PANDROID_SIGNING_KEY_ALIAS={}", self.key_alias),
            format!("-PANDROID_SIGNING_STORE_PASSWORD={}", self.store_password),
            format!("-PANDROID_SIGNING_KEY_PASSWORD={}", self.key_password),
        ]
    }
}

/// Signing setup of one project
pub struct SigningStore<'a> {
    workspace: &'a StateStore,
    secrets: &'a SecretStore,
}

impl<'a> SigningStore<'a> {
    pub fn new(workspace: &'a StateStore, secrets: &'a SecretStore) -> Self {
        Self { workspace, secrets }
    }

    /// Remember a keystore and its passwords
    pub async fn save(
        &self,
        config: &KeystoreConfig,
        store_password: &str,
        key_password: &str,
    ) -> Result<(), CoreError> {
        self.workspace.update(KEYSTORE_CONFIG_KEY, Some(config)).await?;
        self.secrets.store(STORE_PASSWORD_KEY, store_password).await?;
        self.secrets.store(KEY_PASSWORD_KEY, key_password).await?;
        debug!("Signing configuration saved for {:?}", config.keystore_path);
        Ok(())
    }

    pub async fn config(&self) -> Option<KeystoreConfig> {
        match self.workspace.get(KEYSTORE_CONFIG_KEY).await {
            Ok(config) => config,
            Err(e) => {
                warn!("Could not read signing configuration: {}", e);
                None
            }
        }
    }

    /// Configured and the keystore file still exists
    pub async fn is_configured(&self) -> bool {
        self.config()
            .await
            .is_some_and(|config| config.keystore_path.is_file())
    }

    /// Signing properties, when a keystore and both passwords are available
    pub async fn properties(&self) -> Option<SigningProperties> {
        let config = self.config().await?;
        if !config.keystore_path.is_file() {
            warn!("Keystore {:?} no longer exists", config.keystore_path);
            return None;
        }

        let store_password = self.secret(STORE_PASSWORD_KEY).await?;
        let key_password = self.secret(KEY_PASSWORD_KEY).await?;

        Some(SigningProperties {
            store_file: config.keystore_path,
            key_alias: config.key_alias,
            store_password,
            key_password,
        })
    }

    async fn secret(&self, key: &str) -> Option<String> {
        match self.secrets.get(key).await {
            Ok(secret) => secret,
            Err(e) => {
                warn!("Could not read {}: {}", key, e);
                None
            }
        }
    }

    /// Forget the keystore and its passwords (the keystore file is kept)
    pub async fn clear(&self) -> Result<(), CoreError> {
        self.workspace.update::<KeystoreConfig>(KEYSTORE_CONFIG_KEY, None).await?;
        self.secrets.delete(STORE_PASSWORD_KEY).await?;
        self.secrets.delete(KEY_PASSWORD_KEY).await?;
        Ok(())
    }
}
