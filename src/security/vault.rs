//! Credential vault: validated, encrypted, rotatable platform credentials.
//!
//! # Responsibilities
//! - Sanitize and validate credential fields against the platform schema
//! - Encrypt every value before it reaches a store
//! - Track rotation age against the configured interval
//! - Serve decrypted credentials to connectors through a small cache
//!
//! # Design Decisions
//! - A record is encrypted completely before the store sees it, so a
//!   failure never leaves a partial write
//! - Stores only ever hold ciphertext
//! - `Credentials` masks every value in `Debug` so it cannot leak through
//!   `tracing` fields
//! - Cache fills and store writes for one platform run under the same
//!   per-platform lock, so a reader can never re-insert a value that a
//!   concurrent write has already replaced

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;
use crate::platform::{FieldType, Platform};
use crate::security::cipher::CredentialCipher;
use crate::security::sanitize::{mask_credentials, strip_markup, MASK};

/// Decrypted credential fields for one platform.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    fields: BTreeMap<String, String>,
}

impl Credentials {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Field value, or a validation error naming the missing field.
    pub fn require(&self, name: &str) -> GatewayResult<&str> {
        self.get(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| GatewayError::CredentialValidation(vec![format!("{name} is required")]))
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Credentials {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.fields.keys().map(|k| (k, MASK)))
            .finish()
    }
}

/// Encrypted record as held by a [`CredentialStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub platform: Platform,
    /// Field name to base64 ciphertext.
    pub fields: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub rotated_at: Option<DateTime<Utc>>,
    pub version: u32,
}

impl StoredCredentials {
    /// Start of the current rotation period.
    pub fn last_rotated(&self) -> DateTime<Utc> {
        self.rotated_at.unwrap_or(self.created_at)
    }
}

/// Persistence backend for encrypted credential records.
pub trait CredentialStore: Send + Sync {
    fn load(&self, platform: Platform) -> GatewayResult<Option<StoredCredentials>>;
    fn save(&self, record: StoredCredentials) -> GatewayResult<()>;
    fn remove(&self, platform: Platform) -> GatewayResult<bool>;
    fn list(&self) -> GatewayResult<Vec<StoredCredentials>>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    records: DashMap<Platform, StoredCredentials>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn load(&self, platform: Platform) -> GatewayResult<Option<StoredCredentials>> {
        Ok(self.records.get(&platform).map(|r| r.value().clone()))
    }

    fn save(&self, record: StoredCredentials) -> GatewayResult<()> {
        self.records.insert(record.platform, record);
        Ok(())
    }

    fn remove(&self, platform: Platform) -> GatewayResult<bool> {
        Ok(self.records.remove(&platform).is_some())
    }

    fn list(&self) -> GatewayResult<Vec<StoredCredentials>> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.platform);
        Ok(records)
    }
}

/// JSON file store. The whole file is rewritten through a temp file and
/// renamed into place on every change.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    records: DashMap<Platform, StoredCredentials>,
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Open the store, loading existing records if the file exists.
    pub fn open(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let path = path.as_ref().to_path_buf();
        let records = DashMap::new();
        if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| GatewayError::Store(format!("read {}: {e}", path.display())))?;
            let loaded: Vec<StoredCredentials> = serde_json::from_str(&content)
                .map_err(|e| GatewayError::Store(format!("parse {}: {e}", path.display())))?;
            for record in loaded {
                records.insert(record.platform, record);
            }
            tracing::info!(path = %path.display(), count = records.len(), "Loaded credential store");
        }
        Ok(Self {
            path,
            records,
            write_lock: Mutex::new(()),
        })
    }

    fn persist(&self) -> GatewayResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| GatewayError::Store("credential store lock poisoned".to_string()))?;

        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.platform);
        let body = serde_json::to_vec_pretty(&records)
            .map_err(|e| GatewayError::Store(format!("serialize: {e}")))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, body)
            .map_err(|e| GatewayError::Store(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| GatewayError::Store(format!("rename into {}: {e}", self.path.display())))?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, platform: Platform) -> GatewayResult<Option<StoredCredentials>> {
        Ok(self.records.get(&platform).map(|r| r.value().clone()))
    }

    fn save(&self, record: StoredCredentials) -> GatewayResult<()> {
        let platform = record.platform;
        let previous = self.records.insert(platform, record);
        if let Err(e) = self.persist() {
            match previous {
                Some(prev) => self.records.insert(platform, prev),
                None => self.records.remove(&platform).map(|(_, v)| v),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, platform: Platform) -> GatewayResult<bool> {
        let Some((_, removed)) = self.records.remove(&platform) else {
            return Ok(false);
        };
        if let Err(e) = self.persist() {
            self.records.insert(platform, removed);
            return Err(e);
        }
        Ok(true)
    }

    fn list(&self) -> GatewayResult<Vec<StoredCredentials>> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.platform);
        Ok(records)
    }
}

/// Rotation age of one stored credential set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationStatus {
    pub platform: Platform,
    pub version: u32,
    pub last_rotated: DateTime<Utc>,
    pub age_days: i64,
    pub due: bool,
}

/// Validate a field set against the platform schema.
///
/// Returns every problem found, not just the first.
pub fn validate_fields(
    platform: Platform,
    fields: &BTreeMap<String, String>,
) -> Result<(), Vec<String>> {
    let schema = platform.credential_schema();
    let mut problems = Vec::new();

    for name in fields.keys() {
        if !schema.iter().any(|spec| spec.name == name.as_str()) {
            problems.push(format!("unknown field {name}"));
        }
    }

    for spec in schema {
        let value = fields.get(spec.name).map(|v| v.trim()).unwrap_or_default();
        if value.is_empty() {
            if spec.required {
                problems.push(format!("{} is required", spec.name));
            }
            continue;
        }
        match spec.field_type {
            FieldType::Numeric if !value.chars().all(|c| c.is_ascii_digit()) => {
                problems.push(format!("{} must be numeric", spec.name));
            }
            FieldType::Domain if !is_valid_domain(value) => {
                problems.push(format!("{} must be a valid domain", spec.name));
            }
            _ => {}
        }
        if let Some(min) = spec.min_length {
            if value.chars().count() < min {
                problems.push(format!("{} must be at least {min} characters", spec.name));
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

fn is_valid_domain(value: &str) -> bool {
    let value = value.trim_end_matches('.');
    if value.len() > 253 || !value.contains('.') {
        return false;
    }
    value.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Encrypted credential storage with schema validation and rotation tracking.
pub struct CredentialVault {
    cipher: CredentialCipher,
    store: Arc<dyn CredentialStore>,
    cache: DashMap<Platform, Credentials>,
    locks: DashMap<Platform, Arc<Mutex<()>>>,
    rotation_interval_days: i64,
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVault")
            .field("cached", &self.cache.len())
            .field("rotation_interval_days", &self.rotation_interval_days)
            .finish_non_exhaustive()
    }
}

impl CredentialVault {
    pub fn new(
        cipher: CredentialCipher,
        store: Arc<dyn CredentialStore>,
        rotation_interval_days: u32,
    ) -> Self {
        Self {
            cipher,
            store,
            cache: DashMap::new(),
            locks: DashMap::new(),
            rotation_interval_days: i64::from(rotation_interval_days),
        }
    }

    /// Vault over an in-memory store.
    pub fn in_memory(cipher: CredentialCipher, rotation_interval_days: u32) -> Self {
        Self::new(cipher, Arc::new(InMemoryCredentialStore::new()), rotation_interval_days)
    }

    /// Sanitize, validate, encrypt and store a credential set.
    pub fn store_credentials(
        &self,
        platform: Platform,
        fields: BTreeMap<String, String>,
    ) -> GatewayResult<()> {
        let lock = self.lock_for(platform);
        let _guard = lock.lock().map_err(|_| poisoned(platform))?;

        let previous = self.store.load(platform)?;
        let version = previous.map_or(1, |p| p.version.saturating_add(1));
        let record = self.seal(platform, fields, Utc::now(), None, version)?;
        self.write(record, "store")
    }

    /// Replace a credential set and start a new rotation period.
    pub fn rotate_credentials(
        &self,
        platform: Platform,
        fields: BTreeMap<String, String>,
    ) -> GatewayResult<()> {
        let lock = self.lock_for(platform);
        let _guard = lock.lock().map_err(|_| poisoned(platform))?;

        let previous = self
            .store
            .load(platform)?
            .ok_or(GatewayError::MissingCredentials(platform))?;
        let record = self.seal(
            platform,
            fields,
            previous.created_at,
            Some(Utc::now()),
            previous.version.saturating_add(1),
        )?;
        self.write(record, "rotate")
    }

    /// Decrypted credentials, or `None` when nothing is stored.
    pub fn get_credentials(&self, platform: Platform) -> GatewayResult<Option<Credentials>> {
        if let Some(hit) = self.cache.get(&platform) {
            return Ok(Some(hit.value().clone()));
        }

        let lock = self.lock_for(platform);
        let _guard = lock.lock().map_err(|_| poisoned(platform))?;
        // Another reader may have filled the cache while we waited.
        if let Some(hit) = self.cache.get(&platform) {
            return Ok(Some(hit.value().clone()));
        }
        let Some(record) = self.store.load(platform)? else {
            return Ok(None);
        };

        let mut fields = BTreeMap::new();
        for (name, sealed) in &record.fields {
            let value = self.cipher.decrypt(sealed, &aad(platform, name)).map_err(|e| {
                tracing::error!(platform = %platform, field = %name, "Credential decryption failed");
                e
            })?;
            fields.insert(name.clone(), value);
        }
        let credentials = Credentials::new(fields);
        self.cache.insert(platform, credentials.clone());
        Ok(Some(credentials))
    }

    pub fn delete_credentials(&self, platform: Platform) -> GatewayResult<bool> {
        let lock = self.lock_for(platform);
        let _guard = lock.lock().map_err(|_| poisoned(platform))?;

        self.cache.remove(&platform);
        let removed = self.store.remove(platform)?;
        if removed {
            metrics::record_credential_operation("delete");
            tracing::info!(platform = %platform, "Credentials deleted");
        }
        Ok(removed)
    }

    pub fn has_credentials(&self, platform: Platform) -> bool {
        self.cache.contains_key(&platform) || matches!(self.store.load(platform), Ok(Some(_)))
    }

    pub fn rotation_status(&self) -> GatewayResult<Vec<RotationStatus>> {
        self.rotation_status_at(Utc::now())
    }

    /// Rotation status evaluated at a given instant.
    pub fn rotation_status_at(&self, now: DateTime<Utc>) -> GatewayResult<Vec<RotationStatus>> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .map(|record| {
                let last_rotated = record.last_rotated();
                let age_days = (now - last_rotated).num_days().max(0);
                RotationStatus {
                    platform: record.platform,
                    version: record.version,
                    last_rotated,
                    age_days,
                    due: age_days >= self.rotation_interval_days,
                }
            })
            .collect())
    }

    pub fn credentials_due_for_rotation(&self) -> GatewayResult<Vec<Platform>> {
        Ok(self
            .rotation_status()?
            .into_iter()
            .filter(|s| s.due)
            .map(|s| s.platform)
            .collect())
    }

    /// Display form with every secret field masked.
    pub fn masked(&self, platform: Platform) -> GatewayResult<Option<BTreeMap<String, String>>> {
        let Some(credentials) = self.get_credentials(platform)? else {
            return Ok(None);
        };
        let schema = platform.credential_schema();
        let mut masked = mask_credentials(credentials.fields());
        for (name, value) in masked.iter_mut() {
            if schema.iter().any(|s| s.name == name.as_str() && s.secret) {
                *value = MASK.to_string();
            }
        }
        Ok(Some(masked))
    }

    fn seal(
        &self,
        platform: Platform,
        fields: BTreeMap<String, String>,
        created_at: DateTime<Utc>,
        rotated_at: Option<DateTime<Utc>>,
        version: u32,
    ) -> GatewayResult<StoredCredentials> {
        let sanitized: BTreeMap<String, String> = fields
            .into_iter()
            .map(|(k, v)| (k.trim().to_string(), strip_markup(&v)))
            .collect();

        validate_fields(platform, &sanitized).map_err(|problems| {
            tracing::warn!(platform = %platform, problems = problems.len(), "Credential validation failed");
            GatewayError::CredentialValidation(problems)
        })?;

        let mut sealed = BTreeMap::new();
        for (name, value) in &sanitized {
            sealed.insert(name.clone(), self.cipher.encrypt(value, &aad(platform, name))?);
        }

        Ok(StoredCredentials {
            platform,
            fields: sealed,
            created_at,
            rotated_at,
            version,
        })
    }

    fn lock_for(&self, platform: Platform) -> Arc<Mutex<()>> {
        self.locks.entry(platform).or_default().value().clone()
    }

    /// Save and invalidate. Callers hold the platform lock.
    fn write(&self, record: StoredCredentials, operation: &'static str) -> GatewayResult<()> {
        let platform = record.platform;
        let version = record.version;
        let field_names: Vec<String> = record.fields.keys().cloned().collect();
        self.store.save(record)?;
        self.cache.remove(&platform);

        metrics::record_credential_operation(operation);
        tracing::info!(
            platform = %platform,
            version,
            fields = ?field_names,
            operation,
            "Credentials written"
        );
        Ok(())
    }
}

fn poisoned(platform: Platform) -> GatewayError {
    GatewayError::Store(format!("credential lock for {platform} poisoned"))
}

fn aad(platform: Platform, field: &str) -> String {
    format!("{platform}:{field}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration as StdDuration;

    fn vault() -> CredentialVault {
        let cipher = CredentialCipher::from_base64_key(&CredentialCipher::generate_key()).unwrap();
        CredentialVault::in_memory(cipher, 90)
    }

    fn shopee_fields() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("partner_id".to_string(), "12345".to_string()),
            ("partner_key".to_string(), "k".repeat(32)),
            ("shop_id".to_string(), "67890".to_string()),
        ])
    }

    #[test]
    fn test_store_and_get() {
        let vault = vault();
        vault.store_credentials(Platform::Shopee, shopee_fields()).unwrap();

        let creds = vault.get_credentials(Platform::Shopee).unwrap().unwrap();
        assert_eq!(creds.get("partner_id"), Some("12345"));
        assert_eq!(creds.get("partner_key"), Some("k".repeat(32).as_str()));
        assert!(vault.has_credentials(Platform::Shopee));
        assert!(vault.get_credentials(Platform::Lazada).unwrap().is_none());
    }

    #[test]
    fn test_values_are_encrypted_at_rest() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let cipher = CredentialCipher::from_base64_key(&CredentialCipher::generate_key()).unwrap();
        let vault = CredentialVault::new(cipher, store.clone(), 90);
        vault.store_credentials(Platform::Shopee, shopee_fields()).unwrap();

        let record = store.load(Platform::Shopee).unwrap().unwrap();
        assert_eq!(record.version, 1);
        assert!(record
            .fields
            .values()
            .all(|v| v != "12345" && !v.contains(&"k".repeat(32))));
    }

    #[test]
    fn test_invalid_shopee_fields_rejected_without_write() {
        let vault = vault();
        let fields = BTreeMap::from([
            ("partner_id".to_string(), "12a45".to_string()),
            ("partner_key".to_string(), "short".to_string()),
            ("shop_id".to_string(), "67890".to_string()),
        ]);
        let err = vault.store_credentials(Platform::Shopee, fields).unwrap_err();
        match err {
            GatewayError::CredentialValidation(problems) => {
                assert!(problems.contains(&"partner_id must be numeric".to_string()));
                assert!(problems
                    .contains(&"partner_key must be at least 32 characters".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!vault.has_credentials(Platform::Shopee));
    }

    #[test]
    fn test_missing_and_unknown_fields() {
        let fields = BTreeMap::from([
            ("app_key".to_string(), "key".to_string()),
            ("region".to_string(), "my".to_string()),
        ]);
        let problems = validate_fields(Platform::Lazada, &fields).unwrap_err();
        assert!(problems.contains(&"unknown field region".to_string()));
        assert!(problems.contains(&"app_secret is required".to_string()));
        assert!(problems.contains(&"access_token is required".to_string()));
    }

    #[test]
    fn test_domain_field_validation() {
        let mut fields = BTreeMap::from([
            ("shop_domain".to_string(), "https://store.myshopify.com".to_string()),
            ("access_token".to_string(), "shpat_x".to_string()),
            ("api_key".to_string(), "k".to_string()),
            ("api_secret".to_string(), "s".to_string()),
        ]);
        assert!(validate_fields(Platform::Shopify, &fields).is_err());
        fields.insert("shop_domain".to_string(), "store.myshopify.com".to_string());
        assert!(validate_fields(Platform::Shopify, &fields).is_ok());
    }

    #[test]
    fn test_markup_is_stripped_before_storage() {
        let vault = vault();
        let mut fields = shopee_fields();
        fields.insert(
            "partner_key".to_string(),
            format!("<script>alert(1)</script>{}", "a".repeat(32)),
        );
        vault.store_credentials(Platform::Shopee, fields).unwrap();
        let creds = vault.get_credentials(Platform::Shopee).unwrap().unwrap();
        assert_eq!(creds.get("partner_key"), Some("a".repeat(32).as_str()));
    }

    #[test]
    fn test_rotation_bumps_version_and_invalidates_cache() {
        let vault = vault();
        vault.store_credentials(Platform::Shopee, shopee_fields()).unwrap();
        let _ = vault.get_credentials(Platform::Shopee).unwrap();

        let mut rotated = shopee_fields();
        rotated.insert("partner_key".to_string(), "r".repeat(40));
        vault.rotate_credentials(Platform::Shopee, rotated).unwrap();

        let creds = vault.get_credentials(Platform::Shopee).unwrap().unwrap();
        assert_eq!(creds.get("partner_key"), Some("r".repeat(40).as_str()));
        let status = vault.rotation_status().unwrap();
        assert_eq!(status[0].version, 2);
        assert!(!status[0].due);
    }

    /// Store whose first `load` parks until the test releases it.
    struct GatedStore {
        inner: InMemoryCredentialStore,
        gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
    }

    impl CredentialStore for GatedStore {
        fn load(&self, platform: Platform) -> GatewayResult<Option<StoredCredentials>> {
            let record = self.inner.load(platform);
            let gate = self.gate.lock().unwrap().take();
            if let Some((entered, release)) = gate {
                entered.send(()).unwrap();
                release.recv().unwrap();
            }
            record
        }

        fn save(&self, record: StoredCredentials) -> GatewayResult<()> {
            self.inner.save(record)
        }

        fn remove(&self, platform: Platform) -> GatewayResult<bool> {
            self.inner.remove(platform)
        }

        fn list(&self) -> GatewayResult<Vec<StoredCredentials>> {
            self.inner.list()
        }
    }

    #[test]
    fn test_rotation_during_cache_fill_is_not_lost() {
        let store = Arc::new(GatedStore {
            inner: InMemoryCredentialStore::new(),
            gate: Mutex::new(None),
        });
        let cipher = CredentialCipher::from_base64_key(&CredentialCipher::generate_key()).unwrap();
        let vault = Arc::new(CredentialVault::new(cipher, store.clone(), 90));

        let mut old = shopee_fields();
        old.insert("partner_key".to_string(), "o".repeat(32));
        vault.store_credentials(Platform::Shopee, old).unwrap();

        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *store.gate.lock().unwrap() = Some((entered_tx, release_rx));

        // The reader loads the old record and parks before filling the cache.
        let reader = {
            let vault = vault.clone();
            thread::spawn(move || vault.get_credentials(Platform::Shopee).unwrap())
        };
        entered_rx.recv().unwrap();

        let writer = {
            let vault = vault.clone();
            thread::spawn(move || {
                let mut new = shopee_fields();
                new.insert("partner_key".to_string(), "n".repeat(32));
                vault.rotate_credentials(Platform::Shopee, new).unwrap();
            })
        };
        thread::sleep(StdDuration::from_millis(50));
        release_tx.send(()).unwrap();

        let seen = reader.join().unwrap().unwrap();
        assert_eq!(seen.get("partner_key"), Some("o".repeat(32).as_str()));
        writer.join().unwrap();

        let creds = vault.get_credentials(Platform::Shopee).unwrap().unwrap();
        assert_eq!(creds.get("partner_key"), Some("n".repeat(32).as_str()));
        assert_eq!(store.load(Platform::Shopee).unwrap().unwrap().version, 2);
    }

    #[test]
    fn test_rotate_without_existing_fails() {
        let err = vault()
            .rotate_credentials(Platform::Tiktok, BTreeMap::new())
            .unwrap_err();
        assert_eq!(err.reason_code(), "missing_credentials");
    }

    #[test]
    fn test_rotation_due_after_interval() {
        let vault = vault();
        vault.store_credentials(Platform::Shopee, shopee_fields()).unwrap();
        let later = Utc::now() + Duration::days(91);
        let status = vault.rotation_status_at(later).unwrap();
        assert!(status[0].due);
        assert!(status[0].age_days >= 90);
    }

    #[test]
    fn test_masked_and_debug_hide_secrets() {
        let vault = vault();
        vault.store_credentials(Platform::Shopee, shopee_fields()).unwrap();

        let masked = vault.masked(Platform::Shopee).unwrap().unwrap();
        assert_eq!(masked["partner_id"], "12345");
        assert_eq!(masked["partner_key"], MASK);

        let creds = vault.get_credentials(Platform::Shopee).unwrap().unwrap();
        let debug = format!("{creds:?}");
        assert!(!debug.contains("12345"));
        assert!(!debug.contains("kkkk"));
    }

    #[test]
    fn test_delete() {
        let vault = vault();
        vault.store_credentials(Platform::Shopee, shopee_fields()).unwrap();
        assert!(vault.delete_credentials(Platform::Shopee).unwrap());
        assert!(!vault.has_credentials(Platform::Shopee));
        assert!(!vault.delete_credentials(Platform::Shopee).unwrap());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");
        let key = CredentialCipher::generate_key();

        {
            let store = Arc::new(FileCredentialStore::open(&path).unwrap());
            let cipher = CredentialCipher::from_base64_key(&key).unwrap();
            let vault = CredentialVault::new(cipher, store, 90);
            vault.store_credentials(Platform::Shopee, shopee_fields()).unwrap();
        }

        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains(&"k".repeat(32)));

        let store = Arc::new(FileCredentialStore::open(&path).unwrap());
        let cipher = CredentialCipher::from_base64_key(&key).unwrap();
        let vault = CredentialVault::new(cipher, store, 90);
        let creds = vault.get_credentials(Platform::Shopee).unwrap().unwrap();
        assert_eq!(creds.get("shop_id"), Some("67890"));
    }
}
