//! Local key-value persistence
//!
//! Every record is a JSON string under a namespaced `@sarvis_*` key, so the
//! layout matches what the mobile clients keep in their device storage.
//! `FileStore` keeps the whole map in one JSON file and rewrites it atomically
//! on each mutation; `MemoryStore` is for tests and throwaway runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, warn};

use crate::control::ControlState;
use crate::models::{Preset, SessionInfo, Tokens, User, UserPatch};
use crate::signup::SignupDraft;

pub const USER_KEY: &str = "@sarvis_user_info";
pub const TOKENS_KEY: &str = "@sarvis_tokens";
pub const PRESETS_KEY: &str = "@sarvis_presets";
pub const SELECTED_PRESET_KEY: &str = "@sarvis_selected_preset";
pub const SESSION_KEY: &str = "@sarvis_session";
pub const SIGNUP_KEY: &str = "@sarvis_signup_info";
pub const ACCESS_TOKEN_KEY: &str = "@sarvis_access_token";
pub const REFRESH_TOKEN_KEY: &str = "@sarvis_refresh_token";
pub const CURRENT_STATE_KEY: &str = "@sarvis_current_state";

/// Keys removed on logout
pub const AUTH_KEYS: [&str; 7] = [
    USER_KEY,
    TOKENS_KEY,
    PRESETS_KEY,
    SELECTED_PRESET_KEY,
    SESSION_KEY,
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Storage lock poisoned")]
    Poisoned,
}

/// String key-value store
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: String) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    fn multi_remove(&self, keys: &[&str]) -> Result<(), StorageError> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }

    /// Write several entries; stores that can should apply all or none
    fn multi_set(&self, entries: Vec<(String, String)>) -> Result<(), StorageError> {
        for (key, value) in entries {
            self.set(&key, value)?;
        }
        Ok(())
    }
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let map = self.map.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut map = self.map.lock().map_err(|_| StorageError::Poisoned)?;
        map.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut map = self.map.lock().map_err(|_| StorageError::Poisoned)?;
        map.remove(key);
        Ok(())
    }

    fn multi_set(&self, entries: Vec<(String, String)>) -> Result<(), StorageError> {
        let mut map = self.map.lock().map_err(|_| StorageError::Poisoned)?;
        map.extend(entries);
        Ok(())
    }
}

/// Single JSON file holding every key
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    map: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open `storage.json` inside `dir`, creating the directory if needed
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("storage.json");

        let map = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "storage file unreadable, starting empty");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), keys = map.len(), "opened storage");
        Ok(Self {
            path,
            map: Mutex::new(map),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, map: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(map)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn mutate(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), StorageError> {
        let mut map = self.map.lock().map_err(|_| StorageError::Poisoned)?;
        let mut next = map.clone();
        f(&mut next);
        // Only adopt the new map once it is on disk
        self.flush(&next)?;
        *map = next;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let map = self.map.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.mutate(|map| {
            map.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.mutate(|map| {
            map.remove(key);
        })
    }

    fn multi_remove(&self, keys: &[&str]) -> Result<(), StorageError> {
        self.mutate(|map| {
            for key in keys {
                map.remove(*key);
            }
        })
    }

    fn multi_set(&self, entries: Vec<(String, String)>) -> Result<(), StorageError> {
        self.mutate(|map| map.extend(entries))
    }
}

/// Typed view over the namespaced keys
#[derive(Clone)]
pub struct UserStorage {
    store: Arc<dyn KeyValueStore>,
}

impl UserStorage {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Ephemeral storage backed by a `MemoryStore`
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn raw(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        self.store.set(key, serde_json::to_string(value)?)
    }

    /// Missing or corrupt entries read as `None`
    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "storage read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "stored value is not valid JSON for its type");
                None
            }
        }
    }

    pub fn save_user(&self, user: &User) -> Result<(), StorageError> {
        self.put(USER_KEY, user)
    }

    pub fn user(&self) -> Option<User> {
        self.read(USER_KEY)
    }

    /// Merge `patch` into the stored user; `None` when nobody is stored
    pub fn update_user(&self, patch: UserPatch) -> Result<Option<User>, StorageError> {
        let Some(mut user) = self.user() else {
            return Ok(None);
        };
        user.apply(patch);
        self.save_user(&user)?;
        Ok(Some(user))
    }

    /// Store the pair plus the bare access/refresh strings read by the HTTP layer
    pub fn save_tokens(&self, tokens: &Tokens) -> Result<(), StorageError> {
        self.store.multi_set(token_entries(tokens)?)
    }

    /// Persist a whole login in one write: session (if any), user, tokens, presets
    pub fn save_login(
        &self,
        session: Option<&SessionInfo>,
        user: &User,
        tokens: &Tokens,
        presets: &[Preset],
    ) -> Result<(), StorageError> {
        let mut entries = Vec::with_capacity(6);
        if let Some(session) = session {
            entries.push((SESSION_KEY.to_string(), serde_json::to_string(session)?));
        }
        entries.push((USER_KEY.to_string(), serde_json::to_string(user)?));
        entries.extend(token_entries(tokens)?);
        entries.push((PRESETS_KEY.to_string(), serde_json::to_string(presets)?));
        self.store.multi_set(entries)
    }

    pub fn tokens(&self) -> Option<Tokens> {
        self.read(TOKENS_KEY)
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.get(ACCESS_TOKEN_KEY).ok().flatten()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.store.get(REFRESH_TOKEN_KEY).ok().flatten()
    }

    pub fn save_presets(&self, presets: &[Preset]) -> Result<(), StorageError> {
        self.put(PRESETS_KEY, &presets)
    }

    pub fn presets(&self) -> Vec<Preset> {
        self.read(PRESETS_KEY).unwrap_or_default()
    }

    pub fn save_selected_preset(&self, preset: &Preset) -> Result<(), StorageError> {
        self.put(SELECTED_PRESET_KEY, preset)
    }

    pub fn selected_preset(&self) -> Option<Preset> {
        self.read(SELECTED_PRESET_KEY)
    }

    pub fn save_session(&self, session: &SessionInfo) -> Result<(), StorageError> {
        self.put(SESSION_KEY, session)
    }

    pub fn session(&self) -> Option<SessionInfo> {
        self.read(SESSION_KEY)
    }

    pub fn save_signup_draft(&self, draft: &SignupDraft) -> Result<(), StorageError> {
        self.put(SIGNUP_KEY, draft)
    }

    pub fn signup_draft(&self) -> Option<SignupDraft> {
        self.read(SIGNUP_KEY)
    }

    pub fn clear_signup_draft(&self) -> Result<(), StorageError> {
        self.store.remove(SIGNUP_KEY)
    }

    pub fn save_control_state(&self, state: &ControlState) -> Result<(), StorageError> {
        self.put(CURRENT_STATE_KEY, state)
    }

    pub fn control_state(&self) -> Option<ControlState> {
        self.read(CURRENT_STATE_KEY)
    }

    /// Session id and tokens, as needed for logout
    pub fn auth_status(&self) -> (Option<String>, Option<Tokens>) {
        (self.session().map(|s| s.session_id), self.tokens())
    }

    /// Drop everything tied to the logged-in user
    pub fn clear_auth(&self) -> Result<(), StorageError> {
        self.store.multi_remove(&AUTH_KEYS)?;
        debug!("cleared auth storage");
        Ok(())
    }

    /// Drop auth plus signup draft and control state
    pub fn clear_all(&self) -> Result<(), StorageError> {
        let mut keys: Vec<&str> = AUTH_KEYS.to_vec();
        keys.push(SIGNUP_KEY);
        keys.push(CURRENT_STATE_KEY);
        self.store.multi_remove(&keys)
    }
}

fn token_entries(tokens: &Tokens) -> Result<Vec<(String, String)>, StorageError> {
    Ok(vec![
        (TOKENS_KEY.to_string(), serde_json::to_string(tokens)?),
        (ACCESS_TOKEN_KEY.to_string(), tokens.access.clone()),
        (REFRESH_TOKEN_KEY.to_string(), tokens.refresh.clone()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LoginMethod, ServoPositions};

    fn sample_user() -> User {
        User {
            user_id: 1,
            uid: "uid-1".to_string(),
            login_id: "owner1".to_string(),
            nickname: "robo".to_string(),
            email: "x@y.z".to_string(),
            login_method: LoginMethod::Password,
            face_registered: true,
            voice_registered: false,
        }
    }

    fn sample_preset(id: i64, name: &str) -> Preset {
        Preset {
            preset_id: Some(id),
            name: name.to_string(),
            servos: ServoPositions {
                servo1: id as f64,
                servo2: 2.0,
                servo3: 3.0,
                servo4: 4.0,
                servo5: 5.0,
                servo6: 6.0,
            },
            created_at: None,
        }
    }

    #[test]
    fn test_tokens_mirrored_under_bare_keys() {
        let storage = UserStorage::in_memory();
        storage
            .save_tokens(&Tokens {
                access: "a".to_string(),
                refresh: "r".to_string(),
            })
            .unwrap();

        assert_eq!(storage.access_token().as_deref(), Some("a"));
        assert_eq!(storage.refresh_token().as_deref(), Some("r"));
        assert_eq!(storage.tokens().unwrap().access, "a");
        assert_eq!(storage.raw().get(TOKENS_KEY).unwrap().unwrap(), r#"{"access":"a","refresh":"r"}"#);
    }

    #[test]
    fn test_preset_selection_roundtrip() {
        let storage = UserStorage::in_memory();
        let saved = vec![sample_preset(1, "desk"), sample_preset(2, "sofa")];
        storage.save_presets(&saved).unwrap();

        let listed = storage.presets();
        assert_eq!(listed, saved);

        storage.save_selected_preset(&listed[1]).unwrap();
        assert_eq!(storage.selected_preset().unwrap(), saved[1]);
    }

    #[test]
    fn test_clear_auth_keeps_signup_draft() {
        let storage = UserStorage::in_memory();
        storage.save_user(&sample_user()).unwrap();
        storage.save_presets(&[sample_preset(1, "desk")]).unwrap();
        storage.raw().set(SIGNUP_KEY, "{}".to_string()).unwrap();

        storage.clear_auth().unwrap();

        assert!(storage.user().is_none());
        assert!(storage.presets().is_empty());
        assert!(storage.raw().get(SIGNUP_KEY).unwrap().is_some());

        storage.clear_all().unwrap();
        assert!(storage.raw().get(SIGNUP_KEY).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_entry_reads_as_absent() {
        let storage = UserStorage::in_memory();
        storage.raw().set(USER_KEY, "{not json".to_string()).unwrap();
        assert!(storage.user().is_none());
    }

    #[test]
    fn test_update_user_merges() {
        let storage = UserStorage::in_memory();
        assert!(storage.update_user(UserPatch::default()).unwrap().is_none());

        storage.save_user(&sample_user()).unwrap();
        let updated = storage
            .update_user(UserPatch {
                nickname: Some("sarvis-fan".to_string()),
                ..Default::default()
            })
            .unwrap()
            .unwrap();
        assert_eq!(updated.nickname, "sarvis-fan");
        assert_eq!(storage.user().unwrap().login_id, "owner1");
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path()).unwrap();
            tokio_test::assert_ok!(store.set("k1", "v1".to_string()));
            tokio_test::assert_ok!(store.set("k2", "v2".to_string()));
            tokio_test::assert_ok!(store.multi_remove(&["k2"]));
        }

        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get("k1").unwrap().as_deref(), Some("v1"));
        assert!(reopened.get("k2").unwrap().is_none());
        assert!(!dir.path().join("storage.json.tmp").exists());
    }

    #[test]
    fn test_failed_login_write_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::open(dir.path()).unwrap());
        let storage = UserStorage::new(store.clone());
        storage.save_user(&sample_user()).unwrap();

        // A directory where the temp file should go makes every flush fail
        std::fs::create_dir(dir.path().join("storage.json.tmp")).unwrap();
        let mut other = sample_user();
        other.login_id = "someone2".to_string();
        let tokens = Tokens {
            access: "a".to_string(),
            refresh: "r".to_string(),
        };
        let session = SessionInfo {
            session_id: "9".to_string(),
            session_started_at: None,
        };
        assert!(
            storage
                .save_login(Some(&session), &other, &tokens, &[sample_preset(1, "desk")])
                .is_err()
        );

        assert_eq!(storage.user().unwrap().login_id, "owner1");
        assert!(storage.session().is_none());
        assert!(storage.tokens().is_none());
        assert!(storage.access_token().is_none());
        assert!(storage.presets().is_empty());
    }

    #[test]
    fn test_file_store_tolerates_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("storage.json"), "garbage").unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.get("anything").unwrap().is_none());
    }
}
