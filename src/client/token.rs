//! Ownership token provider.
//!
//! Each device holds one opaque token that it stamps on the requests it
//! creates. The token is derived from host signals plus a random salt, persisted
//! in durable storage and reused until explicitly reset. It never fails
//! outward: missing signals switch to a time-and-random construction, and a
//! storage failure degrades to a session-only token.

use std::env;
use std::sync::Arc;

use chrono::{Local, Utc};
use tokio::sync::Mutex;

use super::storage::DurableStorage;

/// Storage key of the persisted token.
pub const TOKEN_KEY: &str = "teamfinder.owner_token";

const TOKEN_PREFIX: &str = "fp-";

/// Environment signals the primary token construction hashes.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSignals {
    pub user_agent: String,
    pub language: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub timezone_offset_minutes: i32,
    pub hardware_concurrency: usize,
    pub platform: String,
    pub pixel_ratio: f64,
}

impl DeviceSignals {
    fn canonical(&self) -> String {
        format!(
            "{}|{}|{}x{}|{}|{}|{}|{}",
            self.user_agent,
            self.language,
            self.screen_width,
            self.screen_height,
            self.timezone_offset_minutes,
            self.hardware_concurrency,
            self.platform,
            self.pixel_ratio
        )
    }
}

/// Source of [`DeviceSignals`]; an `Err` selects the fallback construction.
pub trait SignalSource: Send + Sync {
    fn collect(&self) -> Result<DeviceSignals, String>;
}

/// Signals read from the running host.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostSignals;

impl SignalSource for HostSignals {
    fn collect(&self) -> Result<DeviceSignals, String> {
        let language = env::var("LC_ALL")
            .or_else(|_| env::var("LANG"))
            .map_err(|_| "no locale in environment".to_string())?;
        let hardware_concurrency = std::thread::available_parallelism()
            .map_err(|e| format!("available_parallelism: {}", e))?
            .get();

        Ok(DeviceSignals {
            user_agent: format!("teamfinder/{}", env!("CARGO_PKG_VERSION")),
            language,
            screen_width: env_u32("COLUMNS"),
            screen_height: env_u32("LINES"),
            timezone_offset_minutes: Local::now().offset().local_minus_utc() / 60,
            hardware_concurrency,
            platform: format!("{}-{}", env::consts::OS, env::consts::ARCH),
            pixel_ratio: 1.0,
        })
    }
}

fn env_u32(name: &str) -> u32 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Hands out the device's ownership token.
pub struct OwnershipTokenProvider {
    storage: Option<Arc<dyn DurableStorage>>,
    signals: Box<dyn SignalSource>,
    cached: Mutex<Option<String>>,
}

impl OwnershipTokenProvider {
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self::with_signals(Some(storage), Box::new(HostSignals))
    }

    /// Provider whose token lives only as long as this value.
    pub fn in_memory() -> Self {
        Self::with_signals(None, Box::new(HostSignals))
    }

    pub fn with_signals(
        storage: Option<Arc<dyn DurableStorage>>,
        signals: Box<dyn SignalSource>,
    ) -> Self {
        Self {
            storage,
            signals,
            cached: Mutex::new(None),
        }
    }

    /// Return the device token, creating and persisting it on first use.
    pub async fn get_token(&self) -> String {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            return token.clone();
        }

        if let Some(storage) = &self.storage {
            match storage.get(TOKEN_KEY).await {
                Ok(Some(token)) if !token.is_empty() => {
                    *cached = Some(token.clone());
                    return token;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Token storage unavailable, token will not persist: {}", e)
                }
            }
        }

        let token = match self.signals.collect() {
            Ok(signals) => derive_token(&signals),
            Err(reason) => {
                tracing::warn!("Device signals unavailable ({}), using fallback token", reason);
                fallback_token()
            }
        };

        if let Some(storage) = &self.storage {
            if let Err(e) = storage.set(TOKEN_KEY, &token).await {
                tracing::warn!("Failed to persist ownership token, keeping it for this session: {}", e);
            }
        }

        *cached = Some(token.clone());
        token
    }

    /// Forget the token in memory and in storage.
    pub async fn reset_token(&self) {
        let mut cached = self.cached.lock().await;
        *cached = None;

        if let Some(storage) = &self.storage {
            if let Err(e) = storage.remove(TOKEN_KEY).await {
                tracing::warn!("Failed to clear persisted ownership token: {}", e);
            }
        }
    }
}

/// 32-bit FNV-1a.
fn fnv1a(input: &str) -> u32 {
    input.bytes().fold(0x811c_9dc5_u32, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(0x0100_0193)
    })
}

/// Hash of the signals, salted so that devices with identical signals and
/// resets on one device still yield distinct tokens.
fn derive_token(signals: &DeviceSignals) -> String {
    format!(
        "{}{:08x}{:08x}",
        TOKEN_PREFIX,
        fnv1a(&signals.canonical()),
        rand::random::<u32>()
    )
}

fn fallback_token() -> String {
    format!(
        "{}{:08x}{:08x}",
        TOKEN_PREFIX,
        Utc::now().timestamp_millis() as u32,
        rand::random::<u32>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::storage::MemoryStorage;
    use crate::errors::{StoreError, StoreResult};
    use async_trait::async_trait;

    struct FixedSignals;

    impl SignalSource for FixedSignals {
        fn collect(&self) -> Result<DeviceSignals, String> {
            Ok(DeviceSignals {
                user_agent: "Mozilla/5.0".to_string(),
                language: "de-DE".to_string(),
                screen_width: 1920,
                screen_height: 1080,
                timezone_offset_minutes: 60,
                hardware_concurrency: 8,
                platform: "Linux x86_64".to_string(),
                pixel_ratio: 2.0,
            })
        }
    }

    struct MissingSignals;

    impl SignalSource for MissingSignals {
        fn collect(&self) -> Result<DeviceSignals, String> {
            Err("screen unavailable".to_string())
        }
    }

    struct BrokenStorage;

    #[async_trait]
    impl DurableStorage for BrokenStorage {
        async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
            Err(StoreError::Storage("quota exceeded".to_string()))
        }
        async fn set(&self, _key: &str, _value: &str) -> StoreResult<()> {
            Err(StoreError::Storage("quota exceeded".to_string()))
        }
        async fn remove(&self, _key: &str) -> StoreResult<()> {
            Err(StoreError::Storage("quota exceeded".to_string()))
        }
    }

    fn assert_token_format(token: &str) {
        assert!(token.starts_with(TOKEN_PREFIX));
        assert_eq!(token.len(), TOKEN_PREFIX.len() + 16);
        assert!(token[TOKEN_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_token_is_stable_and_persisted() {
        let storage: Arc<dyn DurableStorage> = Arc::new(MemoryStorage::new());
        let provider =
            OwnershipTokenProvider::with_signals(Some(storage.clone()), Box::new(FixedSignals));

        let first = provider.get_token().await;
        let second = provider.get_token().await;
        assert_eq!(first, second);
        assert_token_format(&first);
        assert_eq!(storage.get(TOKEN_KEY).await.unwrap(), Some(first.clone()));

        // A new provider on the same storage is the same device
        let reloaded = OwnershipTokenProvider::with_signals(Some(storage), Box::new(FixedSignals));
        assert_eq!(reloaded.get_token().await, first);
    }

    #[tokio::test]
    async fn test_fallback_token_is_stable_then_reset_changes_it() {
        let storage: Arc<dyn DurableStorage> = Arc::new(MemoryStorage::new());
        let provider =
            OwnershipTokenProvider::with_signals(Some(storage.clone()), Box::new(MissingSignals));

        let first = provider.get_token().await;
        assert_token_format(&first);
        assert_eq!(provider.get_token().await, first);

        provider.reset_token().await;
        assert_eq!(storage.get(TOKEN_KEY).await.unwrap(), None);

        let renewed = provider.get_token().await;
        assert_token_format(&renewed);
        assert_ne!(renewed, first);
    }

    #[tokio::test]
    async fn test_broken_storage_degrades_to_session_token() {
        let provider =
            OwnershipTokenProvider::with_signals(Some(Arc::new(BrokenStorage)), Box::new(FixedSignals));

        let first = provider.get_token().await;
        assert_eq!(provider.get_token().await, first);

        provider.reset_token().await;
        assert_ne!(provider.get_token().await, first);
    }

    #[test]
    fn test_fnv1a_known_values() {
        assert_eq!(fnv1a(""), 0x811c_9dc5);
        assert_eq!(fnv1a("a"), 0xe40c_292c);
    }
}
