//! Monthly quota tracking for the CJK OCR provider
//!
//! The provider's free tier is a fixed number of calls per API key per
//! calendar month. Several interchangeable keys form a pool, used in a fixed
//! preference order. Usage counters live in an external store keyed by
//! (key, month), so a new month starts from zero without anything being
//! reset.
//!
//! Admission is checked once per batch and usage recorded once after it, with
//! no lock in between: concurrent batches can overshoot a key's limit
//! slightly. The limit is a budget guard, not a billing boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Pool usage ratio at which a warning is surfaced
const WARN_RATIO: f64 = 0.80;
/// Pool usage ratio at which the warning becomes urgent
const CRITICAL_RATIO: f64 = 0.95;

#[derive(Error, Debug)]
pub enum UsageStoreError {
    #[error("Usage store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Usage store data is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Persisted call count of one key in one month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyUsageRecord {
    pub key_id: String,
    /// `YYYY-MM`
    pub month: String,
    pub count: u32,
}

/// External persistence for usage counters
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Usage of `key_id` in `month`; 0 when nothing has been recorded
    async fn get(&self, key_id: &str, month: &str) -> Result<u32, UsageStoreError>;

    /// Insert or replace the usage of `key_id` in `month`
    async fn upsert(&self, key_id: &str, month: &str, count: u32) -> Result<(), UsageStoreError>;
}

/// Usage store held in process memory
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    counts: RwLock<HashMap<(String, String), u32>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn get(&self, key_id: &str, month: &str) -> Result<u32, UsageStoreError> {
        let counts = self.counts.read().await;
        Ok(counts
            .get(&(key_id.to_string(), month.to_string()))
            .copied()
            .unwrap_or(0))
    }

    async fn upsert(&self, key_id: &str, month: &str, count: u32) -> Result<(), UsageStoreError> {
        let mut counts = self.counts.write().await;
        counts.insert((key_id.to_string(), month.to_string()), count);
        Ok(())
    }
}

/// Usage store persisted as a JSON array of `KeyUsageRecord`.
///
/// Each upsert writes a temporary file next to the store and renames it over
/// the old one, so readers only ever see a complete file.
pub struct JsonFileUsageStore {
    path: PathBuf,
    /// Readers share, read-modify-write is exclusive within this process
    lock: RwLock<()>,
}

impl JsonFileUsageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    async fn load(&self) -> Result<Vec<KeyUsageRecord>, UsageStoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_atomically(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(data)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl UsageStore for JsonFileUsageStore {
    async fn get(&self, key_id: &str, month: &str) -> Result<u32, UsageStoreError> {
        let _guard = self.lock.read().await;
        let records = self.load().await?;
        Ok(records
            .iter()
            .find(|r| r.key_id == key_id && r.month == month)
            .map_or(0, |r| r.count))
    }

    async fn upsert(&self, key_id: &str, month: &str, count: u32) -> Result<(), UsageStoreError> {
        let _guard = self.lock.write().await;
        let mut records = self.load().await?;

        match records
            .iter_mut()
            .find(|r| r.key_id == key_id && r.month == month)
        {
            Some(record) => record.count = count,
            None => records.push(KeyUsageRecord {
                key_id: key_id.to_string(),
                month: month.to_string(),
                count,
            }),
        }

        let data = serde_json::to_vec_pretty(&records)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &data))
            .await
            .map_err(std::io::Error::other)??;
        Ok(())
    }
}

/// Sum of per-key usage, saturating like the counters themselves
fn total_usage(usages: &[u32]) -> u32 {
    usages.iter().fold(0u32, |total, &usage| total.saturating_add(usage))
}

/// Month key used to scope usage counters
pub fn month_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

/// A key granted for a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGrant {
    pub index: usize,
    pub key: String,
    /// Month the grant was evaluated in; usage is recorded against it
    pub month: String,
    /// Usage of this key before the batch
    pub usage: u32,
}

/// Aggregate usage of the whole pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolUsage {
    /// Calls used this month across all keys, including the admitted batch
    pub current: u32,
    /// Total monthly capacity across all keys
    pub limit: u32,
    /// Whether the batch was admitted
    pub enabled: bool,
    /// Keys that still have budget left this month
    pub keys_available: usize,
}

/// Admission decision for one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub grant: Option<KeyGrant>,
    pub usage: PoolUsage,
    pub warning: Option<String>,
}

/// Pool of API keys sharing a per-key monthly limit
#[derive(Clone)]
pub struct QuotaLimitedKeyPool {
    provider: &'static str,
    keys: Vec<String>,
    per_key_limit: u32,
    store: Arc<dyn UsageStore>,
}

impl QuotaLimitedKeyPool {
    pub fn new(
        provider: &'static str,
        keys: Vec<String>,
        per_key_limit: u32,
        store: Arc<dyn UsageStore>,
    ) -> Self {
        Self {
            provider,
            keys,
            per_key_limit,
            store,
        }
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn capacity(&self) -> u32 {
        self.per_key_limit.saturating_mul(self.keys.len() as u32)
    }

    /// Identifier under which a key's usage is stored. The key itself is
    /// never persisted.
    fn key_id(&self, index: usize) -> String {
        format!("{}#{}", self.provider, index)
    }

    /// Select a key able to absorb `requested` calls this month.
    pub async fn select_key(&self, requested: u32) -> Admission {
        self.select_key_in(&month_key(Utc::now()), requested).await
    }

    /// Select the first key, in pool order, whose usage in `month` plus
    /// `requested` stays within the per-key limit.
    ///
    /// If the usage store cannot be read the pool fails open: key 0 is
    /// granted as if unused.
    pub async fn select_key_in(&self, month: &str, requested: u32) -> Admission {
        if self.keys.is_empty() {
            return Admission {
                grant: None,
                usage: PoolUsage {
                    current: 0,
                    limit: 0,
                    enabled: false,
                    keys_available: 0,
                },
                warning: None,
            };
        }

        let usages = match self.read_usages(month).await {
            Ok(usages) => usages,
            Err(e) => {
                tracing::warn!("Failed to read {} usage, allowing key 0: {}", self.provider, e);
                return Admission {
                    grant: Some(self.grant(0, month, 0)),
                    usage: PoolUsage {
                        current: requested,
                        limit: self.capacity(),
                        enabled: true,
                        keys_available: self.keys.len(),
                    },
                    warning: None,
                };
            }
        };

        let used = total_usage(&usages);
        let keys_available = usages
            .iter()
            .filter(|&&usage| usage < self.per_key_limit)
            .count();

        let selected = usages
            .iter()
            .position(|&usage| usage.saturating_add(requested) <= self.per_key_limit);

        let Some(index) = selected else {
            tracing::warn!(
                "{} key pool exhausted for {} ({}/{}), skipping CJK recognition",
                self.provider,
                month,
                used,
                self.capacity()
            );
            return Admission {
                grant: None,
                usage: PoolUsage {
                    current: used,
                    limit: self.capacity(),
                    enabled: false,
                    keys_available,
                },
                warning: Some(format!(
                    "{} monthly quota reached ({}/{}); Chinese name recognition is disabled, other passport fields are still recognized",
                    self.provider,
                    used,
                    self.capacity()
                )),
            };
        };

        let projected = used.saturating_add(requested);
        let warning = self.threshold_warning(projected);
        if let Some(warning) = &warning {
            tracing::warn!("{}", warning);
        }

        Admission {
            grant: Some(self.grant(index, month, usages[index])),
            usage: PoolUsage {
                current: projected,
                limit: self.capacity(),
                enabled: true,
                keys_available,
            },
            warning,
        }
    }

    /// Current usage of the whole pool this month
    pub async fn usage(&self) -> PoolUsage {
        self.usage_in(&month_key(Utc::now())).await
    }

    /// Usage of the whole pool in `month`. An unreadable store reports the
    /// pool as unused, matching the fail-open admission.
    pub async fn usage_in(&self, month: &str) -> PoolUsage {
        let usages = match self.read_usages(month).await {
            Ok(usages) => usages,
            Err(e) => {
                tracing::warn!("Failed to read {} usage: {}", self.provider, e);
                vec![0; self.keys.len()]
            }
        };
        let keys_available = usages
            .iter()
            .filter(|&&usage| usage < self.per_key_limit)
            .count();

        PoolUsage {
            current: total_usage(&usages),
            limit: self.capacity(),
            enabled: keys_available > 0,
            keys_available,
        }
    }

    /// Add `count` calls to the usage of key `index` this month.
    pub async fn record_usage(&self, index: usize, count: u32) -> Result<u32, UsageStoreError> {
        self.record_usage_in(&month_key(Utc::now()), index, count)
            .await
    }

    /// Add `count` calls to the usage of key `index` in `month` and return the
    /// new total. Not atomic with respect to other writers.
    pub async fn record_usage_in(
        &self,
        month: &str,
        index: usize,
        count: u32,
    ) -> Result<u32, UsageStoreError> {
        let key_id = self.key_id(index);
        let current = self.store.get(&key_id, month).await?;
        let updated = current.saturating_add(count);
        self.store.upsert(&key_id, month, updated).await?;

        tracing::info!(
            "{} usage for key {} in {}: {}/{}",
            self.provider,
            index,
            month,
            updated,
            self.per_key_limit
        );
        Ok(updated)
    }

    async fn read_usages(&self, month: &str) -> Result<Vec<u32>, UsageStoreError> {
        let mut usages = Vec::with_capacity(self.keys.len());
        for index in 0..self.keys.len() {
            usages.push(self.store.get(&self.key_id(index), month).await?);
        }
        Ok(usages)
    }

    fn grant(&self, index: usize, month: &str, usage: u32) -> KeyGrant {
        KeyGrant {
            index,
            key: self.keys[index].clone(),
            month: month.to_string(),
            usage,
        }
    }

    fn threshold_warning(&self, projected: u32) -> Option<String> {
        let capacity = self.capacity();
        if capacity == 0 {
            return None;
        }
        let ratio = projected as f64 / capacity as f64;
        let percent = ratio * 100.0;

        if ratio >= CRITICAL_RATIO {
            Some(format!(
                "{} usage at {:.0}% ({}/{}), monthly quota almost reached",
                self.provider, percent, projected, capacity
            ))
        } else if ratio >= WARN_RATIO {
            Some(format!(
                "{} usage at {:.0}% ({}/{})",
                self.provider, percent, projected, capacity
            ))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const MONTH: &str = "2026-10";

    struct UnreachableStore;

    #[async_trait]
    impl UsageStore for UnreachableStore {
        async fn get(&self, _key_id: &str, _month: &str) -> Result<u32, UsageStoreError> {
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "down").into())
        }

        async fn upsert(&self, _: &str, _: &str, _: u32) -> Result<(), UsageStoreError> {
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "down").into())
        }
    }

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("key-{}", i)).collect()
    }

    async fn pool_with_usage(usage: &[u32], limit: u32) -> QuotaLimitedKeyPool {
        let store = Arc::new(InMemoryUsageStore::new());
        for (i, count) in usage.iter().enumerate() {
            store
                .upsert(&format!("google_vision#{}", i), MONTH, *count)
                .await
                .unwrap();
        }
        QuotaLimitedKeyPool::new("google_vision", keys(usage.len()), limit, store)
    }

    #[tokio::test]
    async fn test_skips_exhausted_key() {
        let pool = pool_with_usage(&[980, 500], 980).await;
        let admission = pool.select_key_in(MONTH, 10).await;
        let grant = admission.grant.unwrap();
        assert_eq!(grant.index, 1);
        assert_eq!(grant.key, "key-1");
        assert_eq!(grant.usage, 500);
        assert_eq!(admission.usage.keys_available, 1);
        assert_eq!(admission.usage.current, 1490);
        assert_eq!(admission.usage.limit, 1960);
    }

    #[tokio::test]
    async fn test_prefers_first_key() {
        let pool = pool_with_usage(&[100, 0], 980).await;
        assert_eq!(pool.select_key_in(MONTH, 10).await.grant.unwrap().index, 0);
    }

    #[tokio::test]
    async fn test_whole_batch_must_fit() {
        // 975 + 10 would overflow key 0, so key 1 takes the whole batch
        let pool = pool_with_usage(&[975, 0], 980).await;
        assert_eq!(pool.select_key_in(MONTH, 10).await.grant.unwrap().index, 1);
    }

    #[tokio::test]
    async fn test_exact_limit_admitted() {
        let pool = pool_with_usage(&[970], 980).await;
        assert!(pool.select_key_in(MONTH, 10).await.grant.is_some());
    }

    #[tokio::test]
    async fn test_all_exhausted() {
        let pool = pool_with_usage(&[980, 975], 980).await;
        let admission = pool.select_key_in(MONTH, 10).await;
        assert!(admission.grant.is_none());
        assert!(!admission.usage.enabled);
        assert_eq!(admission.usage.keys_available, 1);
        assert!(admission.warning.unwrap().contains("quota reached"));
    }

    #[tokio::test]
    async fn test_new_month_starts_fresh() {
        let pool = pool_with_usage(&[980, 980], 980).await;
        assert!(pool.select_key_in(MONTH, 1).await.grant.is_none());
        let next = pool.select_key_in("2026-11", 1).await;
        assert_eq!(next.grant.unwrap().index, 0);
        assert_eq!(next.usage.keys_available, 2);
    }

    #[tokio::test]
    async fn test_threshold_warnings() {
        let pool = pool_with_usage(&[780], 1000).await;
        let warning = pool.select_key_in(MONTH, 20).await.warning.unwrap();
        assert!(warning.contains("80%"), "{}", warning);

        let pool = pool_with_usage(&[945], 1000).await;
        let warning = pool.select_key_in(MONTH, 10).await.warning.unwrap();
        assert!(warning.contains("almost reached"), "{}", warning);

        let pool = pool_with_usage(&[100], 1000).await;
        assert!(pool.select_key_in(MONTH, 10).await.warning.is_none());
    }

    #[tokio::test]
    async fn test_fails_open_when_store_unreachable() {
        let pool = QuotaLimitedKeyPool::new("google_vision", keys(2), 980, Arc::new(UnreachableStore));
        let admission = pool.select_key_in(MONTH, 10).await;
        let grant = admission.grant.unwrap();
        assert_eq!(grant.index, 0);
        assert_eq!(grant.usage, 0);
        assert!(admission.usage.enabled);
    }

    #[tokio::test]
    async fn test_empty_pool_disabled() {
        let pool = QuotaLimitedKeyPool::new(
            "google_vision",
            Vec::new(),
            980,
            Arc::new(InMemoryUsageStore::new()),
        );
        let admission = pool.select_key_in(MONTH, 1).await;
        assert!(admission.grant.is_none());
        assert!(!admission.usage.enabled);
        assert!(admission.warning.is_none());
    }

    #[tokio::test]
    async fn test_pool_usage_report() {
        let pool = pool_with_usage(&[980, 200], 980).await;
        let usage = pool.usage_in(MONTH).await;
        assert_eq!(usage.current, 1180);
        assert_eq!(usage.limit, 1960);
        assert_eq!(usage.keys_available, 1);
        assert!(usage.enabled);

        let pool = pool_with_usage(&[980], 980).await;
        assert!(!pool.usage_in(MONTH).await.enabled);
    }

    #[tokio::test]
    async fn test_record_usage_accumulates() {
        let pool = pool_with_usage(&[0, 500], 980).await;
        assert_eq!(pool.record_usage_in(MONTH, 1, 10).await.unwrap(), 510);
        assert_eq!(pool.record_usage_in(MONTH, 1, 5).await.unwrap(), 515);
        assert_eq!(pool.record_usage_in("2026-11", 1, 5).await.unwrap(), 5);
        assert_eq!(pool.store.get("google_vision#0", MONTH).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_saturated_counters_do_not_overflow() {
        let pool = pool_with_usage(&[u32::MAX, 10], 980).await;
        let admission = pool.select_key_in(MONTH, 1).await;
        assert_eq!(admission.grant.unwrap().index, 1);
        assert_eq!(admission.usage.current, u32::MAX);
        assert_eq!(pool.usage_in(MONTH).await.current, u32::MAX);
    }

    #[test]
    fn test_month_key() {
        let now = Utc.with_ymd_and_hms(2026, 1, 31, 23, 59, 0).unwrap();
        assert_eq!(month_key(now), "2026-01");
    }

    #[test]
    fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");

        tokio_test::block_on(async {
            let store = JsonFileUsageStore::new(&path);
            assert_eq!(store.get("google_vision#0", MONTH).await.unwrap(), 0);

            store.upsert("google_vision#0", MONTH, 12).await.unwrap();
            store.upsert("google_vision#0", MONTH, 15).await.unwrap();
            store.upsert("google_vision#1", MONTH, 3).await.unwrap();

            let reopened = JsonFileUsageStore::new(&path);
            assert_eq!(reopened.get("google_vision#0", MONTH).await.unwrap(), 15);
            assert_eq!(reopened.get("google_vision#1", MONTH).await.unwrap(), 3);
            assert_eq!(reopened.get("google_vision#1", "2026-09").await.unwrap(), 0);
        });

        let saved: Vec<KeyUsageRecord> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(saved.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_json_store_reads_during_writes_see_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");

        // A large file makes a torn read likely if writes are not atomic
        let mut records: Vec<KeyUsageRecord> = (0..3000)
            .map(|i| KeyUsageRecord {
                key_id: format!("other#{}", i),
                month: "2026-01".to_string(),
                count: 1,
            })
            .collect();
        records.push(KeyUsageRecord {
            key_id: "google_vision#0".to_string(),
            month: MONTH.to_string(),
            count: 980,
        });
        std::fs::write(&path, serde_json::to_vec_pretty(&records).unwrap()).unwrap();

        let store = Arc::new(JsonFileUsageStore::new(&path));

        let pool = QuotaLimitedKeyPool::new("google_vision", keys(2), 980, store.clone());

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for count in 0..100 {
                    store.upsert("google_vision#1", MONTH, count).await.unwrap();
                }
            })
        };

        loop {
            let admission = pool.select_key_in(MONTH, 1).await;
            assert_eq!(admission.grant.map(|g| g.index), Some(1));
            if writer.is_finished() {
                break;
            }
        }
        writer.await.unwrap();

        assert_eq!(store.get("google_vision#1", MONTH).await.unwrap(), 99);
        assert_eq!(store.get("google_vision#0", MONTH).await.unwrap(), 980);
    }

    #[test]
    fn test_json_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        std::fs::write(&path, b"not json").unwrap();

        let store = JsonFileUsageStore::new(&path);
        let result = tokio_test::block_on(store.get("google_vision#0", MONTH));
        assert!(matches!(result, Err(UsageStoreError::Corrupt(_))));
    }
}
