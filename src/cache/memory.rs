use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use super::{CacheError, FastCache};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    SortedSet(HashMap<String, f64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-local [`FastCache`]. Expired keys are invisible immediately and
/// reclaimed on the next write to them or by [`MemoryCache::purge_expired`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

fn poisoned() -> CacheError {
    CacheError::Unavailable("memory cache lock poisoned".to_string())
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::WrongType {
        key: key.to_string(),
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Entry>>, CacheError> {
        self.entries.read().map_err(|_| poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Entry>>, CacheError> {
        self.entries.write().map_err(|_| poisoned())
    }

    /// Live entry for `key`, if any.
    fn live<'a>(
        entries: &'a HashMap<String, Entry>,
        key: &str,
        now: Instant,
    ) -> Option<&'a Entry> {
        entries.get(key).filter(|entry| !entry.is_expired(now))
    }

    /// Drops an expired entry so the caller can treat the key as fresh.
    fn evict_if_expired(entries: &mut HashMap<String, Entry>, key: &str, now: Instant) {
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
    }

    fn sorted_members(
        entries: &HashMap<String, Entry>,
        key: &str,
    ) -> Result<Vec<(String, f64)>, CacheError> {
        match Self::live(entries, key, Instant::now()) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::SortedSet(set),
                ..
            }) => Ok(set.iter().map(|(m, s)| (m.clone(), *s)).collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    /// Removes every expired key, returning how many were dropped.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = Instant::now();
        let mut entries = self.write()?;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before - entries.len())
    }

    /// Number of live keys.
    pub fn len(&self) -> Result<usize, CacheError> {
        let now = Instant::now();
        Ok(self
            .read()?
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count())
    }

    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }
}

impl FastCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.read()?;
        match Self::live(&entries, key, Instant::now()) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.write()?;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.write()?.remove(key);
        Ok(())
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut entries = self.write()?;
        Self::evict_if_expired(&mut entries, key, now);
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        let entries = self.read()?;
        match Self::live(&entries, key, Instant::now()) {
            None => Ok(None),
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => Ok(hash.get(field).cloned()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.write()?;
        Self::evict_if_expired(&mut entries, key, now);
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));
        match &mut entry.value {
            Value::Hash(hash) => {
                hash.insert(field.to_string(), value.to_string());
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    fn hash_delete(&self, key: &str, field: &str) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.write()?;
        Self::evict_if_expired(&mut entries, key, now);
        let Some(entry) = entries.get_mut(key) else {
            return Ok(());
        };
        let emptied = match &mut entry.value {
            Value::Hash(hash) => {
                hash.remove(field);
                hash.is_empty()
            }
            _ => return Err(wrong_type(key)),
        };
        if emptied {
            entries.remove(key);
        }
        Ok(())
    }

    fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>, CacheError> {
        let entries = self.read()?;
        match Self::live(&entries, key, Instant::now()) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => {
                let mut fields: Vec<(String, String)> =
                    hash.iter().map(|(f, v)| (f.clone(), v.clone())).collect();
                fields.sort();
                Ok(fields)
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.write()?;
        Self::evict_if_expired(&mut entries, key, now);
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::SortedSet(HashMap::new())));
        match &mut entry.value {
            Value::SortedSet(set) => {
                set.insert(member.to_string(), score);
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    fn sorted_set_increment(
        &self,
        key: &str,
        member: &str,
        delta: f64,
    ) -> Result<f64, CacheError> {
        let now = Instant::now();
        let mut entries = self.write()?;
        Self::evict_if_expired(&mut entries, key, now);
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::SortedSet(HashMap::new())));
        match &mut entry.value {
            Value::SortedSet(set) => {
                let score = set.entry(member.to_string()).or_insert(0.0);
                *score += delta;
                Ok(*score)
            }
            _ => Err(wrong_type(key)),
        }
    }

    fn sorted_set_range_desc(
        &self,
        key: &str,
        start: usize,
        end: usize,
    ) -> Result<Vec<String>, CacheError> {
        let entries = self.read()?;
        let mut members = Self::sorted_members(&entries, key)?;
        if members.is_empty() || start > end || start >= members.len() {
            return Ok(Vec::new());
        }

        // Ties rank by member in reverse lexical order, like ZREVRANGE.
        members.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        let end = end.min(members.len() - 1);
        Ok(members[start..=end]
            .iter()
            .map(|(member, _)| member.clone())
            .collect())
    }

    fn sorted_set_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<String>, CacheError> {
        let entries = self.read()?;
        let mut members: Vec<(String, f64)> = Self::sorted_members(&entries, key)?
            .into_iter()
            .filter(|(_, score)| *score >= min && *score <= max)
            .collect();
        members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(members.into_iter().map(|(member, _)| member).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::thread::sleep;

    use super::*;

    #[test]
    fn string_values_expire() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v", Some(Duration::from_millis(20)))
            .unwrap();
        assert_eq!(cache.get("k").unwrap().as_deref(), Some("v"));

        sleep(Duration::from_millis(40));
        assert!(cache.get("k").unwrap().is_none());
        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn hash_fields_and_key_ttl() {
        let cache = MemoryCache::new();
        cache.hash_set("h", "a", "1").unwrap();
        cache.hash_set("h", "b", "2").unwrap();
        assert!(cache.expire("h", Duration::from_secs(60)).unwrap());
        assert!(!cache.expire("missing", Duration::from_secs(60)).unwrap());

        assert_eq!(cache.hash_get("h", "a").unwrap().as_deref(), Some("1"));
        cache.hash_delete("h", "a").unwrap();
        assert!(cache.hash_get("h", "a").unwrap().is_none());
        assert_eq!(
            cache.hash_get_all("h").unwrap(),
            vec![("b".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn sorted_set_ranges_match_redis_semantics() {
        let cache = MemoryCache::new();
        cache.sorted_set_increment("z", "a", 1.0).unwrap();
        cache.sorted_set_increment("z", "b", 3.0).unwrap();
        assert_eq!(cache.sorted_set_increment("z", "a", 4.0).unwrap(), 5.0);
        cache.sorted_set_add("z", "c", 2.0).unwrap();

        assert_eq!(cache.sorted_set_range_desc("z", 0, 1).unwrap(), vec!["a", "b"]);
        assert_eq!(
            cache.sorted_set_range_desc("z", 0, 99).unwrap(),
            vec!["a", "b", "c"]
        );
        assert!(cache.sorted_set_range_desc("z", 5, 9).unwrap().is_empty());
        assert_eq!(
            cache.sorted_set_range_by_score("z", 2.0, 3.0).unwrap(),
            vec!["c", "b"]
        );
        assert!(cache.sorted_set_range_desc("none", 0, 9).unwrap().is_empty());
    }

    #[test]
    fn type_mismatch_is_reported() {
        let cache = MemoryCache::new();
        cache.set("k", "v", None).unwrap();
        assert!(matches!(
            cache.sorted_set_add("k", "m", 1.0),
            Err(CacheError::WrongType { .. })
        ));
        assert!(matches!(
            cache.hash_get("k", "f"),
            Err(CacheError::WrongType { .. })
        ));
    }

    #[test]
    fn expired_key_can_change_type() {
        let cache = MemoryCache::new();
        cache.set("k", "v", Some(Duration::from_millis(10))).unwrap();
        sleep(Duration::from_millis(30));
        cache.sorted_set_add("k", "m", 1.0).unwrap();
        assert_eq!(cache.sorted_set_range_desc("k", 0, 0).unwrap(), vec!["m"]);
    }
}
