use crate::store::keys;
use crate::store::operations::catalog::Item;
use crate::store::{Store, StoreError};

const VERSION_KEY: &str = "_meta:version";

type MigrationFn = fn(&Store) -> Result<(), StoreError>;

fn migrations() -> Vec<(&'static str, MigrationFn)> {
    vec![
        ("001_initial", m001_initial),
        ("002_items_by_topic_index", m002_items_by_topic_index),
    ]
}

/// Applies every migration newer than the recorded version.
///
/// Each migration must be idempotent: a crash between the migration body and
/// `set_version` re-runs it on the next start. Versions only move forward.
pub fn run(store: &Store) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    let all = migrations();

    for (index, (name, func)) in all.iter().enumerate() {
        let version = (index + 1) as u32;
        if version > current {
            tracing::info!(version, name, "Running migration");
            func(store)?;
            set_version(store, version)?;
            tracing::info!(version, name, "Migration complete");
        } else {
            tracing::debug!(version, name, "Migration already applied, skipping");
        }
    }

    Ok(())
}

pub fn get_current_version(store: &Store) -> Result<u32, StoreError> {
    match store.meta.get(VERSION_KEY.as_bytes())? {
        Some(raw) => {
            let bytes: [u8; 4] = raw.as_ref().try_into().map_err(|_| StoreError::Migration {
                version: 0,
                message: format!("corrupt version marker ({} bytes)", raw.len()),
            })?;
            Ok(u32::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

pub fn set_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("Refuse to downgrade from {} to {}", current, version),
        });
    }

    store
        .meta
        .insert(VERSION_KEY.as_bytes(), &version.to_be_bytes())?;
    Ok(())
}

fn m001_initial(_store: &Store) -> Result<(), StoreError> {
    Ok(())
}

fn m002_items_by_topic_index(store: &Store) -> Result<(), StoreError> {
    for entry in store.items.iter() {
        let (_, value) = entry?;
        let item: Item = Store::deserialize(&value)?;
        let index_key = keys::item_topic_index_key(&item.topic_id, &item.id)?;
        store
            .items_by_topic
            .insert(index_key.as_bytes(), item.id.as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn migrations_are_recorded_and_rerun_safely() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("migrate-db").to_str().unwrap()).unwrap();

        run(&store).unwrap();
        assert_eq!(get_current_version(&store).unwrap(), migrations().len() as u32);

        run(&store).unwrap();
        assert_eq!(get_current_version(&store).unwrap(), migrations().len() as u32);
    }

    #[test]
    fn downgrade_is_refused() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("migrate-down").to_str().unwrap()).unwrap();

        set_version(&store, 2).unwrap();
        assert!(matches!(
            set_version(&store, 1),
            Err(StoreError::Migration { version: 1, .. })
        ));
    }
}
