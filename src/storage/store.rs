//! The exercise library: a flat collection persisted under one key.

use chrono::{DateTime, Utc};

use super::KeyValueStorage;
use crate::errors::RecorderError;
use crate::types::ExerciseRecord;

pub struct ExerciseStore {
    storage: Box<dyn KeyValueStorage>,
    key: String,
    records: Vec<ExerciseRecord>,
}

impl ExerciseStore {
    /// Load the collection stored under `key`.
    ///
    /// A missing key is an empty library. So is an unreadable one: the
    /// stored value is left untouched until the next successful write.
    pub fn load(storage: Box<dyn KeyValueStorage>, key: impl Into<String>) -> Result<Self, RecorderError> {
        let key = key.into();
        let records = match storage.get(&key)? {
            None => Vec::new(),
            Some(raw) => match serde_json::from_str::<Vec<ExerciseRecord>>(&raw) {
                Ok(records) => records,
                Err(e) => {
                    log::warn!("Stored exercises under '{}' are unreadable, starting empty: {}", key, e);
                    Vec::new()
                }
            },
        };
        log::info!("Loaded {} exercises from '{}'", records.len(), key);
        Ok(Self {
            storage,
            key,
            records,
        })
    }

    /// All records in storage order; callers sort for display.
    pub fn list(&self) -> &[ExerciseRecord] {
        &self.records
    }

    pub fn get(&self, id: u64) -> Option<&ExerciseRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Next id: save time in milliseconds, bumped past every existing id.
    pub fn next_id(&self, now: DateTime<Utc>) -> u64 {
        let millis = now.timestamp_millis().max(0) as u64;
        let highest = self.records.iter().map(|r| r.id).max();
        match highest {
            Some(highest) if millis <= highest => highest + 1,
            _ => millis,
        }
    }

    pub fn append(&mut self, record: ExerciseRecord) -> Result<(), RecorderError> {
        if record.name.trim().is_empty() {
            return Err(RecorderError::validation("Please enter an exercise name"));
        }
        if record.video_payload.is_empty() {
            return Err(RecorderError::validation("Recording has no video"));
        }
        if record.audio_payload.as_ref().is_some_and(|a| a.is_empty()) {
            return Err(RecorderError::validation("Recording has an empty audio track"));
        }
        if self.get(record.id).is_some() {
            return Err(RecorderError::validation(format!(
                "An exercise with id {} already exists",
                record.id
            )));
        }

        let mut candidate = self.records.clone();
        candidate.push(record);
        self.commit(candidate)?;
        log::info!("Saved exercise; library now holds {}", self.records.len());
        Ok(())
    }

    /// Remove the record with `id`. Returns false, without writing, if absent.
    pub fn remove_by_id(&mut self, id: u64) -> Result<bool, RecorderError> {
        if self.get(id).is_none() {
            log::debug!("No exercise with id {}; nothing to delete", id);
            return Ok(false);
        }
        let candidate: Vec<ExerciseRecord> =
            self.records.iter().filter(|r| r.id != id).cloned().collect();
        self.commit(candidate)?;
        log::info!("Deleted exercise {}", id);
        Ok(true)
    }

    pub fn clear(&mut self) -> Result<(), RecorderError> {
        self.commit(Vec::new())?;
        log::info!("Cleared exercise library");
        Ok(())
    }

    /// Size of the serialized collection as it would be written now
    pub fn serialized_len(&self) -> Result<usize, RecorderError> {
        Ok(serde_json::to_string(&self.records)?.len())
    }

    /// Write `candidate` as the whole collection and adopt it on success.
    fn commit(&mut self, candidate: Vec<ExerciseRecord>) -> Result<(), RecorderError> {
        let serialized = serde_json::to_string(&candidate)?;
        if let Err(e) = self.storage.set(&self.key, &serialized) {
            log::error!("Failed to persist exercises: {}", e);
            return Err(e);
        }
        self.records = candidate;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::types::MediaPayload;
    use chrono::TimeZone;

    fn record(id: u64, name: &str) -> ExerciseRecord {
        ExerciseRecord {
            id,
            name: name.to_string(),
            kind: None,
            created_at: Utc.timestamp_millis_opt(id as i64).unwrap(),
            duration_label: "00:03".to_string(),
            video_payload: MediaPayload::new("video/x-motion-jpeg", vec![1u8, 2, 3]),
            audio_payload: Some(MediaPayload::new("audio/wav", vec![4u8, 5])),
        }
    }

    #[test]
    fn test_corrupt_value_loads_empty() {
        let mut storage = MemoryStorage::new();
        storage.set("exercises", "{not json").unwrap();
        let store = ExerciseStore::load(Box::new(storage), "exercises").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_persisted_between_loads() {
        let mut storage = MemoryStorage::new();
        let mut store = ExerciseStore::load(Box::new(storage.clone()), "exercises").unwrap();
        store.append(record(1, "Plank")).unwrap();
        let raw = store.storage.get("exercises").unwrap().unwrap();

        storage.set("exercises", &raw).unwrap();
        let reloaded = ExerciseStore::load(Box::new(storage), "exercises").unwrap();
        assert_eq!(reloaded.list(), store.list());
    }

    #[test]
    fn test_quota_failure_keeps_collection() {
        let mut store =
            ExerciseStore::load(Box::new(MemoryStorage::with_quota(400)), "exercises").unwrap();
        store.append(record(1, "Plank")).unwrap();

        let mut huge = record(2, "Sprint");
        huge.video_payload = MediaPayload::new("video/x-motion-jpeg", vec![7u8; 4096]);
        assert!(matches!(
            store.append(huge),
            Err(RecorderError::QuotaExceeded { .. })
        ));
        assert_eq!(store.len(), 1);
        assert!(store.get(2).is_none());
    }

    #[test]
    fn test_invalid_records_rejected() {
        let mut store = ExerciseStore::load(Box::new(MemoryStorage::new()), "exercises").unwrap();
        assert!(store.append(record(1, "   ")).is_err());

        let mut no_video = record(2, "Lunge");
        no_video.video_payload = MediaPayload::new("video/x-motion-jpeg", Vec::<u8>::new());
        assert!(store.append(no_video).is_err());

        store.append(record(3, "Lunge")).unwrap();
        assert!(store.append(record(3, "Again")).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_next_id_is_monotonic() {
        let mut store = ExerciseStore::load(Box::new(MemoryStorage::new()), "exercises").unwrap();
        let now = Utc.timestamp_millis_opt(5_000).unwrap();
        assert_eq!(store.next_id(now), 5_000);

        store.append(record(5_000, "A")).unwrap();
        assert_eq!(store.next_id(now), 5_001);
        assert_eq!(store.next_id(Utc.timestamp_millis_opt(9_000).unwrap()), 9_000);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut store = ExerciseStore::load(Box::new(MemoryStorage::new()), "exercises").unwrap();
        store.append(record(1, "A")).unwrap();
        assert!(!store.remove_by_id(42).unwrap());
        assert_eq!(store.len(), 1);
        assert!(store.remove_by_id(1).unwrap());
        assert!(store.is_empty());
    }
}
