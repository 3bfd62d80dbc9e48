// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use kestrel_types::TopicKey;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

use crate::error::BusError;
use crate::topic::TopicStore;

/// The process-local bus: a registry of typed topics keyed by
/// `(TopicKey, TypeId)`. One `Bus` is shared (via `Arc`) by every agent
/// task in the process; topics themselves are independently lockable so
/// publishers never contend with each other across topics.
pub struct Bus {
    persist_root: Option<PathBuf>,
    topics: Mutex<HashMap<TopicKey, (TypeId, Arc<dyn Any + Send + Sync>)>>,
}

impl Bus {
    pub fn new(persist_root: Option<PathBuf>) -> Arc<Self> {
        Arc::new(Self { persist_root, topics: Mutex::new(HashMap::new()) })
    }

    /// Fetch or create the typed store for `key`. `persistent` only takes
    /// effect the first time a given key is registered in this process.
    pub async fn topic<T>(&self, key: TopicKey, persistent: bool) -> Result<Arc<TopicStore<T>>, BusError>
    where
        T: Clone + Serialize + DeserializeOwned + PartialEq + Send + Sync + 'static,
    {
        let mut topics = self.topics.lock().await;
        if let Some((type_id, existing)) = topics.get(&key) {
            if *type_id != TypeId::of::<T>() {
                return Err(BusError::TypeMismatch {
                    expected: std::any::type_name::<T>().to_owned(),
                    got: key.type_name.clone(),
                });
            }
            return Ok(Arc::clone(existing).downcast::<TopicStore<T>>().expect("type checked above"));
        }

        let dir = if persistent {
            self.persist_root.as_ref().map(|root| root.join(key.dir_name()))
        } else {
            None
        };
        let store = TopicStore::<T>::new(dir);
        store.load_persisted().await?;
        store.signal_restarted();
        topics.insert(key, (TypeId::of::<T>(), store.clone() as Arc<dyn Any + Send + Sync>));
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        n: u32,
    }

    #[tokio::test]
    async fn topic_is_reused_across_calls() {
        let bus = Bus::new(None);
        let key = TopicKey::new("zedagent", "Widget");
        let a = bus.topic::<Widget>(key.clone(), false).await.unwrap();
        a.publish("k1", Widget { n: 1 }).await.unwrap();
        let b = bus.topic::<Widget>(key, false).await.unwrap();
        assert_eq!(b.get("k1").await, Some(Widget { n: 1 }));
    }

    #[tokio::test]
    async fn type_mismatch_is_rejected() {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        struct Other {
            s: String,
        }

        let bus = Bus::new(None);
        let key = TopicKey::new("zedagent", "Widget");
        let _ = bus.topic::<Widget>(key.clone(), false).await.unwrap();
        let err = bus.topic::<Other>(key, false).await.unwrap_err();
        assert_eq!(err.as_str(), "TYPE_MISMATCH");
    }

    #[tokio::test]
    async fn persistent_topic_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let key = TopicKey::new("zedagent", "Widget");
        {
            let bus = Bus::new(Some(dir.path().to_path_buf()));
            let t = bus.topic::<Widget>(key.clone(), true).await.unwrap();
            t.publish("k1", Widget { n: 9 }).await.unwrap();
        }
        let bus2 = Bus::new(Some(dir.path().to_path_buf()));
        let t2 = bus2.topic::<Widget>(key, true).await.unwrap();
        assert_eq!(t2.get("k1").await, Some(Widget { n: 9 }));
    }
}
