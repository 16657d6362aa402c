//! Bounded LRU cache of synthesized audio artifacts.
//!
//! Keyed by a hash of the voice and reply text; the opaque key doubles as
//! the path segment of the short-lived pull URL. Map mutation happens
//! under a short mutex with no I/O held; synthesis for a missing entry
//! runs outside the lock in a per-key `OnceCell`, so concurrent misses
//! single-flight onto one provider call.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use frontdesk_kernel::speech::{SpeechError, TextToSpeech};

/// Maximum cached artifacts before LRU eviction.
pub const AUDIO_CACHE_CAPACITY: usize = 100;

type Slot = Arc<OnceCell<Arc<Vec<u8>>>>;

struct CacheInner {
    slots: HashMap<String, Slot>,
    /// Keys in least-recently-used-first order.
    order: VecDeque<String>,
}

/// Process-wide audio artifact cache.
pub struct AudioArtifactCache {
    synthesizer: Arc<dyn TextToSpeech>,
    inner: Mutex<CacheInner>,
    capacity: usize,
}

/// Opaque artifact identifier for a voice/text pair: 12 hex chars of the
/// md5 digest.
pub fn artifact_id(voice_id: &str, text: &str) -> String {
    let digest = md5::compute(format!("{}|{}", voice_id, text));
    format!("{:x}", digest)[..12].to_string()
}

impl AudioArtifactCache {
    pub fn new(synthesizer: Arc<dyn TextToSpeech>) -> Self {
        Self::with_capacity(synthesizer, AUDIO_CACHE_CAPACITY)
    }

    pub fn with_capacity(synthesizer: Arc<dyn TextToSpeech>, capacity: usize) -> Self {
        Self {
            synthesizer,
            inner: Mutex::new(CacheInner {
                slots: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Return the artifact for `text`, synthesizing and caching it on a
    /// miss. Concurrent misses for the same key await one synthesis.
    pub async fn get_or_synthesize(
        &self,
        text: &str,
    ) -> Result<(String, Arc<Vec<u8>>), SpeechError> {
        let id = artifact_id(self.synthesizer.voice_id(), text);

        let slot = {
            let mut inner = self.inner.lock().await;
            let slot = inner
                .slots
                .entry(id.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone();
            touch(&mut inner.order, &id);
            evict_over_capacity(&mut inner, self.capacity);
            slot
        };

        let text = text.to_string();
        let synthesizer = self.synthesizer.clone();
        let audio = slot
            .get_or_try_init(|| async move {
                debug!(artifact = %id_for_log(&text), "synthesizing audio artifact");
                synthesizer.synthesize(&text).await.map(Arc::new)
            })
            .await?
            .clone();

        Ok((id, audio))
    }

    /// Look up a previously synthesized artifact by its opaque id.
    /// Evicted or never-synthesized ids yield `None`.
    pub async fn get(&self, id: &str) -> Option<Arc<Vec<u8>>> {
        let slot = {
            let mut inner = self.inner.lock().await;
            let slot = inner.slots.get(id).cloned()?;
            touch(&mut inner.order, id);
            slot
        };
        slot.get().cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.slots.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn touch(order: &mut VecDeque<String>, id: &str) {
    order.retain(|key| key != id);
    order.push_back(id.to_string());
}

fn evict_over_capacity(inner: &mut CacheInner, capacity: usize) {
    while inner.slots.len() > capacity {
        match inner.order.pop_front() {
            Some(oldest) => {
                inner.slots.remove(&oldest);
                debug!(artifact = %oldest, "evicted audio artifact");
            }
            None => break,
        }
    }
}

fn id_for_log(text: &str) -> String {
    text.chars().take(32).collect()
}
