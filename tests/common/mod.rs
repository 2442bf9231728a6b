// tests/common/mod.rs
//
// Shared helpers: a scripted fetcher and a context builder.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use feedwatch::cache::{CacheStore, MemoryStore};
use feedwatch::ingest::types::{Fetcher, Record};
use feedwatch::notify::{NotifierMux, RecordingNotifier};
use feedwatch::scheduler::{ReadySignal, WatchContext};
use feedwatch::FetchError;

/// Plays back a fixed list of batches (comma-joined ids, newest first).
/// Once the script runs out the last good batch repeats.
pub struct Scripted {
    name: String,
    script: Mutex<VecDeque<Result<String, FetchError>>>,
    last_ok: Mutex<String>,
    calls: AtomicUsize,
}

impl Scripted {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            last_ok: Mutex::new(String::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn then(self, ids: &[&str]) -> Self {
        self.script.lock().unwrap().push_back(Ok(ids.join(",")));
        self
    }

    pub fn then_fail(self, err: FetchError) -> Self {
        self.script.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for Scripted {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_raw(&self) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(raw)) => {
                *self.last_ok.lock().unwrap() = raw.clone();
                Ok(raw)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self.last_ok.lock().unwrap().clone()),
        }
    }

    fn parse(&self, raw: &str) -> Result<Vec<Record>, FetchError> {
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        Ok(raw
            .split(',')
            .map(|id| Record::new(id).with_field("title", format!("title {id}")))
            .collect())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub sink: Arc<RecordingNotifier>,
    pub ctx: WatchContext,
}

/// Memory store + one recording sink, already marked ready.
pub fn harness() -> Harness {
    harness_with(ReadySignal::ready(), Vec::new())
}

pub fn harness_with(ready: ReadySignal, extra_sinks: Vec<Arc<RecordingNotifier>>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingNotifier::new("recording"));

    let mut mux = NotifierMux::new();
    for extra in extra_sinks {
        mux.push(extra);
    }
    mux.push(sink.clone());

    let store_dyn: Arc<dyn CacheStore> = store.clone();
    Harness {
        ctx: WatchContext {
            store: store_dyn,
            notifier: Arc::new(mux),
            ready,
        },
        store,
        sink,
    }
}
