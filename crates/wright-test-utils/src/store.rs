use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use wright_store::{FileStore, MemoryStore, StoreError};

/// A [`MemoryStore`] whose writes fail on demand.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    /// Remaining injected failures per path.
    failures: Mutex<BTreeMap<String, usize>>,
    writes: Mutex<Vec<String>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` writes to `path`.
    pub fn failing(self, path: &str, times: usize) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(path.to_string(), times);
        self
    }

    /// Paths of every write attempt, failed or not, in order.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub async fn files(&self) -> BTreeMap<String, String> {
        self.inner.files().await
    }
}

#[async_trait]
impl FileStore for FlakyStore {
    async fn read(&self, path: &str) -> Result<Option<String>, StoreError> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), StoreError> {
        self.writes.lock().unwrap().push(path.to_string());
        let inject = {
            let mut failures = self.failures.lock().unwrap();
            match failures.get_mut(path) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            }
        };
        if inject {
            return Err(StoreError::Io {
                path: path.to_string(),
                source: std::io::Error::other("injected write failure"),
            });
        }
        self.inner.write(path, content).await
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list().await
    }
}
