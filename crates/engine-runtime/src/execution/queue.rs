use model::core::chunk::Chunk;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Pending chunks shared by all workers. Each chunk is handed out once.
pub struct ChunkQueue {
    inner: Mutex<VecDeque<Chunk>>,
}

impl ChunkQueue {
    pub fn new(chunks: impl IntoIterator<Item = Chunk>) -> Self {
        ChunkQueue {
            inner: Mutex::new(chunks.into_iter().collect()),
        }
    }

    pub async fn pop(&self) -> Option<Chunk> {
        self.inner.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
