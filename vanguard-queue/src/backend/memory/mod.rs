mod scored;
mod storage;

pub use storage::MemoryBackend;
