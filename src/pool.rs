// Argus Host Monitoring Service - Object Pooling
// Recycles scratch buffers, string builders and record vectors across ticks

use std::sync::Mutex;

/// Soft capacity cap for pooled byte buffers and string builders.
pub const MAX_POOLED_BYTES: usize = 64 * 1024;

/// Soft element cap for pooled record vectors.
pub const MAX_POOLED_ELEMENTS: usize = 1024;

/// An object that can live in a [`Pool`].
///
/// `reset` must drop every reference to caller-owned data; `weight` is the
/// retained capacity used against the pool's soft cap.
pub trait Poolable: Default + Send {
    fn reset(&mut self);
    fn weight(&self) -> usize;
}

impl<T: Send> Poolable for Vec<T> {
    fn reset(&mut self) {
        self.clear();
    }

    fn weight(&self) -> usize {
        self.capacity()
    }
}

impl Poolable for String {
    fn reset(&mut self) {
        self.clear();
    }

    fn weight(&self) -> usize {
        self.capacity()
    }
}

/// Fixed-size free list of reusable objects.
///
/// Entries are reset on return; entries whose retained capacity exceeds
/// `max_weight` are dropped instead of pooled so a single oversized tick
/// cannot pin memory forever.
pub struct Pool<T: Poolable> {
    entries: Mutex<Vec<T>>,
    max_entries: usize,
    max_weight: usize,
    hits: Mutex<u64>,
    misses: Mutex<u64>,
}

/// Pool usage counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub pooled: usize,
    pub hits: u64,
    pub misses: u64,
}

impl<T: Poolable> Pool<T> {
    pub fn new(max_entries: usize, max_weight: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::with_capacity(max_entries)),
            max_entries,
            max_weight,
            hits: Mutex::new(0),
            misses: Mutex::new(0),
        }
    }

    /// Take an object from the pool, or construct a fresh one.
    pub fn acquire(&self) -> T {
        let mut entries = self.entries.lock().expect("pool lock poisoned");
        match entries.pop() {
            Some(entry) => {
                *self.hits.lock().expect("pool lock poisoned") += 1;
                entry
            }
            None => {
                *self.misses.lock().expect("pool lock poisoned") += 1;
                T::default()
            }
        }
    }

    /// Return an object to the pool.
    ///
    /// The object is reset first. Objects over the weight cap, or returns
    /// past the entry cap, are dropped.
    pub fn release(&self, mut obj: T) {
        obj.reset();
        if obj.weight() > self.max_weight {
            return;
        }
        let mut entries = self.entries.lock().expect("pool lock poisoned");
        if entries.len() < self.max_entries {
            entries.push(obj);
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            pooled: self.entries.lock().expect("pool lock poisoned").len(),
            hits: *self.hits.lock().expect("pool lock poisoned"),
            misses: *self.misses.lock().expect("pool lock poisoned"),
        }
    }
}

/// Pool of scratch byte buffers used by the file-backed stores.
pub type BufferPool = Pool<Vec<u8>>;

/// Pool of string builders used by template rendering.
pub type StringPool = Pool<String>;

/// Byte-buffer pool with the standard caps.
pub fn buffer_pool(max_entries: usize) -> BufferPool {
    Pool::new(max_entries, MAX_POOLED_BYTES)
}

/// String-builder pool with the standard caps.
pub fn string_pool(max_entries: usize) -> StringPool {
    Pool::new(max_entries, MAX_POOLED_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_miss_then_hit() {
        let pool: Pool<Vec<u8>> = Pool::new(4, MAX_POOLED_BYTES);

        let buf = pool.acquire();
        assert_eq!(pool.stats().misses, 1);

        pool.release(buf);
        assert_eq!(pool.stats().pooled, 1);

        let _buf = pool.acquire();
        assert_eq!(pool.stats().hits, 1);
        assert_eq!(pool.stats().pooled, 0);
    }

    #[test]
    fn test_release_resets_contents() {
        let pool: Pool<Vec<u8>> = Pool::new(4, MAX_POOLED_BYTES);

        let mut buf = pool.acquire();
        buf.extend_from_slice(b"stale data");
        pool.release(buf);

        let buf = pool.acquire();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_oversized_entries_dropped() {
        let pool: Pool<Vec<u8>> = Pool::new(4, 16);

        let mut buf = pool.acquire();
        buf.reserve(1024);
        pool.release(buf);

        assert_eq!(pool.stats().pooled, 0);
    }

    #[test]
    fn test_entry_cap_enforced() {
        let pool: Pool<String> = Pool::new(2, MAX_POOLED_BYTES);

        pool.release(String::from("a"));
        pool.release(String::from("b"));
        pool.release(String::from("c"));

        assert_eq!(pool.stats().pooled, 2);
    }

    #[test]
    fn test_string_pool_reuse() {
        let pool = string_pool(2);

        let mut s = pool.acquire();
        s.push_str("rendered body");
        pool.release(s);

        let s = pool.acquire();
        assert!(s.is_empty());
        assert!(s.capacity() >= "rendered body".len());
    }
}
