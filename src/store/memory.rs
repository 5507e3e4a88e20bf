//! In-memory output store for tests
//!
//! Clones share the same column, so a test can hand one clone to the writer and
//! inspect the other afterwards. Writes can be made to fail on demand to
//! exercise store-failure handling.

use super::OutputStore;
use crate::Result;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct Inner {
    values: Vec<f64>,
    write_log: Vec<Vec<u64>>,
    fail_writes: bool,
    closed: bool,
}

/// Shared in-memory column
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    len: u64,
    sentinel: f64,
}

impl MemoryStore {
    pub fn new(len: u64, sentinel: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                values: vec![sentinel; len as usize],
                write_log: Vec::new(),
                fail_writes: false,
                closed: false,
            })),
            len,
            sentinel,
        }
    }

    /// Make every subsequent write fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_writes = fail;
    }

    /// Snapshot of the column
    pub fn values(&self) -> Vec<f64> {
        self.inner.lock().unwrap().values.clone()
    }

    /// Index lists of every successful `write_slice` call, in call order
    pub fn write_log(&self) -> Vec<Vec<u64>> {
        self.inner.lock().unwrap().write_log.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

impl OutputStore for MemoryStore {
    fn len(&self) -> u64 {
        self.len
    }

    fn sentinel(&self) -> f64 {
        self.sentinel
    }

    fn write_slice(&mut self, indices: &[u64], values: &[f64]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            anyhow::bail!("memory store is closed");
        }
        if inner.fail_writes {
            anyhow::bail!("injected write failure");
        }
        if indices.len() != values.len() {
            anyhow::bail!("write_slice got {} indices and {} values", indices.len(), values.len());
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.len) {
            anyhow::bail!("index {} out of range ({})", bad, self.len);
        }

        for (&i, &v) in indices.iter().zip(values) {
            inner.values[i as usize] = v;
        }
        inner.write_log.push(indices.to_vec());
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<f64>> {
        Ok(self.values())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.inner.lock().unwrap().closed = true;
        Ok(())
    }
}
