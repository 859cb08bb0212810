//! XPLM abstraction layer.
//!
//! All dataref access goes through the `XplmApi` trait so the bridge engine
//! runs against `MemoryXplm` in tests and in the console host, and against
//! the real SDK inside X-Plane.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Opaque handle to a cached X-Plane dataref (pointer-sized).
pub type DataRefHandle = usize;

// ── DataRefValue ──────────────────────────────────────────────────────────────

/// Value stored in the in-memory shim for a single dataref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataRefValue {
    Int(i32),
    Text(String),
}

// ── Trait ─────────────────────────────────────────────────────────────────────

/// Abstraction over the XPLM dataref operations used by the bridge.
///
/// `Send + Sync` so the trait object can live in a global `OnceLock`.
pub trait XplmApi: Send + Sync {
    /// Look up a dataref published by the simulator or another plugin.
    fn find_dataref(&self, path: &str) -> Option<DataRefHandle>;
    /// Publish a writable integer dataref owned by this plugin.
    fn register_int(&self, path: &str) -> Option<DataRefHandle>;
    /// Publish a writable string (byte array) dataref owned by this plugin.
    fn register_string(&self, path: &str) -> Option<DataRefHandle>;
    fn get_int(&self, handle: DataRefHandle) -> i32;
    fn set_int(&self, handle: DataRefHandle, value: i32);
    fn get_string(&self, handle: DataRefHandle) -> String;
    fn set_string(&self, handle: DataRefHandle, value: &str);
}

// ── MemoryXplm ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryInner {
    datarefs: HashMap<String, DataRefValue>,
    /// handle → canonical path (assigned on first lookup)
    handles: Vec<String>,
    /// recorded string writes: (path, value)
    string_writes: Vec<(String, String)>,
}

impl MemoryInner {
    fn handle_for(&mut self, path: &str) -> DataRefHandle {
        if let Some(idx) = self.handles.iter().position(|p| p == path) {
            return idx;
        }
        self.handles.push(path.to_string());
        self.handles.len() - 1
    }

    fn path(&self, handle: DataRefHandle) -> String {
        self.handles.get(handle).cloned().unwrap_or_default()
    }
}

/// In-memory dataref table.
///
/// Stands in for the simulator in unit tests and in hosts that run the bridge
/// outside X-Plane. Clones share the same table, so a test (or a consumer)
/// can keep one while the bridge owns another.
#[derive(Clone, Default)]
pub struct MemoryXplm {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryXplm {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        // A panic while holding the lock cannot leave the table half-written.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Pre-populate (or overwrite) a dataref by path.
    pub fn set_dataref(&self, path: &str, value: DataRefValue) {
        self.lock().datarefs.insert(path.to_string(), value);
    }

    /// Current value of a dataref by path.
    pub fn dataref(&self, path: &str) -> Option<DataRefValue> {
        self.lock().datarefs.get(path).cloned()
    }

    /// String value by path (`""` if absent or not a string).
    pub fn text(&self, path: &str) -> String {
        match self.dataref(path) {
            Some(DataRefValue::Text(s)) => s,
            _ => String::new(),
        }
    }

    /// Integer value by path (`0` if absent or not an integer).
    pub fn int(&self, path: &str) -> i32 {
        match self.dataref(path) {
            Some(DataRefValue::Int(v)) => v,
            _ => 0,
        }
    }

    /// Snapshot the recorded `set_string` calls (path, value).
    pub fn string_writes(&self) -> Vec<(String, String)> {
        self.lock().string_writes.clone()
    }
}

impl XplmApi for MemoryXplm {
    fn find_dataref(&self, path: &str) -> Option<DataRefHandle> {
        let mut g = self.lock();
        if !g.datarefs.contains_key(path) {
            return None;
        }
        Some(g.handle_for(path))
    }

    fn register_int(&self, path: &str) -> Option<DataRefHandle> {
        let mut g = self.lock();
        g.datarefs.entry(path.to_string()).or_insert(DataRefValue::Int(0));
        Some(g.handle_for(path))
    }

    fn register_string(&self, path: &str) -> Option<DataRefHandle> {
        let mut g = self.lock();
        g.datarefs
            .entry(path.to_string())
            .or_insert_with(|| DataRefValue::Text(String::new()));
        Some(g.handle_for(path))
    }

    fn get_int(&self, handle: DataRefHandle) -> i32 {
        let g = self.lock();
        match g.datarefs.get(&g.path(handle)) {
            Some(DataRefValue::Int(v)) => *v,
            Some(DataRefValue::Text(s)) => s.trim().parse().unwrap_or(0),
            None => 0,
        }
    }

    fn set_int(&self, handle: DataRefHandle, value: i32) {
        let mut g = self.lock();
        let path = g.path(handle);
        g.datarefs.insert(path, DataRefValue::Int(value));
    }

    fn get_string(&self, handle: DataRefHandle) -> String {
        let g = self.lock();
        match g.datarefs.get(&g.path(handle)) {
            Some(DataRefValue::Text(s)) => s.clone(),
            Some(DataRefValue::Int(v)) => v.to_string(),
            None => String::new(),
        }
    }

    fn set_string(&self, handle: DataRefHandle, value: &str) {
        let mut g = self.lock();
        let path = g.path(handle);
        g.datarefs.insert(path.clone(), DataRefValue::Text(value.to_string()));
        g.string_writes.push((path, value.to_string()));
    }
}
