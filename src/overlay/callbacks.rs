//! Draw callbacks run once per frame between frame setup and present

use std::sync::{Mutex, MutexGuard};
use tracing::debug;

pub type DrawCallback = unsafe extern "C" fn();

#[derive(Debug, Clone)]
pub struct CallbackEntry {
    pub id: i32,
    pub name: String,
    pub callback: DrawCallback,
    pub priority: i32,
    pub enabled: bool,
}

/// Callbacks kept sorted by descending priority, plus the single slot used by
/// callers that predate ids.
#[derive(Debug)]
pub struct CallbackRegistry {
    next_id: i32,
    entries: Vec<CallbackEntry>,
    legacy: Option<DrawCallback>,
}

impl CallbackRegistry {
    pub const fn new() -> Self {
        CallbackRegistry {
            next_id: 1,
            entries: Vec::new(),
            legacy: None,
        }
    }

    pub fn add(&mut self, name: &str, callback: DrawCallback, priority: i32) -> i32 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(CallbackEntry {
            id,
            name: name.to_string(),
            callback,
            priority,
            enabled: true,
        });
        // stable, so equal priorities keep registration order
        self.entries.sort_by(|a, b| b.priority.cmp(&a.priority));
        debug!("Draw callback {} '{}' added at priority {}", id, name, priority);
        id
    }

    pub fn remove(&mut self, id: i32) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        before != self.entries.len()
    }

    pub fn set_enabled(&mut self, id: i32, enabled: bool) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn set_legacy(&mut self, callback: Option<DrawCallback>) {
        self.legacy = callback;
    }

    /// Registered callbacks, counting the legacy slot when set.
    pub fn count(&self) -> usize {
        self.entries.len() + usize::from(self.legacy.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.legacy = None;
    }

    /// Callbacks to run this frame: the legacy slot first, then enabled
    /// entries in priority order.
    pub fn frame_list(&self) -> Vec<DrawCallback> {
        self.legacy
            .into_iter()
            .chain(self.entries.iter().filter(|e| e.enabled).map(|e| e.callback))
            .collect()
    }

    pub fn entries(&self) -> &[CallbackEntry] {
        &self.entries
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static REGISTRY: Mutex<CallbackRegistry> = Mutex::new(CallbackRegistry::new());

pub fn registry() -> MutexGuard<'static, CallbackRegistry> {
    REGISTRY.lock().unwrap_or_else(|e| e.into_inner())
}

/// Run this frame's callbacks. The registry lock is only held to take the
/// snapshot, so callbacks may add or remove entries. Returns false when
/// nothing is registered.
pub fn run_frame() -> bool {
    let list = {
        let registry = registry();
        if registry.is_empty() {
            return false;
        }
        registry.frame_list()
    };
    for callback in list {
        unsafe { callback() };
    }
    true
}
