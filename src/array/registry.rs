//! Array Registry
//!
//! Holds the configured arrays as a sequence of immutable generations. The
//! only write primitive is [`ArrayRegistry::replace_all`], which swaps in a
//! complete new generation; readers load the current generation without
//! taking a lock and keep whatever generation they loaded until they drop it.

use super::descriptor::{ArrayDescriptor, ArrayId};
use super::events::RegistryEvent;
use crate::error::{Error, Result};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the registry event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Generation
// =============================================================================

/// One atomically installed snapshot of the configured arrays
#[derive(Debug)]
pub struct Generation {
    number: u64,
    arrays: HashMap<ArrayId, Arc<ArrayDescriptor>>,
    installed_at: DateTime<Utc>,
}

impl Generation {
    fn empty() -> Self {
        Self {
            number: 0,
            arrays: HashMap::new(),
            installed_at: Utc::now(),
        }
    }

    /// Generation number; 0 means nothing has been loaded yet
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn installed_at(&self) -> DateTime<Utc> {
        self.installed_at
    }

    pub fn get(&self, id: &ArrayId) -> Option<&Arc<ArrayDescriptor>> {
        self.arrays.get(id)
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Arrays ordered by id
    pub fn arrays(&self) -> Vec<Arc<ArrayDescriptor>> {
        let mut arrays: Vec<_> = self.arrays.values().cloned().collect();
        arrays.sort_by(|a, b| a.id().cmp(b.id()));
        arrays
    }

    /// The array marked as default, if any
    pub fn default_array(&self) -> Option<Arc<ArrayDescriptor>> {
        self.arrays.values().find(|a| a.is_default()).cloned()
    }
}

// =============================================================================
// Array Registry
// =============================================================================

/// Registry of configured arrays with whole-generation replacement
pub struct ArrayRegistry {
    current: ArcSwap<Generation>,
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl ArrayRegistry {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get an event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    /// Publish an event to subscribers
    pub fn publish(&self, event: RegistryEvent) {
        let _ = self.event_sender.send(event);
    }

    /// The current generation
    pub fn snapshot(&self) -> Arc<Generation> {
        self.current.load_full()
    }

    /// Current generation number; 0 until the first install
    pub fn generation(&self) -> u64 {
        self.current.load().number
    }

    /// Whether at least one generation has been installed
    pub fn is_loaded(&self) -> bool {
        self.generation() > 0
    }

    /// Look up an array by id (case-insensitive)
    pub fn get(&self, id: impl Into<ArrayId>) -> Option<Arc<ArrayDescriptor>> {
        let id = id.into();
        self.current.load().get(&id).cloned()
    }

    /// Check if an array exists
    pub fn contains(&self, id: impl Into<ArrayId>) -> bool {
        self.get(id).is_some()
    }

    /// All arrays of the current generation, ordered by id
    pub fn list(&self) -> Vec<Arc<ArrayDescriptor>> {
        self.current.load().arrays()
    }

    pub fn count(&self) -> usize {
        self.current.load().len()
    }

    /// The array marked as default in the current generation
    pub fn default_array(&self) -> Option<Arc<ArrayDescriptor>> {
        self.current.load().default_array()
    }

    /// Atomically replace every array with `descriptors`, returning the new
    /// generation number. Duplicate ids leave the registry untouched.
    pub fn replace_all(&self, descriptors: Vec<ArrayDescriptor>) -> Result<u64> {
        let mut arrays = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let id = descriptor.id().clone();
            if arrays.insert(id.clone(), Arc::new(descriptor)).is_some() {
                return Err(Error::ConfigDuplicate {
                    array_id: id.to_string(),
                });
            }
        }

        let array_count = arrays.len();
        let default_array = arrays
            .values()
            .find(|a| a.is_default())
            .map(|a| a.id().to_string());

        let previous = self.current.rcu(|current| Generation {
            number: current.number + 1,
            arrays: arrays.clone(),
            installed_at: Utc::now(),
        });
        let generation = previous.number + 1;

        self.publish(RegistryEvent::GenerationInstalled {
            generation,
            array_count,
            default_array,
        });

        Ok(generation)
    }
}

impl Default for ArrayRegistry {
    fn default() -> Self {
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            current: ArcSwap::from_pointee(Generation::empty()),
            event_sender,
        }
    }
}

impl std::fmt::Debug for ArrayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self.current.load();
        f.debug_struct("ArrayRegistry")
            .field("generation", &current.number)
            .field("array_count", &current.len())
            .finish()
    }
}
