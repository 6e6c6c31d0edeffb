//! Message allocation strategies.
//!
//! [`Allocation::Heap`] gives every message its own ownership, dropped when
//! the caller lets go of it. [`Allocation::Arena`] routes every message built
//! during one call through an [`Arena`]. Only root messages live in the
//! arena's index-addressed slots. Nested messages are ordinary values owned
//! by their root, so they are not pooled individually, but they go away with
//! it when the arena is reset or dropped.

use crate::encode;
use crate::error::Result;
use crate::value::GenericValue;
use crate::wire;
use prost_reflect::{DynamicMessage, MessageDescriptor};
use std::ops::Index;
use tracing::trace;

/// Per-call choice of message ownership.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Allocation {
    #[default]
    Heap,
    Arena,
}

/// Hands out fresh message instances to the encoder.
pub(crate) trait MessageSource {
    fn new_message(&mut self, desc: &MessageDescriptor) -> DynamicMessage;
}

/// Plain heap ownership: every message stands on its own.
pub(crate) struct Heap;

impl MessageSource for Heap {
    fn new_message(&mut self, desc: &MessageDescriptor) -> DynamicMessage {
        DynamicMessage::new(desc.clone())
    }
}

/// Index of a message slot inside an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(usize);

/// Bulk-lifetime pool of messages.
///
/// Slots are only ever appended; a [`MessageId`] stays valid until the arena
/// is dropped or [`reset`](Arena::reset).
#[derive(Debug, Default)]
pub struct Arena {
    slots: Vec<DynamicMessage>,
    created: usize,
}

/// Builds nested messages for an arena-owned root.
///
/// The messages themselves are owned by the root they end up in; the arena
/// only counts them.
struct ArenaSource<'a> {
    created: &'a mut usize,
}

impl MessageSource for ArenaSource<'_> {
    fn new_message(&mut self, desc: &MessageDescriptor) -> DynamicMessage {
        *self.created += 1;
        DynamicMessage::new(desc.clone())
    }
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an empty message of type `desc`.
    pub fn alloc(&mut self, desc: &MessageDescriptor) -> MessageId {
        self.created += 1;
        self.slots.push(DynamicMessage::new(desc.clone()));
        MessageId(self.slots.len() - 1)
    }

    /// Encode `value` into a new arena slot.
    pub fn encode(&mut self, desc: &MessageDescriptor, value: &GenericValue) -> Result<MessageId> {
        let id = self.alloc(desc);
        let Arena { slots, created } = self;
        let mut source = ArenaSource { created };
        encode::encode_into(&mut slots[id.0], value, &mut source)?;
        Ok(id)
    }

    /// Parse wire bytes into a new arena slot.
    pub fn parse(&mut self, desc: &MessageDescriptor, bytes: &[u8]) -> Result<MessageId> {
        let id = self.alloc(desc);
        wire::merge_into(&mut self.slots[id.0], bytes)?;
        Ok(id)
    }

    pub fn get(&self, id: MessageId) -> Option<&DynamicMessage> {
        self.slots.get(id.0)
    }

    pub fn get_mut(&mut self, id: MessageId) -> Option<&mut DynamicMessage> {
        self.slots.get_mut(id.0)
    }

    /// Number of root slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Every message created through this arena, nested ones included.
    ///
    /// Nested messages count here even though they are owned by their root
    /// slot.
    pub fn created(&self) -> usize {
        self.created
    }

    /// Drop every message at once, keeping the slot storage for reuse.
    pub fn reset(&mut self) {
        trace!(slots = self.slots.len(), messages = self.created, "arena reset");
        self.slots.clear();
        self.created = 0;
    }
}

impl Index<MessageId> for Arena {
    type Output = DynamicMessage;

    fn index(&self, id: MessageId) -> &DynamicMessage {
        &self.slots[id.0]
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if self.created > 0 {
            trace!(slots = self.slots.len(), messages = self.created, "arena released");
        }
    }
}

/// Run `f` with a fresh arena and release it on every exit path.
pub fn scoped<T>(f: impl FnOnce(&mut Arena) -> Result<T>) -> Result<T> {
    let mut arena = Arena::new();
    let result = f(&mut arena);
    drop(arena);
    result
}
