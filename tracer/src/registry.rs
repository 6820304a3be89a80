//! Command list registry and collector state
//!
//! All mutable bookkeeping lives in one [`TraceState`] guarded by a single
//! coarse lock in the collector. Commands are stored in an id-keyed arena;
//! list records and pending calls reference them by [`CommandId`], and a
//! dangling id is a broken invariant, not a recoverable condition.

use crate::command::{CallRecord, CommandRecord};
use crate::interval::KernelInterval;
use crate::stats::KernelStatMap;
use gpuscope_shared::{
    CommandId, CommandListHandle, ContextHandle, DeviceHandle, ImageHandle, KernelHandle,
};
use std::collections::HashMap;

/// Bookkeeping for one live command list.
#[derive(Debug)]
pub struct CommandListRecord {
    pub context: ContextHandle,
    pub device: DeviceHandle,
    /// Immediate lists execute appended commands directly, without an
    /// explicit queue submission.
    pub immediate: bool,
    /// Commands committed to this list and not yet released.
    pub commands: Vec<CommandId>,
}

/// Shared mutable state of the collector.
#[derive(Debug, Default)]
pub(crate) struct TraceState {
    pub lists: HashMap<CommandListHandle, CommandListRecord>,
    pub commands: HashMap<CommandId, CommandRecord>,
    pub pending: Vec<CallRecord>,
    pub stats: KernelStatMap,
    pub intervals: Vec<KernelInterval>,
    pub image_sizes: HashMap<ImageHandle, u64>,
    pub group_sizes: HashMap<KernelHandle, [u32; 3]>,
}

impl TraceState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn list(&self, handle: CommandListHandle) -> &CommandListRecord {
        self.lists
            .get(&handle)
            .unwrap_or_else(|| panic!("command list {handle:?} is not registered"))
    }

    pub(crate) fn list_mut(&mut self, handle: CommandListHandle) -> &mut CommandListRecord {
        self.lists
            .get_mut(&handle)
            .unwrap_or_else(|| panic!("command list {handle:?} is not registered"))
    }

    pub(crate) fn command(&self, id: CommandId) -> &CommandRecord {
        self.commands
            .get(&id)
            .unwrap_or_else(|| panic!("command {id} missing from arena"))
    }
}
