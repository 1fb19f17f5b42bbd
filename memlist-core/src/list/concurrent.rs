//! ## memlist-core::list::concurrent
//! **Lock-coupled singly linked list**
//!
//! Traversal is hand-over-hand: the guard of the next node is acquired
//! before the guard of the current node is released, and the head guard is
//! handed off to the first node's guard the same way. A node is unlinked
//! only while its predecessor's guard (or the head guard) and its own guard
//! are both held, so no walker can step into a node that is being removed.
//!
//! Lock order is head guard, then node guards in list order, then the
//! allocator. Node storage is allocated and freed while node guards are
//! held; the allocator never calls back into the list.

use std::fmt::Write;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::node::{GuardRegistry, HeldNode, NodeRecord, NodeRef, Payload, NODE_SIZE};
use crate::alloc::{Allocator, BlockPtr};
use crate::error::{AllocError, ListError};

/// A singly linked list whose nodes live in an [`Allocator`]'s arena.
#[derive(Debug)]
pub struct ConcurrentList {
    allocator: Arc<Allocator>,
    owns_allocator: bool,
    head: Mutex<Option<BlockPtr>>,
    /// Set by `cleanup`; written and checked under the head guard.
    closed: AtomicBool,
    guards: GuardRegistry,
}

impl ConcurrentList {
    /// Creates an empty list backed by a fresh arena of `capacity` bytes.
    /// The arena is released by [`ConcurrentList::cleanup`].
    pub fn init(capacity: usize) -> Result<Self, ListError> {
        let allocator = Allocator::init(capacity)?;
        Ok(Self::new(Arc::new(allocator), true))
    }

    /// Creates an empty list that takes node storage from `allocator`.
    ///
    /// The allocator may be shared with other lists; `cleanup` returns this
    /// list's nodes to it but leaves it running.
    pub fn with_allocator(allocator: Arc<Allocator>) -> Self {
        Self::new(allocator, false)
    }

    fn new(allocator: Arc<Allocator>, owns_allocator: bool) -> Self {
        Self {
            allocator,
            owns_allocator,
            head: Mutex::new(None),
            closed: AtomicBool::new(false),
            guards: GuardRegistry::new(),
        }
    }

    pub fn allocator(&self) -> &Arc<Allocator> {
        &self.allocator
    }

    pub fn is_empty(&self) -> bool {
        self.head.lock().is_none()
    }

    /// Whether [`ConcurrentList::cleanup`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Appends `value` at the tail.
    pub fn insert(&self, value: Payload) -> Result<NodeRef, ListError> {
        self.ensure_open()?;
        let node = self
            .create_node(value, None)
            .map_err(|err| self.closed_or(err))?;
        self.append(node).inspect_err(|_| self.discard(node))?;
        Ok(node)
    }

    fn append(&self, node: NodeRef) -> Result<(), ListError> {
        let mut head = self.head.lock();
        self.ensure_open()?;
        let Some(first) = *head else {
            *head = Some(node.ptr());
            debug!(%node, "Node installed as head");
            return Ok(());
        };

        let mut held = self.lock_node(first)?;
        drop(head);

        loop {
            let record = self.read_record(held.node.ptr())?;
            match record.next {
                Some(next) => held = self.step(held, next)?,
                None => {
                    self.write_next(held.node.ptr(), Some(node.ptr()))?;
                    debug!(%node, after = %held.node, "Node appended");
                    return Ok(());
                }
            }
        }
    }

    /// Links a new node right after `target`.
    pub fn insert_after(
        &self,
        target: Option<NodeRef>,
        value: Payload,
    ) -> Result<NodeRef, ListError> {
        let target = target.ok_or(ListError::MissingNode)?;
        self.ensure_open()?;
        let _held = self.lock_live(target)?;

        let record = self.read_record(target.ptr())?;
        let node = self.create_node(value, record.next)?;
        self.write_next(target.ptr(), Some(node.ptr()))
            .inspect_err(|_| self.discard(node))?;

        debug!(%node, after = %target, "Node inserted");
        Ok(node)
    }

    /// Links a new node right before `target`.
    ///
    /// Storage is only allocated once the splice point has been found, so a
    /// missing target never costs an allocation.
    pub fn insert_before(
        &self,
        target: Option<NodeRef>,
        value: Payload,
    ) -> Result<NodeRef, ListError> {
        let target = target.ok_or(ListError::MissingNode)?;

        let mut head = self.head.lock();
        self.ensure_open()?;
        let Some(first) = *head else {
            return Err(ListError::TargetNotFound(target));
        };
        let mut prev = self.lock_node(first)?;

        if prev.node == target {
            let node = self.create_node(value, Some(first))?;
            *head = Some(node.ptr());
            debug!(%node, before = %target, "Node installed as head");
            return Ok(node);
        }
        drop(head);

        loop {
            let record = self.read_record(prev.node.ptr())?;
            let Some(next) = record.next else {
                warn!(%target, "Insert target not reachable from head");
                return Err(ListError::TargetNotFound(target));
            };

            let current = self.lock_node(next)?;
            if current.node == target {
                let node = self.create_node(value, Some(next))?;
                self.write_next(prev.node.ptr(), Some(node.ptr()))
                    .inspect_err(|_| self.discard(node))?;
                debug!(%node, before = %target, "Node inserted");
                return Ok(node);
            }
            prev = current;
        }
    }

    /// Removes the first node carrying `value`. Returns whether one was
    /// found; an absent value leaves the list untouched.
    pub fn delete(&self, value: Payload) -> Result<bool, ListError> {
        let mut head = self.head.lock();
        let Some(first) = *head else {
            return Ok(false);
        };
        let mut prev = self.lock_node(first)?;

        let record = self.read_record(first)?;
        if record.value == value {
            *head = record.next;
            drop(head);
            self.destroy(prev);
            return Ok(true);
        }
        drop(head);

        let mut cursor = record.next;
        while let Some(ptr) = cursor {
            let current = self.lock_node(ptr)?;
            let record = self.read_record(ptr)?;
            if record.value == value {
                self.write_next(prev.node.ptr(), record.next)?;
                self.destroy(current);
                return Ok(true);
            }
            prev = current;
            cursor = record.next;
        }
        Ok(false)
    }

    /// First node carrying `value`, as of the moment it was visited.
    ///
    /// The handle is not pinned: a later `delete` may remove the node, after
    /// which using the handle reports [`ListError::StaleNode`].
    pub fn search(&self, value: Payload) -> Result<Option<NodeRef>, ListError> {
        let mut found = None;
        self.walk(|node, record| {
            if record.value == value {
                found = Some(node);
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        })?;
        Ok(found)
    }

    /// Payload of `node`, if it is still linked.
    pub fn value(&self, node: NodeRef) -> Result<Payload, ListError> {
        let _held = self.lock_live(node)?;
        Ok(self.read_record(node.ptr())?.value)
    }

    pub fn count(&self) -> Result<usize, ListError> {
        let mut count = 0;
        self.walk(|_, _| {
            count += 1;
            ControlFlow::Continue(())
        })?;
        Ok(count)
    }

    /// Payloads in list order.
    pub fn values(&self) -> Result<Vec<Payload>, ListError> {
        let mut values = Vec::new();
        self.walk(|_, record| {
            values.push(record.value);
            ControlFlow::Continue(())
        })?;
        Ok(values)
    }

    /// Node handles in list order.
    pub fn nodes(&self) -> Result<Vec<NodeRef>, ListError> {
        let mut nodes = Vec::new();
        self.walk(|node, _| {
            nodes.push(node);
            ControlFlow::Continue(())
        })?;
        Ok(nodes)
    }

    /// Renders the list as `[v1, v2, ..., vn]`.
    pub fn display(&self) -> Result<String, ListError> {
        Ok(render(&self.values()?))
    }

    /// Renders the nodes from `start` (or the head) through `end`
    /// inclusive, or to the tail when `end` is `None` or never reached.
    /// A `start` that is never reached renders as `[]`.
    pub fn display_range(
        &self,
        start: Option<NodeRef>,
        end: Option<NodeRef>,
    ) -> Result<String, ListError> {
        let mut rendering = start.is_none();
        let mut values = Vec::new();
        self.walk(|node, record| {
            if Some(node) == start {
                rendering = true;
            }
            if rendering {
                values.push(record.value);
            }
            if Some(node) == end {
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        })?;
        Ok(render(&values))
    }

    /// Closes the list, detaches the whole chain and reclaims every node.
    /// The arena is released too when this list created it. Returns the
    /// number of nodes reclaimed.
    ///
    /// Walks that started before the detach finish safely: this walk
    /// follows them hand-over-hand and cannot overtake them. Inserts that
    /// reach the head guard afterwards fail with [`ListError::Closed`].
    pub fn cleanup(&self) -> Result<usize, ListError> {
        let detached = {
            let mut head = self.head.lock();
            self.closed.store(true, Ordering::Release);
            head.take()
        };

        let mut reclaimed = 0;
        let mut cursor = detached.map(|ptr| self.lock_node(ptr)).transpose()?;
        while let Some(held) = cursor {
            let record = self.read_record(held.node.ptr())?;
            cursor = record.next.map(|next| self.lock_node(next)).transpose()?;
            self.destroy(held);
            reclaimed += 1;
        }

        if self.owns_allocator {
            self.allocator.deinit();
        }
        info!(reclaimed, "List cleaned up");
        Ok(reclaimed)
    }

    fn ensure_open(&self) -> Result<(), ListError> {
        if self.is_closed() {
            return Err(ListError::Closed);
        }
        Ok(())
    }

    /// Storage failures caused by a concurrent `cleanup` report as closed.
    fn closed_or(&self, err: ListError) -> ListError {
        if self.is_closed() {
            ListError::Closed
        } else {
            err
        }
    }

    /// Read-only lock-coupled walk from the head.
    fn walk<F>(&self, mut visit: F) -> Result<(), ListError>
    where
        F: FnMut(NodeRef, &NodeRecord) -> ControlFlow<()>,
    {
        let mut cursor = self.lock_first()?;
        while let Some(held) = cursor {
            let record = self.read_record(held.node.ptr())?;
            if visit(held.node, &record).is_break() {
                break;
            }
            cursor = match record.next {
                Some(next) => Some(self.step(held, next)?),
                None => None,
            };
        }
        Ok(())
    }

    /// Locks the first node, handing off from the head guard.
    fn lock_first(&self) -> Result<Option<HeldNode>, ListError> {
        let head = self.head.lock();
        let first = *head;
        first.map(|ptr| self.lock_node(ptr)).transpose()
    }

    /// Locks the successor before releasing `held`.
    fn step(&self, held: HeldNode, next: BlockPtr) -> Result<HeldNode, ListError> {
        let successor = self.lock_node(next)?;
        drop(held);
        Ok(successor)
    }

    /// Locks the guard of a node reached through a held predecessor or the
    /// head guard, which keeps it registered.
    fn lock_node(&self, ptr: BlockPtr) -> Result<HeldNode, ListError> {
        let lock = self
            .guards
            .lookup(ptr)
            .ok_or(AllocError::UnknownBlock(ptr))?;
        Ok(lock.lock_arc())
    }

    /// Locks the guard of a node reached through a caller's handle and
    /// checks that the handle still names a linked node.
    fn lock_live(&self, node: NodeRef) -> Result<HeldNode, ListError> {
        let stale = || {
            warn!(%node, "Stale node reference");
            ListError::StaleNode(node)
        };
        let lock = self.guards.lookup(node.ptr()).ok_or_else(stale)?;
        let held = lock.lock_arc();
        if !held.linked || held.node != node {
            return Err(stale());
        }
        Ok(held)
    }

    fn read_record(&self, ptr: BlockPtr) -> Result<NodeRecord, ListError> {
        Ok(self.allocator.with_block(ptr, NodeRecord::decode)?)
    }

    fn write_next(&self, ptr: BlockPtr, next: Option<BlockPtr>) -> Result<(), ListError> {
        self.allocator
            .with_block_mut(ptr, |bytes| NodeRecord::encode_next(bytes, next))?;
        Ok(())
    }

    /// Allocates and fills storage for a node and registers its guard. The
    /// node is not reachable until the caller links it.
    fn create_node(&self, value: Payload, next: Option<BlockPtr>) -> Result<NodeRef, ListError> {
        let ptr = self
            .allocator
            .alloc(NODE_SIZE)
            .ok_or(ListError::OutOfMemory {
                requested: NODE_SIZE,
            })?;

        let record = NodeRecord { value, next };
        if let Err(err) = self
            .allocator
            .with_block_mut(ptr, |bytes| record.encode(bytes))
        {
            self.allocator.free(ptr);
            return Err(err.into());
        }
        Ok(self.guards.register(ptr))
    }

    /// Releases a node that was created but never linked.
    fn discard(&self, node: NodeRef) {
        self.guards.unregister(node.ptr());
        self.allocator.free(node.ptr());
    }

    /// Retires an unlinked node: marks its guard dead, drops it from the
    /// registry and returns its storage. The guard is released last.
    fn destroy(&self, mut held: HeldNode) {
        held.linked = false;
        let node = held.node;
        self.guards.unregister(node.ptr());
        self.allocator.free(node.ptr());
        debug!(%node, "Node reclaimed");
    }
}

fn render(values: &[Payload]) -> String {
    let mut out = String::with_capacity(2 + values.len() * 7);
    out.push('[');
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{}", value);
    }
    out.push(']');
    out
}
