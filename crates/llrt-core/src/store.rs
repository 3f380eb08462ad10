//! Shared node/edge storage.
//!
//! A `SharedVec<T>` is a dense array of node or edge data that many worker
//! threads read and write at once without locks. The engine makes that safe
//! structurally rather than with synchronization: work is only ever split at
//! whole near-node boundaries, and no two jobs sharing a near component or
//! a link run in the same barrier, so two threads never hold references to
//! the same element. The unsafe accessors encode exactly that contract.
//!
//! `DataVec` is the type-erased face of a `SharedVec`: enough surface for
//! code that does not know `T` (the scheduler, the adjacency-list link's
//! edge-storage back-channel) to resize, move, and reset entries.

use std::any::Any;
use std::cell::UnsafeCell;
use std::sync::Arc;

pub struct SharedVec<T> {
    cell: UnsafeCell<Vec<T>>,
}

// Raw pointers into the cell are only dereferenced under the disjoint-index
// contract documented on the accessors.
unsafe impl<T: Send + Sync> Sync for SharedVec<T> {}
unsafe impl<T: Send> Send for SharedVec<T> {}

impl<T: Default> SharedVec<T> {
    pub fn with_len(len: usize) -> Self {
        let mut v = Vec::new();
        v.resize_with(len, T::default);
        Self {
            cell: UnsafeCell::new(v),
        }
    }
}

impl<T> SharedVec<T> {
    pub fn len(&self) -> usize {
        unsafe { (*self.cell.get()).len() }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exclusive reference to one element.
    ///
    /// # Safety
    /// No other reference to `ix` may be live. The scheduler guarantees this
    /// for near-node and edge slots inside a barrier; callers outside a
    /// kernel must ensure no kernel is in flight on this storage.
    #[inline]
    pub unsafe fn index_mut(&self, ix: usize) -> &mut T {
        &mut (&mut *self.cell.get())[ix]
    }

    /// Shared reference to one element.
    ///
    /// # Safety
    /// No exclusive reference to `ix` may be live (far-node data is never
    /// written during an iteration, which is what makes this usable from
    /// kernels).
    #[inline]
    pub unsafe fn index_ref(&self, ix: usize) -> &T {
        &(&*self.cell.get())[ix]
    }

    /// Copy out the full contents.
    ///
    /// Precondition: no kernel in flight on this storage.
    pub fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        unsafe { (*self.cell.get()).clone() }
    }

    /// Overwrite the full contents. Lengths must match.
    ///
    /// Precondition: no kernel in flight on this storage.
    pub fn fill_from(&self, values: &[T]) -> bool
    where
        T: Clone,
    {
        let vec = unsafe { &mut *self.cell.get() };
        if vec.len() != values.len() {
            return false;
        }
        vec.clone_from_slice(values);
        true
    }
}

/// Type-erased view of a `SharedVec<T>`.
///
/// The mutating operations carry the same precondition as the typed
/// accessors: they may only be called while no kernel is in flight on the
/// storage (adjacency edits are specified to happen between batches).
pub trait DataVec: Send + Sync + 'static {
    fn len(&self) -> usize;

    /// Grow or shrink the storage, default-filling new entries.
    fn resize(&self, new_len: usize);

    /// Move the entry at `from` into slot `to`, leaving a default value
    /// behind.
    fn move_entry(&self, from: usize, to: usize);

    /// Replace the entry at `ix` with a freshly constructed value.
    fn reset_entry(&self, ix: usize);

    fn as_any(&self) -> &dyn Any;

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Short type label for topology display.
    fn type_label(&self) -> &'static str;
}

impl<T: Default + Send + Sync + 'static> DataVec for SharedVec<T> {
    fn len(&self) -> usize {
        SharedVec::len(self)
    }

    fn resize(&self, new_len: usize) {
        let vec = unsafe { &mut *self.cell.get() };
        vec.resize_with(new_len, T::default);
    }

    fn move_entry(&self, from: usize, to: usize) {
        let vec = unsafe { &mut *self.cell.get() };
        let taken = std::mem::take(&mut vec[from]);
        vec[to] = taken;
    }

    fn reset_entry(&self, ix: usize) {
        let vec = unsafe { &mut *self.cell.get() };
        vec[ix] = T::default();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn type_label(&self) -> &'static str {
        let full = std::any::type_name::<T>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

/// Recover the typed storage behind a `DataVec` handle.
pub fn downcast_store<T: Default + Send + Sync + 'static>(
    data: &Arc<dyn DataVec>,
) -> Option<Arc<SharedVec<T>>> {
    Arc::clone(data).as_any_arc().downcast::<SharedVec<T>>().ok()
}
