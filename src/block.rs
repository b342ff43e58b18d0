use std::{
    any::type_name,
    fmt,
    ptr::{self, NonNull},
    sync::atomic::{AtomicIsize, Ordering::*, fence},
};

// === ControlBlock === //

/// Shared bookkeeping for a single managed object: the number of live handles aliasing it and a
/// type-erased way to destroy it.
pub struct ControlBlock {
    count: AtomicIsize,

    /// The address of the managed object, erased to `()`.
    pointee: *mut (),

    /// Destroys the object at `pointee` as the concrete type it was allocated as. This is bound
    /// once, when the block is created, and never rebound.
    destroy: Option<unsafe fn(*mut ())>,

    /// The name of the concrete type bound to `destroy`.
    type_name: &'static str,
}

// SAFETY: the only state mutated through a shared reference is the atomic count. The pointee is
// only ever touched by `destroy`, which runs exactly once, and construction requires the
// concrete type to be `Send`.
unsafe impl Send for ControlBlock {}

unsafe impl Sync for ControlBlock {}

impl fmt::Debug for ControlBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlBlock")
            .field("count", &self.ref_count())
            .field("pointee", &self.pointee)
            .field("type_name", &self.type_name)
            .finish()
    }
}

unsafe fn destroy_boxed<U>(pointee: *mut ()) {
    // SAFETY: `pointee` was produced by `Box::<U>::into_raw` in `ControlBlock::for_raw`.
    drop(unsafe { Box::from_raw(pointee.cast::<U>()) });
}

impl ControlBlock {
    /// A placeholder block with a count of zero and nothing to destroy. Null handles carry no block
    /// at all, so this only backs counting checks.
    #[cfg(test)]
    pub(crate) const fn empty() -> Self {
        Self {
            count: AtomicIsize::new(0),
            pointee: ptr::null_mut(),
            destroy: None,
            type_name: "()",
        }
    }

    /// Creates a block owning `pointee` with a count of one.
    ///
    /// ## Safety
    ///
    /// `pointee` must come from `Box::<U>::into_raw` and must not be owned by any other block.
    ///
    pub(crate) unsafe fn for_raw<U: Send + 'static>(pointee: NonNull<U>) -> Self {
        Self {
            count: AtomicIsize::new(1),
            pointee: pointee.as_ptr().cast(),
            destroy: Some(destroy_boxed::<U>),
            type_name: type_name::<U>(),
        }
    }

    /// Moves the block onto the heap. The result is released by [`ControlBlock::destroy`].
    pub(crate) fn alloc(self) -> NonNull<Self> {
        let type_name = self.type_name;
        let block = NonNull::from(Box::leak(Box::new(self)));

        log::trace!("allocated control block {block:p} for `{type_name}`");

        block
    }

    /// Adds one to the count. Only handles may do this, each on behalf of exactly one handle.
    pub(crate) fn increment(&self) {
        self.count.fetch_add(1, Relaxed);
    }

    /// Subtracts one from the count and returns the count this call observed afterwards.
    ///
    /// The block never destroys itself here. Callers that observe a result of zero or less own
    /// the block's destruction and must follow up with [`ControlBlock::destroy`].
    /// Only a handle giving up its own contribution may call this.
    #[must_use = "a result of zero or less obliges the caller to destroy the block"]
    pub(crate) fn decrement(&self) -> isize {
        self.count.fetch_sub(1, Release) - 1
    }

    /// A snapshot of the count. This may already be stale when it returns.
    pub fn ref_count(&self) -> isize {
        self.count.load(Acquire)
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Destroys the managed object, if any, and then releases the block's own storage.
    ///
    /// ## Safety
    ///
    /// `block` must have been produced by [`ControlBlock::alloc`] and the caller must have just
    /// driven its count to zero or less. No other handle may reference it afterwards.
    ///
    pub(crate) unsafe fn destroy(block: NonNull<Self>) {
        // Synchronizes with the `Release` decrements performed by every other handle so that
        // their accesses to the pointee happen-before its destruction.
        fence(Acquire);

        // SAFETY: provided by caller. The box is freed even if the pointee's destructor unwinds.
        let block = unsafe { Box::from_raw(block.as_ptr()) };

        log::trace!(
            "destroying control block {:p} for `{}`",
            &*block,
            block.type_name
        );

        if let Some(destroy) = block.destroy
            && !block.pointee.is_null()
        {
            // SAFETY: `destroy` was bound to the concrete type of `pointee` by `for_raw`.
            unsafe { destroy(block.pointee) };
        }
    }
}
