use std::{
    any::type_name,
    cmp::Ordering,
    fmt, hash,
    mem::{self, ManuallyDrop},
    ops::Deref,
    ptr::{self, NonNull},
};

use crate::ControlBlock;

// === Shared === //

/// A handle sharing ownership of a heap-allocated object with every other handle aliasing the same
/// [`ControlBlock`].
///
/// The handle's static type `T` may differ from the concrete type the object was allocated as.
/// Destruction always runs the destructor of the concrete type, which is bound to the block when
/// the object is first handed over.
pub struct Shared<T: ?Sized> {
    value: Option<NonNull<T>>,
    block: Option<NonNull<ControlBlock>>,
}

// SAFETY: handles only ever hand out `&T` and the concrete object is required to be `Send` when
// the block is created, so it may be destroyed from whichever thread releases it last.
unsafe impl<T: ?Sized + Sync> Send for Shared<T> {}

unsafe impl<T: ?Sized + Sync> Sync for Shared<T> {}

impl<T: ?Sized> Default for Shared<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized> Shared<T> {
    pub const fn null() -> Self {
        Self {
            value: None,
            block: None,
        }
    }

    pub fn new(value: T) -> Self
    where
        T: Sized + Send + 'static,
    {
        Self::from_box(Box::new(value))
    }

    pub fn from_box(value: Box<T>) -> Self
    where
        T: Sized + Send + 'static,
    {
        // SAFETY: the pointer was just leaked from a box nobody else owns.
        unsafe { Self::from_raw(NonNull::from(Box::leak(value))) }
    }

    /// Takes ownership of `value` through a handle of static type `T`. The object will still be
    /// destroyed as a `U`.
    pub fn from_box_as<U: Send + 'static>(value: Box<U>, upcast: fn(&U) -> &T) -> Self {
        Self::upcast(Shared::from_box(value), upcast)
    }

    /// Takes ownership of a raw pointer, binding a fresh control block with a count of one.
    ///
    /// ## Safety
    ///
    /// `ptr` must have been produced by `Box::<T>::into_raw` (or `Box::leak`) and must not already
    /// be owned by another handle's control block. Violating the latter results in a double drop.
    ///
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self
    where
        T: Sized + Send + 'static,
    {
        // SAFETY: provided by caller.
        let block = unsafe { ControlBlock::for_raw(ptr) }.alloc();

        Self {
            value: Some(ptr),
            block: Some(block),
        }
    }

    /// Converts a handle of type `U` into a handle of type `T` without touching the reference
    /// count. This is the converting counterpart of a move.
    pub fn upcast<U: ?Sized>(from: Shared<U>, upcast: fn(&U) -> &T) -> Self {
        let from = ManuallyDrop::new(from);

        Self {
            value: from.get().map(|v| NonNull::from(upcast(v))),
            block: from.block,
        }
    }

    /// Creates a new handle to `value` sharing this handle's control block, incrementing its
    /// count if there is one.
    ///
    /// ## Safety
    ///
    /// `value`, if present, must stay valid for as long as the object managed by this handle's
    /// block is alive.
    ///
    pub(crate) unsafe fn alias<U: ?Sized>(&self, value: Option<NonNull<U>>) -> Shared<U> {
        if let Some(block) = self.block {
            // SAFETY: our count keeps the block alive.
            unsafe { block.as_ref() }.increment();
        }

        Shared {
            value,
            block: self.block,
        }
    }

    fn release(&mut self) {
        self.value = None;

        let Some(block) = self.block.take() else {
            return;
        };

        // SAFETY: the count we are about to give up kept the block alive until now.
        if unsafe { block.as_ref() }.decrement() <= 0 {
            // SAFETY: we drove the count to the threshold and have already forgotten the block.
            unsafe { ControlBlock::destroy(block) };
        }
    }

    /// Releases this handle's ownership and leaves it null.
    pub fn reset(&mut self) {
        self.release();
    }

    /// Releases this handle's ownership and takes ownership of `value` with a fresh control block.
    pub fn reset_with(&mut self, value: Box<T>)
    where
        T: Sized + Send + 'static,
    {
        self.release();
        *self = Self::from_box(value);
    }

    pub fn reset_with_as<U: Send + 'static>(&mut self, value: Box<U>, upcast: fn(&U) -> &T) {
        self.release();
        *self = Self::from_box_as(value, upcast);
    }

    /// Releases this handle's ownership and takes ownership of a raw pointer.
    ///
    /// ## Safety
    ///
    /// See [`Shared::from_raw`]. Whether `ptr` is already owned elsewhere cannot be detected.
    ///
    pub unsafe fn reset_raw(&mut self, ptr: NonNull<T>)
    where
        T: Sized + Send + 'static,
    {
        self.release();

        // SAFETY: provided by caller.
        *self = unsafe { Self::from_raw(ptr) };
    }

    /// Replaces this handle with a converted copy of `from`.
    ///
    /// Assigning a handle that already denotes the same object through the same block is a no-op.
    pub fn assign<U: ?Sized>(&mut self, from: &Shared<U>, upcast: fn(&U) -> &T) {
        let value = from.get().map(|v| NonNull::from(upcast(v)));

        if self.block == from.block && self.identity() == identity_of(value, from.block) {
            return;
        }

        self.release();

        // SAFETY: `value` was derived from an object kept alive by `from`'s block.
        *self = unsafe { from.alias(value) };
    }

    /// Moves the contents out of this handle, leaving a null handle behind.
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }

    pub fn get(&self) -> Option<&T> {
        // SAFETY: a non-null value is kept alive by the count this handle contributes.
        self.value.map(|v| unsafe { v.as_ref() })
    }

    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.value
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Read-only access to the aliased block for diagnostics. The count cannot be changed
    /// through it:
    ///
    /// ```compile_fail
    /// use refshare::Shared;
    ///
    /// let a = Shared::new(1u32);
    /// let _ = a.control_block().unwrap().decrement();
    /// ```
    ///
    /// ```compile_fail
    /// use refshare::Shared;
    ///
    /// let a = Shared::new(1u32);
    /// a.control_block().unwrap().increment();
    /// ```
    pub fn control_block(&self) -> Option<&ControlBlock> {
        // SAFETY: our count keeps the block alive.
        self.block.map(|block| unsafe { block.as_ref() })
    }

    /// The number of handles sharing this handle's control block, or zero if there is none.
    pub fn ref_count(&self) -> usize {
        self.control_block()
            .map_or(0, |block| usize::try_from(block.ref_count()).unwrap_or(0))
    }

    pub fn is_unique(&self) -> bool {
        self.ref_count() == 1
    }

    /// Returns whether both handles share ownership through the same control block. Unlike `==`,
    /// this ignores the addresses the handles denote.
    pub fn ptr_eq<U: ?Sized>(me: &Self, other: &Shared<U>) -> bool {
        me.block == other.block
    }

    fn addr(&self) -> *const () {
        addr_of(self.value)
    }

    /// The key used by `==`, hashing and ordering.
    fn identity(&self) -> *const () {
        identity_of(self.value, self.block)
    }
}

fn addr_of<T: ?Sized>(value: Option<NonNull<T>>) -> *const () {
    value.map_or(ptr::null(), |v| v.as_ptr().cast_const().cast())
}

/// The object's address, except for zero-sized values. Those all share one dangling address and
/// are told apart by their control block instead.
fn identity_of<T: ?Sized>(
    value: Option<NonNull<T>>,
    block: Option<NonNull<ControlBlock>>,
) -> *const () {
    match value {
        // SAFETY: a non-null value is kept alive by the block it was derived from.
        Some(v) if mem::size_of_val(unsafe { v.as_ref() }) == 0 => addr_of(block),
        _ => addr_of(value),
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    fn clone(&self) -> Self {
        // SAFETY: the value is kept alive by the block we are aliasing.
        unsafe { self.alias(self.value) }
    }

    fn clone_from(&mut self, source: &Self) {
        if self.block == source.block && self.identity() == source.identity() {
            return;
        }

        self.release();
        *self = source.clone();
    }
}

impl<T: ?Sized> Drop for Shared<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    #[track_caller]
    fn deref(&self) -> &Self::Target {
        match self.get() {
            Some(v) => v,
            None => panic!("attempted to dereference a null `Shared<{}>`", type_name::<T>()),
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(v) => f.debug_tuple("Shared").field(&v).finish(),
            None => f.write_str("Shared(null)"),
        }
    }
}

impl<T: ?Sized> fmt::Pointer for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.addr(), f)
    }
}

// === Comparisons === //

/// The null literal. Compares equal to every handle whose value is null.
#[derive(Debug, Copy, Clone, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Null;

impl<T: ?Sized, U: ?Sized> PartialEq<Shared<U>> for Shared<T> {
    fn eq(&self, other: &Shared<U>) -> bool {
        self.identity() == other.identity()
    }
}

impl<T: ?Sized> Eq for Shared<T> {}

impl<T: ?Sized> PartialEq<Null> for Shared<T> {
    fn eq(&self, _other: &Null) -> bool {
        self.is_null()
    }
}

impl<T: ?Sized> PartialEq<Shared<T>> for Null {
    fn eq(&self, other: &Shared<T>) -> bool {
        other.is_null()
    }
}

impl<T: ?Sized> hash::Hash for Shared<T> {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl<T: ?Sized> PartialOrd for Shared<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: ?Sized> Ord for Shared<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}
