use std::{
    any::{Any, type_name},
    ptr::NonNull,
};

use thiserror::Error;

use crate::Shared;

// === Pointer Casts === //

/// Produces a handle of type `T` aliasing `from`'s control block, with its value converted by
/// `cast`. The count is incremented whenever there is a block to alias, even if `from` is null.
pub fn static_pointer_cast<T: ?Sized, U: ?Sized>(
    from: &Shared<U>,
    cast: fn(&U) -> &T,
) -> Shared<T> {
    let value = from.get().map(|v| NonNull::from(cast(v)));

    // SAFETY: `value` borrows from the object kept alive by `from`'s block.
    unsafe { from.alias(value) }
}

/// Like [`static_pointer_cast`] but with a runtime-checked conversion.
///
/// When `cast` rejects the value, the result is a null-valued handle which *still* aliases
/// `from`'s control block and contributes to its count. The managed object is kept alive until
/// that handle is dropped or reset as well.
pub fn dynamic_pointer_cast<T: ?Sized, U: ?Sized>(
    from: &Shared<U>,
    cast: fn(&U) -> Option<&T>,
) -> Shared<T> {
    let value = from.get().and_then(cast).map(NonNull::from);

    // SAFETY: `value` borrows from the object kept alive by `from`'s block.
    unsafe { from.alias(value) }
}

/// Converts a [`Shared`] into a handle of the type expected by the surrounding context using an
/// implicit coercion, e.g. to a `dyn Trait`.
#[macro_export]
macro_rules! upcast {
    ($($expr:tt)*) => {
        $crate::Shared::upcast($($expr)*, |v| v)
    };
}

// === Any Downcasts === //

#[derive(Debug, Clone, Error)]
pub enum DowncastError {
    #[error("attempted to downcast a null handle to `{expected}`")]
    Null { expected: &'static str },

    #[error("managed object is not a `{expected}`")]
    Mismatch { expected: &'static str },
}

macro_rules! impl_any_downcast {
    ($($ty:ty),*$(,)?) => {$(
        impl Shared<$ty> {
            /// A [`dynamic_pointer_cast`] to the concrete type `U`.
            pub fn downcast<U: Any>(&self) -> Shared<U> {
                dynamic_pointer_cast(self, |v| v.downcast_ref::<U>())
            }

            /// Like [`Shared::downcast`] but leaves the count untouched on failure.
            pub fn try_downcast<U: Any>(&self) -> Result<Shared<U>, DowncastError> {
                let expected = type_name::<U>();

                match self.get() {
                    None => Err(DowncastError::Null { expected }),
                    Some(v) if !v.is::<U>() => Err(DowncastError::Mismatch { expected }),
                    Some(_) => Ok(self.downcast::<U>()),
                }
            }
        }
    )*};
}

impl_any_downcast!(dyn Any, dyn Any + Send, dyn Any + Send + Sync);
