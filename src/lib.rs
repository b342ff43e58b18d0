//! Shared ownership of heap objects through atomically reference-counted handles.
//!
//! A [`Shared`] handle points at its object directly and at a [`ControlBlock`] which counts the
//! handles aliasing it. The block also remembers how to destroy the object as the type it was
//! allocated as, so handles may be converted to less specific types (e.g. trait objects) without
//! ever running the wrong destructor.
//!
//! ```
//! use std::any::Any;
//! use refshare::{Shared, dynamic_pointer_cast, static_pointer_cast};
//!
//! trait Shape: Any + Sync {
//!     fn area(&self) -> f64;
//!     fn as_any(&self) -> &dyn Any;
//! }
//!
//! struct Square(f64);
//!
//! impl Shape for Square {
//!     fn area(&self) -> f64 {
//!         self.0 * self.0
//!     }
//!
//!     fn as_any(&self) -> &dyn Any {
//!         self
//!     }
//! }
//!
//! let square = Shared::new(Square(2.0));
//! let shape = static_pointer_cast::<dyn Shape, _>(&square, |v| v);
//! assert_eq!(shape.area(), 4.0);
//! assert_eq!(square.ref_count(), 2);
//!
//! let back = dynamic_pointer_cast::<Square, _>(&shape, |v| v.as_any().downcast_ref());
//! assert!(back == square);
//!
//! drop(square);
//! drop(back);
//! assert!(shape.is_unique());
//! ```

mod block;
pub use self::block::*;

mod cast;
pub use self::cast::*;

mod handle;
pub use self::handle::*;
