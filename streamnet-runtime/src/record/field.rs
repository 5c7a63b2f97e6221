//! Field values and the interfaces that own them
//!
//! A field value is opaque to the runtime. Copying and releasing it goes
//! through the [`Interface`] it was created with, so that the external type
//! system stays in charge of its own memory.

use crate::error::{RecordError, RecordResult};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use streamnet_types::InterfaceId;

/// Opaque field value handle
pub type Opaque = Box<dyn Any + Send>;

/// External type system owning a set of field values
pub trait Interface: Send + Sync {
    fn id(&self) -> InterfaceId;

    /// Deep-copy a value owned by this interface
    fn copy(&self, value: &Opaque) -> RecordResult<Opaque>;

    /// Release a value owned by this interface
    fn free(&self, value: Opaque) {
        drop(value);
    }
}

/// Interface for plain `Clone` values
pub struct CloneInterface<T> {
    id: InterfaceId,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Clone + Send> CloneInterface<T> {
    pub fn new(id: impl Into<InterfaceId>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            _marker: PhantomData,
        })
    }

    /// Wrap `value` into a field owned by this interface
    pub fn field(self: &Arc<Self>, value: T) -> Field {
        Field::new(Box::new(value), self.clone())
    }
}

impl<T: Any + Clone + Send> Interface for CloneInterface<T> {
    fn id(&self) -> InterfaceId {
        self.id
    }

    fn copy(&self, value: &Opaque) -> RecordResult<Opaque> {
        value
            .downcast_ref::<T>()
            .map(|v| Box::new(v.clone()) as Opaque)
            .ok_or_else(|| RecordError::CopyFailed {
                interface: self.id,
                reason: format!("value is not a {}", std::any::type_name::<T>()),
            })
    }
}

/// A field value together with its owning interface
///
/// Dropping a field releases the value through the interface exactly once.
pub struct Field {
    value: Opaque,
    interface: Arc<dyn Interface>,
    released: bool,
}

impl Field {
    pub fn new(value: Opaque, interface: Arc<dyn Interface>) -> Self {
        Self {
            value,
            interface,
            released: false,
        }
    }

    pub fn interface_id(&self) -> InterfaceId {
        self.interface.id()
    }

    pub fn interface(&self) -> &Arc<dyn Interface> {
        &self.interface
    }

    pub fn value(&self) -> &Opaque {
        &self.value
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Deep copy through the owning interface
    pub fn try_clone(&self) -> RecordResult<Field> {
        let value = self.interface.copy(&self.value)?;
        Ok(Field::new(value, self.interface.clone()))
    }

    /// Hand the raw value to the caller, who becomes responsible for it.
    pub fn into_value(mut self) -> Opaque {
        self.released = true;
        std::mem::replace(&mut self.value, Box::new(()))
    }
}

impl Drop for Field {
    fn drop(&mut self) {
        if !self.released {
            let value = std::mem::replace(&mut self.value, Box::new(()));
            self.interface.free(value);
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("interface", &self.interface.id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Interface counting every copy and free, for ownership checks
    #[derive(Default)]
    pub(crate) struct CountingInterface {
        pub created: AtomicUsize,
        pub copies: AtomicUsize,
        pub frees: AtomicUsize,
    }

    impl CountingInterface {
        pub fn field(self: &Arc<Self>, value: i64) -> Field {
            self.created.fetch_add(1, Ordering::SeqCst);
            Field::new(Box::new(value), self.clone())
        }

        pub fn live(&self) -> usize {
            self.created.load(Ordering::SeqCst) + self.copies.load(Ordering::SeqCst)
                - self.frees.load(Ordering::SeqCst)
        }
    }

    impl Interface for CountingInterface {
        fn id(&self) -> InterfaceId {
            InterfaceId(99)
        }

        fn copy(&self, value: &Opaque) -> RecordResult<Opaque> {
            self.copies.fetch_add(1, Ordering::SeqCst);
            let v = value.downcast_ref::<i64>().copied().unwrap_or_default();
            Ok(Box::new(v))
        }

        fn free(&self, value: Opaque) {
            self.frees.fetch_add(1, Ordering::SeqCst);
            drop(value);
        }
    }

    #[test]
    fn test_clone_interface_copies_value() {
        let iface = CloneInterface::<String>::new(1);
        let field = iface.field("hello".to_string());
        let copy = field.try_clone().unwrap();
        assert_eq!(copy.downcast_ref::<String>().map(String::as_str), Some("hello"));
        assert_eq!(copy.interface_id(), InterfaceId(1));
        assert!(copy.is::<String>());
    }

    #[test]
    fn test_clone_interface_rejects_foreign_value() {
        let iface = CloneInterface::<String>::new(1);
        let field = Field::new(Box::new(5u8), iface);
        let err = field.try_clone().unwrap_err();
        assert!(matches!(err, RecordError::CopyFailed { .. }));
    }

    #[test]
    fn test_drop_frees_once() {
        let iface = Arc::new(CountingInterface::default());
        let field = iface.field(3);
        let copy = field.try_clone().unwrap();
        drop(field);
        drop(copy);
        assert_eq!(iface.frees.load(Ordering::SeqCst), 2);
        assert_eq!(iface.live(), 0);
    }

    #[test]
    fn test_into_value_skips_free() {
        let iface = Arc::new(CountingInterface::default());
        let field = iface.field(3);
        let raw = field.into_value();
        assert_eq!(raw.downcast_ref::<i64>(), Some(&3));
        assert_eq!(iface.frees.load(Ordering::SeqCst), 0);
    }
}
