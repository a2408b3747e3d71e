//! Type-erased runtime values

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A dynamically typed script value.
///
/// Cloning is cheap (reference counted). The value class is the Rust type
/// the value was created from; the Type Registry maps value classes to
/// semantic types.
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
}

impl Value {
    /// Create a new value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Value class of the wrapped value
    pub fn value_type(&self) -> TypeId {
        self.type_id
    }

    /// Rust type name, for debugging only
    pub fn rust_type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether both handles point at the same allocation
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.downcast_ref::<String>() {
            write!(f, "Value({:?})", s)
        } else if let Some(n) = self.downcast_ref::<f64>() {
            write!(f, "Value({})", n)
        } else if let Some(n) = self.downcast_ref::<i64>() {
            write!(f, "Value({})", n)
        } else if let Some(b) = self.downcast_ref::<bool>() {
            write!(f, "Value({})", b)
        } else {
            write!(f, "Value(<{}>)", self.type_name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_downcast() {
        let v = Value::new(42i64);
        assert!(v.is::<i64>());
        assert_eq!(v.downcast_ref::<i64>(), Some(&42));
        assert!(v.downcast_ref::<f64>().is_none());
        assert_eq!(v.value_type(), TypeId::of::<i64>());
    }

    #[test]
    fn test_clone_shares_allocation() {
        let v = Value::new(String::from("hi"));
        let w = v.clone();
        assert!(v.ptr_eq(&w));
        assert_eq!(format!("{:?}", w), "Value(\"hi\")");
    }
}
