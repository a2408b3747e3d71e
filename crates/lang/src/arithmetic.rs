//! Arithmetic operations between value classes
//!
//! Operations are looked up by exact operand classes first; otherwise the
//! first operation (in registration order) whose operand classes both
//! operands convert to is used. Resolutions are cached per operand pair.

use crate::convert::ConverterRegistry;
use crate::error::{RegistryError, Result};
use crate::value::Value;
use dashmap::DashMap;
use parking_lot::RwLock;
use skript_core::{EdgeId, IdGenerator};
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Exponent,
}

impl Operator {
    pub fn sign(&self) -> char {
        match self {
            Self::Add => '+',
            Self::Subtract => '-',
            Self::Multiply => '*',
            Self::Divide => '/',
            Self::Exponent => '^',
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sign())
    }
}

pub type OperationFn = Arc<dyn Fn(&Value, &Value) -> Option<Value> + Send + Sync>;

/// A registered operation
pub struct OperationInfo {
    pub id: EdgeId,
    pub operator: Operator,
    pub left: TypeId,
    pub right: TypeId,
    pub return_type: TypeId,
    pub left_name: &'static str,
    pub right_name: &'static str,
    operation: OperationFn,
}

#[derive(Clone)]
struct Resolved {
    info: Arc<OperationInfo>,
    convert_left: bool,
    convert_right: bool,
}

pub struct ArithmeticRegistry {
    operations: RwLock<Arc<Vec<Arc<OperationInfo>>>>,
    cache: DashMap<(Operator, TypeId, TypeId), (u64, Option<Resolved>)>,
    generation: AtomicU64,
    converters: Arc<ConverterRegistry>,
    ids: IdGenerator<EdgeId>,
}

impl ArithmeticRegistry {
    pub fn new(converters: Arc<ConverterRegistry>) -> Self {
        Self {
            operations: RwLock::new(Arc::new(Vec::new())),
            cache: DashMap::new(),
            generation: AtomicU64::new(0),
            converters,
            ids: IdGenerator::new(),
        }
    }

    /// Register `L operator R -> T`
    pub fn register<L, R, T, F>(&self, operator: Operator, operation: F) -> Result<EdgeId>
    where
        L: Any + Send + Sync,
        R: Any + Send + Sync,
        T: Any + Send + Sync,
        F: Fn(&L, &R) -> Option<T> + Send + Sync + 'static,
    {
        let left = TypeId::of::<L>();
        let right = TypeId::of::<R>();
        let left_name = std::any::type_name::<L>();
        let right_name = std::any::type_name::<R>();

        let mut operations = self.operations.write();
        if operations
            .iter()
            .any(|o| o.operator == operator && o.left == left && o.right == right)
        {
            return Err(RegistryError::DuplicateOperation {
                operator: operator.sign(),
                left: left_name,
                right: right_name,
            });
        }

        let info = Arc::new(OperationInfo {
            id: self.ids.next_id(),
            operator,
            left,
            right,
            return_type: TypeId::of::<T>(),
            left_name,
            right_name,
            operation: Arc::new(move |l: &Value, r: &Value| {
                match (l.downcast_ref::<L>(), r.downcast_ref::<R>()) {
                    (Some(l), Some(r)) => operation(l, r).map(Value::new),
                    _ => None,
                }
            }),
        });
        let id = info.id;
        let mut next = Vec::clone(&operations);
        next.push(info);
        *operations = Arc::new(next);
        self.generation.fetch_add(1, Ordering::SeqCst);

        tracing::debug!("Registered operation {} {} {}", left_name, operator, right_name);
        Ok(id)
    }

    pub fn unregister(&self, id: EdgeId) -> bool {
        let mut operations = self.operations.write();
        if !operations.iter().any(|o| o.id == id) {
            return false;
        }
        let next: Vec<_> = operations.iter().filter(|o| o.id != id).cloned().collect();
        *operations = Arc::new(next);
        self.generation.fetch_add(1, Ordering::SeqCst);
        true
    }

    pub fn len(&self) -> usize {
        self.operations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.read().is_empty()
    }

    /// Compute `left operator right`
    pub fn calculate(&self, operator: Operator, left: &Value, right: &Value) -> Option<Value> {
        let resolved = self.resolve(operator, left.value_type(), right.value_type())?;
        let info = &resolved.info;

        let left = if resolved.convert_left {
            self.converters.convert(left, info.left)?
        } else {
            left.clone()
        };
        let right = if resolved.convert_right {
            self.converters.convert(right, info.right)?
        } else {
            right.clone()
        };
        (info.operation)(&left, &right)
    }

    /// Value class produced by `left operator right`, for parse-time typing
    pub fn return_type(&self, operator: Operator, left: TypeId, right: TypeId) -> Option<TypeId> {
        self.resolve(operator, left, right).map(|r| r.info.return_type)
    }

    fn resolve(&self, operator: Operator, left: TypeId, right: TypeId) -> Option<Resolved> {
        let generation = self.generation.load(Ordering::SeqCst) ^ (self.converters.generation() << 32);
        let key = (operator, left, right);
        if let Some(entry) = self.cache.get(&key) {
            if entry.0 == generation {
                return entry.1.clone();
            }
        }

        let operations = Arc::clone(&self.operations.read());
        let exact = operations
            .iter()
            .find(|o| o.operator == operator && o.left == left && o.right == right)
            .map(|info| Resolved {
                info: Arc::clone(info),
                convert_left: false,
                convert_right: false,
            });
        let resolved = exact.or_else(|| {
            operations
                .iter()
                .filter(|o| o.operator == operator)
                .find(|o| {
                    self.converters.has_path(left, o.left) && self.converters.has_path(right, o.right)
                })
                .map(|info| Resolved {
                    info: Arc::clone(info),
                    convert_left: info.left != left,
                    convert_right: info.right != right,
                })
        });

        self.cache.insert(key, (generation, resolved.clone()));
        resolved
    }
}
