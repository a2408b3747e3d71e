//! Change modes and change handlers

use crate::error::ChangeError;
use crate::value::Value;
use std::any::TypeId;
use std::fmt;

/// How an assignment-like effect changes its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeMode {
    Add,
    Set,
    Remove,
    RemoveAll,
    Delete,
    Reset,
}

impl ChangeMode {
    pub const ALL: [ChangeMode; 6] = [
        ChangeMode::Add,
        ChangeMode::Set,
        ChangeMode::Remove,
        ChangeMode::RemoveAll,
        ChangeMode::Delete,
        ChangeMode::Reset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Set => "set",
            Self::Remove => "remove",
            Self::RemoveAll => "remove all",
            Self::Delete => "delete",
            Self::Reset => "reset",
        }
    }

    /// Delete and reset take no delta values
    pub fn takes_delta(&self) -> bool {
        !matches!(self, Self::Delete | Self::Reset)
    }
}

impl fmt::Display for ChangeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Change handler of a semantic type.
///
/// `accept_change` must be queried before `change` is invoked; it returns
/// the value classes accepted as delta, or `None` when the mode is not
/// supported.
pub trait Changer: Send + Sync {
    fn accept_change(&self, mode: ChangeMode) -> Option<Vec<TypeId>>;

    fn change(
        &self,
        what: &[Value],
        delta: Option<&[Value]>,
        mode: ChangeMode,
    ) -> Result<(), ChangeError>;
}
