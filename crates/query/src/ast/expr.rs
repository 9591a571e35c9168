//! Expression AST definitions.

use alloc::string::String;
use tarn_core::Value;

/// The right-hand side of a comparison or assignment.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// A literal written in the statement text.
    Literal(Value),
    /// A named parameter slot (`@name`), filled from a binding.
    Param(String),
}

impl Operand {
    /// Returns the parameter name if this operand is a slot.
    pub fn param(&self) -> Option<&str> {
        match self {
            Operand::Param(name) => Some(name),
            Operand::Literal(_) => None,
        }
    }
}

/// Sort order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}
