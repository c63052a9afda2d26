//! Expression tree used for method bodies, initializers and attribute arguments.
//!
//! Member references inside an expression are either real runtime members or handles into
//! the descriptor batch that is being generated. The code generator lowers the latter into
//! the former once all batch types are declared; the interpreter only executes lowered trees.

use std::fmt;

use strum::{Display, EnumString};

use crate::{
    model::{FieldHandle, MethodHandle},
    runtime::{FieldRc, FieldRef, MethodRc, MethodRef, Value},
};

/// The method a call or object creation refers to
#[derive(Clone)]
pub enum MethodTarget {
    /// A method of a runtime type
    Runtime(MethodRef),
    /// A method of a descriptor in the current batch
    Mutable(MethodHandle),
}

impl From<&MethodRc> for MethodTarget {
    fn from(method: &MethodRc) -> Self {
        MethodTarget::Runtime(MethodRef::new(method))
    }
}

impl From<MethodHandle> for MethodTarget {
    fn from(handle: MethodHandle) -> Self {
        MethodTarget::Mutable(handle)
    }
}

impl fmt::Debug for MethodTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodTarget::Runtime(method) => match method.upgrade() {
                Some(method) => write!(f, "{}", method.full_name()),
                None => write!(f, "<dropped method>"),
            },
            MethodTarget::Mutable(handle) => write!(f, "{handle:?}"),
        }
    }
}

/// The field a load or store refers to
#[derive(Clone)]
pub enum FieldTarget {
    /// A field of a runtime type
    Runtime(FieldRef),
    /// A field of a descriptor in the current batch
    Mutable(FieldHandle),
}

impl From<&FieldRc> for FieldTarget {
    fn from(field: &FieldRc) -> Self {
        FieldTarget::Runtime(FieldRef::new(field))
    }
}

impl From<FieldHandle> for FieldTarget {
    fn from(handle: FieldHandle) -> Self {
        FieldTarget::Mutable(handle)
    }
}

impl fmt::Debug for FieldTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldTarget::Runtime(field) => match field.upgrade() {
                Some(field) => write!(f, "{}", field.name),
                None => write!(f, "<dropped field>"),
            },
            FieldTarget::Mutable(handle) => write!(f, "{handle:?}"),
        }
    }
}

/// How an instance call selects its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum Dispatch {
    /// Resolve through the runtime type of the instance
    Virtual,
    /// Call exactly the referenced method (base calls, constructors)
    NonVirtual,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum BinaryOp {
    /// Numeric addition
    Add,
    /// Numeric subtraction
    Subtract,
    /// Numeric multiplication
    Multiply,
    /// String concatenation of the display form of both operands
    Concat,
    /// Value equality, yields a boolean
    Equal,
}

/// A method body expression
#[derive(Debug, Clone)]
pub enum Expr {
    /// A constant value
    Constant(Value),
    /// The current instance
    This,
    /// The n-th explicit argument (zero based, `this` excluded)
    Argument(u16),
    /// Evaluates all expressions in order, yielding the last value (or `Void` when empty)
    Block(Vec<Expr>),
    /// Method call; `instance` is `None` for static methods
    Call {
        /// Receiver of an instance call
        instance: Option<Box<Expr>>,
        /// Called method
        method: MethodTarget,
        /// Call arguments
        arguments: Vec<Expr>,
        /// Dispatch mode for instance calls
        dispatch: Dispatch,
    },
    /// Object creation through a constructor
    New {
        /// The constructor to run
        constructor: MethodTarget,
        /// Constructor arguments
        arguments: Vec<Expr>,
    },
    /// Field read; `instance` is `None` for static fields
    LoadField {
        /// Owner of an instance field
        instance: Option<Box<Expr>>,
        /// The field
        field: FieldTarget,
    },
    /// Field write, yields `Void`
    StoreField {
        /// Owner of an instance field
        instance: Option<Box<Expr>>,
        /// The field
        field: FieldTarget,
        /// The stored value
        value: Box<Expr>,
    },
    /// Binary operation
    Binary {
        /// The operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Conditional expression
    Condition {
        /// Boolean condition
        condition: Box<Expr>,
        /// Evaluated when the condition holds
        then: Box<Expr>,
        /// Evaluated otherwise
        otherwise: Box<Expr>,
    },
}

impl Expr {
    /// A constant expression
    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Constant(value.into())
    }

    /// An empty block, the body of a method that does nothing
    #[must_use]
    pub fn empty() -> Self {
        Expr::Block(Vec::new())
    }

    /// Forwards all `arity` arguments of the current method
    #[must_use]
    pub fn forward_arguments(arity: usize) -> Vec<Expr> {
        (0..arity)
            .map(|index| Expr::Argument(u16::try_from(index).unwrap_or(u16::MAX)))
            .collect()
    }

    /// Virtual instance call
    pub fn call_virtual(
        instance: Expr,
        method: impl Into<MethodTarget>,
        arguments: Vec<Expr>,
    ) -> Self {
        Expr::Call {
            instance: Some(Box::new(instance)),
            method: method.into(),
            arguments,
            dispatch: Dispatch::Virtual,
        }
    }

    /// Non-virtual instance call, as used for base and constructor calls
    pub fn call_base(instance: Expr, method: impl Into<MethodTarget>, arguments: Vec<Expr>) -> Self {
        Expr::Call {
            instance: Some(Box::new(instance)),
            method: method.into(),
            arguments,
            dispatch: Dispatch::NonVirtual,
        }
    }

    /// Static call
    pub fn call_static(method: impl Into<MethodTarget>, arguments: Vec<Expr>) -> Self {
        Expr::Call {
            instance: None,
            method: method.into(),
            arguments,
            dispatch: Dispatch::NonVirtual,
        }
    }

    /// Object creation
    pub fn new_object(constructor: impl Into<MethodTarget>, arguments: Vec<Expr>) -> Self {
        Expr::New {
            constructor: constructor.into(),
            arguments,
        }
    }

    /// Reads a field of `this`
    pub fn load_this_field(field: impl Into<FieldTarget>) -> Self {
        Expr::LoadField {
            instance: Some(Box::new(Expr::This)),
            field: field.into(),
        }
    }

    /// Writes a field of `this`
    pub fn store_this_field(field: impl Into<FieldTarget>, value: Expr) -> Self {
        Expr::StoreField {
            instance: Some(Box::new(Expr::This)),
            field: field.into(),
            value: Box::new(value),
        }
    }

    /// Reads a static field
    pub fn load_static(field: impl Into<FieldTarget>) -> Self {
        Expr::LoadField {
            instance: None,
            field: field.into(),
        }
    }

    /// Writes a static field
    pub fn store_static(field: impl Into<FieldTarget>, value: Expr) -> Self {
        Expr::StoreField {
            instance: None,
            field: field.into(),
            value: Box::new(value),
        }
    }

    /// Binary operation
    #[must_use]
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Visits this expression and all nested expressions, parents first
    pub fn walk(&self, visit: &mut dyn FnMut(&Expr)) {
        visit(self);
        match self {
            Expr::Constant(_) | Expr::This | Expr::Argument(_) => {}
            Expr::Block(items) => items.iter().for_each(|item| item.walk(visit)),
            Expr::Call {
                instance,
                arguments,
                ..
            } => {
                if let Some(instance) = instance {
                    instance.walk(visit);
                }
                arguments.iter().for_each(|arg| arg.walk(visit));
            }
            Expr::New { arguments, .. } => arguments.iter().for_each(|arg| arg.walk(visit)),
            Expr::LoadField { instance, .. } => {
                if let Some(instance) = instance {
                    instance.walk(visit);
                }
            }
            Expr::StoreField {
                instance, value, ..
            } => {
                if let Some(instance) = instance {
                    instance.walk(visit);
                }
                value.walk(visit);
            }
            Expr::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Condition {
                condition,
                then,
                otherwise,
            } => {
                condition.walk(visit);
                then.walk(visit);
                otherwise.walk(visit);
            }
        }
    }

    /// Returns true if any nested member reference still points into a descriptor batch
    #[must_use]
    pub fn has_descriptor_references(&self) -> bool {
        let mut found = false;
        self.walk(&mut |expr| match expr {
            Expr::Call {
                method: MethodTarget::Mutable(_),
                ..
            }
            | Expr::New {
                constructor: MethodTarget::Mutable(_),
                ..
            }
            | Expr::LoadField {
                field: FieldTarget::Mutable(_),
                ..
            }
            | Expr::StoreField {
                field: FieldTarget::Mutable(_),
                ..
            } => found = true,
            _ => {}
        });
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MethodSlot, TypeHandle};

    #[test]
    fn test_forward_arguments() {
        let args = Expr::forward_arguments(3);
        assert_eq!(args.len(), 3);
        assert!(matches!(args[2], Expr::Argument(2)));
    }

    #[test]
    fn test_descriptor_references_detected_in_nested_expressions() {
        let handle = MethodHandle {
            owner: TypeHandle::new(0),
            slot: MethodSlot::Method(0),
        };
        let body = Expr::Block(vec![
            Expr::constant(1),
            Expr::binary(
                BinaryOp::Concat,
                Expr::constant("a"),
                Expr::call_virtual(Expr::This, handle, Vec::new()),
            ),
        ]);
        assert!(body.has_descriptor_references());
        assert!(!Expr::constant("plain").has_descriptor_references());
    }
}
