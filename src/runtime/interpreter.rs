//! Execution of method bodies.

use std::sync::Arc;

use crate::{
    runtime::{
        BinaryOp, Dispatch, Expr, FieldRc, FieldTarget, MethodRc, MethodTarget, Object,
        ObjectRef, TypeRc, Value,
    },
    Error, Result,
};

/// Maximum nesting of method invocations before execution is aborted
pub const MAX_CALL_DEPTH: usize = 256;

/// Stack space kept free below each invocation
const RED_ZONE: usize = 128 * 1024;

/// Size of each stack segment allocated once the red zone is reached
const STACK_PER_RECURSION: usize = 1024 * 1024;

struct Frame<'a> {
    this: Option<&'a ObjectRef>,
    arguments: &'a [Value],
}

/// Tree-walking interpreter for [`Expr`] bodies.
///
/// One interpreter is used per top-level invocation; it tracks the call depth and runs type
/// initializers lazily, at most once per type, before the first static access or instantiation.
pub(crate) struct Interpreter {
    depth: usize,
}

impl Interpreter {
    pub(crate) fn new() -> Self {
        Interpreter { depth: 0 }
    }

    pub(crate) fn invoke(
        &mut self,
        method: &MethodRc,
        this: Option<&ObjectRef>,
        arguments: &[Value],
    ) -> Result<Value> {
        if arguments.len() != method.signature.arity() {
            return Err(argument_error!(
                "arguments",
                "'{}' expects {} arguments, {} were supplied",
                method.full_name(),
                method.signature.arity(),
                arguments.len()
            ));
        }
        if method.is_abstract() {
            return Err(invalid_operation!(
                "Cannot invoke abstract method '{}'",
                method.full_name()
            ));
        }
        if !method.is_static() && this.is_none() {
            return Err(Error::NullReference(format!(
                "calling instance method '{}'",
                method.full_name()
            )));
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(Error::RecursionLimit(MAX_CALL_DEPTH));
        }

        if method.is_static() {
            if let Some(declaring) = method.declaring_type() {
                self.ensure_initialized(&declaring)?;
            }
        }

        let body = method.body().ok_or_else(|| {
            invalid_operation!("Method '{}' has no body", method.full_name())
        })?;

        // Worker threads may run with small stacks; grow on demand so the depth limit fires first.
        self.depth += 1;
        let result = stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, || {
            self.evaluate(body, &Frame { this, arguments })
        });
        self.depth -= 1;

        let value = result?;
        if method.signature.return_type.is_void() {
            Ok(Value::Void)
        } else {
            Ok(value)
        }
    }

    pub(crate) fn instantiate(&mut self, constructor: &MethodRc, arguments: &[Value]) -> Result<ObjectRef> {
        let ty = constructor
            .declaring_type()
            .ok_or_else(|| Error::TypeNotFound(constructor.name.clone()))?;
        if !constructor.is_constructor() {
            return Err(invalid_operation!(
                "'{}' is not a constructor",
                constructor.full_name()
            ));
        }
        if ty.is_abstract() {
            return Err(Error::AbstractInstantiation(ty.fullname()));
        }
        if !ty.is_complete() {
            return Err(invalid_operation!(
                "Type '{}' has not been finalized",
                ty.fullname()
            ));
        }

        self.ensure_initialized(&ty)?;
        let instance = Arc::new(Object::new(&ty));
        self.invoke(constructor, Some(&instance), arguments)?;
        Ok(instance)
    }

    pub(crate) fn ensure_initialized(&mut self, ty: &TypeRc) -> Result<()> {
        if ty.is_initialized() {
            return Ok(());
        }
        if let Some(base) = ty.base() {
            self.ensure_initialized(&base)?;
        }

        let running = ty.lock_initialization();
        // Re-entered from the initializer itself, or finished by another thread meanwhile.
        if running.get() || ty.is_initialized() {
            return Ok(());
        }

        running.set(true);
        let result = match ty.type_initializer() {
            Some(initializer) => self.invoke(&initializer, None, &[]).map(|_| ()),
            None => Ok(()),
        };
        running.set(false);

        if result.is_ok() {
            ty.mark_initialized();
        }
        result
    }

    fn evaluate(&mut self, expr: &Expr, frame: &Frame<'_>) -> Result<Value> {
        match expr {
            Expr::Constant(value) => Ok(value.clone()),
            Expr::This => frame
                .this
                .map(|this| Value::Object(this.clone()))
                .ok_or_else(|| Error::NullReference("accessing 'this' in a static context".into())),
            Expr::Argument(index) => frame
                .arguments
                .get(usize::from(*index))
                .cloned()
                .ok_or_else(|| argument_error!("index", "argument {} is out of range", index)),
            Expr::Block(items) => {
                let mut last = Value::Void;
                for item in items {
                    last = self.evaluate(item, frame)?;
                }
                Ok(last)
            }
            Expr::Call {
                instance,
                method,
                arguments,
                dispatch,
            } => {
                let method = resolve_method(method)?;
                let receiver = match instance {
                    Some(instance) => {
                        let value = self.evaluate(instance, frame)?;
                        Some(expect_object(value, || {
                            format!("calling '{}'", method.full_name())
                        })?)
                    }
                    None => None,
                };
                let arguments = self.evaluate_all(arguments, frame)?;

                match receiver {
                    Some(receiver) => {
                        let target = match dispatch {
                            Dispatch::Virtual => receiver.runtime_type().resolve_virtual(&method),
                            Dispatch::NonVirtual => method,
                        };
                        self.invoke(&target, Some(&receiver), &arguments)
                    }
                    None => self.invoke(&method, None, &arguments),
                }
            }
            Expr::New {
                constructor,
                arguments,
            } => {
                let constructor = resolve_method(constructor)?;
                let arguments = self.evaluate_all(arguments, frame)?;
                self.instantiate(&constructor, &arguments).map(Value::Object)
            }
            Expr::LoadField { instance, field } => {
                let field = resolve_field(field)?;
                match instance {
                    Some(instance) => {
                        let value = self.evaluate(instance, frame)?;
                        expect_object(value, || format!("reading field '{}'", field.name))?
                            .load(&field)
                    }
                    None => {
                        let owner = self.static_owner(&field)?;
                        Ok(owner.static_value(&field))
                    }
                }
            }
            Expr::StoreField {
                instance,
                field,
                value,
            } => {
                let field = resolve_field(field)?;
                let target = match instance {
                    Some(instance) => {
                        let value = self.evaluate(instance, frame)?;
                        Some(expect_object(value, || {
                            format!("writing field '{}'", field.name)
                        })?)
                    }
                    None => None,
                };
                let value = self.evaluate(value, frame)?;

                match target {
                    Some(target) => target.store(&field, value)?,
                    None => {
                        if !field.signature.accepts(&value) {
                            return Err(argument_error!(
                                field.name,
                                "value {:?} cannot be stored in a field of type {}",
                                value,
                                field.signature
                            ));
                        }
                        let owner = self.static_owner(&field)?;
                        owner.set_static_value(&field, value);
                    }
                }
                Ok(Value::Void)
            }
            Expr::Binary { op, left, right } => {
                let left = self.evaluate(left, frame)?;
                let right = self.evaluate(right, frame)?;
                binary(*op, &left, &right)
            }
            Expr::Condition {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.evaluate(condition, frame)?;
                match condition.as_bool() {
                    Some(true) => self.evaluate(then, frame),
                    Some(false) => self.evaluate(otherwise, frame),
                    None => Err(invalid_operation!(
                        "Condition evaluated to non-boolean value {:?}",
                        condition
                    )),
                }
            }
        }
    }

    fn evaluate_all(&mut self, expressions: &[Expr], frame: &Frame<'_>) -> Result<Vec<Value>> {
        expressions
            .iter()
            .map(|expr| self.evaluate(expr, frame))
            .collect()
    }

    fn static_owner(&mut self, field: &FieldRc) -> Result<TypeRc> {
        if !field.is_static() {
            return Err(invalid_operation!(
                "Field '{}' is an instance field",
                field.name
            ));
        }
        let owner = field
            .declaring_type()
            .ok_or_else(|| Error::TypeNotFound(field.name.clone()))?;
        self.ensure_initialized(&owner)?;
        Ok(owner)
    }
}

fn resolve_method(target: &MethodTarget) -> Result<MethodRc> {
    match target {
        MethodTarget::Runtime(method) => method
            .upgrade()
            .ok_or_else(|| invalid_operation!("Called method has been dropped")),
        MethodTarget::Mutable(handle) => Err(invalid_operation!(
            "Unresolved descriptor reference {:?} in executed code",
            handle
        )),
    }
}

fn resolve_field(target: &FieldTarget) -> Result<FieldRc> {
    match target {
        FieldTarget::Runtime(field) => field
            .upgrade()
            .ok_or_else(|| invalid_operation!("Accessed field has been dropped")),
        FieldTarget::Mutable(handle) => Err(invalid_operation!(
            "Unresolved descriptor reference {:?} in executed code",
            handle
        )),
    }
}

fn expect_object(value: Value, action: impl FnOnce() -> String) -> Result<ObjectRef> {
    match value {
        Value::Object(object) => Ok(object),
        Value::Null => Err(Error::NullReference(action())),
        other => Err(invalid_operation!(
            "Expected an object while {}, found {:?}",
            action(),
            other
        )),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    let result = match (op, left, right) {
        (BinaryOp::Concat, left, right) => Value::from(format!("{left}{right}")),
        (BinaryOp::Equal, left, right) => Value::Boolean(left == right),
        (BinaryOp::Add, Value::I4(l), Value::I4(r)) => Value::I4(l.wrapping_add(*r)),
        (BinaryOp::Add, Value::I8(l), Value::I8(r)) => Value::I8(l.wrapping_add(*r)),
        (BinaryOp::Add, Value::R8(l), Value::R8(r)) => Value::R8(l + r),
        (BinaryOp::Subtract, Value::I4(l), Value::I4(r)) => Value::I4(l.wrapping_sub(*r)),
        (BinaryOp::Subtract, Value::I8(l), Value::I8(r)) => Value::I8(l.wrapping_sub(*r)),
        (BinaryOp::Subtract, Value::R8(l), Value::R8(r)) => Value::R8(l - r),
        (BinaryOp::Multiply, Value::I4(l), Value::I4(r)) => Value::I4(l.wrapping_mul(*r)),
        (BinaryOp::Multiply, Value::I8(l), Value::I8(r)) => Value::I8(l.wrapping_mul(*r)),
        (BinaryOp::Multiply, Value::R8(l), Value::R8(r)) => Value::R8(l * r),
        (op, left, right) => {
            return Err(invalid_operation!(
                "Operator {} is not defined for {:?} and {:?}",
                op,
                left,
                right
            ))
        }
    };
    Ok(result)
}
