//! Replaces descriptor references with the real members emitted for them.

use crate::{
    codegen::EmittableMemberMap,
    runtime::{
        Expr, FieldRef, FieldTarget, MethodRef, MethodSignature, MethodTarget,
        ParameterDeclaration, TypeRc, TypeSignature,
    },
    Result,
};

/// Resolves a class signature to its runtime type
pub(crate) fn resolve_type(signature: &TypeSignature, members: &EmittableMemberMap) -> Result<TypeRc> {
    match signature {
        TypeSignature::Mutable(handle) => members.get_type(*handle),
        TypeSignature::Class(_) => signature
            .runtime_type()
            .ok_or_else(|| invalid_operation!("Referenced type has been dropped")),
        other => Err(argument_error!(
            "signature",
            "'{}' does not denote a class or interface",
            other
        )),
    }
}

pub(crate) fn lower_type(signature: &TypeSignature, members: &EmittableMemberMap) -> Result<TypeSignature> {
    match signature {
        TypeSignature::Mutable(handle) => Ok(TypeSignature::class(&members.get_type(*handle)?)),
        other => Ok(other.clone()),
    }
}

pub(crate) fn lower_signature(
    signature: &MethodSignature,
    members: &EmittableMemberMap,
) -> Result<MethodSignature> {
    let parameters = signature
        .parameters
        .iter()
        .map(|parameter| {
            Ok(ParameterDeclaration::new(
                parameter.name.clone(),
                lower_type(&parameter.ty, members)?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(MethodSignature::with_parameters(
        lower_type(&signature.return_type, members)?,
        parameters,
    ))
}

fn lower_method(target: &MethodTarget, members: &EmittableMemberMap) -> Result<MethodTarget> {
    match target {
        MethodTarget::Mutable(handle) => Ok(MethodTarget::Runtime(MethodRef::new(
            &members.get_method(*handle)?,
        ))),
        runtime => Ok(runtime.clone()),
    }
}

fn lower_field(target: &FieldTarget, members: &EmittableMemberMap) -> Result<FieldTarget> {
    match target {
        FieldTarget::Mutable(handle) => Ok(FieldTarget::Runtime(FieldRef::new(
            &members.get_field(*handle)?,
        ))),
        runtime => Ok(runtime.clone()),
    }
}

fn lower_boxed(expr: &Expr, members: &EmittableMemberMap) -> Result<Box<Expr>> {
    Ok(Box::new(lower_expr(expr, members)?))
}

fn lower_all(expressions: &[Expr], members: &EmittableMemberMap) -> Result<Vec<Expr>> {
    expressions
        .iter()
        .map(|expr| lower_expr(expr, members))
        .collect()
}

/// Rewrites `expr` so that it only refers to runtime members
pub(crate) fn lower_expr(expr: &Expr, members: &EmittableMemberMap) -> Result<Expr> {
    let lowered = match expr {
        Expr::Constant(_) | Expr::This | Expr::Argument(_) => expr.clone(),
        Expr::Block(items) => Expr::Block(lower_all(items, members)?),
        Expr::Call {
            instance,
            method,
            arguments,
            dispatch,
        } => Expr::Call {
            instance: instance
                .as_deref()
                .map(|instance| lower_boxed(instance, members))
                .transpose()?,
            method: lower_method(method, members)?,
            arguments: lower_all(arguments, members)?,
            dispatch: *dispatch,
        },
        Expr::New {
            constructor,
            arguments,
        } => Expr::New {
            constructor: lower_method(constructor, members)?,
            arguments: lower_all(arguments, members)?,
        },
        Expr::LoadField { instance, field } => Expr::LoadField {
            instance: instance
                .as_deref()
                .map(|instance| lower_boxed(instance, members))
                .transpose()?,
            field: lower_field(field, members)?,
        },
        Expr::StoreField {
            instance,
            field,
            value,
        } => Expr::StoreField {
            instance: instance
                .as_deref()
                .map(|instance| lower_boxed(instance, members))
                .transpose()?,
            field: lower_field(field, members)?,
            value: lower_boxed(value, members)?,
        },
        Expr::Binary { op, left, right } => Expr::Binary {
            op: *op,
            left: lower_boxed(left, members)?,
            right: lower_boxed(right, members)?,
        },
        Expr::Condition {
            condition,
            then,
            otherwise,
        } => Expr::Condition {
            condition: lower_boxed(condition, members)?,
            then: lower_boxed(then, members)?,
            otherwise: lower_boxed(otherwise, members)?,
        },
    };
    Ok(lowered)
}
