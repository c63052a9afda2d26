//! Declaration order for a descriptor batch.
//!
//! A type must be declared after the batch types its base, enclosing type and interfaces
//! refer to; those edges are hard. Member types (fields, parameters, return types, properties,
//! events) only add soft edges, which are given up when mutually referencing types would
//! otherwise form a cycle.

use std::collections::HashSet;

use tracing::trace;

use crate::{
    model::{MutableType, TypeArena, TypeHandle},
    runtime::{MethodSignature, TypeSignature},
    utils::graph::{
        algorithms::{self, CycleError},
        DirectedGraph, NodeId,
    },
    Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dependency {
    Hard,
    Soft,
}

/// Orders the descriptors of a batch for declaration
pub struct DependentTypeSorter;

impl DependentTypeSorter {
    /// Returns all handles of `arena` so that every batch dependency comes first.
    ///
    /// Ties keep creation order. Cycles made only of member-type references are broken at
    /// the earliest created type whose hard dependencies are satisfied.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOperation`] naming the involved types if base, enclosing
    /// type or interface references form a cycle.
    pub fn sort(arena: &TypeArena) -> Result<Vec<TypeHandle>> {
        let mut graph: DirectedGraph<TypeHandle, Dependency> =
            DirectedGraph::with_capacity(arena.len());
        for ty in arena.iter() {
            graph.add_node(ty.handle());
        }

        for ty in arena.iter() {
            let dependent = NodeId::new(ty.handle().index());
            for dependency in hard_dependencies(ty) {
                if dependency != ty.handle() && dependency.index() < arena.len() {
                    graph.add_edge(NodeId::new(dependency.index()), dependent, Dependency::Hard);
                }
            }
            for dependency in soft_dependencies(ty) {
                if dependency != ty.handle() && dependency.index() < arena.len() {
                    graph.add_edge(NodeId::new(dependency.index()), dependent, Dependency::Soft);
                }
            }
        }

        let order = algorithms::topological_sort(&graph, |dependency| {
            *dependency == Dependency::Hard
        })
        .map_err(|cycle: CycleError| {
            let nodes = algorithms::find_cycle(&graph, &cycle.remaining)
                .unwrap_or(cycle.remaining);
            let names: Vec<String> = nodes
                .iter()
                .filter_map(|node| graph.node(*node))
                .map(|handle| arena.fullname(*handle))
                .collect();
            invalid_operation!("Cyclic type dependency: {}", names.join(" -> "))
        })?;

        let handles: Vec<TypeHandle> = order
            .into_iter()
            .filter_map(|node| graph.node(node).copied())
            .collect();
        trace!(
            order = ?handles.iter().map(|handle| arena.fullname(*handle)).collect::<Vec<_>>(),
            "sorted descriptor batch"
        );
        Ok(handles)
    }
}

fn hard_dependencies(ty: &MutableType) -> Vec<TypeHandle> {
    ty.base()
        .and_then(TypeSignature::mutable_handle)
        .into_iter()
        .chain(ty.declaring_type())
        .chain(ty.interfaces().iter().filter_map(TypeSignature::mutable_handle))
        .collect()
}

fn soft_dependencies(ty: &MutableType) -> Vec<TypeHandle> {
    let mut seen = HashSet::new();
    let mut push = |signature: &TypeSignature, out: &mut Vec<TypeHandle>| {
        if let Some(handle) = signature.mutable_handle() {
            if seen.insert(handle) {
                out.push(handle);
            }
        }
    };

    let mut dependencies = Vec::new();
    let methods = ty
        .constructors()
        .iter()
        .chain(ty.methods())
        .map(|method| method.signature());
    for signature in methods {
        push_method_signature(signature, &mut |s| push(s, &mut dependencies));
    }
    for field in ty.fields() {
        push(field.signature(), &mut dependencies);
    }
    for property in ty.properties() {
        push(property.signature(), &mut dependencies);
    }
    for event in ty.events() {
        push(event.event_type(), &mut dependencies);
    }
    dependencies
}

fn push_method_signature(signature: &MethodSignature, push: &mut dyn FnMut(&TypeSignature)) {
    push(&signature.return_type);
    for parameter in &signature.parameters {
        push(&parameter.ty);
    }
}
