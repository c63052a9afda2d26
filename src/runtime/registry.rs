//! Central type registry.
//!
//! This module provides the [`TypeRegistry`], a thread-safe registry owning every runtime type
//! known to one pipeline: the core types, requested types built through
//! [`crate::runtime::ClassBuilder`], generated types and types re-created from flushed modules.
//!
//! # Registry Architecture
//!
//! - **Token-based lookup**: Primary index using tokens (`SkipMap`)
//! - **Name-based lookup**: Secondary index for full names (`DashMap`)
//! - **Token allocation**: One atomic sequence per token kind
//!
//! # Thread Safety
//!
//! Lookups and insertions never block each other: both indices are lock-free or sharded,
//! and token generation is a single atomic increment.
//!
//! # Examples
//!
//! ```rust
//! use typeforge::runtime::TypeRegistry;
//!
//! let registry = TypeRegistry::new()?;
//! let object = &registry.core().object;
//! assert_eq!(registry.get_by_fullname("System.Object")[0].token, object.token);
//! # Ok::<(), typeforge::Error>(())
//! ```

use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;

use crate::{
    runtime::{ClassBuilder, Expr, MethodRc, Token, TokenKind, TypeRc},
    Error::TypeNotFound,
    Result,
};

/// Hands out unique tokens, one sequence per [`TokenKind`]
pub(crate) struct TokenAllocator {
    types: AtomicU32,
    fields: AtomicU32,
    methods: AtomicU32,
    properties: AtomicU32,
    events: AtomicU32,
}

impl TokenAllocator {
    fn new() -> Self {
        TokenAllocator {
            types: AtomicU32::new(1),
            fields: AtomicU32::new(1),
            methods: AtomicU32::new(1),
            properties: AtomicU32::new(1),
            events: AtomicU32::new(1),
        }
    }

    pub(crate) fn next(&self, kind: TokenKind) -> Token {
        let counter = match kind {
            TokenKind::Type => &self.types,
            TokenKind::Field => &self.fields,
            TokenKind::Method => &self.methods,
            TokenKind::Property => &self.properties,
            TokenKind::Event => &self.events,
        };
        Token::from_parts(kind, counter.fetch_add(1, Ordering::Relaxed))
    }
}

/// Well-known types every registry provides
pub struct CoreTypes {
    /// `System.Object`, the root of every class hierarchy
    pub object: TypeRc,
    /// `System.Attribute`, the base of all attribute types
    pub attribute: TypeRc,
    /// `TypeForge.AssembledTypeAttribute`, stamped onto every generated proxy type
    pub assembled_type_attribute: TypeRc,
}

impl CoreTypes {
    fn new(tokens: &TokenAllocator) -> Result<Self> {
        let object = ClassBuilder::new("System", "Object")
            .public()
            .constructor(|c| c.body(Expr::empty()))
            .build_with(tokens, None)?;
        let attribute = ClassBuilder::new("System", "Attribute")
            .public()
            .abstract_()
            .constructor(|c| c.protected())
            .build_with(tokens, Some(&object))?;
        let assembled_type_attribute = ClassBuilder::new("TypeForge", "AssembledTypeAttribute")
            .public()
            .sealed()
            .extends(&attribute)
            .default_constructor()
            .build_with(tokens, Some(&object))?;

        Ok(CoreTypes {
            object,
            attribute,
            assembled_type_attribute,
        })
    }

    /// The parameterless constructor of the marker attribute
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingMember`] if the constructor is missing.
    pub fn assembled_type_attribute_constructor(&self) -> Result<MethodRc> {
        self.assembled_type_attribute
            .find_constructor(&[])
            .ok_or_else(|| crate::Error::MissingMember {
                type_name: self.assembled_type_attribute.fullname(),
                member: ".ctor".to_string(),
            })
    }

    fn all(&self) -> [&TypeRc; 3] {
        [&self.object, &self.attribute, &self.assembled_type_attribute]
    }
}

/// Central registry managing all runtime types of one pipeline.
///
/// Types are stored in a lock-free skip list ordered by token; a secondary index maps full
/// names to every type registered under that name (generated type names are unique per
/// registry, but types re-created from a flushed module may share a name with a
/// previously generated one).
pub struct TypeRegistry {
    /// Primary storage, ordered by token
    types: SkipMap<Token, TypeRc>,
    /// Full name index
    fullnames: DashMap<String, Vec<TypeRc>>,
    /// Token sequences
    tokens: TokenAllocator,
    /// Well-known types
    core: CoreTypes,
}

impl TypeRegistry {
    /// Create a new registry, holding the core types
    ///
    /// # Errors
    /// Returns an error if the core types cannot be built.
    pub fn new() -> Result<Self> {
        let tokens = TokenAllocator::new();
        let core = CoreTypes::new(&tokens)?;
        let registry = TypeRegistry {
            types: SkipMap::new(),
            fullnames: DashMap::new(),
            tokens,
            core,
        };

        for ty in registry.core.all() {
            registry.insert(ty);
        }
        Ok(registry)
    }

    /// Access the well-known core types
    pub fn core(&self) -> &CoreTypes {
        &self.core
    }

    pub(crate) fn tokens(&self) -> &TokenAllocator {
        &self.tokens
    }

    /// Allocates the next token of `kind`
    pub fn next_token(&self, kind: TokenKind) -> Token {
        self.tokens.next(kind)
    }

    /// Registers a type. Inserting the same token twice keeps the first registration.
    pub fn insert(&self, ty: &TypeRc) {
        if self.types.contains_key(&ty.token) {
            return;
        }

        self.types.insert(ty.token, ty.clone());
        self.fullnames
            .entry(ty.fullname())
            .or_default()
            .push(ty.clone());
    }

    /// Get a type by its token
    pub fn get(&self, token: &Token) -> Option<TypeRc> {
        self.types.get(token).map(|entry| entry.value().clone())
    }

    /// Get a type by its token, failing if it is unknown
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeNotFound`] if no such type is registered.
    pub fn require(&self, token: &Token) -> Result<TypeRc> {
        self.get(token)
            .ok_or_else(|| TypeNotFound(token.to_string()))
    }

    /// All types registered under `fullname`, in registration order
    pub fn get_by_fullname(&self, fullname: &str) -> Vec<TypeRc> {
        self.fullnames
            .get(fullname)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// The first type registered under `fullname`
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeNotFound`] if no such type is registered.
    pub fn get_by_fullname_first(&self, fullname: &str) -> Result<TypeRc> {
        self.get_by_fullname(fullname)
            .into_iter()
            .next()
            .ok_or_else(|| TypeNotFound(fullname.to_string()))
    }

    /// Returns true if a type is registered under `fullname`
    pub fn contains_fullname(&self, fullname: &str) -> bool {
        self.fullnames
            .get(fullname)
            .is_some_and(|entry| !entry.is_empty())
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if no type is registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// All registered types in token order
    pub fn all_types(&self) -> Vec<TypeRc> {
        self.types.iter().map(|entry| entry.value().clone()).collect()
    }
}
