//! The participant extension point.

use std::{
    any::Any,
    collections::HashMap,
    fmt,
    sync::Arc,
};

use crate::{
    assembler::{AdditionalTypeAssemblyContext, ProxyTypeAssemblyContext},
    identity::{AssembledTypeId, IdPart, TypeIdentifierProvider},
    model::TypeHandle,
    runtime::TypeRc,
    Result,
};

/// A pluggable code generator contributing to generated types.
///
/// Participants run in registration order for every assembly request. Each one may add
/// members to the proxy, create additional types in the same batch and register callbacks
/// that run once the batch has been generated. Participants are shared between threads
/// and must not keep per-request state in `self`; [`ParticipantState`] is the per-request
/// store.
pub trait Participant: Send + Sync {
    /// Unique, stable name of this participant
    fn name(&self) -> &str;

    /// The component contributing this participant's part of every [`AssembledTypeId`].
    /// `None` means the participant generates the same code for every request.
    fn partial_type_identifier_provider(&self) -> Option<Arc<dyn TypeIdentifierProvider>> {
        None
    }

    /// Modifies the proxy of one request.
    ///
    /// # Errors
    /// Any error aborts the assembly and is reported with the requested type and the
    /// participant list.
    fn participate(
        &self,
        state: &mut ParticipantState,
        context: &mut ProxyTypeAssemblyContext<'_>,
    ) -> Result<()>;

    /// Called instead of [`Participant::participate`] for requested types that cannot be
    /// derived from.
    ///
    /// # Errors
    /// Any error aborts the request.
    fn handle_non_subclassable_type(&self, _requested: &TypeRc) -> Result<()> {
        Ok(())
    }

    /// Provides or creates the additional type identified by `additional_id`, or returns
    /// `None` if this participant does not know the id.
    ///
    /// # Errors
    /// Any error aborts the request.
    fn get_or_create_additional_type(
        &self,
        _additional_id: &IdPart,
        _state: &mut ParticipantState,
        _context: &mut AdditionalTypeAssemblyContext<'_>,
    ) -> Result<Option<AdditionalType>> {
        Ok(None)
    }

    /// Restores the participant's caches from types loaded out of flushed modules
    ///
    /// # Errors
    /// Any error aborts the load.
    fn rebuild_state(&self, _loaded: &LoadedTypesContext) -> Result<()> {
        Ok(())
    }

    /// The identifier a loaded additional type was generated for.
    ///
    /// Mapped types are cached, so requesting the identifier again does not regenerate
    /// them. The first participant answering wins.
    fn additional_type_id(&self, _loaded: &TypeRc) -> Option<IdPart> {
        None
    }
}

/// The answer of a participant to an additional-type request
#[derive(Debug, Clone)]
pub enum AdditionalType {
    /// A type that already exists
    Existing(TypeRc),
    /// A descriptor created in the request's batch
    Created(TypeHandle),
}

/// Typed key/value store shared by all participants of one request
#[derive(Default)]
pub struct ParticipantState {
    entries: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl ParticipantState {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        ParticipantState::default()
    }

    /// Stores `value` under `key`, replacing any previous value
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), Box::new(value));
    }

    /// The value under `key`, if it exists and has type `T`
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.entries.get(key).and_then(|value| value.downcast_ref())
    }

    /// Mutable access to the value under `key`, if it exists and has type `T`
    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.entries
            .get_mut(key)
            .and_then(|value| value.downcast_mut())
    }

    /// The value under `key`, inserting `create()` first if the key is vacant.
    /// Returns `None` if the existing value has another type.
    pub fn get_or_insert_with<T, F>(&mut self, key: &str, create: F) -> Option<&mut T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        self.entries
            .entry(key.to_string())
            .or_insert_with(|| Box::new(create()))
            .downcast_mut()
    }

    /// Removes the value under `key` if it has type `T`
    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        if !self.entries.get(key).is_some_and(|value| value.is::<T>()) {
            return None;
        }
        self.entries
            .remove(key)
            .and_then(|value| value.downcast().ok())
            .map(|value| *value)
    }

    /// Returns true if a value is stored under `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ParticipantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();
        f.debug_struct("ParticipantState")
            .field("keys", &keys)
            .finish()
    }
}

/// A proxy type re-created from a flushed module
#[derive(Debug, Clone)]
pub struct LoadedProxyType {
    /// The requested type the proxy was generated for
    pub requested: TypeRc,
    /// The loaded proxy
    pub generated: TypeRc,
    /// The identifier stamped into the proxy
    pub id: AssembledTypeId,
}

/// Everything loaded from flushed modules, handed to [`Participant::rebuild_state`]
#[derive(Debug, Default)]
pub struct LoadedTypesContext {
    /// Loaded proxies with their identifiers
    pub proxy_types: Vec<LoadedProxyType>,
    /// Loaded types that are not proxies
    pub additional_types: Vec<TypeRc>,
    /// State shared by the participants while rebuilding
    pub state: ParticipantState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_typed() {
        let mut state = ParticipantState::new();
        state.insert("count", 3usize);
        state.insert("name", String::from("mixins"));

        assert_eq!(state.get::<usize>("count"), Some(&3));
        assert_eq!(state.get::<String>("count"), None);
        assert_eq!(state.len(), 2);

        *state.get_mut::<usize>("count").unwrap() += 1;
        assert_eq!(state.remove::<String>("count"), None);
        assert_eq!(state.remove::<usize>("count"), Some(4));
        assert!(!state.contains_key("count"));
    }

    #[test]
    fn test_get_or_insert_with_keeps_existing_value() {
        let mut state = ParticipantState::new();
        state.get_or_insert_with("visited", Vec::<String>::new)
            .unwrap()
            .push("first".to_string());
        state.get_or_insert_with("visited", Vec::<String>::new)
            .unwrap()
            .push("second".to_string());

        assert_eq!(
            state.get::<Vec<String>>("visited").map(Vec::len),
            Some(2)
        );
        assert!(state.get_or_insert_with("visited", || 0u32).is_none());
    }
}
