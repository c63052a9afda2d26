//! Configurable participants for tests.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;

use crate::{
    assembler::{
        AdditionalType, AdditionalTypeAssemblyContext, LoadedTypesContext, Participant,
        ParticipantState, ProxyTypeAssemblyContext,
    },
    identity::{AssembledTypeId, IdPart, TypeIdentifierProvider},
    runtime::{Expr, TypeRc},
    Result,
};

type ParticipateFn =
    dyn Fn(&mut ParticipantState, &mut ProxyTypeAssemblyContext<'_>) -> Result<()> + Send + Sync;
type AdditionalTypeFn = dyn Fn(&IdPart, &mut AdditionalTypeAssemblyContext<'_>) -> Result<Option<AdditionalType>>
    + Send
    + Sync;

/// A participant whose behavior is assembled from closures, recording every callback
pub struct NamedParticipant {
    name: String,
    part: Option<Arc<dyn TypeIdentifierProvider>>,
    participate: Option<Box<ParticipateFn>>,
    additional: Option<Box<AdditionalTypeFn>>,
    participations: AtomicUsize,
    non_subclassable: Mutex<Vec<String>>,
    rebuilt: Mutex<Vec<AssembledTypeId>>,
}

impl NamedParticipant {
    /// A participant that contributes no id part and changes nothing
    pub fn new(name: &str) -> Self {
        NamedParticipant {
            name: name.to_string(),
            part: None,
            participate: None,
            additional: None,
            participations: AtomicUsize::new(0),
            non_subclassable: Mutex::new(Vec::new()),
            rebuilt: Mutex::new(Vec::new()),
        }
    }

    /// Sets the partial-identifier component
    pub fn with_part<P: TypeIdentifierProvider + 'static>(mut self, provider: P) -> Self {
        self.part = Some(Arc::new(provider));
        self
    }

    /// Sets what the participant does to the proxy
    pub fn on_participate<F>(mut self, participate: F) -> Self
    where
        F: Fn(&mut ParticipantState, &mut ProxyTypeAssemblyContext<'_>) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.participate = Some(Box::new(participate));
        self
    }

    /// Sets how the participant answers additional-type requests
    pub fn on_additional_type<F>(mut self, additional: F) -> Self
    where
        F: Fn(&IdPart, &mut AdditionalTypeAssemblyContext<'_>) -> Result<Option<AdditionalType>>
            + Send
            + Sync
            + 'static,
    {
        self.additional = Some(Box::new(additional));
        self
    }

    /// Number of `participate` calls so far
    pub fn participations(&self) -> usize {
        self.participations.load(Ordering::SeqCst)
    }

    /// Full names of the non-subclassable types reported to this participant
    pub fn non_subclassable_types(&self) -> Vec<String> {
        self.non_subclassable.lock().clone()
    }

    /// Identifiers of the proxies handed to `rebuild_state`
    pub fn rebuilt_ids(&self) -> Vec<AssembledTypeId> {
        self.rebuilt.lock().clone()
    }
}

impl Participant for NamedParticipant {
    fn name(&self) -> &str {
        &self.name
    }

    fn partial_type_identifier_provider(&self) -> Option<Arc<dyn TypeIdentifierProvider>> {
        self.part.clone()
    }

    fn participate(
        &self,
        state: &mut ParticipantState,
        context: &mut ProxyTypeAssemblyContext<'_>,
    ) -> Result<()> {
        self.participations.fetch_add(1, Ordering::SeqCst);
        match &self.participate {
            Some(participate) => participate(state, context),
            None => Ok(()),
        }
    }

    fn handle_non_subclassable_type(&self, requested: &TypeRc) -> Result<()> {
        self.non_subclassable.lock().push(requested.fullname());
        Ok(())
    }

    fn get_or_create_additional_type(
        &self,
        additional_id: &IdPart,
        _state: &mut ParticipantState,
        context: &mut AdditionalTypeAssemblyContext<'_>,
    ) -> Result<Option<AdditionalType>> {
        match &self.additional {
            Some(additional) => additional(additional_id, context),
            None => Ok(None),
        }
    }

    fn rebuild_state(&self, loaded: &LoadedTypesContext) -> Result<()> {
        self.rebuilt
            .lock()
            .extend(loaded.proxy_types.iter().map(|proxy| proxy.id.clone()));
        Ok(())
    }
}

/// A participant overriding `Greet()` of the requested type to return `greeting`
pub fn greeting_participant(name: &str, greeting: &'static str) -> NamedParticipant {
    NamedParticipant::new(name).on_participate(move |_, context| {
        let greet = context.requested_type().method("Greet")?;
        let proxy = context.proxy_mut()?;
        let (handle, _) = proxy.get_or_add_override(&greet)?;
        proxy.set_method_body(handle, Expr::constant(greeting))
    })
}
