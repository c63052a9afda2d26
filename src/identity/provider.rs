//! Identifier computation.

use std::sync::Arc;

use crate::{
    assembler::Participant,
    identity::{AssembledTypeId, IdPart},
    runtime::{Expr, TypeRc, Value},
    Result,
};

/// A participant's partial-identifier component.
///
/// Returns the part that distinguishes the types this participant generates for
/// `requested`, or `None` if the participant always generates the same thing.
pub trait TypeIdentifierProvider: Send + Sync {
    /// Computes the identifier part for `requested`
    fn get_part(&self, requested: &TypeRc) -> Option<IdPart>;
}

impl<F> TypeIdentifierProvider for F
where
    F: Fn(&TypeRc) -> Option<IdPart> + Send + Sync,
{
    fn get_part(&self, requested: &TypeRc) -> Option<IdPart> {
        self(requested)
    }
}

/// Builds [`AssembledTypeId`]s from the configured participants
pub struct IdentifierProvider {
    participants: Vec<(String, Option<Arc<dyn TypeIdentifierProvider>>)>,
}

impl IdentifierProvider {
    /// Collects the partial-identifier components of `participants`, keeping their order
    pub fn new(participants: &[Arc<dyn Participant>]) -> Self {
        IdentifierProvider {
            participants: participants
                .iter()
                .map(|participant| {
                    (
                        participant.name().to_string(),
                        participant.partial_type_identifier_provider(),
                    )
                })
                .collect(),
        }
    }

    /// Number of configured participants, and so the number of parts per identifier
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Computes the identifier of a request for `requested`
    pub fn get_identifier(&self, requested: &TypeRc) -> AssembledTypeId {
        let parts = self
            .participants
            .iter()
            .map(|(_, provider)| provider.as_ref().and_then(|p| p.get_part(requested)))
            .collect();
        AssembledTypeId::new(requested, parts)
    }

    /// The part `participant` contributed to `id`
    ///
    /// # Errors
    /// Returns [`crate::Error::Argument`] if the participant is not configured.
    pub fn get_part(&self, id: &AssembledTypeId, participant: &str) -> Result<Option<IdPart>> {
        let index = self
            .participants
            .iter()
            .position(|(name, _)| name == participant)
            .ok_or_else(|| {
                argument_error!(
                    "participant",
                    "Participant '{}' is not configured",
                    participant
                )
            })?;
        Ok(id.part(index).cloned())
    }

    /// The expression that evaluates to `id` inside generated code
    pub fn get_expression(&self, id: &AssembledTypeId) -> Expr {
        Expr::Constant(Value::Identifier(Arc::new(id.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::{
            fixtures::{animal_hierarchy, registry},
            participants::NamedParticipant,
        },
        Error,
    };

    fn provider() -> IdentifierProvider {
        let participants: Vec<Arc<dyn Participant>> = vec![
            Arc::new(NamedParticipant::new("first").with_part(|ty: &TypeRc| {
                Some(IdPart::from(ty.name.as_str()))
            })),
            Arc::new(NamedParticipant::new("silent")),
            Arc::new(NamedParticipant::new("flag").with_part(|_: &TypeRc| Some(IdPart::Bool(true)))),
        ];
        IdentifierProvider::new(&participants)
    }

    #[test]
    fn test_identifier_aligns_parts_with_participants() {
        let registry = registry();
        let (_, dog, _) = animal_hierarchy(&registry);
        let provider = provider();

        let id = provider.get_identifier(&dog);
        assert_eq!(id.parts().len(), 3);
        assert_eq!(id.part(0), Some(&IdPart::from("Dog")));
        assert_eq!(id.part(1), None);
        assert_eq!(id.part(2), Some(&IdPart::Bool(true)));
        assert_eq!(provider.get_identifier(&dog), id);
    }

    #[test]
    fn test_get_part_by_participant() {
        let registry = registry();
        let (_, dog, _) = animal_hierarchy(&registry);
        let provider = provider();
        let id = provider.get_identifier(&dog);

        assert_eq!(provider.get_part(&id, "flag").unwrap(), Some(IdPart::Bool(true)));
        assert_eq!(provider.get_part(&id, "silent").unwrap(), None);
        assert!(matches!(
            provider.get_part(&id, "unknown"),
            Err(Error::Argument { .. })
        ));
    }

    #[test]
    fn test_expression_evaluates_to_identifier() {
        let registry = registry();
        let (_, dog, _) = animal_hierarchy(&registry);
        let provider = provider();
        let id = provider.get_identifier(&dog);

        match provider.get_expression(&id) {
            Expr::Constant(Value::Identifier(stamped)) => assert_eq!(*stamped, id),
            other => panic!("unexpected expression {other:?}"),
        }
    }
}
