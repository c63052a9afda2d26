//! Assembled type identifiers.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use crate::runtime::TypeRc;

/// One participant's contribution to an identifier.
///
/// Parts are plain data so that identifiers survive being stamped into a generated type,
/// flushed to disk and read back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdPart {
    /// A flag
    Bool(bool),
    /// An integer
    Int(i64),
    /// A string
    Str(Arc<str>),
    /// An ordered list of parts
    List(Vec<IdPart>),
}

impl IdPart {
    /// The text of a string part, without the quotes [`fmt::Display`] adds
    pub fn as_str(&self) -> Option<&str> {
        match self {
            IdPart::Str(value) => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for IdPart {
    fn from(value: bool) -> Self {
        IdPart::Bool(value)
    }
}

impl From<i64> for IdPart {
    fn from(value: i64) -> Self {
        IdPart::Int(value)
    }
}

impl From<&str> for IdPart {
    fn from(value: &str) -> Self {
        IdPart::Str(Arc::from(value))
    }
}

impl From<String> for IdPart {
    fn from(value: String) -> Self {
        IdPart::Str(Arc::from(value))
    }
}

impl From<Vec<IdPart>> for IdPart {
    fn from(value: Vec<IdPart>) -> Self {
        IdPart::List(value)
    }
}

impl fmt::Display for IdPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdPart::Bool(value) => write!(f, "{value}"),
            IdPart::Int(value) => write!(f, "{value}"),
            IdPart::Str(value) => write!(f, "{value:?}"),
            IdPart::List(parts) => {
                write!(f, "[")?;
                for (index, part) in parts.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{part}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Fingerprint of one assembly request: the requested type plus one optional part per
/// configured participant, in registration order.
///
/// Two identifiers are equal when they name the same requested type instance and all parts
/// are equal; equal identifiers always map to the same generated type.
#[derive(Clone)]
pub struct AssembledTypeId {
    requested: TypeRc,
    parts: Vec<Option<IdPart>>,
}

impl AssembledTypeId {
    /// Creates an identifier
    pub fn new(requested: &TypeRc, parts: Vec<Option<IdPart>>) -> Self {
        AssembledTypeId {
            requested: requested.clone(),
            parts,
        }
    }

    /// The requested type
    pub fn requested_type(&self) -> &TypeRc {
        &self.requested
    }

    /// All parts, `None` where a participant contributes nothing
    pub fn parts(&self) -> &[Option<IdPart>] {
        &self.parts
    }

    /// The part at `index`
    pub fn part(&self, index: usize) -> Option<&IdPart> {
        self.parts.get(index).and_then(Option::as_ref)
    }
}

impl PartialEq for AssembledTypeId {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.requested, &other.requested) && self.parts == other.parts
    }
}

impl Eq for AssembledTypeId {}

impl Hash for AssembledTypeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.requested.token.hash(state);
        self.parts.hash(state);
    }
}

impl fmt::Display for AssembledTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.requested.fullname())?;
        for (index, part) in self.parts.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            match part {
                Some(part) => write!(f, "{part}")?,
                None => write!(f, "<none>")?,
            }
        }
        write!(f, "]")
    }
}

impl fmt::Debug for AssembledTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssembledTypeId({self})")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::test::fixtures::{animal_hierarchy, registry};

    #[test]
    fn test_equality_is_structural_over_parts() {
        let registry = registry();
        let (animal, dog, _) = animal_hierarchy(&registry);

        let first = AssembledTypeId::new(&dog, vec![Some(IdPart::from("a")), None]);
        let second = AssembledTypeId::new(&dog, vec![Some(IdPart::from("a")), None]);
        let other_part = AssembledTypeId::new(&dog, vec![Some(IdPart::from("b")), None]);
        let other_type = AssembledTypeId::new(&animal, vec![Some(IdPart::from("a")), None]);

        assert_eq!(first, second);
        assert_ne!(first, other_part);
        assert_ne!(first, other_type);

        let set: HashSet<_> = [first, second, other_part].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_display() {
        let registry = registry();
        let (_, dog, _) = animal_hierarchy(&registry);
        let id = AssembledTypeId::new(
            &dog,
            vec![
                Some(IdPart::List(vec![IdPart::Int(1), IdPart::Bool(true)])),
                None,
                Some(IdPart::from("x")),
            ],
        );
        assert_eq!(id.to_string(), "App.Dog[[1, true], <none>, \"x\"]");
        assert_eq!(id.part(2), Some(&IdPart::from("x")));
        assert_eq!(id.part(1), None);
    }

    #[test]
    fn test_as_str_is_unquoted() {
        assert_eq!(IdPart::from("Alpha").as_str(), Some("Alpha"));
        assert_eq!(IdPart::from("Alpha").to_string(), "\"Alpha\"");
        assert_eq!(IdPart::Int(3).as_str(), None);
    }
}
