//! Attribute flags for runtime types and members.
//!
//! The bit layout follows the ECMA-335 attribute encodings (§II.23.1) so that
//! generated types can be described with the same vocabulary as hand-written ones.

use bitflags::bitflags;
use strum::{Display, EnumString};

/// Mask selecting the visibility bits of [`TypeAttributes`]
pub const TYPE_VISIBILITY_MASK: u32 = 0x0000_0007;
/// Mask selecting the member access bits of [`MethodAttributes`] and [`FieldAttributes`]
pub const MEMBER_ACCESS_MASK: u32 = 0x0000_0007;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Type attribute flags
    pub struct TypeAttributes: u32 {
        /// Class is not public scope
        const NOT_PUBLIC = 0x0000_0000;
        /// Class is public scope
        const PUBLIC = 0x0000_0001;
        /// Class is nested with public visibility
        const NESTED_PUBLIC = 0x0000_0002;
        /// Class is nested with private visibility
        const NESTED_PRIVATE = 0x0000_0003;
        /// Class is nested with family visibility
        const NESTED_FAMILY = 0x0000_0004;
        /// Type is an interface
        const INTERFACE = 0x0000_0020;
        /// Class is abstract
        const ABSTRACT = 0x0000_0080;
        /// Class cannot be extended
        const SEALED = 0x0000_0100;
        /// Class name is special
        const SPECIAL_NAME = 0x0000_0400;
        /// Initialize the class before first static field access
        const BEFORE_FIELD_INIT = 0x0010_0000;
    }
}

impl TypeAttributes {
    /// Returns only the visibility bits
    #[must_use]
    pub fn visibility(self) -> u32 {
        self.bits() & TYPE_VISIBILITY_MASK
    }

    /// Returns true if the type is visible outside of its defining module
    #[must_use]
    pub fn is_visible(self) -> bool {
        matches!(self.visibility(), 0x1 | 0x2 | 0x4)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Method attribute flags
    pub struct MethodAttributes: u32 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types only in this module
        const FAM_AND_ASSEM = 0x0002;
        /// Accessible by anyone in the module
        const ASSEM = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessible by sub-types anywhere, plus anyone in module
        const FAM_OR_ASSEM = 0x0005;
        /// Accessible by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method may not be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method always gets a new slot in the vtable
        const NEW_SLOT = 0x0100;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// Runtime should check name encoding
        const RT_SPECIAL_NAME = 0x1000;
    }
}

impl MethodAttributes {
    /// Returns the access level encoded in these flags
    #[must_use]
    pub fn access(self) -> MemberAccess {
        MemberAccess::from_bits(self.bits())
    }

    /// Replaces the access bits with `access`, keeping all other flags
    #[must_use]
    pub fn with_access(self, access: MemberAccess) -> Self {
        Self::from_bits_retain((self.bits() & !MEMBER_ACCESS_MASK) | access as u32)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Field attribute flags
    pub struct FieldAttributes: u32 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types only in this module
        const FAM_AND_ASSEM = 0x0002;
        /// Accessible by anyone in the module
        const ASSEM = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessible by sub-types anywhere, plus anyone in module
        const FAM_OR_ASSEM = 0x0005;
        /// Accessible by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Field may only be initialized, not written to after init
        const INIT_ONLY = 0x0020;
    }
}

impl FieldAttributes {
    /// Returns the access level encoded in these flags
    #[must_use]
    pub fn access(self) -> MemberAccess {
        MemberAccess::from_bits(self.bits())
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Property attribute flags
    pub struct PropertyAttributes: u32 {
        /// Property is special
        const SPECIAL_NAME = 0x0200;
        /// Runtime should check name encoding
        const RT_SPECIAL_NAME = 0x0400;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Event attribute flags
    pub struct EventAttributes: u32 {
        /// Event is special
        const SPECIAL_NAME = 0x0200;
        /// Runtime should check name encoding
        const RT_SPECIAL_NAME = 0x0400;
    }
}

/// Member accessibility extracted from the access mask of method and field flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[repr(u32)]
pub enum MemberAccess {
    /// Member not referenceable
    CompilerControlled = 0,
    /// Accessible only by the parent type
    Private = 1,
    /// Accessible by sub-types only in this module
    FamilyAndAssembly = 2,
    /// Accessible by anyone in the module
    Assembly = 3,
    /// Accessible only by type and sub-types
    Family = 4,
    /// Accessible by sub-types anywhere, plus anyone in module
    FamilyOrAssembly = 5,
    /// Accessible by anyone
    Public = 6,
}

impl MemberAccess {
    /// Extract the access level from raw member flags
    #[must_use]
    pub fn from_bits(flags: u32) -> Self {
        match flags & MEMBER_ACCESS_MASK {
            1 => MemberAccess::Private,
            2 => MemberAccess::FamilyAndAssembly,
            3 => MemberAccess::Assembly,
            4 => MemberAccess::Family,
            5 => MemberAccess::FamilyOrAssembly,
            6 => MemberAccess::Public,
            _ => MemberAccess::CompilerControlled,
        }
    }

    /// Returns true if a subclass living in another module can access the member
    #[must_use]
    pub fn is_accessible_from_subclass(self) -> bool {
        matches!(
            self,
            MemberAccess::Public | MemberAccess::Family | MemberAccess::FamilyOrAssembly
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_access_extraction() {
        let flags = MethodAttributes::FAMILY | MethodAttributes::VIRTUAL;
        assert_eq!(flags.access(), MemberAccess::Family);
        assert!(flags.access().is_accessible_from_subclass());

        let private = MethodAttributes::PRIVATE | MethodAttributes::STATIC;
        assert_eq!(private.access(), MemberAccess::Private);
        assert!(!private.access().is_accessible_from_subclass());
    }

    #[test]
    fn test_with_access_keeps_other_bits() {
        let flags = (MethodAttributes::PRIVATE | MethodAttributes::VIRTUAL)
            .with_access(MemberAccess::Public);
        assert_eq!(flags.access(), MemberAccess::Public);
        assert!(flags.contains(MethodAttributes::VIRTUAL));
    }

    #[test]
    fn test_type_visibility() {
        assert!(TypeAttributes::PUBLIC.is_visible());
        assert!(TypeAttributes::NESTED_PUBLIC.is_visible());
        assert!(!TypeAttributes::NESTED_PRIVATE.is_visible());
        assert!(!(TypeAttributes::NOT_PUBLIC | TypeAttributes::SEALED).is_visible());
    }

    #[test]
    fn test_member_access_display() {
        assert_eq!(MemberAccess::FamilyOrAssembly.to_string(), "FamilyOrAssembly");
    }
}
