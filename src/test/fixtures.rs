//! Requested-type factories.

use crate::runtime::{ClassBuilder, Expr, TypeRc, TypeRegistry, TypeSignature};

/// A fresh registry holding only the core types
pub fn registry() -> TypeRegistry {
    TypeRegistry::new().unwrap()
}

/// Builds the animal hierarchy used throughout the tests.
///
/// - `App.ISpeaker`: interface with `string Speak()`
/// - `App.Animal`: public abstract class implementing `ISpeaker` with a protected
///   constructor, abstract `Speak` and virtual `Sleep` returning `"zzz"`
/// - `App.Dog`: public class deriving from `Animal` with a public constructor and
///   `Speak` overridden to return `"woof"`
///
/// Returns `(animal, dog, speaker)`.
pub fn animal_hierarchy(registry: &TypeRegistry) -> (TypeRc, TypeRc, TypeRc) {
    let speaker = ClassBuilder::new("App", "ISpeaker")
        .public()
        .interface()
        .method("Speak", |m| m.abstract_().returns(TypeSignature::String))
        .build(registry)
        .unwrap();

    let animal = ClassBuilder::new("App", "Animal")
        .public()
        .abstract_()
        .implements(&speaker)
        .constructor(|c| c.protected())
        .method("Speak", |m| m.abstract_().returns(TypeSignature::String))
        .method("Sleep", |m| {
            m.virtual_()
                .returns(TypeSignature::String)
                .body(Expr::constant("zzz"))
        })
        .build(registry)
        .unwrap();

    let dog = ClassBuilder::new("App", "Dog")
        .public()
        .extends(&animal)
        .default_constructor()
        .method("Speak", |m| {
            m.override_()
                .returns(TypeSignature::String)
                .body(Expr::constant("woof"))
        })
        .build(registry)
        .unwrap();

    (animal, dog, speaker)
}

/// A public, non-sealed `App.Base` with a default constructor and a virtual
/// `string Greet()` returning `"base"`
pub fn greeter_base(registry: &TypeRegistry) -> TypeRc {
    ClassBuilder::new("App", "Base")
        .public()
        .default_constructor()
        .method("Greet", |m| {
            m.virtual_()
                .returns(TypeSignature::String)
                .body(Expr::constant("base"))
        })
        .build(registry)
        .unwrap()
}
