//! Integration tests for the pipeline facade.
//!
//! These tests drive complete requests through the public API: participants editing the
//! proxy, additional types, concurrent requests and constructor selection.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier,
    },
    thread,
};

use typeforge::{prelude::*, runtime::MemberAccess};

/// Overrides `Greet()` to return a fixed greeting; the greeting is the id part
struct Greeter {
    greeting: &'static str,
    participations: AtomicUsize,
}

impl Greeter {
    fn new(greeting: &'static str) -> Self {
        Greeter {
            greeting,
            participations: AtomicUsize::new(0),
        }
    }
}

impl Participant for Greeter {
    fn name(&self) -> &str {
        "greeter"
    }

    fn partial_type_identifier_provider(&self) -> Option<Arc<dyn TypeIdentifierProvider>> {
        let greeting = self.greeting;
        Some(Arc::new(move |_: &TypeRc| Some(IdPart::from(greeting))))
    }

    fn participate(
        &self,
        _state: &mut ParticipantState,
        context: &mut ProxyTypeAssemblyContext<'_>,
    ) -> Result<()> {
        self.participations.fetch_add(1, Ordering::SeqCst);
        let greet = context.requested_type().method("Greet")?;
        let proxy = context.proxy_mut()?;
        let (method, _) = proxy.get_or_add_override(&greet)?;
        proxy.set_method_body(method, Expr::constant(self.greeting))
    }
}

/// Adds a `Name` auto property and a public `Tag` field
struct Suffixer;

impl Participant for Suffixer {
    fn name(&self) -> &str {
        "suffixer"
    }

    fn participate(
        &self,
        state: &mut ParticipantState,
        context: &mut ProxyTypeAssemblyContext<'_>,
    ) -> Result<()> {
        state.insert("suffixer.seen", context.requested_type().fullname());
        let proxy = context.proxy_mut()?;
        proxy.add_auto_property("Name", TypeSignature::String, MemberAccess::Public)?;
        proxy.add_field("Tag", TypeSignature::String, FieldAttributes::PUBLIC)?;
        Ok(())
    }
}

/// Provides `Helpers.<id>` types with a static `Id()` method
struct HelperFactory;

impl Participant for HelperFactory {
    fn name(&self) -> &str {
        "helpers"
    }

    fn participate(
        &self,
        _state: &mut ParticipantState,
        _context: &mut ProxyTypeAssemblyContext<'_>,
    ) -> Result<()> {
        Ok(())
    }

    fn get_or_create_additional_type(
        &self,
        additional_id: &IdPart,
        _state: &mut ParticipantState,
        context: &mut AdditionalTypeAssemblyContext<'_>,
    ) -> Result<Option<AdditionalType>> {
        let Some(name) = additional_id.as_str().map(str::to_string) else {
            return Ok(None);
        };
        let handle = context.create_additional_type(
            "Helpers",
            &name,
            TypeAttributes::PUBLIC | TypeAttributes::SEALED,
            None,
        )?;
        context.type_mut(handle)?.add_method(
            "Id",
            MethodAttributes::PUBLIC | MethodAttributes::STATIC,
            MethodSignature::new(TypeSignature::String, vec![]),
            Some(Expr::constant(name.as_str())),
        )?;
        Ok(Some(AdditionalType::Created(handle)))
    }
}

fn greeter_base(registry: &TypeRegistry) -> Result<TypeRc> {
    ClassBuilder::new("App", "Base")
        .public()
        .default_constructor()
        .constructor(|c| {
            c.public()
                .parameter("greeting", TypeSignature::String)
        })
        .method("Greet", |m| {
            m.virtual_()
                .returns(TypeSignature::String)
                .body(Expr::constant("base"))
        })
        .build(registry)
}

#[test]
fn test_greeter_overrides_requested_method() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let base = greeter_base(&registry)?;
    let pipeline = Pipeline::builder(registry)
        .participant(Arc::new(Greeter::new("hello")))
        .build()?;

    let instance = pipeline.create(&base, &[])?;
    let generated = instance.runtime_type();

    assert_eq!(instance.call("Greet", &[])?.as_str(), Some("hello"));
    assert!(generated.is_subclass_of(&base));
    assert_ne!(generated.token, base.token);
    assert_eq!(base.create_instance(&[])?.call("Greet", &[])?.as_str(), Some("base"));
    Ok(())
}

#[test]
fn test_participants_share_one_proxy() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let base = greeter_base(&registry)?;
    let pipeline = Pipeline::builder(registry)
        .participant(Arc::new(Greeter::new("hi")))
        .participant(Arc::new(Suffixer))
        .build()?;

    let instance = pipeline.create(&base, &[])?;
    instance.set_field("Tag", Value::from("tagged"))?;

    assert_eq!(instance.call("Greet", &[])?.as_str(), Some("hi"));
    assert_eq!(instance.get_field("Tag")?.as_str(), Some("tagged"));
    instance.call("set_Name", &[Value::from("ada")])?;
    assert_eq!(instance.call("get_Name", &[])?.as_str(), Some("ada"));
    assert_eq!(instance.runtime_type().properties.count(), 1);
    Ok(())
}

#[test]
fn test_requests_are_cached_per_identifier() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let base = greeter_base(&registry)?;
    let greeter = Arc::new(Greeter::new("cached"));
    let pipeline = Pipeline::builder(registry)
        .participant(greeter.clone())
        .build()?;
    let reflection = pipeline.reflection_service();

    let first = reflection.get_assembled_type(&base)?;
    let second = reflection.get_assembled_type(&base)?;

    assert_eq!(first.token, second.token);
    assert_eq!(greeter.participations.load(Ordering::SeqCst), 1);

    let id = reflection.get_type_id_for_assembled_type(&first)?;
    assert_eq!(
        reflection.get_part(&id, "greeter")?,
        Some(IdPart::from("cached"))
    );
    Ok(())
}

#[test]
fn test_differing_parts_yield_distinct_types() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let base = greeter_base(&registry)?;
    let pipeline = Pipeline::builder(registry)
        .participant(Arc::new(Greeter::new("parts")))
        .build()?;
    let reflection = pipeline.reflection_service();

    let formal = AssembledTypeId::new(&base, vec![Some(IdPart::from("formal"))]);
    let casual = AssembledTypeId::new(&base, vec![Some(IdPart::from("casual"))]);
    let first = reflection.get_assembled_type_by_id(&formal)?;
    let second = reflection.get_assembled_type_by_id(&casual)?;

    assert!(!Arc::ptr_eq(&first, &second));
    assert_ne!(first.token, second.token);
    assert_eq!(reflection.get_type_id_for_assembled_type(&first)?, formal);
    assert_eq!(reflection.get_type_id_for_assembled_type(&second)?, casual);
    assert!(Arc::ptr_eq(&reflection.get_assembled_type_by_id(&formal)?, &first));
    Ok(())
}

#[test]
fn test_concurrent_requests_generate_once() -> Result<()> {
    const THREADS: usize = 8;

    let registry = Arc::new(TypeRegistry::new()?);
    let base = greeter_base(&registry)?;
    let greeter = Arc::new(Greeter::new("concurrent"));
    let pipeline = Arc::new(
        Pipeline::builder(registry)
            .participant(greeter.clone())
            .degree_of_parallelism(4)
            .build()?,
    );
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let pipeline = pipeline.clone();
            let barrier = barrier.clone();
            let base = base.clone();
            thread::spawn(move || {
                barrier.wait();
                pipeline.create(&base, &[]).map(|instance| instance.runtime_type().token)
            })
        })
        .collect();

    let tokens: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect::<Result<_>>()?;

    assert!(tokens.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(greeter.participations.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_get_assembled_types_keeps_input_order() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let base = greeter_base(&registry)?;
    let other = ClassBuilder::new("App", "Other")
        .public()
        .default_constructor()
        .method("Greet", |m| {
            m.virtual_()
                .returns(TypeSignature::String)
                .body(Expr::constant("other"))
        })
        .build(&registry)?;
    let pipeline = Pipeline::builder(registry)
        .participant(Arc::new(Greeter::new("many")))
        .build()?;
    let reflection = pipeline.reflection_service();

    let generated = reflection.get_assembled_types(&[base.clone(), other.clone(), base.clone()])?;

    assert_eq!(generated.len(), 3);
    assert_eq!(reflection.get_requested_type(&generated[0])?.token, base.token);
    assert_eq!(reflection.get_requested_type(&generated[1])?.token, other.token);
    assert_eq!(generated[0].token, generated[2].token);
    Ok(())
}

#[test]
fn test_additional_types_are_cached_by_id() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let pipeline = Pipeline::builder(registry.clone())
        .participant(Arc::new(HelperFactory))
        .build()?;
    let reflection = pipeline.reflection_service();

    let helper = reflection.get_additional_type(&IdPart::from("Alpha"))?;
    let again = reflection.get_additional_type(&IdPart::from("Alpha"))?;

    assert_eq!(helper.token, again.token);
    assert_eq!(helper.fullname(), "Helpers.Alpha");
    assert_eq!(
        helper.method("Id")?.invoke(None, &[])?.as_str(),
        Some("Alpha")
    );
    assert!(registry.contains_fullname("Helpers.Alpha"));
    Ok(())
}

#[test]
fn test_unknown_additional_type_is_not_supported() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let pipeline = Pipeline::builder(registry)
        .participant(Arc::new(Greeter::new("none")))
        .build()?;

    let result = pipeline
        .reflection_service()
        .get_additional_type(&IdPart::from("Missing"));
    assert!(result.is_err());
    Ok(())
}

#[test]
fn test_constructor_arguments_select_overload() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let base = greeter_base(&registry)?;
    let pipeline = Pipeline::builder(registry)
        .participant(Arc::new(Greeter::new("args")))
        .build()?;

    let by_arguments = pipeline.create(&base, &[Value::from("ignored")])?;
    let by_signature = pipeline.create_with(
        &base,
        &[TypeSignature::String],
        &[Value::from("ignored")],
        false,
    )?;

    assert_eq!(by_arguments.runtime_type().token, by_signature.runtime_type().token);
    assert!(matches!(
        pipeline.create(&base, &[Value::from(1), Value::from(2)]),
        Err(Error::MissingMember { .. })
    ));
    Ok(())
}

#[test]
fn test_sealed_type_is_returned_unchanged() -> Result<()> {
    let registry = Arc::new(TypeRegistry::new()?);
    let sealed = ClassBuilder::new("App", "Final")
        .public()
        .sealed()
        .default_constructor()
        .build(&registry)?;
    let pipeline = Pipeline::builder(registry)
        .participant(Arc::new(Suffixer))
        .build()?;

    let instance = pipeline.create(&sealed, &[])?;
    assert_eq!(instance.runtime_type().token, sealed.token);
    assert!(!pipeline.reflection_service().is_assembled_type(&sealed));
    Ok(())
}
