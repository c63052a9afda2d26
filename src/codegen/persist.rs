//! XML artifacts of flushed modules.
//!
//! A module document lists every generated type of one module with its base type,
//! interfaces, attributes, members, bodies and explicit overrides. All data lives in
//! attributes; type references are full names, member references are the declaring type's
//! full name plus member name and parameter types. Loading re-creates the types in three
//! passes (declare, define members, attach bodies), resolving names against the module's
//! own types first and the registry second.
//!
//! ```xml
//! <module id="…" name="TypeForge.Generated.1" configuration="…">
//!   <type namespace="App" name="Dog_Proxy_1" flags="1048577" base="class:App.Dog">
//!     <field name="__typeID" type="object" flags="17"/>
//!     <method name="Speak" flags="198" returns="string">
//!       <body><constant><value kind="string" value="woof"/></constant></body>
//!     </method>
//!   </type>
//! </module>
//! ```

use std::{collections::HashMap, fs, path::Path, sync::Arc};

use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, Event},
    Reader, Writer,
};
use uguid::Guid;

use crate::{
    identity::{AssembledTypeId, IdPart},
    runtime::{
        CustomAttribute, Dispatch, EventAttributes, Expr, FieldAttributes, FieldRc, FieldRef,
        FieldTarget, MethodAttributes, MethodKind, MethodOverride, MethodRc, MethodRef,
        MethodSignature, MethodTarget, ParameterDeclaration, PropertyAttributes, RuntimeEvent,
        RuntimeField, RuntimeMethod, RuntimeProperty, RuntimeType, TokenKind, TypeAttributes,
        TypeOrigin, TypeRc, TypeRef, TypeRegistry, TypeSignature, Value,
    },
    Error, Result,
};

/// Identity of a flushed module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleHeader {
    /// Module id
    pub id: Guid,
    /// Module name
    pub name: String,
    /// Configuration id of the participants that generated the module
    pub participant_configuration_id: String,
}

/// Types re-created from a module document
#[derive(Debug)]
pub struct LoadedModule {
    /// The module identity
    pub header: ModuleHeader,
    /// The loaded types in document order
    pub types: Vec<TypeRc>,
}

fn persistence(message: impl Into<String>) -> Error {
    Error::Persistence(message.into())
}

/// A minimal element tree
#[derive(Debug, Clone, Default)]
struct XmlNode {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlNode>,
}

impl XmlNode {
    fn new(name: &str) -> Self {
        XmlNode {
            name: name.to_string(),
            ..XmlNode::default()
        }
    }

    fn attr(mut self, key: &str, value: impl ToString) -> Self {
        self.attributes.push((key.to_string(), value.to_string()));
        self
    }

    fn child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            persistence(format!("<{}> is missing attribute '{}'", self.name, key))
        })
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    fn first_child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|child| child.name == name)
    }

    fn require_child(&self, name: &str) -> Result<&XmlNode> {
        self.first_child(name).ok_or_else(|| {
            persistence(format!("<{}> is missing element <{}>", self.name, name))
        })
    }
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &XmlNode) -> Result<()> {
    let mut start = BytesStart::new(node.name.as_str());
    for (key, value) in &node.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if node.children.is_empty() {
        writer
            .write_event(Event::Empty(start))
            .map_err(|e| persistence(e.to_string()))?;
        return Ok(());
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|e| persistence(e.to_string()))?;
    for child in &node.children {
        write_node(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(node.name.as_str())))
        .map_err(|e| persistence(e.to_string()))?;
    Ok(())
}

fn to_document(root: &XmlNode) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(|e| persistence(e.to_string()))?;
    write_node(&mut writer, root)?;
    String::from_utf8(writer.into_inner()).map_err(|e| persistence(e.to_string()))
}

fn node_from(start: &BytesStart<'_>) -> Result<XmlNode> {
    let mut node = XmlNode::new(&String::from_utf8_lossy(start.name().as_ref()));
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| persistence(e.to_string()))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| persistence(e.to_string()))?
            .into_owned();
        node.attributes.push((key, value));
    }
    Ok(node)
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_none() => *root = Some(node),
        None => return Err(persistence("Document has more than one root element")),
    }
    Ok(())
}

fn parse_document(text: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root = None;
    loop {
        match reader.read_event().map_err(|e| persistence(e.to_string()))? {
            Event::Start(start) => stack.push(node_from(&start)?),
            Event::Empty(start) => {
                let node = node_from(&start)?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| persistence("Unbalanced end element"))?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(persistence("Document ended inside an element"));
    }
    root.ok_or_else(|| persistence("Document has no root element"))
}

fn signature_text(signature: &TypeSignature) -> Result<String> {
    match signature {
        TypeSignature::Class(_) => signature
            .runtime_type()
            .map(|ty| format!("class:{}", ty.fullname()))
            .ok_or_else(|| persistence("Signature refers to a dropped type")),
        TypeSignature::Mutable(handle) => Err(persistence(format!(
            "Signature still refers to descriptor {handle:?}"
        ))),
        primitive => Ok(primitive.to_string()),
    }
}

fn parameter_list(signature: &MethodSignature) -> Result<String> {
    let types = signature
        .parameters
        .iter()
        .map(|parameter| signature_text(&parameter.ty))
        .collect::<Result<Vec<_>>>()?;
    Ok(types.join(";"))
}

fn method_reference(element: &str, method: &MethodRc) -> Result<XmlNode> {
    let owner = method
        .declaring_type()
        .ok_or_else(|| persistence(format!("Method '{}' lost its declaring type", method.name)))?;
    Ok(XmlNode::new(element)
        .attr("declaring", owner.fullname())
        .attr("name", &method.name)
        .attr("params", parameter_list(&method.signature)?))
}

fn method_target(target: &MethodTarget) -> Result<MethodRc> {
    match target {
        MethodTarget::Runtime(method) => method
            .upgrade()
            .ok_or_else(|| persistence("Body refers to a dropped method")),
        MethodTarget::Mutable(handle) => Err(persistence(format!(
            "Body still refers to descriptor method {handle:?}"
        ))),
    }
}

fn field_target(target: &FieldTarget) -> Result<FieldRc> {
    match target {
        FieldTarget::Runtime(field) => field
            .upgrade()
            .ok_or_else(|| persistence("Body refers to a dropped field")),
        FieldTarget::Mutable(handle) => Err(persistence(format!(
            "Body still refers to descriptor field {handle:?}"
        ))),
    }
}

fn id_part_node(part: Option<&IdPart>) -> XmlNode {
    match part {
        None => XmlNode::new("part").attr("kind", "none"),
        Some(IdPart::Bool(value)) => XmlNode::new("part").attr("kind", "bool").attr("value", value),
        Some(IdPart::Int(value)) => XmlNode::new("part").attr("kind", "int").attr("value", value),
        Some(IdPart::Str(value)) => XmlNode::new("part").attr("kind", "str").attr("value", value),
        Some(IdPart::List(items)) => items
            .iter()
            .fold(XmlNode::new("part").attr("kind", "list"), |node, item| {
                node.child(id_part_node(Some(item)))
            }),
    }
}

fn value_node(value: &Value) -> Result<XmlNode> {
    let node = XmlNode::new("value");
    let node = match value {
        Value::Void => node.attr("kind", "void"),
        Value::Null => node.attr("kind", "null"),
        Value::Boolean(v) => node.attr("kind", "bool").attr("value", v),
        Value::I4(v) => node.attr("kind", "int32").attr("value", v),
        Value::I8(v) => node.attr("kind", "int64").attr("value", v),
        Value::R8(v) => node.attr("kind", "float64").attr("value", v),
        Value::String(v) => node.attr("kind", "string").attr("value", v),
        Value::Type(ty) => node.attr("kind", "type").attr("type", ty.fullname()),
        Value::Identifier(id) => id.parts().iter().fold(
            node.attr("kind", "identifier")
                .attr("requested", id.requested_type().fullname()),
            |node, part| node.child(id_part_node(part.as_ref())),
        ),
        Value::Object(object) => {
            return Err(persistence(format!(
                "Instances of '{}' cannot be persisted",
                object.runtime_type().fullname()
            )))
        }
    };
    Ok(node)
}

fn instance_node(node: XmlNode, instance: Option<&Expr>) -> Result<XmlNode> {
    match instance {
        Some(instance) => Ok(node.child(XmlNode::new("instance").child(expr_node(instance)?))),
        None => Ok(node),
    }
}

fn arguments_node(arguments: &[Expr]) -> Result<XmlNode> {
    arguments
        .iter()
        .try_fold(XmlNode::new("arguments"), |node, argument| {
            Ok(node.child(expr_node(argument)?))
        })
}

fn expr_node(expr: &Expr) -> Result<XmlNode> {
    let node = match expr {
        Expr::Constant(value) => XmlNode::new("constant").child(value_node(value)?),
        Expr::This => XmlNode::new("this"),
        Expr::Argument(index) => XmlNode::new("argument").attr("index", index),
        Expr::Block(items) => items
            .iter()
            .try_fold(XmlNode::new("block"), |node, item| {
                Ok::<_, Error>(node.child(expr_node(item)?))
            })?,
        Expr::Call {
            instance,
            method,
            arguments,
            dispatch,
        } => {
            let node = method_reference("call", &method_target(method)?)?.attr("dispatch", dispatch);
            instance_node(node, instance.as_deref())?.child(arguments_node(arguments)?)
        }
        Expr::New {
            constructor,
            arguments,
        } => method_reference("new", &method_target(constructor)?)?
            .child(arguments_node(arguments)?),
        Expr::LoadField { instance, field } => {
            let field = field_target(field)?;
            instance_node(field_reference("load", &field)?, instance.as_deref())?
        }
        Expr::StoreField {
            instance,
            field,
            value,
        } => {
            let field = field_target(field)?;
            instance_node(field_reference("store", &field)?, instance.as_deref())?
                .child(XmlNode::new("value-of").child(expr_node(value)?))
        }
        Expr::Binary { op, left, right } => XmlNode::new("binary")
            .attr("op", op)
            .child(expr_node(left)?)
            .child(expr_node(right)?),
        Expr::Condition {
            condition,
            then,
            otherwise,
        } => XmlNode::new("condition")
            .child(expr_node(condition)?)
            .child(expr_node(then)?)
            .child(expr_node(otherwise)?),
    };
    Ok(node)
}

fn field_reference(element: &str, field: &FieldRc) -> Result<XmlNode> {
    let owner = field
        .declaring_type()
        .ok_or_else(|| persistence(format!("Field '{}' lost its declaring type", field.name)))?;
    Ok(XmlNode::new(element)
        .attr("declaring", owner.fullname())
        .attr("name", &field.name))
}

fn attribute_node(attribute: &CustomAttribute) -> Result<XmlNode> {
    let mut node = method_reference("attribute", &attribute.constructor)?;
    for argument in &attribute.arguments {
        node = node.child(XmlNode::new("positional").child(value_node(argument)?));
    }
    for (name, value) in &attribute.named_arguments {
        node = node.child(XmlNode::new("named").attr("name", name).child(value_node(value)?));
    }
    Ok(node)
}

fn attributes_of(node: XmlNode, attributes: &boxcar::Vec<CustomAttribute>) -> Result<XmlNode> {
    attributes
        .iter()
        .try_fold(node, |node, (_, attribute)| Ok(node.child(attribute_node(attribute)?)))
}

fn method_node(element: &str, method: &MethodRc) -> Result<XmlNode> {
    let mut node = XmlNode::new(element)
        .attr("name", &method.name)
        .attr("flags", method.flags.bits())
        .attr("returns", signature_text(&method.signature.return_type)?);
    for parameter in &method.signature.parameters {
        node = node.child(
            XmlNode::new("param")
                .attr("name", &parameter.name)
                .attr("type", signature_text(&parameter.ty)?),
        );
    }
    node = attributes_of(node, &method.custom_attributes)?;
    if let Some(body) = method.body() {
        node = node.child(XmlNode::new("body").child(expr_node(body)?));
    }
    Ok(node)
}

fn accessor_reference(element: &str, method: &MethodRc) -> Result<XmlNode> {
    Ok(XmlNode::new(element)
        .attr("name", &method.name)
        .attr("params", parameter_list(&method.signature)?))
}

fn type_node(ty: &TypeRc) -> Result<XmlNode> {
    let mut node = XmlNode::new("type")
        .attr("namespace", &ty.namespace)
        .attr("name", &ty.name)
        .attr("flags", ty.flags.bits());
    if let Some(declaring) = ty.declaring_type() {
        node = node.attr("declaring", declaring.fullname());
    }
    if let Some(base) = ty.base() {
        node = node.attr("base", signature_text(&TypeSignature::class(&base))?);
    }

    for (_, interface) in ty.interfaces.iter() {
        node = node.child(
            XmlNode::new("interface").attr("type", signature_text(&TypeSignature::class(interface))?),
        );
    }
    node = attributes_of(node, &ty.custom_attributes)?;
    for (_, field) in ty.fields.iter() {
        let field_node = XmlNode::new("field")
            .attr("name", &field.name)
            .attr("type", signature_text(&field.signature)?)
            .attr("flags", field.flags.bits());
        node = node.child(attributes_of(field_node, &field.custom_attributes)?);
    }
    for (_, ctor) in ty.constructors.iter() {
        node = node.child(method_node("constructor", ctor)?);
    }
    if let Some(initializer) = ty.type_initializer() {
        node = node.child(method_node("initializer", &initializer)?);
    }
    for (_, method) in ty.methods.iter() {
        node = node.child(method_node("method", method)?);
    }
    for (_, property) in ty.properties.iter() {
        let mut property_node = XmlNode::new("property")
            .attr("name", &property.name)
            .attr("type", signature_text(&property.signature)?);
        if let Some(getter) = &property.getter {
            property_node = property_node.child(accessor_reference("getter", getter)?);
        }
        if let Some(setter) = &property.setter {
            property_node = property_node.child(accessor_reference("setter", setter)?);
        }
        node = node.child(property_node);
    }
    for (_, event) in ty.events.iter() {
        let mut event_node = XmlNode::new("event")
            .attr("name", &event.name)
            .attr("type", signature_text(&event.event_type)?)
            .child(accessor_reference("add", &event.add_method)?)
            .child(accessor_reference("remove", &event.remove_method)?);
        if let Some(raise) = &event.raise_method {
            event_node = event_node.child(accessor_reference("raise", raise)?);
        }
        node = node.child(event_node);
    }
    for (_, entry) in ty.overrides.iter() {
        node = node.child(
            XmlNode::new("override")
                .child(method_reference("declaration", &entry.declaration)?)
                .child(accessor_reference("implementation", &entry.body)?),
        );
    }
    Ok(node)
}

/// Writes a module document for `types` to `path`
///
/// # Errors
/// Returns [`Error::Persistence`] if a type refers to something that cannot be persisted
/// (instances, descriptor members, dropped members) and [`Error::FileError`] on I/O failure.
pub fn write_module(path: &Path, header: &ModuleHeader, types: &[TypeRc]) -> Result<()> {
    let root = types.iter().try_fold(
        XmlNode::new("module")
            .attr("id", header.id)
            .attr("name", &header.name)
            .attr("configuration", &header.participant_configuration_id),
        |root, ty| Ok::<_, Error>(root.child(type_node(ty)?)),
    )?;
    fs::write(path, to_document(&root)?)?;
    Ok(())
}

/// Reads only the identity of a module document
///
/// # Errors
/// Returns [`Error::Persistence`] for malformed documents and [`Error::FileError`] on I/O
/// failure.
pub fn read_module_header(path: &Path) -> Result<ModuleHeader> {
    let root = parse_document(&fs::read_to_string(path)?)?;
    header_of(&root)
}

fn header_of(root: &XmlNode) -> Result<ModuleHeader> {
    if root.name != "module" {
        return Err(persistence(format!("Unexpected root element <{}>", root.name)));
    }
    let id = root.require("id")?;
    Ok(ModuleHeader {
        id: Guid::try_parse(id)
            .map_err(|e| persistence(format!("Invalid module id '{id}': {e:?}")))?,
        name: root.require("name")?.to_string(),
        participant_configuration_id: root.require("configuration")?.to_string(),
    })
}

/// Re-creates the types of a module document and registers them in `registry`.
///
/// Names are resolved against the module's own types first, then against `registry`; the
/// requested types must therefore be registered before loading.
///
/// # Errors
/// Returns [`Error::Persistence`] for malformed documents or unresolvable references and
/// [`Error::FileError`] on I/O failure.
pub fn read_module(path: &Path, registry: &TypeRegistry) -> Result<LoadedModule> {
    let root = parse_document(&fs::read_to_string(path)?)?;
    let header = header_of(&root)?;
    let mut loader = ModuleLoader {
        registry,
        local: HashMap::new(),
    };

    let mut declared = Vec::new();
    for node in root.children_named("type") {
        declared.push((node, loader.declare(node)?));
    }
    for (node, ty) in &declared {
        loader.define(node, ty)?;
    }
    for (node, ty) in &declared {
        loader.attach_bodies(node, ty)?;
    }

    let types: Vec<TypeRc> = declared.into_iter().map(|(_, ty)| ty).collect();
    for ty in &types {
        ty.mark_complete();
        registry.insert(ty);
    }
    Ok(LoadedModule { header, types })
}

fn parse_flags(node: &XmlNode) -> Result<u32> {
    let text = node.require("flags")?;
    text.parse::<u32>()
        .map_err(|_| persistence(format!("Invalid flags '{text}' on <{}>", node.name)))
}

fn parse_attr<T: std::str::FromStr>(node: &XmlNode, key: &str) -> Result<T> {
    let text = node.require(key)?;
    text.parse::<T>()
        .map_err(|_| persistence(format!("Invalid value '{text}' for '{key}' on <{}>", node.name)))
}

struct ModuleLoader<'a> {
    registry: &'a TypeRegistry,
    local: HashMap<String, TypeRc>,
}

impl ModuleLoader<'_> {
    fn resolve_type(&self, fullname: &str) -> Result<TypeRc> {
        if let Some(ty) = self.local.get(fullname) {
            return Ok(ty.clone());
        }
        self.registry
            .get_by_fullname_first(fullname)
            .map_err(|_| persistence(format!("Unknown type '{fullname}'")))
    }

    fn parse_signature(&self, text: &str) -> Result<TypeSignature> {
        Ok(match text {
            "void" => TypeSignature::Void,
            "bool" => TypeSignature::Boolean,
            "int32" => TypeSignature::I4,
            "int64" => TypeSignature::I8,
            "float64" => TypeSignature::R8,
            "string" => TypeSignature::String,
            "object" => TypeSignature::Object,
            other => match other.strip_prefix("class:") {
                Some(fullname) => TypeSignature::class(&self.resolve_type(fullname)?),
                None => return Err(persistence(format!("Unknown signature '{other}'"))),
            },
        })
    }

    fn parse_parameter_types(&self, text: &str) -> Result<Vec<TypeSignature>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        text.split(';')
            .map(|part| self.parse_signature(part))
            .collect()
    }

    fn method_signature(&self, node: &XmlNode) -> Result<MethodSignature> {
        let parameters = node
            .children_named("param")
            .map(|param| {
                Ok(ParameterDeclaration::new(
                    param.require("name")?,
                    self.parse_signature(param.require("type")?)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MethodSignature::with_parameters(
            self.parse_signature(node.require("returns")?)?,
            parameters,
        ))
    }

    fn find_method_on(&self, ty: &TypeRc, node: &XmlNode) -> Result<MethodRc> {
        let name = node.require("name")?;
        let parameters = MethodSignature::new(
            TypeSignature::Void,
            self.parse_parameter_types(node.require("params")?)?,
        );

        let found = match name {
            ".ctor" => ty
                .constructor_list()
                .into_iter()
                .find(|ctor| ctor.signature.has_parameter_types(&parameters)),
            ".cctor" => ty.type_initializer(),
            _ => ty
                .method_list()
                .into_iter()
                .find(|method| method.name == name && method.signature.has_parameter_types(&parameters)),
        };
        found.ok_or_else(|| {
            persistence(format!("Unknown method '{}::{}'", ty.fullname(), name))
        })
    }

    fn resolve_method(&self, node: &XmlNode) -> Result<MethodRc> {
        let owner = self.resolve_type(node.require("declaring")?)?;
        self.find_method_on(&owner, node)
    }

    fn resolve_field(&self, node: &XmlNode) -> Result<FieldRc> {
        let owner = self.resolve_type(node.require("declaring")?)?;
        let name = node.require("name")?;
        owner
            .fields
            .iter()
            .find(|(_, field)| field.name == name)
            .map(|(_, field)| field.clone())
            .ok_or_else(|| persistence(format!("Unknown field '{}::{}'", owner.fullname(), name)))
    }

    fn parse_id_part(&self, node: &XmlNode) -> Result<Option<IdPart>> {
        Ok(match node.require("kind")? {
            "none" => None,
            "bool" => Some(IdPart::Bool(parse_attr(node, "value")?)),
            "int" => Some(IdPart::Int(parse_attr(node, "value")?)),
            "str" => Some(IdPart::from(node.require("value")?)),
            "list" => {
                let items = node
                    .children_named("part")
                    .map(|item| {
                        self.parse_id_part(item)?
                            .ok_or_else(|| persistence("List parts cannot be empty"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Some(IdPart::List(items))
            }
            other => return Err(persistence(format!("Unknown identifier part kind '{other}'"))),
        })
    }

    fn parse_value(&self, node: &XmlNode) -> Result<Value> {
        Ok(match node.require("kind")? {
            "void" => Value::Void,
            "null" => Value::Null,
            "bool" => Value::Boolean(parse_attr(node, "value")?),
            "int32" => Value::I4(parse_attr(node, "value")?),
            "int64" => Value::I8(parse_attr(node, "value")?),
            "float64" => Value::R8(parse_attr(node, "value")?),
            "string" => Value::String(Arc::from(node.require("value")?)),
            "type" => Value::Type(self.resolve_type(node.require("type")?)?),
            "identifier" => {
                let requested = self.resolve_type(node.require("requested")?)?;
                let parts = node
                    .children_named("part")
                    .map(|part| self.parse_id_part(part))
                    .collect::<Result<Vec<_>>>()?;
                Value::Identifier(Arc::new(AssembledTypeId::new(&requested, parts)))
            }
            other => return Err(persistence(format!("Unknown value kind '{other}'"))),
        })
    }

    fn parse_instance(&self, node: &XmlNode) -> Result<Option<Box<Expr>>> {
        node.first_child("instance")
            .map(|instance| Ok(Box::new(self.parse_single(instance)?)))
            .transpose()
    }

    fn parse_arguments(&self, node: &XmlNode) -> Result<Vec<Expr>> {
        match node.first_child("arguments") {
            Some(arguments) => arguments
                .children
                .iter()
                .map(|argument| self.parse_expr(argument))
                .collect(),
            None => Ok(Vec::new()),
        }
    }

    /// The only expression child of a wrapper element
    fn parse_single(&self, node: &XmlNode) -> Result<Expr> {
        match node.children.as_slice() {
            [expr] => self.parse_expr(expr),
            _ => Err(persistence(format!(
                "<{}> must contain exactly one expression",
                node.name
            ))),
        }
    }

    fn parse_operands<const N: usize>(&self, node: &XmlNode) -> Result<[Box<Expr>; N]> {
        let operands = node
            .children
            .iter()
            .map(|child| Ok(Box::new(self.parse_expr(child)?)))
            .collect::<Result<Vec<_>>>()?;
        operands.try_into().map_err(|_| {
            persistence(format!("<{}> must contain exactly {} operands", node.name, N))
        })
    }

    fn parse_expr(&self, node: &XmlNode) -> Result<Expr> {
        Ok(match node.name.as_str() {
            "constant" => Expr::Constant(self.parse_value(node.require_child("value")?)?),
            "this" => Expr::This,
            "argument" => Expr::Argument(parse_attr(node, "index")?),
            "block" => Expr::Block(
                node.children
                    .iter()
                    .map(|item| self.parse_expr(item))
                    .collect::<Result<Vec<_>>>()?,
            ),
            "call" => Expr::Call {
                instance: self.parse_instance(node)?,
                method: MethodTarget::Runtime(MethodRef::new(&self.resolve_method(node)?)),
                arguments: self.parse_arguments(node)?,
                dispatch: parse_attr::<Dispatch>(node, "dispatch")?,
            },
            "new" => Expr::New {
                constructor: MethodTarget::Runtime(MethodRef::new(&self.resolve_method(node)?)),
                arguments: self.parse_arguments(node)?,
            },
            "load" => Expr::LoadField {
                instance: self.parse_instance(node)?,
                field: FieldTarget::Runtime(FieldRef::new(&self.resolve_field(node)?)),
            },
            "store" => Expr::StoreField {
                instance: self.parse_instance(node)?,
                field: FieldTarget::Runtime(FieldRef::new(&self.resolve_field(node)?)),
                value: Box::new(self.parse_single(node.require_child("value-of")?)?),
            },
            "binary" => {
                let [left, right] = self.parse_operands::<2>(node)?;
                Expr::Binary {
                    op: parse_attr(node, "op")?,
                    left,
                    right,
                }
            }
            "condition" => {
                let [condition, then, otherwise] = self.parse_operands::<3>(node)?;
                Expr::Condition {
                    condition,
                    then,
                    otherwise,
                }
            }
            other => return Err(persistence(format!("Unknown expression <{other}>"))),
        })
    }

    fn parse_attribute(&self, node: &XmlNode) -> Result<CustomAttribute> {
        let arguments = node
            .children_named("positional")
            .map(|argument| self.parse_value(argument.require_child("value")?))
            .collect::<Result<Vec<_>>>()?;
        let named_arguments = node
            .children_named("named")
            .map(|argument| {
                Ok((
                    argument.require("name")?.to_string(),
                    self.parse_value(argument.require_child("value")?)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CustomAttribute {
            constructor: self.resolve_method(node)?,
            arguments,
            named_arguments,
        })
    }

    fn declare(&mut self, node: &XmlNode) -> Result<TypeRc> {
        let ty = Arc::new(RuntimeType::new(
            self.registry.next_token(TokenKind::Type),
            node.require("namespace")?,
            node.require("name")?,
            TypeAttributes::from_bits_retain(parse_flags(node)?),
            TypeOrigin::Loaded,
        ));
        if let Some(declaring) = node.get("declaring") {
            let outer = self.resolve_type(declaring)?;
            ty.set_declaring_type(&outer)?;
            outer.nested_types.push(TypeRef::new(&ty));
        }
        self.local.insert(ty.fullname(), ty.clone());
        Ok(ty)
    }

    fn new_method(&self, ty: &TypeRc, node: &XmlNode, kind: MethodKind) -> Result<MethodRc> {
        Ok(Arc::new(RuntimeMethod::new(
            self.registry.next_token(TokenKind::Method),
            node.require("name")?,
            ty,
            kind,
            MethodAttributes::from_bits_retain(parse_flags(node)?),
            self.method_signature(node)?,
        )))
    }

    fn define(&self, node: &XmlNode, ty: &TypeRc) -> Result<()> {
        if let Some(base) = node.get("base") {
            match self.parse_signature(base)?.runtime_type() {
                Some(base) => ty.set_base(base)?,
                None => return Err(persistence(format!("Invalid base '{base}'"))),
            }
        }
        for interface in node.children_named("interface") {
            match self.parse_signature(interface.require("type")?)?.runtime_type() {
                Some(interface) => {
                    ty.interfaces.push(interface);
                }
                None => return Err(persistence("Invalid interface reference")),
            }
        }

        for field in node.children_named("field") {
            ty.fields.push(Arc::new(RuntimeField::new(
                self.registry.next_token(TokenKind::Field),
                field.require("name")?,
                ty,
                self.parse_signature(field.require("type")?)?,
                FieldAttributes::from_bits_retain(parse_flags(field)?),
            )));
        }
        for ctor in node.children_named("constructor") {
            ty.constructors
                .push(self.new_method(ty, ctor, MethodKind::Constructor)?);
        }
        if let Some(initializer) = node.first_child("initializer") {
            ty.set_type_initializer(self.new_method(ty, initializer, MethodKind::TypeInitializer)?)?;
        }
        for method in node.children_named("method") {
            ty.methods.push(self.new_method(ty, method, MethodKind::Method)?);
        }

        for property in node.children_named("property") {
            let getter = property
                .first_child("getter")
                .map(|getter| self.find_method_on(ty, getter))
                .transpose()?;
            let setter = property
                .first_child("setter")
                .map(|setter| self.find_method_on(ty, setter))
                .transpose()?;
            ty.properties.push(Arc::new(RuntimeProperty::new(
                self.registry.next_token(TokenKind::Property),
                property.require("name")?,
                ty,
                self.parse_signature(property.require("type")?)?,
                PropertyAttributes::empty(),
                getter,
                setter,
            )));
        }
        for event in node.children_named("event") {
            let raise = event
                .first_child("raise")
                .map(|raise| self.find_method_on(ty, raise))
                .transpose()?;
            ty.events.push(Arc::new(RuntimeEvent::new(
                self.registry.next_token(TokenKind::Event),
                event.require("name")?,
                ty,
                self.parse_signature(event.require("type")?)?,
                EventAttributes::empty(),
                self.find_method_on(ty, event.require_child("add")?)?,
                self.find_method_on(ty, event.require_child("remove")?)?,
                raise,
            )));
        }
        Ok(())
    }

    fn attach_method(&self, method: &MethodRc, node: &XmlNode) -> Result<()> {
        for attribute in node.children_named("attribute") {
            method.custom_attributes.push(self.parse_attribute(attribute)?);
        }
        if let Some(body) = node.first_child("body") {
            method.set_body(self.parse_single(body)?)?;
        }
        Ok(())
    }

    fn attach_bodies(&self, node: &XmlNode, ty: &TypeRc) -> Result<()> {
        for attribute in node.children_named("attribute") {
            ty.custom_attributes.push(self.parse_attribute(attribute)?);
        }
        for (field_node, (_, field)) in node.children_named("field").zip(ty.fields.iter()) {
            for attribute in field_node.children_named("attribute") {
                field.custom_attributes.push(self.parse_attribute(attribute)?);
            }
        }

        for (ctor_node, ctor) in node.children_named("constructor").zip(ty.constructor_list()) {
            self.attach_method(&ctor, ctor_node)?;
        }
        if let (Some(initializer_node), Some(initializer)) =
            (node.first_child("initializer"), ty.type_initializer())
        {
            self.attach_method(&initializer, initializer_node)?;
        }
        for (method_node, method) in node.children_named("method").zip(ty.method_list()) {
            self.attach_method(&method, method_node)?;
        }

        for entry in node.children_named("override") {
            ty.overrides.push(MethodOverride {
                declaration: self.resolve_method(entry.require_child("declaration")?)?,
                body: self.find_method_on(ty, entry.require_child("implementation")?)?,
            });
        }
        Ok(())
    }
}
