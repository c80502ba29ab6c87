//! Module descriptions in YAML or JSON.
//!
//! A description lists statements as externally tagged nodes, for example
//!
//! ```yaml
//! statements:
//!   - let: { name: x, type: Int, init: { int: 1 } }
//!   - op: { name: "+", args: [{ read: x }, { int: 2 }] }
//!     at: 2+0-5
//! ```
//!
//! and is lowered through [`TreeBuilder`] so that names are resolved the same
//! way as in hand-built trees.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::builder::{ClassBuilder, Signature, TreeBuilder};
use crate::error::{FixtureError, TreeError};
use crate::options::TyperOptions;
use crate::table::Visibility;
use crate::tree::{CheckPosition, Module, NodeId};

/// A module plus the options it asks to be typed with.
#[derive(Debug)]
pub struct Fixture {
    pub module: Module,
    pub options: TyperOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleDescription {
    #[serde(default)]
    pub options: TyperOptions,
    /// Names declared before any statement, so earlier statements can use them.
    #[serde(default)]
    pub hoist: Vec<String>,
    #[serde(default)]
    pub statements: Vec<NodeDescription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeDescription {
    /// Rendered position, like `3+8-9`.
    #[serde(default)]
    pub at: Option<String>,
    #[serde(flatten)]
    pub node: NodeSpec,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeSpec {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    /// Spelled `null-literal` since a bare `null` key reads as YAML null.
    #[serde(rename = "null-literal")]
    Null(Option<()>),
    Void(Option<()>),
    Read(String),
    Let(DeclSpec),
    Var(DeclSpec),
    Temp(DeclSpec),
    Assign(AssignSpec),
    Call(CallSpec),
    Op(OpSpec),
    Member(MemberAccessSpec),
    MethodCall(MethodCallSpec),
    New(NewSpec),
    Is(TypeTestSpec),
    As(TypeTestSpec),
    Orelse(OrelseSpec),
    Block(Vec<NodeDescription>),
    If(IfSpec),
    While(LoopSpec),
    DoWhile(LoopSpec),
    Break(Option<String>),
    Continue(Option<String>),
    Return(Option<Box<NodeDescription>>),
    Fn(FunSpec),
    Class(ClassSpec),
    Interface(ClassSpec),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeclSpec {
    pub name: String,
    #[serde(default, rename = "type")]
    pub ty: Option<String>,
    #[serde(default)]
    pub init: Option<Box<NodeDescription>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignSpec {
    pub name: String,
    pub value: Box<NodeDescription>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CallSpec {
    pub callee: Box<NodeDescription>,
    #[serde(default)]
    pub type_args: Vec<String>,
    #[serde(default)]
    pub args: Vec<NodeDescription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpSpec {
    pub name: String,
    #[serde(default)]
    pub args: Vec<NodeDescription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberAccessSpec {
    pub receiver: Box<NodeDescription>,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MethodCallSpec {
    pub receiver: Box<NodeDescription>,
    pub name: String,
    #[serde(default)]
    pub args: Vec<NodeDescription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSpec {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub args: Vec<NodeDescription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypeTestSpec {
    pub value: Box<NodeDescription>,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrelseSpec {
    pub body: Box<NodeDescription>,
    pub fallback: Box<NodeDescription>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IfSpec {
    pub cond: Box<NodeDescription>,
    #[serde(default)]
    pub then: Vec<NodeDescription>,
    #[serde(default, rename = "else")]
    pub otherwise: Option<Vec<NodeDescription>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoopSpec {
    #[serde(default)]
    pub label: Option<String>,
    pub cond: Box<NodeDescription>,
    #[serde(default)]
    pub body: Vec<NodeDescription>,
    #[serde(default)]
    pub increment: Option<Box<NodeDescription>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormalSpec {
    pub name: String,
    #[serde(default)]
    pub bounds: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(default, rename = "type")]
    pub ty: Option<String>,
}

/// A function literal. With a `name` it is also declared, as in
/// `let f(x: Int): Int { .. }`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FunSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub type_formals: Vec<FormalSpec>,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default)]
    pub throws_bubble: bool,
    #[serde(default)]
    pub body: Vec<NodeDescription>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClassSpec {
    pub name: String,
    #[serde(default)]
    pub type_formals: Vec<FormalSpec>,
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub members: Vec<MemberSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PropertySpec {
    pub name: String,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default, rename = "type")]
    pub ty: Option<String>,
    #[serde(default)]
    pub init: Option<Box<NodeDescription>>,
    /// Filled from the arguments of `new` when the class has no constructor.
    #[serde(default)]
    pub constructor: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemberSpec {
    Property(PropertySpec),
    Static(PropertySpec),
    Method(FunSpec),
    Getter(FunSpec),
    Constructor(FunSpec),
    Abstract(FunSpec),
}

pub fn load_yaml(text: &str, path: impl Into<PathBuf>) -> Result<Fixture, FixtureError> {
    let description: ModuleDescription = serde_yaml::from_str(text)?;
    Ok(description.build(path)?)
}

pub fn load_json(text: &str, path: impl Into<PathBuf>) -> Result<Fixture, FixtureError> {
    let description: ModuleDescription = serde_json::from_str(text)?;
    Ok(description.build(path)?)
}

/// Reads a description from disk. Files ending in `.json` are read as JSON,
/// anything else as YAML.
pub fn load_path(path: &Path) -> Result<Fixture, FixtureError> {
    let text = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));
    tracing::debug!(path = %path.display(), is_json, "loading module description");
    if is_json {
        load_json(&text, path)
    } else {
        load_yaml(&text, path)
    }
}

impl ModuleDescription {
    pub fn build(&self, path: impl Into<PathBuf>) -> Result<Fixture, TreeError> {
        let builder = TreeBuilder::with_output_name(path, self.options.output_name.as_deref());
        let hoisted: Vec<&str> = self.hoist.iter().map(String::as_str).collect();
        builder.hoist(&hoisted);
        let lowering = Lowering::default();
        let statements = lowering.nodes(&builder, &self.statements);
        if let Some(error) = lowering.error.into_inner() {
            return Err(error);
        }
        let module = builder.finish(statements)?;
        Ok(Fixture {
            module,
            options: self.options.clone(),
        })
    }
}

fn visibility(text: Option<&str>) -> Result<Visibility, TreeError> {
    match text.unwrap_or("public") {
        "public" => Ok(Visibility::Public),
        "private" => Ok(Visibility::Private),
        other => Err(TreeError::UnknownVisibility(other.to_string())),
    }
}

fn signature(spec: &FunSpec) -> Signature {
    let mut signature = Signature::new();
    for formal in &spec.type_formals {
        let bounds: Vec<&str> = formal.bounds.iter().map(String::as_str).collect();
        signature = signature.type_formal(&formal.name, &bounds);
    }
    for param in &spec.params {
        signature = match &param.ty {
            Some(ty) => signature.param(&param.name, ty),
            None => signature.untyped_param(&param.name),
        };
    }
    if let Some(ty) = &spec.returns {
        signature = signature.returns(ty);
    }
    if spec.throws_bubble {
        signature = signature.throws_bubble();
    }
    signature
}

/// Lowers descriptions, keeping the first problem found. Builder callbacks
/// cannot return errors, so lowering carries on with placeholders.
#[derive(Default)]
struct Lowering {
    error: RefCell<Option<TreeError>>,
}

impl Lowering {
    fn nodes(&self, b: &TreeBuilder, descriptions: &[NodeDescription]) -> Vec<NodeId> {
        descriptions.iter().map(|d| self.node(b, d)).collect()
    }

    fn boxed(&self, b: &TreeBuilder, description: &Option<Box<NodeDescription>>) -> Option<NodeId> {
        description.as_deref().map(|d| self.node(b, d))
    }

    fn node(&self, b: &TreeBuilder, description: &NodeDescription) -> NodeId {
        let id = self.lower(b, &description.node);
        match &description.at {
            Some(at) => b.place(id, at),
            None => id,
        }
    }

    fn lower(&self, b: &TreeBuilder, spec: &NodeSpec) -> NodeId {
        match spec {
            NodeSpec::Int(value) => b.int(*value),
            NodeSpec::Float(value) => b.float(*value),
            NodeSpec::String(value) => b.string(value),
            NodeSpec::Bool(value) => b.boolean(*value),
            NodeSpec::Null(_) => b.null(),
            NodeSpec::Void(_) => b.void(),
            NodeSpec::Read(name) => b.read(name),
            NodeSpec::Let(decl) => {
                let init = self.boxed(b, &decl.init);
                b.let_decl(&decl.name, decl.ty.as_deref(), init)
            }
            NodeSpec::Var(decl) => {
                let init = self.boxed(b, &decl.init);
                b.var_decl(&decl.name, decl.ty.as_deref(), init)
            }
            NodeSpec::Temp(decl) => {
                let init = self.boxed(b, &decl.init);
                b.temp_decl(&decl.name, init)
            }
            NodeSpec::Assign(assign) => {
                let value = self.node(b, &assign.value);
                b.assign(&assign.name, value)
            }
            NodeSpec::Call(call) => {
                let callee = self.node(b, &call.callee);
                let args = self.nodes(b, &call.args);
                let type_args: Vec<&str> = call.type_args.iter().map(String::as_str).collect();
                b.call_generic(callee, &type_args, args)
            }
            NodeSpec::Op(op) => {
                let callee = b.read(&op.name);
                let args = self.nodes(b, &op.args);
                b.call(callee, args)
            }
            NodeSpec::Member(access) => {
                let receiver = self.node(b, &access.receiver);
                b.member(receiver, &access.name)
            }
            NodeSpec::MethodCall(call) => {
                let receiver = self.node(b, &call.receiver);
                let args = self.nodes(b, &call.args);
                b.method_call(receiver, &call.name, args)
            }
            NodeSpec::New(new) => {
                let args = self.nodes(b, &new.args);
                b.new_instance(&new.ty, args)
            }
            NodeSpec::Is(test) => {
                let value = self.node(b, &test.value);
                b.is_check(value, &test.ty)
            }
            NodeSpec::As(test) => {
                let value = self.node(b, &test.value);
                b.as_cast(value, &test.ty)
            }
            NodeSpec::Orelse(orelse) => {
                let body = self.node(b, &orelse.body);
                let fallback = self.node(b, &orelse.fallback);
                b.orelse(body, fallback)
            }
            NodeSpec::Block(statements) => b.block(|b| self.nodes(b, statements)),
            NodeSpec::If(spec) => {
                let condition = self.node(b, &spec.cond);
                match &spec.otherwise {
                    Some(otherwise) => b.if_else(
                        condition,
                        |b| self.nodes(b, &spec.then),
                        |b| self.nodes(b, otherwise),
                    ),
                    None => b.if_then(condition, |b| self.nodes(b, &spec.then)),
                }
            }
            NodeSpec::While(spec) => self.lower_loop(b, spec, CheckPosition::Before),
            NodeSpec::DoWhile(spec) => self.lower_loop(b, spec, CheckPosition::After),
            NodeSpec::Break(label) => b.break_(label.as_deref()),
            NodeSpec::Continue(label) => b.continue_(label.as_deref()),
            NodeSpec::Return(value) => {
                let value = self.boxed(b, value);
                b.return_(value)
            }
            NodeSpec::Fn(spec) => {
                let body = |b: &TreeBuilder| self.nodes(b, &spec.body);
                match &spec.name {
                    Some(name) => b.fun_decl(name, signature(spec), body),
                    None => b.fun(signature(spec), body),
                }
            }
            NodeSpec::Class(spec) => b.class_decl(&spec.name, |c| self.members(c, spec)),
            NodeSpec::Interface(spec) => b.interface_decl(&spec.name, |c| self.members(c, spec)),
        }
    }

    fn lower_loop(&self, b: &TreeBuilder, spec: &LoopSpec, check: CheckPosition) -> NodeId {
        let condition = self.node(b, &spec.cond);
        let increment = self.boxed(b, &spec.increment);
        b.loop_with(
            spec.label.as_deref(),
            check,
            condition,
            |b| self.nodes(b, &spec.body),
            increment,
        )
    }

    fn members(&self, c: &ClassBuilder<'_>, spec: &ClassSpec) {
        for formal in &spec.type_formals {
            let bounds: Vec<&str> = formal.bounds.iter().map(String::as_str).collect();
            c.type_formal(&formal.name, &bounds);
        }
        for supertype in &spec.extends {
            c.extends(supertype);
        }
        for member in &spec.members {
            if let Err(error) = self.member(c, member) {
                self.error.borrow_mut().get_or_insert(error);
            }
        }
    }

    fn member(&self, c: &ClassBuilder<'_>, member: &MemberSpec) -> Result<NodeId, TreeError> {
        let b = c.builder();
        Ok(match member {
            MemberSpec::Property(property) if property.constructor => {
                let ty = property.ty.as_deref().unwrap_or("AnyValue");
                c.constructor_property(&property.name, visibility(property.visibility.as_deref())?, ty)
            }
            MemberSpec::Property(property) => {
                let init = self.boxed(b, &property.init);
                c.property(
                    &property.name,
                    visibility(property.visibility.as_deref())?,
                    property.ty.as_deref(),
                    init,
                )
            }
            MemberSpec::Static(property) => {
                let init = self.boxed(b, &property.init);
                c.static_property(
                    &property.name,
                    visibility(property.visibility.as_deref())?,
                    property.ty.as_deref(),
                    init,
                )
            }
            MemberSpec::Method(spec) => c.method(
                spec.name.as_deref().unwrap_or_default(),
                visibility(spec.visibility.as_deref())?,
                signature(spec),
                |b| self.nodes(b, &spec.body),
            ),
            MemberSpec::Getter(spec) => c.getter(
                spec.name.as_deref().unwrap_or_default(),
                visibility(spec.visibility.as_deref())?,
                spec.returns.as_deref().unwrap_or("AnyValue"),
                |b| self.nodes(b, &spec.body),
            ),
            MemberSpec::Constructor(spec) => c.constructor(
                visibility(spec.visibility.as_deref())?,
                signature(spec),
                |b| self.nodes(b, &spec.body),
            ),
            MemberSpec::Abstract(spec) => c.abstract_method(
                spec.name.as_deref().unwrap_or_default(),
                visibility(spec.visibility.as_deref())?,
                signature(spec),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_visibility_is_rejected() {
        let text = r#"
statements:
  - class:
      name: C
      members:
        - property: { name: x, type: Int, visibility: protected }
"#;
        let error = load_yaml(text, "test.temper").unwrap_err();
        assert!(matches!(
            error,
            FixtureError::Tree(TreeError::UnknownVisibility(ref v)) if v == "protected"
        ));
    }

    #[test]
    fn output_name_can_be_disabled() {
        let text = r#"
options:
  output-name: ~
statements:
  - int: 1
"#;
        let fixture = load_yaml(text, "test.temper").unwrap();
        assert!(fixture.module.output_name.is_none());
        assert!(fixture.options.output_name.is_none());
    }
}
