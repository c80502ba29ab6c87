use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::builtins::find_builtin;
use crate::error::TreeError;
use crate::names::{NameKind, NameTable, ResolvedName};
use crate::source::{Position, SourceFile, SourceId};
use crate::table::{
    MemberKind, MemberRef, MemberShape, MethodKind, ShapeKind, TypeTable, Visibility,
};
use crate::tree::{
    Call, CheckPosition, ClassDecl, Decl, Fun, Literal, Loop, Module, NodeId, NodeKind, Tree,
    TypeFormalDecl,
};
use crate::type_expr::{TypeExpr, TypeExprKind};
use crate::types::ShapeId;

pub const DEFAULT_OUTPUT_NAME: &str = "return__0";

/// The parts of a function literal other than its body.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    type_formals: Vec<(String, Vec<String>)>,
    params: Vec<(String, Option<String>)>,
    return_type: Option<String>,
    throws_bubble: bool,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn type_formal(mut self, name: &str, bounds: &[&str]) -> Self {
        self.type_formals.push((
            name.to_string(),
            bounds.iter().map(|bound| bound.to_string()).collect(),
        ));
        self
    }

    pub fn param(mut self, name: &str, ty: &str) -> Self {
        self.params.push((name.to_string(), Some(ty.to_string())));
        self
    }

    pub fn untyped_param(mut self, name: &str) -> Self {
        self.params.push((name.to_string(), None));
        self
    }

    pub fn returns(mut self, ty: &str) -> Self {
        self.return_type = Some(ty.to_string());
        self
    }

    pub fn throws_bubble(mut self) -> Self {
        self.throws_bubble = true;
        self
    }

    pub fn is_fully_typed(&self) -> bool {
        self.return_type.is_some() && self.params.iter().all(|(_, ty)| ty.is_some())
    }
}

#[derive(Default)]
struct Scope {
    names: HashMap<String, ResolvedName>,
    hoisted: HashSet<String>,
}

struct BuilderState {
    tree: Tree,
    names: NameTable,
    types: TypeTable,
    source: SourceFile,
    scopes: Vec<Scope>,
    return_names: Vec<ResolvedName>,
    loops: Vec<Option<String>>,
    builtin_names: HashMap<String, ResolvedName>,
    unresolved: HashMap<String, ResolvedName>,
    output_name: Option<ResolvedName>,
    errors: Vec<TreeError>,
}

/// Assembles a [`Module`] while resolving names the way the disambiguation
/// stage would. Every method takes `&self` so that calls can nest.
pub struct TreeBuilder {
    state: RefCell<BuilderState>,
}

impl TreeBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_output_name(path, Some(DEFAULT_OUTPUT_NAME))
    }

    pub fn with_output_name(path: impl Into<PathBuf>, output: Option<&str>) -> Self {
        let mut names = NameTable::new();
        let mut root = Scope::default();
        let output_name = output.map(|text| {
            let name = names.fresh(text, NameKind::Return);
            root.names.insert(text.to_string(), name);
            name
        });
        Self {
            state: RefCell::new(BuilderState {
                tree: Tree::new(),
                names,
                types: TypeTable::new(),
                source: SourceFile::new(SourceId(0), path.into()),
                scopes: vec![root],
                return_names: Vec::new(),
                loops: Vec::new(),
                builtin_names: HashMap::new(),
                unresolved: HashMap::new(),
                output_name,
                errors: Vec::new(),
            }),
        }
    }

    /// Builds a whole module from the statements returned by `body`.
    pub fn build(
        path: impl Into<PathBuf>,
        body: impl FnOnce(&TreeBuilder) -> Vec<NodeId>,
    ) -> Result<Module, TreeError> {
        let builder = Self::new(path);
        let statements = body(&builder);
        builder.finish(statements)
    }

    pub fn finish(self, statements: Vec<NodeId>) -> Result<Module, TreeError> {
        let root = self.add(NodeKind::Block { statements });
        let mut state = self.state.into_inner();
        if let Some(error) = state.errors.first() {
            return Err(error.clone());
        }
        state.tree.set_root(root)?;
        Ok(Module {
            source: state.source,
            tree: state.tree,
            names: state.names,
            types: state.types,
            output_name: state.output_name,
        })
    }

    pub fn output_name(&self) -> Option<ResolvedName> {
        self.state.borrow().output_name
    }

    fn add(&self, kind: NodeKind) -> NodeId {
        let mut state = self.state.borrow_mut();
        let pos = Position::point(state.source.id, 0, 0);
        match state.tree.add(kind, pos) {
            Ok(id) => id,
            Err(error) => {
                state.errors.push(error);
                state.tree.add_leaf(NodeKind::Value(Literal::Void), pos)
            }
        }
    }

    fn error(&self, error: TreeError) {
        self.state.borrow_mut().errors.push(error);
    }

    fn type_expr(&self, text: &str) -> TypeExpr {
        TypeExpr::parse(text).unwrap_or_else(|error| {
            self.error(error);
            TypeExpr::named(text)
        })
    }

    /// Sets the position of `id` from its rendered form, like `3+8-9`.
    pub fn place(&self, id: NodeId, position: &str) -> NodeId {
        match position.parse::<Position>() {
            Ok(mut pos) => {
                let mut state = self.state.borrow_mut();
                pos.source = state.source.id;
                state.tree.set_pos(id, pos);
            }
            Err(error) => self.error(error),
        }
        id
    }

    fn push_scope(&self) {
        self.state.borrow_mut().scopes.push(Scope::default());
    }

    fn pop_scope(&self) {
        self.state.borrow_mut().scopes.pop();
    }

    fn declare(&self, text: &str, kind: NameKind) -> ResolvedName {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        let Some(scope) = state.scopes.last_mut() else {
            return state.names.fresh(text, kind);
        };
        if scope.hoisted.remove(text) {
            if let Some(name) = scope.names.get(text) {
                return *name;
            }
        }
        if scope.names.contains_key(text) {
            state
                .errors
                .push(TreeError::DuplicateDeclaration(text.to_string()));
        }
        let name = state.names.fresh(text, kind);
        scope.names.insert(text.to_string(), name);
        name
    }

    /// Declares names up front so that earlier code can refer to them.
    pub fn hoist(&self, texts: &[&str]) {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        let Some(scope) = state.scopes.last_mut() else {
            return;
        };
        for text in texts {
            let name = state.names.fresh(*text, NameKind::Source);
            scope.names.insert(text.to_string(), name);
            scope.hoisted.insert(text.to_string());
        }
    }

    fn resolve(&self, text: &str) -> ResolvedName {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        for scope in state.scopes.iter().rev() {
            if let Some(name) = scope.names.get(text) {
                return *name;
            }
        }
        if find_builtin(text).is_some() {
            return *state
                .builtin_names
                .entry(text.to_string())
                .or_insert_with(|| state.names.fresh(text, NameKind::Builtin));
        }
        *state
            .unresolved
            .entry(text.to_string())
            .or_insert_with(|| state.names.fresh(text, NameKind::Unresolved))
    }

    pub fn int(&self, value: i64) -> NodeId {
        self.add(NodeKind::Value(Literal::Int(value)))
    }

    pub fn float(&self, value: f64) -> NodeId {
        self.add(NodeKind::Value(Literal::Float(value)))
    }

    pub fn string(&self, value: &str) -> NodeId {
        self.add(NodeKind::Value(Literal::String(value.to_string())))
    }

    pub fn boolean(&self, value: bool) -> NodeId {
        self.add(NodeKind::Value(Literal::Boolean(value)))
    }

    pub fn null(&self) -> NodeId {
        self.add(NodeKind::Value(Literal::Null))
    }

    pub fn void(&self) -> NodeId {
        self.add(NodeKind::Value(Literal::Void))
    }

    pub fn read(&self, text: &str) -> NodeId {
        let name = self.resolve(text);
        self.add(NodeKind::RightName(name))
    }

    fn decl_with(
        &self,
        name: ResolvedName,
        ty: Option<&str>,
        initializer: Option<NodeId>,
        mutable: bool,
    ) -> NodeId {
        let declared_type = ty.map(|ty| self.type_expr(ty));
        let left = self.add(NodeKind::LeftName(name));
        self.add(NodeKind::Decl(Decl {
            name: left,
            declared_type,
            initializer,
            mutable,
            is_param: false,
            member: None,
        }))
    }

    /// `let text: ty = initializer`
    pub fn let_decl(&self, text: &str, ty: Option<&str>, initializer: Option<NodeId>) -> NodeId {
        let name = self.declare(text, NameKind::Source);
        self.decl_with(name, ty, initializer, false)
    }

    /// `var text: ty = initializer`
    pub fn var_decl(&self, text: &str, ty: Option<&str>, initializer: Option<NodeId>) -> NodeId {
        let name = self.declare(text, NameKind::Source);
        self.decl_with(name, ty, initializer, true)
    }

    /// A compiler-introduced temporary, like the ones produced when an
    /// earlier stage flattens nested expressions.
    pub fn temp_decl(&self, text: &str, initializer: Option<NodeId>) -> NodeId {
        let name = self.declare(text, NameKind::Temporary);
        self.decl_with(name, None, initializer, true)
    }

    pub fn assign(&self, text: &str, value: NodeId) -> NodeId {
        let name = self.resolve(text);
        let target = self.add(NodeKind::LeftName(name));
        self.add(NodeKind::Assign { target, value })
    }

    pub fn call(&self, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        self.add(NodeKind::Call(Call {
            callee,
            type_args: Vec::new(),
            args,
        }))
    }

    pub fn call_generic(&self, callee: NodeId, type_args: &[&str], args: Vec<NodeId>) -> NodeId {
        let type_args = type_args.iter().map(|ty| self.type_expr(ty)).collect();
        self.add(NodeKind::Call(Call {
            callee,
            type_args,
            args,
        }))
    }

    /// Calls a function or operator by name, as in `b.op("+", vec![x, y])`.
    pub fn op(&self, text: &str, args: Vec<NodeId>) -> NodeId {
        let callee = self.read(text);
        self.call(callee, args)
    }

    pub fn member(&self, receiver: NodeId, member: &str) -> NodeId {
        self.add(NodeKind::Member {
            receiver,
            member: member.to_string(),
        })
    }

    pub fn method_call(&self, receiver: NodeId, member: &str, args: Vec<NodeId>) -> NodeId {
        let callee = self.member(receiver, member);
        self.call(callee, args)
    }

    pub fn new_instance(&self, ty: &str, args: Vec<NodeId>) -> NodeId {
        let type_expr = self.type_expr(ty);
        self.add(NodeKind::New { type_expr, args })
    }

    pub fn is_check(&self, value: NodeId, ty: &str) -> NodeId {
        let type_expr = self.type_expr(ty);
        self.add(NodeKind::Is { value, type_expr })
    }

    pub fn as_cast(&self, value: NodeId, ty: &str) -> NodeId {
        let type_expr = self.type_expr(ty);
        self.add(NodeKind::As { value, type_expr })
    }

    pub fn orelse(&self, body: NodeId, fallback: NodeId) -> NodeId {
        self.add(NodeKind::Orelse { body, fallback })
    }

    pub fn block(&self, body: impl FnOnce(&TreeBuilder) -> Vec<NodeId>) -> NodeId {
        self.push_scope();
        let statements = body(self);
        self.pop_scope();
        self.add(NodeKind::Block { statements })
    }

    pub fn if_then(
        &self,
        condition: NodeId,
        consequent: impl FnOnce(&TreeBuilder) -> Vec<NodeId>,
    ) -> NodeId {
        let consequent = self.block(consequent);
        self.add(NodeKind::If {
            condition,
            consequent,
            alternate: None,
        })
    }

    pub fn if_else(
        &self,
        condition: NodeId,
        consequent: impl FnOnce(&TreeBuilder) -> Vec<NodeId>,
        alternate: impl FnOnce(&TreeBuilder) -> Vec<NodeId>,
    ) -> NodeId {
        let consequent = self.block(consequent);
        let alternate = self.block(alternate);
        self.add(NodeKind::If {
            condition,
            consequent,
            alternate: Some(alternate),
        })
    }

    /// `if (condition) { .. } else <alternate>` where the alternate is an
    /// already built statement, usually another `if`.
    pub fn if_else_if(
        &self,
        condition: NodeId,
        consequent: impl FnOnce(&TreeBuilder) -> Vec<NodeId>,
        alternate: NodeId,
    ) -> NodeId {
        let consequent = self.block(consequent);
        self.add(NodeKind::If {
            condition,
            consequent,
            alternate: Some(alternate),
        })
    }

    pub fn while_loop(
        &self,
        condition: NodeId,
        body: impl FnOnce(&TreeBuilder) -> Vec<NodeId>,
    ) -> NodeId {
        self.loop_with(None, CheckPosition::Before, condition, body, None)
    }

    pub fn labeled_while(
        &self,
        label: &str,
        condition: NodeId,
        body: impl FnOnce(&TreeBuilder) -> Vec<NodeId>,
    ) -> NodeId {
        self.loop_with(Some(label), CheckPosition::Before, condition, body, None)
    }

    pub fn do_while(
        &self,
        body: impl FnOnce(&TreeBuilder) -> Vec<NodeId>,
        condition: NodeId,
    ) -> NodeId {
        self.loop_with(None, CheckPosition::After, condition, body, None)
    }

    pub fn loop_with(
        &self,
        label: Option<&str>,
        check: CheckPosition,
        condition: NodeId,
        body: impl FnOnce(&TreeBuilder) -> Vec<NodeId>,
        increment: Option<NodeId>,
    ) -> NodeId {
        self.state
            .borrow_mut()
            .loops
            .push(label.map(str::to_string));
        let body = self.block(body);
        self.state.borrow_mut().loops.pop();
        self.add(NodeKind::Loop(Loop {
            label: label.map(str::to_string),
            condition,
            body,
            increment,
            check,
        }))
    }

    fn check_jump(&self, keyword: &'static str, label: Option<&str>) {
        let problem = {
            let state = self.state.borrow();
            if state.loops.is_empty() {
                Some(TreeError::JumpOutsideLoop { keyword })
            } else {
                label
                    .filter(|label| {
                        !state
                            .loops
                            .iter()
                            .any(|known| known.as_deref() == Some(*label))
                    })
                    .map(|label| TreeError::UnknownLabel(label.to_string()))
            }
        };
        if let Some(problem) = problem {
            self.error(problem);
        }
    }

    pub fn break_(&self, label: Option<&str>) -> NodeId {
        self.check_jump("break", label);
        self.add(NodeKind::Break {
            label: label.map(str::to_string),
        })
    }

    pub fn continue_(&self, label: Option<&str>) -> NodeId {
        self.check_jump("continue", label);
        self.add(NodeKind::Continue {
            label: label.map(str::to_string),
        })
    }

    pub fn return_(&self, value: Option<NodeId>) -> NodeId {
        if self.state.borrow().return_names.is_empty() {
            self.error(TreeError::ReturnOutsideFunction);
        }
        self.add(NodeKind::Return { value })
    }

    /// A function literal.
    pub fn fun(
        &self,
        signature: Signature,
        body: impl FnOnce(&TreeBuilder) -> Vec<NodeId>,
    ) -> NodeId {
        let type_formals = signature
            .type_formals
            .iter()
            .map(|(name, bounds)| {
                let formal = self.state.borrow_mut().types.add_formal(name.clone());
                TypeFormalDecl {
                    formal,
                    bounds: bounds.iter().map(|bound| self.type_expr(bound)).collect(),
                }
            })
            .collect();
        let return_type = signature.return_type.as_deref().map(|ty| self.type_expr(ty));

        let return_name = {
            let mut state = self.state.borrow_mut();
            let text = format!("return__{}", state.names.len());
            let name = state.names.fresh(text, NameKind::Return);
            state.return_names.push(name);
            name
        };
        let outer_loops = std::mem::take(&mut self.state.borrow_mut().loops);
        self.push_scope();

        let params = signature
            .params
            .iter()
            .map(|(text, ty)| {
                let name = self.declare(text, NameKind::Source);
                let declared_type = ty.as_deref().map(|ty| self.type_expr(ty));
                let left = self.add(NodeKind::LeftName(name));
                self.add(NodeKind::Decl(Decl {
                    name: left,
                    declared_type,
                    initializer: None,
                    mutable: false,
                    is_param: true,
                    member: None,
                }))
            })
            .collect();
        let statements = body(self);
        let body = self.add(NodeKind::Block { statements });

        self.pop_scope();
        {
            let mut state = self.state.borrow_mut();
            state.loops = outer_loops;
            state.return_names.pop();
        }

        self.add(NodeKind::Fun(Fun {
            type_formals,
            params,
            return_type,
            throws_bubble: signature.throws_bubble,
            body,
            return_name,
        }))
    }

    /// `let text(..) { .. }`, visible inside its own body.
    pub fn fun_decl(
        &self,
        text: &str,
        signature: Signature,
        body: impl FnOnce(&TreeBuilder) -> Vec<NodeId>,
    ) -> NodeId {
        let name = self.declare(text, NameKind::Source);
        let fun = self.fun(signature, body);
        self.decl_with(name, None, Some(fun), false)
    }

    pub fn class_decl(&self, text: &str, body: impl FnOnce(&ClassBuilder<'_>)) -> NodeId {
        self.shape_decl(text, ShapeKind::Class, body)
    }

    pub fn interface_decl(&self, text: &str, body: impl FnOnce(&ClassBuilder<'_>)) -> NodeId {
        self.shape_decl(text, ShapeKind::Interface, body)
    }

    fn shape_decl(
        &self,
        text: &str,
        kind: ShapeKind,
        body: impl FnOnce(&ClassBuilder<'_>),
    ) -> NodeId {
        let shape = self.state.borrow_mut().types.add_shape(text, kind);
        let name = self.declare(text, NameKind::Source);
        self.push_scope();
        let this_name = self.declare("this", NameKind::Source);

        let class = ClassBuilder {
            builder: self,
            shape,
            parts: RefCell::new(ClassParts::default()),
        };
        body(&class);
        let parts = class.parts.into_inner();
        self.pop_scope();

        self.add(NodeKind::ClassDecl(ClassDecl {
            name,
            shape,
            type_formals: parts.type_formals,
            formal_members: parts.formal_members,
            supertypes: parts.supertypes,
            members: parts.members,
            this_name,
        }))
    }
}

#[derive(Default)]
struct ClassParts {
    type_formals: Vec<TypeFormalDecl>,
    formal_members: Vec<(ResolvedName, MemberRef)>,
    supertypes: Vec<TypeExpr>,
    members: Vec<NodeId>,
}

/// Collects the members of a class or interface declaration.
pub struct ClassBuilder<'b> {
    builder: &'b TreeBuilder,
    shape: ShapeId,
    parts: RefCell<ClassParts>,
}

impl<'b> ClassBuilder<'b> {
    pub fn shape(&self) -> ShapeId {
        self.shape
    }

    /// The enclosing builder, for building member initializers.
    pub fn builder(&self) -> &'b TreeBuilder {
        self.builder
    }

    pub fn type_formal(&self, text: &str, bounds: &[&str]) {
        let bounds = bounds
            .iter()
            .map(|bound| self.builder.type_expr(bound))
            .collect();
        let (formal, member) = {
            let mut state = self.builder.state.borrow_mut();
            let formal = state.types.add_formal(text);
            state.types.shape_mut(self.shape).formals.push(formal.clone());
            let member = state.types.add_member(
                self.shape,
                MemberShape::new(text, MemberKind::TypeParameter, Visibility::Public),
            );
            (formal, member)
        };
        let name = self.builder.declare(text, NameKind::Source);
        let mut parts = self.parts.borrow_mut();
        parts.type_formals.push(TypeFormalDecl { formal, bounds });
        parts.formal_members.push((name, member));
    }

    pub fn extends(&self, ty: &str) {
        let ty = self.builder.type_expr(ty);
        self.parts.borrow_mut().supertypes.push(ty);
    }

    fn member_decl(
        &self,
        shape: MemberShape,
        declared_type: Option<TypeExpr>,
        initializer: Option<NodeId>,
        mutable: bool,
    ) -> (NodeId, MemberRef) {
        let text = shape.name.clone();
        let member = self
            .builder
            .state
            .borrow_mut()
            .types
            .add_member(self.shape, shape);
        let name = self
            .builder
            .state
            .borrow_mut()
            .names
            .fresh(text, NameKind::Source);
        let left = self.builder.add(NodeKind::LeftName(name));
        let decl = self.builder.add(NodeKind::Decl(Decl {
            name: left,
            declared_type,
            initializer,
            mutable,
            is_param: false,
            member: Some(member),
        }));
        self.builder
            .state
            .borrow_mut()
            .types
            .member_mut(member)
            .declaration = Some(decl);
        self.parts.borrow_mut().members.push(decl);
        (decl, member)
    }

    pub fn property(
        &self,
        text: &str,
        visibility: Visibility,
        ty: Option<&str>,
        initializer: Option<NodeId>,
    ) -> NodeId {
        let declared = ty.map(|ty| self.builder.type_expr(ty));
        let shape = MemberShape::new(text, MemberKind::Property, visibility);
        self.member_decl(shape, declared, initializer, false).0
    }

    /// A property declared in the class header, filled by `new`.
    pub fn constructor_property(&self, text: &str, visibility: Visibility, ty: &str) -> NodeId {
        let declared = Some(self.builder.type_expr(ty));
        let shape = MemberShape::new(text, MemberKind::Property, visibility);
        let (decl, member) = self.member_decl(shape, declared, None, false);
        self.builder
            .state
            .borrow_mut()
            .types
            .shape_mut(self.shape)
            .constructor_params
            .push(member.index);
        decl
    }

    pub fn static_property(
        &self,
        text: &str,
        visibility: Visibility,
        ty: Option<&str>,
        initializer: Option<NodeId>,
    ) -> NodeId {
        let declared = ty.map(|ty| self.builder.type_expr(ty));
        let shape = MemberShape::new(text, MemberKind::StaticProperty, visibility);
        self.member_decl(shape, declared, initializer, false).0
    }

    fn method_with(
        &self,
        text: &str,
        kind: MethodKind,
        visibility: Visibility,
        signature: Signature,
        body: impl FnOnce(&TreeBuilder) -> Vec<NodeId>,
    ) -> NodeId {
        let mut shape = MemberShape::new(text, MemberKind::Method(kind), visibility);
        shape.throws_bubble = signature.throws_bubble;
        let fun = self.builder.fun(signature, body);
        self.member_decl(shape, None, Some(fun), false).0
    }

    pub fn method(
        &self,
        text: &str,
        visibility: Visibility,
        signature: Signature,
        body: impl FnOnce(&TreeBuilder) -> Vec<NodeId>,
    ) -> NodeId {
        self.method_with(text, MethodKind::Normal, visibility, signature, body)
    }

    pub fn getter(
        &self,
        text: &str,
        visibility: Visibility,
        ty: &str,
        body: impl FnOnce(&TreeBuilder) -> Vec<NodeId>,
    ) -> NodeId {
        let signature = Signature::new().returns(ty);
        self.method_with(text, MethodKind::Getter, visibility, signature, body)
    }

    pub fn constructor(
        &self,
        visibility: Visibility,
        signature: Signature,
        body: impl FnOnce(&TreeBuilder) -> Vec<NodeId>,
    ) -> NodeId {
        let signature = Signature {
            return_type: Some("Void".to_string()),
            ..signature
        };
        self.method_with("constructor", MethodKind::Constructor, visibility, signature, body)
    }

    /// A method without a body, as found in interfaces.
    pub fn abstract_method(&self, text: &str, visibility: Visibility, signature: Signature) -> NodeId {
        let params = signature
            .params
            .iter()
            .map(|(_, ty)| self.builder.type_expr(ty.as_deref().unwrap_or("AnyValue")))
            .collect();
        let ret = self
            .builder
            .type_expr(signature.return_type.as_deref().unwrap_or("Void"));
        let declared = TypeExpr {
            kind: TypeExprKind::Function {
                params,
                rest: None,
                ret: Box::new(ret),
            },
            pos: Position::default(),
        };
        let mut shape = MemberShape::new(text, MemberKind::Method(MethodKind::Normal), visibility);
        shape.throws_bubble = signature.throws_bubble;
        self.member_decl(shape, Some(declared), None, false).0
    }
}
