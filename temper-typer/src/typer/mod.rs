mod calls;
mod members;
mod narrowing;
mod resolve;
mod solver;

use std::collections::{HashMap, HashSet};

use crate::diagnostics::{LogEntry, LogLevel, LogSink, MessageTemplate};
use crate::names::{NameKind, ResolvedName};
use crate::options::TyperOptions;
use crate::plan::TyperPlan;
use crate::reachability;
use crate::source::Position;
use crate::tree::{Literal, Module, NodeId, NodeKind, TypeInferences};
use crate::types::{FunctionType, ShapeId, StaticType};

/// Plans and types `module` in place. Problems in the program are logged to
/// `sink`; typing always runs to completion.
pub fn typecheck<S>(module: &mut Module, options: &TyperOptions, sink: &mut S) -> TyperPlan
where
    S: LogSink + ?Sized,
{
    let plan = TyperPlan::build(module);
    let entries = Typer::new(module, &plan, options).run();
    for entry in entries {
        sink.log(entry);
    }
    plan
}

pub(crate) struct Typer<'a> {
    module: &'a mut Module,
    plan: &'a TyperPlan,
    options: &'a TyperOptions,
    bindings: HashMap<ResolvedName, StaticType>,
    /// Names whose type was written down by the programmer.
    declared: HashMap<ResolvedName, StaticType>,
    /// Signatures of function literals whose parameter and return types are
    /// all written down.
    signatures: HashMap<NodeId, FunctionType>,
    class_shapes: HashMap<ResolvedName, ShapeId>,
    decisions: HashMap<NodeId, TypeInferences>,
    initializer_of: HashMap<NodeId, ResolvedName>,
    pending: HashMap<ResolvedName, usize>,
    initializer_types: HashMap<ResolvedName, Vec<StaticType>>,
    pre_bound: HashSet<ResolvedName>,
    /// Calls whose decision is not final yet.
    provisional: HashSet<NodeId>,
    /// Calls waiting for type context from the call they feed into.
    late_calls: HashSet<NodeId>,
    /// Nodes skipped by the main loop until a late call resolves.
    waiting: HashSet<NodeId>,
    /// Deferred lambdas whose call needs their return type.
    lambda_calls: HashMap<NodeId, NodeId>,
    /// Explicit type arguments of calls, resolved once.
    type_args: HashMap<NodeId, Vec<StaticType>>,
    /// Resolved `is` types, for narrowing.
    checked_types: HashMap<NodeId, StaticType>,
    explanations: Vec<LogEntry>,
    log: Vec<LogEntry>,
}

impl<'a> Typer<'a> {
    pub(crate) fn new(module: &'a mut Module, plan: &'a TyperPlan, options: &'a TyperOptions) -> Self {
        Self {
            module,
            plan,
            options,
            bindings: HashMap::new(),
            declared: HashMap::new(),
            signatures: HashMap::new(),
            class_shapes: HashMap::new(),
            decisions: HashMap::new(),
            initializer_of: HashMap::new(),
            pending: HashMap::new(),
            initializer_types: HashMap::new(),
            pre_bound: HashSet::new(),
            provisional: HashSet::new(),
            late_calls: HashSet::new(),
            waiting: HashSet::new(),
            lambda_calls: HashMap::new(),
            type_args: HashMap::new(),
            checked_types: HashMap::new(),
            explanations: Vec::new(),
            log: Vec::new(),
        }
    }

    pub(crate) fn run(mut self) -> Vec<LogEntry> {
        self.module.tree.clear_inferences();
        self.reset_member_types();
        self.resolve_shapes();
        self.bind_declared();
        self.bind_conditions();
        self.pre_type_initializers();

        let plan = self.plan;
        for (name, values) in &plan.initializers {
            if !self.pre_bound.contains(name) {
                self.pending.insert(*name, values.len());
            }
            for value in values {
                self.initializer_of.insert(*value, *name);
            }
        }

        for id in &plan.type_order {
            let id = *id;
            if self.waiting.contains(&id)
                || matches!(self.module.tree.kind(id), NodeKind::LeftName(_))
            {
                continue;
            }
            self.type_and_decide(id);
        }

        self.resolve_remaining_late_calls();
        self.bind_unbound_names();
        self.decide_left_names();
        if self.options.check_bubbles {
            self.check_bubbles();
        }
        self.store();
        if self.options.invalid_notes {
            self.note_invalid_types();
        }
        tracing::debug!(
            typed = self.decisions.len(),
            logged = self.log.len(),
            "typing finished"
        );
        self.log
    }

    fn kind(&self, id: NodeId) -> NodeKind {
        self.module.tree.kind(id).clone()
    }

    fn pos(&self, id: NodeId) -> Position {
        self.module.tree.pos(id)
    }

    fn name_text(&self, name: ResolvedName) -> String {
        self.module.names.text(name).to_string()
    }

    pub(crate) fn type_of(&self, id: NodeId) -> StaticType {
        self.decisions
            .get(&id)
            .and_then(TypeInferences::ty)
            .cloned()
            .unwrap_or(StaticType::Invalid)
    }

    fn report(&mut self, template: MessageTemplate, pos: Position) {
        let entry = LogEntry::error(template, pos);
        self.explanations.push(entry.clone());
        self.log.push(entry);
    }

    fn basic(ty: StaticType) -> TypeInferences {
        TypeInferences::Basic {
            ty,
            explanations: Vec::new(),
        }
    }

    fn type_and_decide(&mut self, id: NodeId) {
        let inferences = self.type_node(id);
        self.decide(id, inferences);
    }

    /// Records the decision for `id` along with whatever was logged while
    /// typing it.
    fn decide(&mut self, id: NodeId, mut inferences: TypeInferences) {
        let logged = std::mem::take(&mut self.explanations);
        match &mut inferences {
            TypeInferences::Basic { explanations, .. }
            | TypeInferences::Call { explanations, .. } => explanations.extend(logged),
            TypeInferences::None => {}
        }
        self.decisions.insert(id, inferences);
        if !self.provisional.contains(&id) {
            self.after_decision(id);
        }
    }

    fn after_decision(&mut self, id: NodeId) {
        let Some(ty) = self.decisions.get(&id).and_then(TypeInferences::ty).cloned() else {
            return;
        };
        if let Some(result_name) = self.plan.implicit_results.get(&id).copied() {
            self.check_result(result_name, &ty, self.pos(id));
        }
        let Some(name) = self.initializer_of.get(&id).copied() else {
            return;
        };
        if self.pre_bound.contains(&name) {
            return;
        }
        self.initializer_types
            .entry(name)
            .or_default()
            .push(ty.without_bubble());
        let remaining = self.pending.entry(name).or_insert(1);
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            let types = self.initializer_types.get(&name).cloned().unwrap_or_default();
            let ty = self.module.types.union(types);
            tracing::trace!(name = self.module.names.text(name), %ty, "bound from initializers");
            self.bind(name, ty);
        }
    }

    fn bind(&mut self, name: ResolvedName, ty: StaticType) {
        if let Some(member) = self.plan.names_to_local_member_shapes.get(&name) {
            self.module.types.member_mut(*member).ty = Some(ty.clone());
        }
        self.bindings.insert(name, ty);
    }

    /// Values that implicitly become a function's result must fit its
    /// declared return type.
    fn check_result(&mut self, name: ResolvedName, ty: &StaticType, pos: Position) {
        let Some(declared) = self.declared.get(&name).cloned() else {
            return;
        };
        if declared == StaticType::Void || ty.mentions_invalid() {
            return;
        }
        let value = ty.without_bubble();
        if !self.module.types.is_subtype(&value, &declared) {
            let entry = LogEntry::error(
                MessageTemplate::IllegalAssignment {
                    target: declared.to_string(),
                    source: value.to_string(),
                },
                pos,
            );
            self.log.push(entry);
        }
    }

    fn reset_member_types(&mut self) {
        let shapes: Vec<ShapeId> = self
            .module
            .types
            .shapes()
            .filter(|(_, shape)| !shape.builtin)
            .map(|(id, _)| id)
            .collect();
        for shape in shapes {
            for member in &mut self.module.types.shape_mut(shape).members {
                if member.declaration.is_some() {
                    member.ty = None;
                }
            }
        }
    }

    fn bind_declared(&mut self) {
        let plan = self.plan;
        for id in &plan.type_order {
            let id = *id;
            match self.kind(id) {
                NodeKind::Decl(decl) => {
                    let (Some(name), Some(declared)) =
                        (self.module.tree.name_of(decl.name), decl.declared_type.as_ref())
                    else {
                        continue;
                    };
                    let ty = self.resolve_type(declared, id);
                    self.declared.insert(name, ty.clone());
                    self.bind(name, ty);
                }
                NodeKind::Fun(fun) => {
                    let Some(declared) = fun.return_type.as_ref() else {
                        continue;
                    };
                    let ret = self.resolve_type(declared, id);
                    let masked = ret.without_bubble();
                    self.declared.insert(fun.return_name, masked.clone());
                    self.bindings.insert(fun.return_name, masked);

                    let mut params = Vec::new();
                    for param in &fun.params {
                        let declared = self
                            .module
                            .tree
                            .as_decl(*param)
                            .and_then(|decl| decl.declared_type.clone());
                        match declared {
                            Some(declared) => params.push(self.resolve_type(&declared, *param)),
                            None => break,
                        }
                    }
                    if params.len() == fun.params.len() {
                        let ret = if fun.throws_bubble { ret.or_bubble() } else { ret };
                        let formals = fun
                            .type_formals
                            .iter()
                            .map(|decl| decl.formal.clone())
                            .collect();
                        self.signatures
                            .insert(id, FunctionType::generic(formals, params, ret));
                    }
                }
                NodeKind::ClassDecl(class) => {
                    let this = StaticType::Nominal(self.module.types.self_type(class.shape));
                    self.bindings.insert(class.this_name, this);
                    self.class_shapes.insert(class.name, class.shape);
                }
                _ => {}
            }
        }
    }

    /// A bare, otherwise unconstrained name used as a condition is Boolean.
    fn bind_conditions(&mut self) {
        let plan = self.plan;
        for condition in &plan.used_as_condition {
            let NodeKind::RightName(name) = self.kind(*condition) else {
                continue;
            };
            let constrained = self.bindings.contains_key(&name)
                || !plan.initializers_of(name).is_empty()
                || !matches!(
                    self.module.names.kind(name),
                    NameKind::Source | NameKind::Temporary
                )
                || plan
                    .declarations
                    .get(&name)
                    .and_then(|decl| self.module.tree.as_decl(*decl))
                    .map_or(true, |decl| decl.is_param);
            if !constrained {
                let boolean = self.module.types.boolean();
                self.bindings.insert(name, boolean);
            }
        }
    }

    /// Names initialized only by literals or fully annotated functions are
    /// bound before anything is typed, so that declarations can refer to
    /// each other in any order.
    fn pre_type_initializers(&mut self) {
        let plan = self.plan;
        for (name, values) in &plan.initializers {
            if self.bindings.contains_key(name) {
                continue;
            }
            let mut types = Vec::new();
            for value in values {
                let ty = match self.module.tree.kind(*value) {
                    NodeKind::Value(literal) => self.literal_type(literal),
                    NodeKind::Fun(_) => match self.signatures.get(value) {
                        Some(signature) => StaticType::Function(signature.clone()),
                        None => break,
                    },
                    _ => break,
                };
                types.push(ty);
            }
            if types.len() == values.len() {
                let ty = self.module.types.union(types);
                self.bind(*name, ty);
                self.pre_bound.insert(*name);
            }
        }
    }

    fn literal_type(&self, literal: &Literal) -> StaticType {
        let types = &self.module.types;
        match literal {
            Literal::Int(_) => types.int32(),
            Literal::Float(_) => types.float64(),
            Literal::String(_) => types.string(),
            Literal::Boolean(_) => types.boolean(),
            Literal::Null => StaticType::Null,
            Literal::Void => StaticType::Void,
        }
    }

    fn type_node(&mut self, id: NodeId) -> TypeInferences {
        match self.kind(id) {
            NodeKind::Value(literal) => Self::basic(self.literal_type(&literal)),
            NodeKind::RightName(name) => Self::basic(self.type_read(id, name)),
            NodeKind::LeftName(name) => Self::basic(
                self.bindings
                    .get(&name)
                    .cloned()
                    .unwrap_or(StaticType::Top),
            ),
            NodeKind::Decl(_) => {
                self.type_decl(id);
                TypeInferences::None
            }
            NodeKind::Assign { target, value } => Self::basic(self.type_assign(id, target, value)),
            NodeKind::Call(_) => self.type_call(id),
            NodeKind::Member { receiver, member } => {
                Self::basic(self.type_member(id, receiver, &member))
            }
            NodeKind::New { .. } => self.type_new(id),
            NodeKind::Fun(_) => Self::basic(self.type_fun(id)),
            NodeKind::If {
                condition,
                consequent,
                alternate,
            } => {
                self.check_condition(condition);
                if !self.in_value_position(id) {
                    return TypeInferences::None;
                }
                let otherwise = match alternate {
                    Some(alternate) => self.block_value(alternate),
                    None => StaticType::Void,
                };
                let arms = [self.block_value(consequent), otherwise];
                Self::basic(self.module.types.union(arms))
            }
            NodeKind::Block { .. } if self.in_value_position(id) => {
                Self::basic(self.block_value(id))
            }
            NodeKind::Loop(lp) => {
                self.check_condition(lp.condition);
                TypeInferences::None
            }
            NodeKind::Return { value } => {
                if let Some(value) = value {
                    self.check_return(id, value);
                }
                TypeInferences::None
            }
            NodeKind::Is { value: _, type_expr } => {
                let checked = self.resolve_type(&type_expr, id);
                self.checked_types.insert(id, checked);
                Self::basic(self.module.types.boolean())
            }
            NodeKind::As { value, type_expr } => Self::basic(self.type_cast(id, value, &type_expr)),
            NodeKind::Orelse { body, fallback } => {
                let body = self.type_of(body).without_bubble();
                let fallback = self.type_of(fallback);
                Self::basic(self.module.types.union([body, fallback]))
            }
            NodeKind::Block { .. }
            | NodeKind::Break { .. }
            | NodeKind::Continue { .. }
            | NodeKind::ClassDecl(_) => TypeInferences::None,
        }
    }

    /// Whether the result of `id` is used, as for `let x = if (c) { 1 } else { 2 }`,
    /// rather than `id` standing as a statement.
    fn in_value_position(&self, id: NodeId) -> bool {
        let tree = &self.module.tree;
        let Some(parent) = tree.parent(id) else {
            return false;
        };
        match tree.kind(parent) {
            NodeKind::Block { .. } | NodeKind::Fun(_) | NodeKind::ClassDecl(_) => false,
            NodeKind::If { condition, .. } => *condition == id,
            NodeKind::Loop(lp) => lp.condition == id,
            _ => true,
        }
    }

    /// The least upper bound of the expressions that may end `block`.
    fn block_value(&self, block: NodeId) -> StaticType {
        let analysis = reachability::analyze(&self.module.tree, block, None);
        if !analysis.reaches_exit {
            return StaticType::Never;
        }
        if analysis.terminals.is_empty() {
            return StaticType::Void;
        }
        let types: Vec<StaticType> = analysis
            .terminals
            .iter()
            .map(|terminal| self.type_of(*terminal))
            .collect();
        self.module.types.union(types)
    }

    fn type_read(&mut self, id: NodeId, name: ResolvedName) -> StaticType {
        match self.module.names.kind(name) {
            NameKind::Unresolved => {
                let name = self.name_text(name);
                self.report(MessageTemplate::MissingDeclaration { name }, self.pos(id));
                return StaticType::Invalid;
            }
            NameKind::Builtin => {
                let text = self.name_text(name);
                return match self.module.types.builtins().function(&text) {
                    Some(function) => function
                        .variants
                        .first()
                        .cloned()
                        .map(StaticType::Function)
                        .unwrap_or(StaticType::Invalid),
                    None => {
                        self.report(MessageTemplate::MissingDeclaration { name: text }, self.pos(id));
                        StaticType::Invalid
                    }
                };
            }
            NameKind::Source | NameKind::Temporary | NameKind::Return => {}
        }
        if self.class_shapes.contains_key(&name) {
            let type_shape = self.module.types.builtins().type_shape;
            return self.module.types.simple(type_shape);
        }
        if let Some(bound) = self.bindings.get(&name).cloned() {
            return self.narrow(id, name, bound);
        }
        if let Some(partial) = self.initializer_types.get(&name).cloned() {
            return self.module.types.union(partial);
        }

        let positions = match self.plan.initializers.get(&name) {
            Some(values) if !values.is_empty() => values
                .iter()
                .map(|value| self.pos(*value).to_string())
                .collect::<Vec<_>>()
                .join(", "),
            _ => self
                .plan
                .declarations
                .get(&name)
                .map(|decl| self.pos(*decl).to_string())
                .unwrap_or_default(),
        };
        let text = self.name_text(name);
        self.report(
            MessageTemplate::UseBeforeInitialization {
                name: text,
                positions,
            },
            self.pos(id),
        );
        StaticType::Invalid
    }

    fn type_decl(&mut self, id: NodeId) {
        let Some(decl) = self.module.tree.as_decl(id).cloned() else {
            return;
        };
        let Some(name) = self.module.tree.name_of(decl.name) else {
            return;
        };
        if decl.is_param && !self.bindings.contains_key(&name) {
            if let Some(ty) = self.param_type_from_context(id) {
                self.bindings.insert(name, ty);
                return;
            }
            let text = self.name_text(name);
            self.report(MessageTemplate::MissingType { name: text }, self.pos(id));
            self.bindings.insert(name, StaticType::Invalid);
            return;
        }
        let (Some(declared), Some(initializer)) = (self.declared.get(&name).cloned(), decl.initializer)
        else {
            return;
        };
        let value = self.type_of(initializer);
        if value.mentions_invalid() {
            return;
        }
        let value = value.without_bubble();
        if !self.module.types.is_subtype(&value, &declared) {
            self.report(
                MessageTemplate::IllegalAssignment {
                    target: declared.to_string(),
                    source: value.to_string(),
                },
                self.pos(initializer),
            );
        }
    }

    /// An untyped parameter of a function whose expected type is a function
    /// type, as in `let f: fn (Int): Int = fn (x) { x }`.
    fn param_type_from_context(&mut self, param: NodeId) -> Option<StaticType> {
        let fun = self.module.tree.parent(param)?;
        let index = self.module.tree.as_fun(fun)?.params.iter().position(|p| *p == param)?;
        let expected = self.expected_type(fun)?;
        expected.as_function()?.params.get(index).cloned()
    }

    fn type_assign(&mut self, id: NodeId, target: NodeId, value: NodeId) -> StaticType {
        let value_type = self.type_of(value);
        let Some(name) = self.module.tree.name_of(target) else {
            return value_type;
        };
        if self.module.names.kind(name) == NameKind::Unresolved {
            let text = self.name_text(name);
            self.report(MessageTemplate::MissingDeclaration { name: text }, self.pos(target));
            return StaticType::Invalid;
        }
        if value_type.mentions_invalid() {
            return StaticType::Invalid;
        }
        let target_type = match self.declared.get(&name) {
            Some(declared) => Some(declared.clone()),
            None if self.initializer_of.get(&value) == Some(&name) => None,
            None => self.bindings.get(&name).cloned(),
        };
        let stored = value_type.without_bubble();
        match target_type {
            Some(target_type) if !self.module.types.is_subtype(&stored, &target_type) => {
                self.report(
                    MessageTemplate::IllegalAssignment {
                        target: target_type.to_string(),
                        source: stored.to_string(),
                    },
                    self.pos(id),
                );
                target_type
            }
            _ => value_type,
        }
    }

    fn check_return(&mut self, id: NodeId, value: NodeId) {
        let Some(fun) = self.module.tree.enclosing_function(id) else {
            return;
        };
        let Some(return_name) = self.module.tree.as_fun(fun).map(|fun| fun.return_name) else {
            return;
        };
        let ty = self.type_of(value);
        self.check_result(return_name, &ty, self.pos(value));
    }

    fn check_condition(&mut self, condition: NodeId) {
        let ty = self.type_of(condition);
        let boolean = self.module.types.boolean();
        if ty.mentions_invalid() || self.module.types.is_subtype(&ty, &boolean) {
            return;
        }
        let entry = LogEntry::error(
            MessageTemplate::ExpectedValueOfType {
                expected: boolean.to_string(),
                actual: ty.to_string(),
            },
            self.pos(condition),
        );
        self.log.push(entry);
    }

    fn type_cast(&mut self, id: NodeId, value: NodeId, type_expr: &crate::type_expr::TypeExpr) -> StaticType {
        let target = self.resolve_type(type_expr, id);
        let value_type = self.type_of(value);
        if value_type.mentions_invalid() || target.mentions_invalid() {
            return StaticType::Invalid;
        }
        let types = &self.module.types;
        let related =
            types.is_subtype(&target, &value_type) || types.is_subtype(&value_type, &target);
        if !related {
            self.report(
                MessageTemplate::ExpectedSubType {
                    expected: value_type.to_string(),
                    actual: target.to_string(),
                },
                self.pos(id),
            );
            return StaticType::Invalid;
        }
        target.or_bubble()
    }

    fn type_fun(&mut self, id: NodeId) -> StaticType {
        let Some(fun) = self.module.tree.as_fun(id).cloned() else {
            return StaticType::Invalid;
        };
        if let Some(signature) = self.signatures.get(&id) {
            return StaticType::Function(signature.clone());
        }
        let params: Vec<StaticType> = fun
            .params
            .iter()
            .map(|param| {
                self.module
                    .tree
                    .name_of(*param)
                    .and_then(|name| self.bindings.get(&name).cloned())
                    .unwrap_or(StaticType::Invalid)
            })
            .collect();
        let formals = fun
            .type_formals
            .iter()
            .map(|decl| decl.formal.clone())
            .collect();

        let ret = if fun.return_type.is_some() {
            let declared = self
                .declared
                .get(&fun.return_name)
                .cloned()
                .unwrap_or(StaticType::Invalid);
            if fun.throws_bubble {
                declared.or_bubble()
            } else {
                declared
            }
        } else if self.plan.deferred_lambdas.contains_key(&id) {
            let inferred = self
                .bindings
                .get(&fun.return_name)
                .cloned()
                .unwrap_or(StaticType::Void);
            if self.first_bubble_in(id).is_some() {
                inferred.or_bubble()
            } else {
                inferred
            }
        } else if let Some(expected) = self
            .expected_type(id)
            .and_then(|expected| expected.as_function().map(|function| (*function.ret).clone()))
        {
            expected
        } else {
            self.report(MessageTemplate::ReturnTypeRequired, self.pos(id));
            StaticType::Top
        };
        let ty = StaticType::Function(FunctionType::generic(formals, params, ret));

        if let Some(call) = self.lambda_calls.remove(&id) {
            self.decisions.insert(id, Self::basic(ty.clone()));
            self.finish_lambda_call(call);
        }
        ty
    }

    /// The type that the surroundings of `id` expect it to have, if any.
    pub(crate) fn expected_type(&self, id: NodeId) -> Option<StaticType> {
        let tree = &self.module.tree;
        if let Some(result_name) = self.plan.implicit_results.get(&id) {
            return self.declared.get(result_name).cloned();
        }
        let parent = tree.parent(id)?;
        let stored_into = match tree.kind(parent) {
            NodeKind::Assign { target, value } if *value == id => tree.name_of(*target),
            NodeKind::Decl(decl) if decl.initializer == Some(id) => tree.name_of(decl.name),
            NodeKind::Return { .. } => {
                let fun = tree.enclosing_function(parent)?;
                let return_name = tree.as_fun(fun)?.return_name;
                return self.declared.get(&return_name).cloned();
            }
            NodeKind::Call(call) => {
                let index = call.args.iter().position(|arg| *arg == id)?;
                let callee = self.decisions.get(&call.callee)?.ty()?;
                let function = callee.as_function()?;
                if function.is_generic() {
                    return None;
                }
                return function.param_for(index).cloned();
            }
            _ => None,
        }?;
        if let Some(declared) = self.declared.get(&stored_into) {
            return Some(declared.clone());
        }
        if let Some(targets) = self.plan.may_infer_type_for_variable_from.get(&stored_into) {
            for target in targets {
                if let Some(ty) = self.declared.get(target).or_else(|| self.bindings.get(target)) {
                    return Some(ty.clone());
                }
            }
        }
        if self.initializer_of.get(&id) == Some(&stored_into) {
            return None;
        }
        self.bindings.get(&stored_into).cloned()
    }

    fn bind_unbound_names(&mut self) {
        let plan = self.plan;
        for name in plan.declarations.keys() {
            if !self.bindings.contains_key(name) {
                let partial = self.initializer_types.get(name).cloned();
                let ty = match partial {
                    Some(types) if !types.is_empty() => self.module.types.union(types),
                    _ => StaticType::Top,
                };
                self.bind(*name, ty);
            }
        }
    }

    fn decide_left_names(&mut self) {
        let plan = self.plan;
        for id in &plan.type_order {
            if let NodeKind::LeftName(name) = self.kind(*id) {
                let ty = self.bindings.get(&name).cloned().unwrap_or(StaticType::Top);
                self.decisions.insert(*id, Self::basic(ty));
            }
        }
    }

    /// The first expression directly inside `fun` that may bubble without
    /// being handled by an `orelse`.
    fn first_bubble_in(&self, fun: NodeId) -> Option<NodeId> {
        let tree = &self.module.tree;
        self.plan.type_order.iter().copied().find(|id| {
            if !matches!(tree.kind(*id), NodeKind::Call(_) | NodeKind::As { .. }) {
                return false;
            }
            if !self
                .decisions
                .get(id)
                .and_then(TypeInferences::ty)
                .is_some_and(StaticType::includes_bubble)
            {
                return false;
            }
            let mut child = *id;
            for ancestor in tree.ancestors(*id) {
                match tree.kind(ancestor) {
                    NodeKind::Orelse { body, .. } if *body == child => return false,
                    NodeKind::Fun(_) => return ancestor == fun,
                    _ => {}
                }
                child = ancestor;
            }
            false
        })
    }

    fn check_bubbles(&mut self) {
        let plan = self.plan;
        for id in &plan.type_order {
            let Some(fun) = self.module.tree.as_fun(*id) else {
                continue;
            };
            if fun.throws_bubble || plan.deferred_lambdas.contains_key(id) {
                continue;
            }
            if let Some(bubbly) = self.first_bubble_in(*id) {
                let entry = LogEntry::error(MessageTemplate::ExpectedNoBubble, self.pos(bubbly));
                self.log.push(entry);
            }
        }
    }

    fn store(&mut self) {
        for (id, inferences) in &self.decisions {
            self.module.tree.set_inferences(*id, inferences.clone());
        }
    }

    fn note_invalid_types(&mut self) {
        let plan = self.plan;
        for id in &plan.type_order {
            let Some(inferences) = self.decisions.get(id) else {
                continue;
            };
            let template = match inferences {
                TypeInferences::Basic { ty, .. } | TypeInferences::Call { ty, .. }
                    if ty.mentions_invalid() =>
                {
                    MessageTemplate::InvalidTypeMention { ty: ty.to_string() }
                }
                TypeInferences::Call { variant, .. } if variant.mentions_invalid() => {
                    MessageTemplate::InvalidVariantMention {
                        variant: variant.to_string(),
                    }
                }
                _ => continue,
            };
            self.log
                .push(LogEntry::new(LogLevel::Info, template, self.pos(*id)));
        }
    }
}
