use std::collections::{HashMap, HashSet};

use crate::builtins::BuiltinKind;
use crate::diagnostics::MessageTemplate;
use crate::names::NameKind;
use crate::source::Position;
use crate::table::{MemberKind, MethodKind, ShapeKind, Visibility};
use crate::tree::{Literal, NodeId, NodeKind, TypeInferences};
use crate::type_expr::TypeExprKind;
use crate::types::{FunctionType, ShapeId, StaticType, TypeFormalId, TypeFormalRef};

use super::solver::Solver;
use super::Typer;

/// What is known about one actual argument while a call is solved.
#[derive(Debug, Clone)]
enum Arg {
    Known(StaticType),
    /// The result of a call that is still waiting for context from this one.
    Late(StaticType),
    /// A function literal that is typed after its call.
    Lambda(NodeId),
}

struct Attempt {
    variant: FunctionType,
    instantiated: FunctionType,
    bindings: HashMap<TypeFormalId, StaticType>,
    open: Vec<TypeFormalRef>,
    matches: bool,
    score: usize,
}

pub(super) struct Outcome {
    ty: StaticType,
    variant: StaticType,
    function: Option<FunctionType>,
    bindings: Vec<(TypeFormalRef, StaticType)>,
    open: Vec<TypeFormalRef>,
    problems: Vec<(MessageTemplate, Position)>,
}

impl Outcome {
    fn invalid(problems: Vec<(MessageTemplate, Position)>) -> Self {
        Self {
            ty: StaticType::Invalid,
            variant: StaticType::Invalid,
            function: None,
            bindings: Vec::new(),
            open: Vec::new(),
            problems,
        }
    }

    fn inferences(&self) -> TypeInferences {
        TypeInferences::Call {
            ty: self.ty.clone(),
            variant: self.variant.clone(),
            bindings: self.bindings.clone(),
            explanations: Vec::new(),
        }
    }
}

fn collect_formals(ty: &StaticType, out: &mut HashSet<TypeFormalId>) {
    match ty {
        StaticType::Param(formal) => {
            out.insert(formal.id);
        }
        StaticType::Nominal(nominal) => nominal.args.iter().for_each(|arg| collect_formals(arg, out)),
        StaticType::Function(function) => {
            function.params.iter().for_each(|param| collect_formals(param, out));
            if let Some(rest) = &function.rest {
                collect_formals(rest, out);
            }
            collect_formals(&function.ret, out);
        }
        StaticType::Or(members) => members.iter().for_each(|member| collect_formals(member, out)),
        _ => {}
    }
}

fn mentions_any(ty: &StaticType, formals: &[TypeFormalRef]) -> bool {
    formals.iter().any(|formal| ty.mentions_formal(formal.id))
}

impl Typer<'_> {
    pub(super) fn type_call(&mut self, id: NodeId) -> TypeInferences {
        let Some(call) = self.module.tree.as_call(id).cloned() else {
            return TypeInferences::None;
        };
        if !self.type_args.contains_key(&id) {
            let explicit = call
                .type_args
                .iter()
                .map(|arg| self.resolve_type(arg, id))
                .collect();
            self.type_args.insert(id, explicit);
        }
        let context = self.expected_type(id);
        let outcome = self.solve_call(id, context.as_ref());

        let lambdas = self.pending_lambdas(id);
        if !lambdas.is_empty() {
            self.bind_lambda_params(&call.args, &outcome);
            for fun in lambdas {
                self.lambda_calls.insert(fun, id);
            }
            self.provisional.insert(id);
            return outcome.inferences();
        }

        if !outcome.open.is_empty() && self.can_defer(id) {
            self.defer(id);
            return outcome.inferences();
        }
        let outcome = self.settle_late_arguments(id, outcome, context.as_ref());
        let outcome = self.close(outcome);
        self.finish(id, outcome)
    }

    /// Called once every function literal passed to `call` has a type.
    pub(super) fn finish_lambda_call(&mut self, call: NodeId) {
        let plan = self.plan;
        let waiting = plan
            .deferred_lambdas
            .iter()
            .any(|(fun, owner)| *owner == call && !self.decisions.contains_key(fun));
        if waiting {
            return;
        }
        let saved = std::mem::take(&mut self.explanations);
        let context = self.expected_type(call);
        let outcome = self.solve_call(call, context.as_ref());
        let outcome = self.settle_late_arguments(call, outcome, context.as_ref());
        let outcome = self.close(outcome);
        self.provisional.remove(&call);
        let inferences = self.finish(call, outcome);
        self.decide(call, inferences);
        self.explanations = saved;
    }

    pub(super) fn type_new(&mut self, id: NodeId) -> TypeInferences {
        let NodeKind::New { type_expr, args } = self.kind(id) else {
            return TypeInferences::None;
        };
        let explicit_args = matches!(
            &type_expr.kind,
            TypeExprKind::Named { args: written, .. } if !written.is_empty()
        );
        let target = self.resolve_type(&type_expr, id);
        let nominal = match target {
            StaticType::Nominal(nominal) => nominal,
            StaticType::Invalid => return Outcome::invalid(Vec::new()).inferences(),
            other => {
                self.report(
                    MessageTemplate::ExpectedSubType {
                        expected: self.module.types.any_value().to_string(),
                        actual: other.to_string(),
                    },
                    self.pos(id),
                );
                return Outcome::invalid(Vec::new()).inferences();
            }
        };
        let Some(constructor) = self.constructor_signature(id, nominal.shape) else {
            return Outcome::invalid(Vec::new()).inferences();
        };
        let explicit = if explicit_args { nominal.args.clone() } else { Vec::new() };
        let context = self.expected_type(id);

        let classified = self.classify_args(id, &args);
        let mut outcome = self.select(
            id,
            &args,
            &classified,
            &[constructor.clone()],
            &explicit,
            context.as_ref(),
            None,
        );
        if !self.late_arguments(id).is_empty() {
            let function = outcome.function.clone();
            self.resolve_late_arguments(id, function.as_ref(), &outcome.open);
            let classified = self.classify_args(id, &args);
            outcome = self.select(
                id,
                &args,
                &classified,
                &[constructor],
                &explicit,
                context.as_ref(),
                None,
            );
        }
        let outcome = self.close(outcome);
        self.finish(id, outcome)
    }

    /// The constructor of a class as a function over the class's formals,
    /// returning an instance.
    fn constructor_signature(&mut self, id: NodeId, shape_id: ShapeId) -> Option<FunctionType> {
        let shape = self.module.types.shape(shape_id).clone();
        let instance = StaticType::Nominal(self.module.types.self_type(shape_id));
        let shape_name = shape.name.clone();
        if shape.kind == ShapeKind::Interface {
            self.report(
                MessageTemplate::NoSuchMember {
                    member: "constructor".to_string(),
                    type_name: shape_name,
                },
                self.pos(id),
            );
            return None;
        }
        let formals = shape.formals.clone();
        let declared = shape
            .members
            .iter()
            .find(|member| member.kind == MemberKind::Method(MethodKind::Constructor))
            .cloned();
        let params = match declared {
            Some(member) => {
                if member.visibility == Visibility::Private && !self.inside_shape(id, shape_id) {
                    self.report(
                        MessageTemplate::MissingMemberVisibility {
                            member: "constructor".to_string(),
                            defined_in: shape_name,
                        },
                        self.pos(id),
                    );
                    return None;
                }
                let ty = member.ty.clone().or_else(|| {
                    let decl = member.declaration?;
                    let init = self.module.tree.as_decl(decl)?.initializer?;
                    self.signatures.get(&init).cloned().map(StaticType::Function)
                });
                match ty.as_ref().and_then(StaticType::as_function) {
                    Some(function) => function.params.clone(),
                    None => {
                        self.report(
                            MessageTemplate::MissingType {
                                name: member.name.clone(),
                            },
                            self.pos(id),
                        );
                        return None;
                    }
                }
            }
            None => shape
                .constructor_params
                .iter()
                .map(|index| {
                    shape
                        .members
                        .get(*index)
                        .and_then(|member| member.ty.clone())
                        .unwrap_or(StaticType::Invalid)
                })
                .collect(),
        };
        Some(FunctionType::generic(formals, params, instance))
    }

    fn solve_call(&mut self, id: NodeId, context: Option<&StaticType>) -> Outcome {
        let Some(call) = self.module.tree.as_call(id).cloned() else {
            return Outcome::invalid(Vec::new());
        };
        let (variants, kind) = match self.callee_variants(call.callee) {
            Ok(found) => found,
            Err(outcome) => return outcome,
        };
        let explicit = self.type_args.get(&id).cloned().unwrap_or_default();
        let classified = self.classify_args(id, &call.args);
        self.select(id, &call.args, &classified, &variants, &explicit, context, kind)
    }

    fn callee_variants(
        &self,
        callee: NodeId,
    ) -> Result<(Vec<FunctionType>, Option<BuiltinKind>), Outcome> {
        if let NodeKind::RightName(name) = self.module.tree.kind(callee) {
            if self.module.names.kind(*name) == NameKind::Builtin {
                let text = self.module.names.text(*name);
                return match self.module.types.builtins().function(text) {
                    Some(function) => Ok((function.variants.clone(), Some(function.kind))),
                    None => Err(Outcome::invalid(Vec::new())),
                };
            }
        }
        match self.type_of(callee) {
            ty if ty.mentions_invalid() => Err(Outcome::invalid(Vec::new())),
            StaticType::Function(function) => Ok((vec![function], None)),
            other => Err(Outcome::invalid(vec![(
                MessageTemplate::ExpectedFunctionType {
                    actual: other.to_string(),
                },
                self.pos(callee),
            )])),
        }
    }

    fn classify_args(&self, owner: NodeId, args: &[NodeId]) -> Vec<Arg> {
        args.iter()
            .map(|arg| {
                if self.plan.deferred_lambdas.get(arg) == Some(&owner) && !self.decisions.contains_key(arg) {
                    return Arg::Lambda(*arg);
                }
                if self.late_calls.contains(arg) {
                    return Arg::Late(self.type_of(*arg));
                }
                if let Some(late) = self.late_alias(*arg) {
                    return Arg::Late(self.type_of(late));
                }
                Arg::Known(self.type_of(*arg))
            })
            .collect()
    }

    /// The late call whose result reaches `arg` through a chain of
    /// temporaries.
    fn late_alias(&self, arg: NodeId) -> Option<NodeId> {
        let NodeKind::RightName(name) = self.module.tree.kind(arg) else {
            return None;
        };
        let aliased = self.plan.aliased_calls.get(name)?;
        (aliased.use_site == arg && self.late_calls.contains(&aliased.call)).then_some(aliased.call)
    }

    #[allow(clippy::too_many_arguments)]
    fn select(
        &self,
        id: NodeId,
        arg_nodes: &[NodeId],
        args: &[Arg],
        variants: &[FunctionType],
        explicit: &[StaticType],
        context: Option<&StaticType>,
        kind: Option<BuiltinKind>,
    ) -> Outcome {
        if args
            .iter()
            .any(|arg| matches!(arg, Arg::Known(ty) if ty.mentions_invalid()))
        {
            return Outcome::invalid(Vec::new());
        }

        let fitting: Vec<&FunctionType> = variants
            .iter()
            .filter(|variant| variant.accepts_arity(args.len()))
            .collect();
        if fitting.is_empty() {
            let problem = match variants {
                [only] if args.len() > only.params.len() => {
                    let extra = arg_nodes
                        .get(only.params.len())
                        .map(|node| self.pos(*node))
                        .unwrap_or_else(|| self.pos(id));
                    (MessageTemplate::RedundantArgument, extra)
                }
                [only] => (
                    MessageTemplate::ArityMismatch {
                        expected: only.params.len(),
                    },
                    self.pos(id),
                ),
                _ => (MessageTemplate::NoSignatureMatches, self.pos(id)),
            };
            return Outcome::invalid(vec![problem]);
        }

        let attempts: Vec<Attempt> = fitting
            .iter()
            .map(|variant| self.attempt(variant, args, explicit, context))
            .collect();
        let mut best: Option<&Attempt> = None;
        for attempt in attempts.iter().filter(|attempt| attempt.matches) {
            if best.map_or(true, |current| attempt.score > current.score) {
                best = Some(attempt);
            }
        }
        let Some(best) = best else {
            let problem = match attempts.as_slice() {
                [only] => MessageTemplate::SignatureInputMismatch {
                    signature: StaticType::Function(only.variant.clone()).to_string(),
                    expected: only
                        .instantiated
                        .params
                        .iter()
                        .map(ToString::to_string)
                        .collect(),
                    actual: args.iter().map(|arg| self.describe_arg(arg)).collect(),
                },
                _ => MessageTemplate::NoSignatureMatches,
            };
            return Outcome::invalid(vec![(problem, self.pos(id))]);
        };

        let bindings: Vec<(TypeFormalRef, StaticType)> = best
            .variant
            .formals
            .iter()
            .filter_map(|formal| {
                best.bindings
                    .get(&formal.id)
                    .map(|ty| (formal.clone(), ty.clone()))
            })
            .collect();
        let mut function = best.instantiated.clone();
        let mut problems = Vec::new();

        if let Some(violation) =
            Solver::check_bounds(&self.module.types, &best.variant.formals, &best.bindings)
        {
            problems.push((
                MessageTemplate::ActualNotInBounds {
                    formal: self.describe_formal(&violation.formal),
                    actual: violation.actual.to_string(),
                    bounds: violation.bounds.iter().map(ToString::to_string).collect(),
                },
                self.pos(id),
            ));
            return Outcome {
                ty: StaticType::Invalid,
                variant: StaticType::Function(function.clone()),
                function: Some(function),
                bindings,
                open: Vec::new(),
                problems,
            };
        }

        if kind == Some(BuiltinKind::Division) && function.ret.includes_bubble() {
            match arg_nodes.get(1).and_then(|divisor| self.int_literal(*divisor)) {
                Some(0) => problems.push((MessageTemplate::DivByZero, self.pos(id))),
                Some(_) => function.ret = Box::new(function.ret.without_bubble()),
                None => {}
            }
        }

        Outcome {
            ty: (*function.ret).clone(),
            variant: StaticType::Function(function.clone()),
            function: Some(function),
            bindings,
            open: best.open.clone(),
            problems,
        }
    }

    fn attempt(
        &self,
        variant: &FunctionType,
        args: &[Arg],
        explicit: &[StaticType],
        context: Option<&StaticType>,
    ) -> Attempt {
        let table = &self.module.types;
        let mut wildcards = HashSet::new();
        for arg in args {
            if let Arg::Late(ty) = arg {
                collect_formals(ty, &mut wildcards);
            }
        }
        let mut solver = Solver::new(table, variant.formals.clone(), &wildcards);
        for (index, arg) in args.iter().enumerate() {
            let Some(param) = variant.param_for(index) else {
                continue;
            };
            if let Arg::Known(ty) = arg {
                solver.add_lower(param, &ty.without_bubble());
            }
        }
        if let Some(context) = context {
            solver.add_upper(&variant.ret, context);
        }
        let solution = solver.solve(explicit);
        let instantiated = variant.instantiate(&solution.bindings);

        let mut matches = true;
        let mut score = 0;
        for (index, arg) in args.iter().enumerate() {
            let Some(param) = instantiated.param_for(index) else {
                matches = false;
                continue;
            };
            match arg {
                Arg::Late(_) => {}
                Arg::Lambda(fun) => {
                    let arity = self
                        .module
                        .tree
                        .as_fun(*fun)
                        .map(|fun| fun.params.len())
                        .unwrap_or_default();
                    let fits = match param {
                        StaticType::Function(function) => function.params.len() == arity,
                        other => mentions_any(other, &solution.open) || *other == StaticType::Top,
                    };
                    matches &= fits;
                }
                Arg::Known(ty) => {
                    if mentions_any(param, &solution.open) {
                        continue;
                    }
                    let value = ty.without_bubble();
                    if value == *param {
                        score += 1;
                    } else if !table.is_subtype(&value, param) {
                        matches = false;
                    }
                }
            }
        }

        Attempt {
            variant: variant.clone(),
            instantiated,
            bindings: solution.bindings,
            open: solution.open,
            matches,
            score,
        }
    }

    fn describe_arg(&self, arg: &Arg) -> String {
        match arg {
            Arg::Known(ty) | Arg::Late(ty) => ty.to_string(),
            Arg::Lambda(fun) => self
                .module
                .tree
                .as_fun(*fun)
                .map(|fun| format!("fn ({})", vec!["_"; fun.params.len()].join(", ")))
                .unwrap_or_default(),
        }
    }

    /// `T extends MapKey`, or just `T` when unbounded.
    fn describe_formal(&self, formal: &TypeFormalRef) -> String {
        let bounds: Vec<String> = self
            .module
            .types
            .formal(formal.id)
            .bounds
            .iter()
            .map(ToString::to_string)
            .collect();
        if bounds.is_empty() {
            formal.name.clone()
        } else {
            format!("{} extends {}", formal.name, bounds.join(" & "))
        }
    }

    fn int_literal(&self, id: NodeId) -> Option<i64> {
        match self.module.tree.kind(id) {
            NodeKind::Value(Literal::Int(value)) => Some(*value),
            NodeKind::Call(call) if call.args.len() == 1 => {
                let NodeKind::RightName(name) = self.module.tree.kind(call.callee) else {
                    return None;
                };
                if self.module.names.kind(*name) != NameKind::Builtin
                    || self.module.names.text(*name) != "-"
                {
                    return None;
                }
                self.int_literal(call.args[0]).and_then(i64::checked_neg)
            }
            _ => None,
        }
    }

    fn pending_lambdas(&self, call: NodeId) -> Vec<NodeId> {
        self.plan
            .deferred_lambdas
            .iter()
            .filter(|(fun, owner)| **owner == call && !self.decisions.contains_key(fun))
            .map(|(fun, _)| *fun)
            .collect()
    }

    /// Gives untyped lambda parameters the parameter types of the slot the
    /// lambda is passed to.
    fn bind_lambda_params(&mut self, args: &[NodeId], outcome: &Outcome) {
        for (index, arg) in args.iter().enumerate() {
            let Some(fun) = self.module.tree.as_fun(*arg).cloned() else {
                continue;
            };
            let expected = outcome
                .function
                .as_ref()
                .and_then(|function| function.param_for(index))
                .map(|param| self.with_defaults(param, &outcome.open));
            for (position, param) in fun.params.iter().enumerate() {
                let Some(decl) = self.module.tree.as_decl(*param) else {
                    continue;
                };
                if decl.declared_type.is_some() {
                    continue;
                }
                let Some(name) = self.module.tree.name_of(*param) else {
                    continue;
                };
                let ty = match (&outcome.ty, &expected) {
                    (StaticType::Invalid, _) => StaticType::Invalid,
                    (_, Some(StaticType::Function(function))) => match function.params.get(position) {
                        Some(ty) => ty.clone(),
                        None => continue,
                    },
                    _ => continue,
                };
                self.bindings.insert(name, ty);
            }
        }
    }

    fn with_defaults(&self, ty: &StaticType, open: &[TypeFormalRef]) -> StaticType {
        let defaults: HashMap<TypeFormalId, StaticType> = open
            .iter()
            .map(|formal| (formal.id, Solver::default_for(&self.module.types, formal)))
            .collect();
        ty.substitute(&defaults)
    }

    /// Binds formals nothing constrained to their defaults.
    fn close(&self, mut outcome: Outcome) -> Outcome {
        if outcome.open.is_empty() {
            return outcome;
        }
        let defaults: HashMap<TypeFormalId, StaticType> = outcome
            .open
            .iter()
            .map(|formal| (formal.id, Solver::default_for(&self.module.types, formal)))
            .collect();
        for formal in &outcome.open {
            if let Some(ty) = defaults.get(&formal.id) {
                outcome.bindings.push((formal.clone(), ty.clone()));
            }
        }
        outcome.ty = outcome.ty.substitute(&defaults);
        if let Some(function) = outcome.function.as_mut() {
            *function = function.instantiate(&defaults);
            outcome.variant = StaticType::Function(function.clone());
        }
        outcome.open.clear();
        outcome
    }

    /// Logs what went wrong and records the selected variant on a builtin
    /// callee.
    fn finish(&mut self, id: NodeId, outcome: Outcome) -> TypeInferences {
        for (template, pos) in &outcome.problems {
            self.report(template.clone(), *pos);
        }
        if let (Some(call), Some(function)) = (self.module.tree.as_call(id), outcome.function.as_ref()) {
            let callee = call.callee;
            let builtin = matches!(
                self.module.tree.kind(callee),
                NodeKind::RightName(name) if self.module.names.kind(*name) == NameKind::Builtin
            );
            if builtin {
                self.decisions
                    .insert(callee, Self::basic(StaticType::Function(function.clone())));
            }
        }
        outcome.inferences()
    }

    /// A call in argument position, or whose result is only passed along
    /// through temporaries into a call, can wait for that call to supply
    /// context for its open formals.
    fn can_defer(&self, id: NodeId) -> bool {
        let tree = &self.module.tree;
        let direct = tree
            .argument_of(id)
            .is_some_and(|owner| matches!(tree.kind(owner), NodeKind::Call(_) | NodeKind::New { .. }));
        direct || self.plan.aliased_calls.values().any(|aliased| aliased.call == id)
    }

    fn defer(&mut self, id: NodeId) {
        tracing::trace!(call = id.index(), "deferring call until its context is known");
        self.late_calls.insert(id);
        self.provisional.insert(id);
        for node in self.alias_chain(id) {
            self.waiting.insert(node);
        }
    }

    /// The statements and reads that carry a late call's result to its use.
    fn alias_chain(&self, call: NodeId) -> Vec<NodeId> {
        let plan = self.plan;
        let Some(aliased) = plan.aliased_calls.values().find(|aliased| aliased.call == call) else {
            return Vec::new();
        };
        let tree = &self.module.tree;
        let mut chain = Vec::new();
        let mut current = call;
        for _ in 0..plan.type_order.len() {
            let Some(statement) = tree.parent(current) else {
                break;
            };
            let stored = match tree.kind(statement) {
                NodeKind::Assign { target, value } if *value == current => tree.name_of(*target),
                NodeKind::Decl(decl) if decl.initializer == Some(current) => tree.name_of(decl.name),
                _ => None,
            };
            let Some(stored) = stored else {
                break;
            };
            chain.push(statement);
            let Some(read) = plan.reads.get(&stored).and_then(|reads| reads.first()).copied() else {
                break;
            };
            chain.push(read);
            if read == aliased.use_site {
                break;
            }
            current = read;
        }
        chain
    }

    fn late_arguments(&self, id: NodeId) -> Vec<(usize, NodeId)> {
        let args: &[NodeId] = match self.module.tree.kind(id) {
            NodeKind::Call(call) => &call.args,
            NodeKind::New { args, .. } => args,
            _ => return Vec::new(),
        };
        args.iter()
            .enumerate()
            .filter_map(|(index, arg)| {
                if self.late_calls.contains(arg) {
                    Some((index, *arg))
                } else {
                    self.late_alias(*arg).map(|late| (index, late))
                }
            })
            .collect()
    }

    fn settle_late_arguments(&mut self, id: NodeId, outcome: Outcome, context: Option<&StaticType>) -> Outcome {
        if self.late_arguments(id).is_empty() {
            return outcome;
        }
        self.resolve_late_arguments(id, outcome.function.as_ref(), &outcome.open);
        self.solve_call(id, context)
    }

    fn resolve_late_arguments(&mut self, id: NodeId, function: Option<&FunctionType>, open: &[TypeFormalRef]) {
        for (index, late) in self.late_arguments(id) {
            let expected = function
                .and_then(|function| function.param_for(index))
                .filter(|param| !mentions_any(param, open))
                .cloned();
            self.resolve_late(late, expected);
        }
    }

    /// Finishes a late call now that the slot its result flows into is known.
    fn resolve_late(&mut self, call: NodeId, expected: Option<StaticType>) {
        if !self.late_calls.remove(&call) {
            return;
        }
        let saved = std::mem::take(&mut self.explanations);
        let outcome = self.solve_call(call, expected.as_ref());
        let outcome = self.settle_late_arguments(call, outcome, expected.as_ref());
        let outcome = self.close(outcome);
        self.provisional.remove(&call);
        let inferences = self.finish(call, outcome);
        self.decide(call, inferences);

        for node in self.alias_chain(call) {
            if self.waiting.remove(&node) {
                self.type_and_decide(node);
            }
        }
        self.explanations = saved;
    }

    /// Typing is over; late calls nobody resolved get default bindings.
    pub(super) fn resolve_remaining_late_calls(&mut self) {
        let mut remaining: Vec<NodeId> = self.late_calls.iter().copied().collect();
        remaining.sort();
        for call in remaining {
            self.resolve_late(call, None);
        }
        let mut provisional: Vec<NodeId> = self.provisional.iter().copied().collect();
        provisional.sort();
        for call in provisional {
            self.finish_lambda_call(call);
        }
    }
}
