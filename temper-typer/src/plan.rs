use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::names::{NameKind, ResolvedName};
use crate::reachability;
use crate::table::MemberRef;
use crate::tree::{CheckPosition, Literal, Module, NodeId, NodeKind, Tree};

/// A call whose result reaches another call's argument list through a
/// single-use name, as in `t = f(0); g(t)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AliasedCall {
    pub call: NodeId,
    /// The `Assign` or `Decl` that stores the call's result.
    pub assignment: NodeId,
    /// The single read of the alias, an argument of another call.
    pub use_site: NodeId,
}

/// Everything the typer needs to know about a module before it starts.
#[derive(Debug, Clone, Default)]
pub struct TyperPlan {
    pub type_order: Vec<NodeId>,
    pub initializers: BTreeMap<ResolvedName, Vec<NodeId>>,
    pub may_infer_type_for_variable_from: BTreeMap<ResolvedName, BTreeSet<ResolvedName>>,
    pub aliased_calls: BTreeMap<ResolvedName, AliasedCall>,
    pub names_to_local_member_shapes: BTreeMap<ResolvedName, MemberRef>,
    pub return_names: BTreeSet<ResolvedName>,
    pub used_as_condition: BTreeSet<NodeId>,
    pub declarations: BTreeMap<ResolvedName, NodeId>,
    /// Terminal expressions and the result name they implicitly assign.
    pub implicit_results: BTreeMap<NodeId, ResolvedName>,
    pub reads: BTreeMap<ResolvedName, Vec<NodeId>>,
    /// `Assign` nodes and initialized `Decl` nodes per name.
    pub assignments: BTreeMap<ResolvedName, Vec<NodeId>>,
    pub unreachable: BTreeSet<NodeId>,
    /// Lambdas typed after the call that gives them context.
    pub deferred_lambdas: BTreeMap<NodeId, NodeId>,
}

impl TyperPlan {
    pub fn build(module: &Module) -> TyperPlan {
        let mut plan = TyperPlan::default();
        let Some(root) = module.root() else {
            return plan;
        };
        let tree = &module.tree;

        let analysis = reachability::analyze(tree, root, module.output_name);
        plan.unreachable.extend(analysis.unreachable);
        if let Some(output) = module.output_name {
            plan.return_names.insert(output);
            for terminal in analysis.terminals {
                plan.implicit_results.insert(terminal, output);
            }
        }
        for id in tree.ids() {
            if let NodeKind::Fun(fun) = tree.kind(id) {
                plan.return_names.insert(fun.return_name);
                let analysis = reachability::analyze(tree, fun.body, Some(fun.return_name));
                plan.unreachable.extend(analysis.unreachable);
                for terminal in analysis.terminals {
                    plan.implicit_results.insert(terminal, fun.return_name);
                }
            }
        }

        let mut order = OrderBuilder {
            tree,
            plan: &mut plan,
        };
        order.visit(root);
        plan.collect_facts(module);

        let mut flow = InitializerFlow {
            module,
            plan: &mut plan,
            loops: Vec::new(),
        };
        let mut states = InitStates::new();
        flow.walk(root, &mut states);

        plan.find_inference_chains(module);
        plan.find_aliased_calls(module);

        tracing::debug!(
            nodes = plan.type_order.len(),
            initialized = plan.initializers.len(),
            aliased = plan.aliased_calls.len(),
            deferred = plan.deferred_lambdas.len(),
            "built typer plan"
        );
        plan
    }

    fn collect_facts(&mut self, module: &Module) {
        let tree = &module.tree;
        for id in self.type_order.clone() {
            match tree.kind(id) {
                NodeKind::RightName(name) => self.reads.entry(*name).or_default().push(id),
                NodeKind::Decl(decl) => {
                    if let Some(name) = tree.name_of(decl.name) {
                        self.declarations.insert(name, id);
                        if decl.initializer.is_some() {
                            self.assignments.entry(name).or_default().push(id);
                        }
                        if let Some(member) = decl.member {
                            self.names_to_local_member_shapes.insert(name, member);
                        }
                    }
                }
                NodeKind::Assign { target, .. } => {
                    if let Some(name) = tree.name_of(*target) {
                        self.assignments.entry(name).or_default().push(id);
                    }
                }
                NodeKind::ClassDecl(class) => {
                    for (name, member) in &class.formal_members {
                        self.names_to_local_member_shapes.insert(*name, *member);
                    }
                }
                NodeKind::If { condition, .. } => {
                    self.used_as_condition.insert(*condition);
                }
                NodeKind::Loop(lp) => {
                    self.used_as_condition.insert(lp.condition);
                }
                _ => {}
            }
        }
    }

    fn single_use(&self, name: ResolvedName) -> Option<NodeId> {
        match self.reads.get(&name).map(Vec::as_slice) {
            Some([single]) => Some(*single),
            _ => None,
        }
    }

    fn single_assignment(&self, name: ResolvedName) -> Option<NodeId> {
        match self.assignments.get(&name).map(Vec::as_slice) {
            Some([single]) => Some(*single),
            _ => None,
        }
    }

    fn has_declared_type(&self, tree: &Tree, name: ResolvedName) -> bool {
        self.declarations
            .get(&name)
            .and_then(|decl| tree.as_decl(*decl))
            .is_some_and(|decl| decl.declared_type.is_some() || decl.is_param)
    }

    /// The name that the value at `id` is stored into, when `id` is the
    /// whole right-hand side of an assignment or declaration.
    fn stored_into(tree: &Tree, id: NodeId) -> Option<(ResolvedName, NodeId)> {
        let parent = tree.parent(id)?;
        match tree.kind(parent) {
            NodeKind::Assign { target, value } if *value == id => {
                tree.name_of(*target).map(|name| (name, parent))
            }
            NodeKind::Decl(decl) if decl.initializer == Some(id) => {
                tree.name_of(decl.name).map(|name| (name, parent))
            }
            _ => None,
        }
    }

    fn find_inference_chains(&mut self, module: &Module) {
        let tree = &module.tree;
        let mut edges: BTreeMap<ResolvedName, ResolvedName> = BTreeMap::new();
        for (name, reads) in &self.reads {
            if module.names.kind(*name) != NameKind::Temporary
                || self.has_declared_type(tree, *name)
                || self.single_assignment(*name).is_none()
            {
                continue;
            }
            let [read] = reads.as_slice() else {
                continue;
            };
            if let Some((target, _)) = Self::stored_into(tree, *read) {
                if target != *name {
                    edges.insert(*name, target);
                }
            }
        }

        for start in edges.keys() {
            let mut reached = BTreeSet::new();
            let mut current = *start;
            while let Some(next) = edges.get(&current) {
                if !reached.insert(*next) || next == start {
                    break;
                }
                current = *next;
            }
            reached.remove(start);
            if !reached.is_empty() {
                self.may_infer_type_for_variable_from.insert(*start, reached);
            }
        }
    }

    fn find_aliased_calls(&mut self, module: &Module) {
        let tree = &module.tree;
        let mut found = BTreeMap::new();
        for name in self.reads.keys() {
            if !module.names.is_local(*name) || self.has_declared_type(tree, *name) {
                continue;
            }
            let Some(use_site) = self.single_use(*name) else {
                continue;
            };
            if tree
                .argument_of(use_site)
                .and_then(|parent| tree.as_call(parent))
                .is_none()
            {
                continue;
            }

            let mut current = *name;
            let mut seen = BTreeSet::new();
            while seen.insert(current) {
                let Some(assignment) = self.single_assignment(current) else {
                    break;
                };
                let value = match tree.kind(assignment) {
                    NodeKind::Assign { value, .. } => Some(*value),
                    NodeKind::Decl(decl) => decl.initializer,
                    _ => None,
                };
                let Some(value) = value else {
                    break;
                };
                match tree.kind(value) {
                    NodeKind::Call(_) => {
                        found.insert(
                            *name,
                            AliasedCall {
                                call: value,
                                assignment,
                                use_site,
                            },
                        );
                        break;
                    }
                    NodeKind::RightName(previous)
                        if self.single_use(*previous) == Some(value)
                            && !self.has_declared_type(tree, *previous) =>
                    {
                        current = *previous;
                    }
                    _ => break,
                }
            }
        }
        self.aliased_calls = found;
    }

    pub fn initializers_of(&self, name: ResolvedName) -> &[NodeId] {
        self.initializers
            .get(&name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn summarize(&self, module: &Module) -> PlanSummary {
        let tree = &module.tree;
        let describe = |id: NodeId| format!("{} {}", tree.pos(id), tree.kind(id).describe());
        let name = |name: ResolvedName| module.names.text(name).to_string();
        PlanSummary {
            type_order: self.type_order.iter().copied().map(describe).collect(),
            initializers: self
                .initializers
                .iter()
                .map(|(key, nodes)| NamedNodes {
                    name: name(*key),
                    nodes: nodes.iter().copied().map(describe).collect(),
                })
                .collect(),
            may_infer_type_for_variable_from: self
                .may_infer_type_for_variable_from
                .iter()
                .map(|(key, names)| NamedNames {
                    name: name(*key),
                    names: names.iter().copied().map(name).collect(),
                })
                .collect(),
            aliased_calls: self
                .aliased_calls
                .iter()
                .map(|(key, alias)| NamedNodes {
                    name: name(*key),
                    nodes: vec![describe(alias.call), describe(alias.assignment)],
                })
                .collect(),
            names_to_local_member_shapes: self
                .names_to_local_member_shapes
                .iter()
                .map(|(key, member)| {
                    (name(*key), module.types.display_member(*member).to_string())
                })
                .collect(),
            return_names: self.return_names.iter().copied().map(name).collect(),
            used_as_condition: self.used_as_condition.iter().copied().map(describe).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NamedNodes {
    pub name: String,
    pub nodes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct NamedNames {
    pub name: String,
    pub names: Vec<String>,
}

/// A rendering of a [`TyperPlan`] with positions and names spelled out.
#[derive(Debug, Serialize)]
pub struct PlanSummary {
    pub type_order: Vec<String>,
    pub initializers: Vec<NamedNodes>,
    pub may_infer_type_for_variable_from: Vec<NamedNames>,
    pub aliased_calls: Vec<NamedNodes>,
    pub names_to_local_member_shapes: Vec<(String, String)>,
    pub return_names: Vec<String>,
    pub used_as_condition: Vec<String>,
}

struct OrderBuilder<'a> {
    tree: &'a Tree,
    plan: &'a mut TyperPlan,
}

impl OrderBuilder<'_> {
    fn emit(&mut self, id: NodeId) {
        self.plan.type_order.push(id);
    }

    /// Untyped lambdas passed to a call take their signature from it.
    fn needs_call_context(&self, id: NodeId) -> bool {
        let Some(fun) = self.tree.as_fun(id) else {
            return false;
        };
        let untyped = fun.return_type.is_none()
            || fun.params.iter().any(|param| {
                self.tree
                    .as_decl(*param)
                    .is_some_and(|decl| decl.declared_type.is_none())
            });
        untyped
            && self
                .tree
                .argument_of(id)
                .is_some_and(|parent| self.tree.as_call(parent).is_some())
    }

    /// Orders the statements of one block so that a declaration comes before
    /// the statements that read its name, including reads from inside nested
    /// functions. Statements that depend on each other keep source order.
    fn dependency_order(&self, statements: &[NodeId]) -> Vec<NodeId> {
        let tree = self.tree;
        let mut declared_by: HashMap<ResolvedName, usize> = HashMap::new();
        for (index, statement) in statements.iter().enumerate() {
            let name = match tree.kind(*statement) {
                NodeKind::Decl(decl) => tree.name_of(decl.name),
                NodeKind::ClassDecl(class) => Some(class.name),
                _ => None,
            };
            if let Some(name) = name {
                declared_by.insert(name, index);
            }
        }
        let needs: Vec<BTreeSet<usize>> = statements
            .iter()
            .enumerate()
            .map(|(index, statement)| {
                let mut reads = BTreeSet::new();
                reads_within(tree, *statement, &mut reads);
                reads
                    .iter()
                    .filter_map(|name| declared_by.get(name).copied())
                    .filter(|declaration| *declaration != index)
                    .collect()
            })
            .collect();

        let reaches = (0..needs.len()).map(|index| reachable(&needs, index)).collect();
        let mut placement = Placement {
            needs,
            reaches,
            placed: vec![false; statements.len()],
            order: Vec::with_capacity(statements.len()),
        };
        for index in 0..statements.len() {
            placement.place(index);
        }
        placement
            .order
            .into_iter()
            .map(|index| statements[index])
            .collect()
    }

    fn visit(&mut self, id: NodeId) {
        let tree = self.tree;
        match tree.kind(id) {
            NodeKind::Block { statements } => {
                let live: Vec<NodeId> = statements
                    .iter()
                    .copied()
                    .filter(|statement| !self.plan.unreachable.contains(statement))
                    .collect();
                for statement in self.dependency_order(&live) {
                    self.visit(statement);
                }
            }
            NodeKind::Decl(decl) => {
                if let Some(initializer) = decl.initializer {
                    self.visit(initializer);
                }
                self.visit(decl.name);
            }
            NodeKind::Assign { target, value } => {
                self.visit(*value);
                self.visit(*target);
            }
            NodeKind::Call(call) => {
                self.visit(call.callee);
                let mut deferred = Vec::new();
                for arg in &call.args {
                    if self.needs_call_context(*arg) {
                        deferred.push(*arg);
                    } else {
                        self.visit(*arg);
                    }
                }
                self.emit(id);
                for lambda in deferred {
                    self.plan.deferred_lambdas.insert(lambda, id);
                    self.visit(lambda);
                }
                return;
            }
            NodeKind::ClassDecl(class) => {
                let (methods, fields): (Vec<NodeId>, Vec<NodeId>) =
                    class.members.iter().partition(|member| {
                        tree.as_decl(**member)
                            .and_then(|decl| decl.initializer)
                            .is_some_and(|init| tree.as_fun(init).is_some())
                    });
                for member in fields.into_iter().chain(methods) {
                    self.visit(member);
                }
            }
            _ => {
                for child in tree.children(id) {
                    self.visit(child);
                }
            }
        }
        self.emit(id);
    }
}

/// Puts statements after the statements they need. Statements that need
/// each other, directly or not, are placed together in source order.
struct Placement {
    needs: Vec<BTreeSet<usize>>,
    reaches: Vec<BTreeSet<usize>>,
    placed: Vec<bool>,
    order: Vec<usize>,
}

impl Placement {
    fn place(&mut self, index: usize) {
        if self.placed[index] {
            return;
        }
        let cycle: Vec<usize> = (0..self.needs.len())
            .filter(|other| {
                *other == index
                    || (self.reaches[index].contains(other) && self.reaches[*other].contains(&index))
            })
            .collect();
        for member in &cycle {
            self.placed[*member] = true;
        }
        for member in &cycle {
            let outside: Vec<usize> = self.needs[*member]
                .iter()
                .copied()
                .filter(|needed| !cycle.contains(needed))
                .collect();
            for needed in outside {
                self.place(needed);
            }
        }
        self.order.extend(cycle);
    }
}

fn reachable(needs: &[BTreeSet<usize>], from: usize) -> BTreeSet<usize> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<usize> = needs[from].iter().copied().collect();
    while let Some(next) = stack.pop() {
        if seen.insert(next) {
            stack.extend(needs[next].iter().copied());
        }
    }
    seen
}

fn reads_within(tree: &Tree, id: NodeId, reads: &mut BTreeSet<ResolvedName>) {
    if let NodeKind::RightName(name) = tree.kind(id) {
        reads.insert(*name);
    }
    for child in tree.children(id) {
        reads_within(tree, child, reads);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum InitState {
    NotInitialized,
    InitializedNull,
    Initialized,
}

type InitStates = HashMap<ResolvedName, InitState>;

fn merge(branches: Vec<InitStates>) -> InitStates {
    let mut iter = branches.into_iter();
    let Some(mut merged) = iter.next() else {
        return InitStates::new();
    };
    for branch in iter {
        merged.retain(|name, state| match branch.get(name) {
            Some(other) => {
                *state = (*state).min(*other);
                true
            }
            None => false,
        });
    }
    merged
}

struct LoopExits {
    node: NodeId,
    breaks: Vec<InitStates>,
}

/// Finds initializers by walking statements in order while tracking how
/// definitely each name has been assigned.
struct InitializerFlow<'a> {
    module: &'a Module,
    plan: &'a mut TyperPlan,
    loops: Vec<LoopExits>,
}

impl InitializerFlow<'_> {
    fn may_initialize(&self, name: ResolvedName) -> bool {
        let tree = &self.module.tree;
        match self.module.names.kind(name) {
            NameKind::Builtin | NameKind::Unresolved => return false,
            NameKind::Return => {
                let declared = tree.ids().any(|id| {
                    tree.as_fun(id)
                        .is_some_and(|fun| fun.return_name == name && fun.return_type.is_some())
                });
                return !declared;
            }
            NameKind::Source | NameKind::Temporary => {}
        }
        !self.plan.has_declared_type(tree, name)
    }

    fn never_returns(&self, value: NodeId) -> bool {
        let tree = &self.module.tree;
        let Some(call) = tree.as_call(value) else {
            return false;
        };
        call.args.is_empty()
            && tree.name_of(call.callee).is_some_and(|name| {
                self.module.names.kind(name) == NameKind::Builtin
                    && self.module.names.text(name) == "panic"
            })
    }

    fn record(&mut self, name: ResolvedName, value: NodeId, states: &mut InitStates) {
        if !self.may_initialize(name) || self.never_returns(value) {
            return;
        }
        let state = states
            .get(&name)
            .copied()
            .unwrap_or(InitState::NotInitialized);
        let is_null = self.module.tree.is_null_literal(value);
        let initializes = if is_null {
            state == InitState::NotInitialized
        } else {
            state != InitState::Initialized
        };
        if initializes {
            let list = self.plan.initializers.entry(name).or_default();
            if !list.contains(&value) {
                tracing::trace!(name = self.module.names.text(name), ?value, "initializer");
                list.push(value);
            }
        }
        let next = if is_null {
            state.max(InitState::InitializedNull)
        } else {
            InitState::Initialized
        };
        states.insert(name, next);
    }

    /// Returns whether control can continue after `id`.
    fn walk(&mut self, id: NodeId, states: &mut InitStates) -> bool {
        if self.plan.unreachable.contains(&id) {
            return false;
        }
        let module = self.module;
        let tree = &module.tree;
        let falls_through = match tree.kind(id) {
            NodeKind::Block { statements } => {
                for statement in statements {
                    if !self.walk(*statement, states) {
                        return false;
                    }
                }
                true
            }
            NodeKind::Decl(decl) => {
                if let Some(initializer) = decl.initializer {
                    self.walk(initializer, states);
                    if let Some(name) = tree.name_of(decl.name) {
                        self.record(name, initializer, states);
                    }
                }
                true
            }
            NodeKind::Assign { target, value } => {
                self.walk(*value, states);
                if let Some(name) = tree.name_of(*target) {
                    self.record(name, *value, states);
                }
                true
            }
            NodeKind::If {
                condition,
                consequent,
                alternate,
            } => {
                self.walk(*condition, states);
                let mut then_states = states.clone();
                let mut live = Vec::new();
                if self.walk(*consequent, &mut then_states) {
                    live.push(then_states);
                }
                let mut else_states = states.clone();
                let else_live = match alternate {
                    Some(alternate) => self.walk(*alternate, &mut else_states),
                    None => true,
                };
                if else_live {
                    live.push(else_states);
                }
                if live.is_empty() {
                    return false;
                }
                *states = merge(live);
                true
            }
            NodeKind::Loop(lp) => {
                let always = matches!(
                    tree.kind(lp.condition),
                    NodeKind::Value(Literal::Boolean(true))
                );
                self.loops.push(LoopExits {
                    node: id,
                    breaks: Vec::new(),
                });
                let mut exits = Vec::new();
                match lp.check {
                    CheckPosition::Before => {
                        self.walk(lp.condition, states);
                        let mut body = states.clone();
                        if self.walk(lp.body, &mut body) {
                            if let Some(increment) = lp.increment {
                                self.walk(increment, &mut body);
                            }
                        }
                        if !always {
                            exits.push(states.clone());
                        }
                    }
                    CheckPosition::After => {
                        let mut body = states.clone();
                        if self.walk(lp.body, &mut body) {
                            if let Some(increment) = lp.increment {
                                self.walk(increment, &mut body);
                            }
                            self.walk(lp.condition, &mut body);
                            if !always {
                                exits.push(body);
                            }
                        }
                    }
                }
                if let Some(frame) = self.loops.pop() {
                    exits.extend(frame.breaks);
                }
                if exits.is_empty() {
                    return false;
                }
                *states = merge(exits);
                true
            }
            NodeKind::Break { label } => {
                let target = tree.jump_target(id, label.as_deref());
                if let Some(frame) = self
                    .loops
                    .iter_mut()
                    .rev()
                    .find(|frame| Some(frame.node) == target)
                {
                    frame.breaks.push(states.clone());
                }
                false
            }
            NodeKind::Continue { .. } => false,
            NodeKind::Return { value } => {
                if let Some(value) = value {
                    self.walk(*value, states);
                    let return_name = tree
                        .enclosing_function(id)
                        .and_then(|fun| tree.as_fun(fun))
                        .map(|fun| fun.return_name);
                    if let Some(return_name) = return_name {
                        self.record(return_name, *value, states);
                    }
                }
                false
            }
            NodeKind::Fun(fun) => {
                // Bodies see the enclosing state but do not change it.
                let mut inner = states.clone();
                let saved = std::mem::take(&mut self.loops);
                self.walk(fun.body, &mut inner);
                self.loops = saved;
                true
            }
            NodeKind::Orelse { body, fallback } => {
                let mut fallback_states = states.clone();
                let body_live = self.walk(*body, states);
                let fallback_live = self.walk(*fallback, &mut fallback_states);
                let mut live = Vec::new();
                if body_live {
                    live.push(states.clone());
                }
                if fallback_live {
                    live.push(fallback_states);
                }
                if live.is_empty() {
                    return false;
                }
                *states = merge(live);
                true
            }
            _ => {
                for child in tree.children(id) {
                    self.walk(child, states);
                }
                true
            }
        };
        if let Some(name) = self.plan.implicit_results.get(&id).copied() {
            self.record(name, id, states);
        }
        falls_through
    }
}
