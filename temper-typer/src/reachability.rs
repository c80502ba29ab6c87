//! Which trailing expressions of a block may become its result, and whether
//! control can fall off the end of it.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::names::ResolvedName;
use crate::tree::{CheckPosition, Literal, NodeId, NodeKind, Tree};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Reachability {
    /// Expressions whose value may be the block's result, in source order.
    pub terminals: Vec<NodeId>,
    pub reaches_exit: bool,
    /// The output name is assigned along at least one path.
    pub sets_name: bool,
    /// The output name is assigned along every path that reaches the exit.
    pub definitely_sets_name: bool,
    /// Statements that follow a jump or a loop that never exits.
    pub unreachable: BTreeSet<NodeId>,
}

/// Analyzes `block` with respect to `output`, the name that receives the
/// block's result. Nested function bodies are opaque.
pub fn analyze(tree: &Tree, block: NodeId, output: Option<ResolvedName>) -> Reachability {
    let mut analyzer = Analyzer {
        tree,
        output,
        loops: Vec::new(),
        unreachable: BTreeSet::new(),
    };
    let flow = analyzer.statement(block, Flow::entry());
    Reachability {
        terminals: flow.terminals,
        reaches_exit: flow.falls_through,
        sets_name: flow.possibly_set,
        definitely_sets_name: flow.definitely_set,
        unreachable: analyzer.unreachable,
    }
}

/// Can control continue past `statement`?
pub fn completes_normally(tree: &Tree, statement: NodeId) -> bool {
    let mut analyzer = Analyzer {
        tree,
        output: None,
        loops: Vec::new(),
        unreachable: BTreeSet::new(),
    };
    analyzer.statement(statement, Flow::entry()).falls_through
}

#[derive(Debug, Clone)]
struct Flow {
    falls_through: bool,
    definitely_set: bool,
    possibly_set: bool,
    terminals: Vec<NodeId>,
}

impl Flow {
    fn entry() -> Self {
        Self {
            falls_through: true,
            definitely_set: false,
            possibly_set: false,
            terminals: Vec::new(),
        }
    }

    fn diverged(self) -> Self {
        Self {
            falls_through: false,
            terminals: Vec::new(),
            ..self
        }
    }

    fn set(self) -> Self {
        Self {
            definitely_set: true,
            possibly_set: true,
            terminals: Vec::new(),
            ..self
        }
    }

    fn merge(branches: Vec<Flow>, entry: &Flow) -> Flow {
        let possibly_set = entry.possibly_set || branches.iter().any(|flow| flow.possibly_set);
        let live: Vec<&Flow> = branches.iter().filter(|flow| flow.falls_through).collect();
        if live.is_empty() {
            return Flow {
                falls_through: false,
                definitely_set: branches.iter().all(|flow| flow.definitely_set),
                possibly_set,
                terminals: Vec::new(),
            };
        }
        let mut terminals = Vec::new();
        for flow in &live {
            for terminal in &flow.terminals {
                if !terminals.contains(terminal) {
                    terminals.push(*terminal);
                }
            }
        }
        Flow {
            falls_through: true,
            definitely_set: live.iter().all(|flow| flow.definitely_set),
            possibly_set,
            terminals,
        }
    }
}

struct LoopFrame {
    label: Option<String>,
    exits: Vec<Flow>,
}

struct Analyzer<'a> {
    tree: &'a Tree,
    output: Option<ResolvedName>,
    loops: Vec<LoopFrame>,
    unreachable: BTreeSet<NodeId>,
}

impl Analyzer<'_> {
    fn statement(&mut self, id: NodeId, flow: Flow) -> Flow {
        let tree = self.tree;
        match tree.kind(id) {
            NodeKind::Block { statements } => {
                let mut flow = flow;
                for statement in statements {
                    if !flow.falls_through {
                        self.unreachable.insert(*statement);
                        continue;
                    }
                    flow = self.statement(*statement, flow);
                }
                flow
            }
            NodeKind::Decl(_) | NodeKind::ClassDecl(_) => flow,
            NodeKind::Assign { target, .. } => {
                if self.output.is_some() && self.tree.name_of(*target) == self.output {
                    flow.set()
                } else {
                    self.expression(id, flow)
                }
            }
            NodeKind::If {
                consequent,
                alternate,
                ..
            } => {
                let then_flow = self.statement(*consequent, Flow {
                    terminals: Vec::new(),
                    ..flow.clone()
                });
                let else_flow = match alternate {
                    Some(alternate) => self.statement(*alternate, Flow {
                        terminals: Vec::new(),
                        ..flow.clone()
                    }),
                    None => Flow {
                        terminals: Vec::new(),
                        ..flow.clone()
                    },
                };
                Flow::merge(vec![then_flow, else_flow], &flow)
            }
            NodeKind::Loop(lp) => {
                let always = matches!(
                    self.tree.kind(lp.condition),
                    NodeKind::Value(Literal::Boolean(true))
                );
                self.loops.push(LoopFrame {
                    label: lp.label.clone(),
                    exits: Vec::new(),
                });
                let body = self.statement(lp.body, Flow {
                    terminals: Vec::new(),
                    ..flow.clone()
                });
                let frame = self.loops.pop();
                let mut exits = frame.map(|frame| frame.exits).unwrap_or_default();

                if !always {
                    let normal = match lp.check {
                        CheckPosition::Before => flow.clone(),
                        CheckPosition::After if body.falls_through => body.clone(),
                        CheckPosition::After => body.clone().diverged(),
                    };
                    exits.push(Flow {
                        possibly_set: normal.possibly_set || body.possibly_set,
                        ..normal
                    });
                }
                if exits.is_empty() {
                    return Flow {
                        possibly_set: flow.possibly_set || body.possibly_set,
                        ..flow
                    }
                    .diverged();
                }
                let exits = exits
                    .into_iter()
                    .map(|exit| Flow {
                        terminals: Vec::new(),
                        ..exit
                    })
                    .collect();
                let mut merged = Flow::merge(exits, &flow);
                merged.possibly_set |= body.possibly_set;
                merged.terminals.clear();
                merged
            }
            NodeKind::Break { label } => {
                let target = self.target_loop(label.as_deref());
                if let Some(frame) = target.and_then(|index| self.loops.get_mut(index)) {
                    frame.exits.push(flow.clone());
                }
                flow.diverged()
            }
            NodeKind::Continue { .. } => flow.diverged(),
            NodeKind::Return { .. } => {
                let sets_output = self.output.is_some_and(|output| {
                    self.tree
                        .enclosing_function(id)
                        .and_then(|fun| self.tree.as_fun(fun))
                        .is_some_and(|fun| fun.return_name == output)
                });
                if sets_output {
                    flow.set().diverged()
                } else {
                    flow.diverged()
                }
            }
            _ => self.expression(id, flow),
        }
    }

    fn expression(&mut self, id: NodeId, flow: Flow) -> Flow {
        if flow.definitely_set {
            Flow {
                terminals: Vec::new(),
                ..flow
            }
        } else {
            Flow {
                terminals: vec![id],
                ..flow
            }
        }
    }

    fn target_loop(&self, label: Option<&str>) -> Option<usize> {
        match label {
            None => self.loops.len().checked_sub(1),
            Some(label) => self
                .loops
                .iter()
                .rposition(|frame| frame.label.as_deref() == Some(label)),
        }
    }
}

impl Tree {
    /// The loop a `break` or `continue` with `label` jumps out of, searching
    /// outward from `from`.
    pub fn jump_target(&self, from: NodeId, label: Option<&str>) -> Option<NodeId> {
        for ancestor in self.ancestors(from) {
            match self.kind(ancestor) {
                NodeKind::Fun(_) => return None,
                NodeKind::Loop(lp) => match label {
                    None => return Some(ancestor),
                    Some(label) if lp.label.as_deref() == Some(label) => return Some(ancestor),
                    Some(_) => {}
                },
                _ => {}
            }
        }
        None
    }
}
