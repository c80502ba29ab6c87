use serde::Serialize;

use crate::diagnostics::LogEntry;
use crate::error::TreeError;
use crate::names::{NameTable, ResolvedName};
use crate::source::{Position, SourceFile};
use crate::table::{MemberRef, TypeTable};
use crate::type_expr::TypeExpr;
use crate::types::{ShapeId, StaticType, TypeFormalRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckPosition {
    /// `while (c) { .. }`
    Before,
    /// `do { .. } while (c)`
    After,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    /// A `LeftName` node.
    pub name: NodeId,
    pub declared_type: Option<TypeExpr>,
    pub initializer: Option<NodeId>,
    pub mutable: bool,
    pub is_param: bool,
    pub member: Option<MemberRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub callee: NodeId,
    pub type_args: Vec<TypeExpr>,
    pub args: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeFormalDecl {
    pub formal: TypeFormalRef,
    pub bounds: Vec<TypeExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fun {
    pub type_formals: Vec<TypeFormalDecl>,
    /// `Decl` nodes.
    pub params: Vec<NodeId>,
    pub return_type: Option<TypeExpr>,
    pub throws_bubble: bool,
    pub body: NodeId,
    pub return_name: ResolvedName,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    pub label: Option<String>,
    pub condition: NodeId,
    pub body: NodeId,
    pub increment: Option<NodeId>,
    pub check: CheckPosition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: ResolvedName,
    pub shape: ShapeId,
    pub type_formals: Vec<TypeFormalDecl>,
    /// Names standing for the class's type parameters inside its body.
    pub formal_members: Vec<(ResolvedName, MemberRef)>,
    pub supertypes: Vec<TypeExpr>,
    /// `Decl` nodes, one per member.
    pub members: Vec<NodeId>,
    pub this_name: ResolvedName,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Block {
        statements: Vec<NodeId>,
    },
    Value(Literal),
    LeftName(ResolvedName),
    RightName(ResolvedName),
    Decl(Decl),
    Assign {
        target: NodeId,
        value: NodeId,
    },
    Call(Call),
    Member {
        receiver: NodeId,
        member: String,
    },
    New {
        type_expr: TypeExpr,
        args: Vec<NodeId>,
    },
    Fun(Fun),
    If {
        condition: NodeId,
        consequent: NodeId,
        alternate: Option<NodeId>,
    },
    Loop(Loop),
    Break {
        label: Option<String>,
    },
    Continue {
        label: Option<String>,
    },
    Return {
        value: Option<NodeId>,
    },
    Is {
        value: NodeId,
        type_expr: TypeExpr,
    },
    As {
        value: NodeId,
        type_expr: TypeExpr,
    },
    Orelse {
        body: NodeId,
        fallback: NodeId,
    },
    ClassDecl(ClassDecl),
}

impl NodeKind {
    pub fn describe(&self) -> &'static str {
        match self {
            NodeKind::Block { .. } => "block",
            NodeKind::Value(_) => "value",
            NodeKind::LeftName(_) => "left-name",
            NodeKind::RightName(_) => "right-name",
            NodeKind::Decl(_) => "declaration",
            NodeKind::Assign { .. } => "assignment",
            NodeKind::Call(_) => "call",
            NodeKind::Member { .. } => "member",
            NodeKind::New { .. } => "new",
            NodeKind::Fun(_) => "function",
            NodeKind::If { .. } => "if",
            NodeKind::Loop(_) => "loop",
            NodeKind::Break { .. } => "break",
            NodeKind::Continue { .. } => "continue",
            NodeKind::Return { .. } => "return",
            NodeKind::Is { .. } => "is",
            NodeKind::As { .. } => "as",
            NodeKind::Orelse { .. } => "orelse",
            NodeKind::ClassDecl(_) => "class",
        }
    }
}

/// The result of typing one node.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeInferences {
    Basic {
        ty: StaticType,
        explanations: Vec<LogEntry>,
    },
    Call {
        ty: StaticType,
        /// The signature that was selected, after substituting bindings.
        variant: StaticType,
        bindings: Vec<(TypeFormalRef, StaticType)>,
        explanations: Vec<LogEntry>,
    },
    /// Declarations and other nodes that have no value.
    None,
}

impl TypeInferences {
    pub fn ty(&self) -> Option<&StaticType> {
        match self {
            TypeInferences::Basic { ty, .. } | TypeInferences::Call { ty, .. } => Some(ty),
            TypeInferences::None => None,
        }
    }

    pub fn variant(&self) -> Option<&StaticType> {
        match self {
            TypeInferences::Call { variant, .. } => Some(variant),
            _ => None,
        }
    }

    pub fn explanations(&self) -> &[LogEntry] {
        match self {
            TypeInferences::Basic { explanations, .. }
            | TypeInferences::Call { explanations, .. } => explanations,
            TypeInferences::None => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub pos: Position,
    pub parent: Option<NodeId>,
    pub inferences: Option<TypeInferences>,
}

#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and adopts its children.
    pub fn add(&mut self, kind: NodeKind, pos: Position) -> Result<NodeId, TreeError> {
        let id = NodeId(self.nodes.len() as u32);
        let children = children_of(&kind);
        for child in &children {
            if self.nodes[child.index()].parent.is_some() {
                return Err(TreeError::NodeReused(*child));
            }
        }
        for child in children {
            self.nodes[child.index()].parent = Some(id);
        }
        self.nodes.push(Node {
            kind,
            pos,
            parent: None,
            inferences: None,
        });
        Ok(id)
    }

    /// Adds a node that has no children, which cannot fail.
    pub(crate) fn add_leaf(&mut self, kind: NodeKind, pos: Position) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            pos,
            parent: None,
            inferences: None,
        });
        id
    }

    pub fn set_root(&mut self, root: NodeId) -> Result<(), TreeError> {
        if !matches!(self.kind(root), NodeKind::Block { .. }) {
            return Err(TreeError::RootNotBlock);
        }
        self.root = Some(root);
        Ok(())
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn pos(&self, id: NodeId) -> Position {
        self.nodes[id.index()].pos
    }

    pub fn set_pos(&mut self, id: NodeId, pos: Position) {
        self.nodes[id.index()].pos = pos;
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        children_of(self.kind(id))
    }

    pub fn inferences(&self, id: NodeId) -> Option<&TypeInferences> {
        self.nodes[id.index()].inferences.as_ref()
    }

    pub fn type_of(&self, id: NodeId) -> Option<&StaticType> {
        self.inferences(id).and_then(TypeInferences::ty)
    }

    pub fn set_inferences(&mut self, id: NodeId, inferences: TypeInferences) {
        self.nodes[id.index()].inferences = Some(inferences);
    }

    pub fn clear_inferences(&mut self) {
        for node in &mut self.nodes {
            node.inferences = None;
        }
    }

    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.parent(id),
        }
    }

    pub fn is_within(&self, id: NodeId, ancestor: NodeId) -> bool {
        id == ancestor || self.ancestors(id).any(|node| node == ancestor)
    }

    /// The name a `LeftName`, `RightName` or `Decl` refers to.
    pub fn name_of(&self, id: NodeId) -> Option<ResolvedName> {
        match self.kind(id) {
            NodeKind::LeftName(name) | NodeKind::RightName(name) => Some(*name),
            NodeKind::Decl(decl) => self.name_of(decl.name),
            _ => None,
        }
    }

    pub fn as_decl(&self, id: NodeId) -> Option<&Decl> {
        match self.kind(id) {
            NodeKind::Decl(decl) => Some(decl),
            _ => None,
        }
    }

    pub fn as_fun(&self, id: NodeId) -> Option<&Fun> {
        match self.kind(id) {
            NodeKind::Fun(fun) => Some(fun),
            _ => None,
        }
    }

    pub fn as_call(&self, id: NodeId) -> Option<&Call> {
        match self.kind(id) {
            NodeKind::Call(call) => Some(call),
            _ => None,
        }
    }

    pub fn is_null_literal(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Value(Literal::Null))
    }

    /// The innermost function whose body contains `id`.
    pub fn enclosing_function(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id)
            .find(|ancestor| matches!(self.kind(*ancestor), NodeKind::Fun(_)))
    }

    /// The innermost class declaration containing `id`.
    pub fn enclosing_class(&self, id: NodeId) -> Option<NodeId> {
        self.ancestors(id)
            .find(|ancestor| matches!(self.kind(*ancestor), NodeKind::ClassDecl(_)))
    }

    /// Is `id` an actual argument of a call, as opposed to its callee?
    pub fn argument_of(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        match self.kind(parent) {
            NodeKind::Call(call) if call.args.contains(&id) => Some(parent),
            NodeKind::New { args, .. } if args.contains(&id) => Some(parent),
            _ => None,
        }
    }

    pub fn is_callee(&self, id: NodeId) -> bool {
        self.parent(id)
            .and_then(|parent| self.as_call(parent))
            .is_some_and(|call| call.callee == id)
    }
}

pub struct Ancestors<'a> {
    tree: &'a Tree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}

fn children_of(kind: &NodeKind) -> Vec<NodeId> {
    match kind {
        NodeKind::Block { statements } => statements.clone(),
        NodeKind::Value(_)
        | NodeKind::LeftName(_)
        | NodeKind::RightName(_)
        | NodeKind::Break { .. }
        | NodeKind::Continue { .. } => Vec::new(),
        NodeKind::Decl(decl) => std::iter::once(decl.name)
            .chain(decl.initializer)
            .collect(),
        NodeKind::Assign { target, value } => vec![*target, *value],
        NodeKind::Call(call) => std::iter::once(call.callee)
            .chain(call.args.iter().copied())
            .collect(),
        NodeKind::Member { receiver, .. } => vec![*receiver],
        NodeKind::New { args, .. } => args.clone(),
        NodeKind::Fun(fun) => fun
            .params
            .iter()
            .copied()
            .chain(std::iter::once(fun.body))
            .collect(),
        NodeKind::If {
            condition,
            consequent,
            alternate,
        } => [*condition, *consequent]
            .into_iter()
            .chain(*alternate)
            .collect(),
        NodeKind::Loop(lp) => match lp.check {
            CheckPosition::Before => std::iter::once(lp.condition)
                .chain(std::iter::once(lp.body))
                .chain(lp.increment)
                .collect(),
            CheckPosition::After => std::iter::once(lp.body)
                .chain(lp.increment)
                .chain(std::iter::once(lp.condition))
                .collect(),
        },
        NodeKind::Return { value } => value.iter().copied().collect(),
        NodeKind::Is { value, .. } | NodeKind::As { value, .. } => vec![*value],
        NodeKind::Orelse { body, fallback } => vec![*body, *fallback],
        NodeKind::ClassDecl(class) => class.members.clone(),
    }
}

/// Everything the typing stage reads and writes for one module.
#[derive(Debug, Clone)]
pub struct Module {
    pub source: SourceFile,
    pub tree: Tree,
    pub names: NameTable,
    pub types: TypeTable,
    /// The synthetic name holding the module's result, when there is one.
    pub output_name: Option<ResolvedName>,
}

impl Module {
    pub fn root(&self) -> Option<NodeId> {
        self.tree.root()
    }

    pub fn name_text(&self, name: ResolvedName) -> &str {
        self.names.text(name)
    }

    /// Finds the first declaration whose name has the given text.
    pub fn declaration_named(&self, text: &str) -> Option<NodeId> {
        self.tree.ids().find(|id| {
            self.tree
                .as_decl(*id)
                .and_then(|decl| self.tree.name_of(decl.name))
                .is_some_and(|name| self.names.text(name) == text)
        })
    }

    pub fn name_declared(&self, text: &str) -> Option<ResolvedName> {
        self.declaration_named(text)
            .and_then(|decl| self.tree.name_of(decl))
    }
}
