use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct ShapeId(pub(crate) u32);

impl ShapeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeFormalId(pub(crate) u32);

impl TypeFormalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A reference to a type parameter. The name is carried along for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeFormalRef {
    pub id: TypeFormalId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NominalType {
    pub shape: ShapeId,
    pub name: String,
    pub args: Vec<StaticType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub formals: Vec<TypeFormalRef>,
    pub params: Vec<StaticType>,
    pub rest: Option<Box<StaticType>>,
    pub ret: Box<StaticType>,
}

impl FunctionType {
    pub fn new(params: Vec<StaticType>, ret: StaticType) -> Self {
        Self {
            formals: Vec::new(),
            params,
            rest: None,
            ret: Box::new(ret),
        }
    }

    pub fn generic(formals: Vec<TypeFormalRef>, params: Vec<StaticType>, ret: StaticType) -> Self {
        Self {
            formals,
            params,
            rest: None,
            ret: Box::new(ret),
        }
    }

    pub fn with_rest(mut self, rest: StaticType) -> Self {
        self.rest = Some(Box::new(rest));
        self
    }

    pub fn is_generic(&self) -> bool {
        !self.formals.is_empty()
    }

    /// The parameter type that the actual at `index` binds to, if any.
    pub fn param_for(&self, index: usize) -> Option<&StaticType> {
        self.params
            .get(index)
            .or_else(|| self.rest.as_deref())
    }

    pub fn accepts_arity(&self, count: usize) -> bool {
        if self.rest.is_some() {
            count >= self.params.len()
        } else {
            count == self.params.len()
        }
    }

    /// Drops the type formals after substituting their solutions.
    pub fn instantiate(&self, solution: &HashMap<TypeFormalId, StaticType>) -> FunctionType {
        FunctionType {
            formals: Vec::new(),
            params: self
                .params
                .iter()
                .map(|param| param.substitute(solution))
                .collect(),
            rest: self
                .rest
                .as_ref()
                .map(|rest| Box::new(rest.substitute(solution))),
            ret: Box::new(self.ret.substitute(solution)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StaticType {
    Nominal(NominalType),
    Param(TypeFormalRef),
    Function(FunctionType),
    /// A normalized union of at least two members.
    Or(Vec<StaticType>),
    Null,
    /// The recoverable failure marker.
    Bubble,
    Void,
    Never,
    Top,
    Invalid,
}

impl StaticType {
    pub fn nominal(shape: ShapeId, name: impl Into<String>, args: Vec<StaticType>) -> Self {
        StaticType::Nominal(NominalType {
            shape,
            name: name.into(),
            args,
        })
    }

    pub fn function(params: Vec<StaticType>, ret: StaticType) -> Self {
        StaticType::Function(FunctionType::new(params, ret))
    }

    pub fn mentions_invalid(&self) -> bool {
        match self {
            StaticType::Invalid => true,
            StaticType::Nominal(nominal) => nominal.args.iter().any(StaticType::mentions_invalid),
            StaticType::Function(function) => {
                function.ret.mentions_invalid()
                    || function.params.iter().any(StaticType::mentions_invalid)
                    || function
                        .rest
                        .as_deref()
                        .is_some_and(StaticType::mentions_invalid)
            }
            StaticType::Or(members) => members.iter().any(StaticType::mentions_invalid),
            _ => false,
        }
    }

    pub fn alternatives(&self) -> &[StaticType] {
        match self {
            StaticType::Or(members) => members,
            other => std::slice::from_ref(other),
        }
    }

    pub fn includes_bubble(&self) -> bool {
        self.alternatives().contains(&StaticType::Bubble)
    }

    pub fn includes_null(&self) -> bool {
        self.alternatives().contains(&StaticType::Null)
    }

    pub fn without_bubble(&self) -> StaticType {
        self.without(&StaticType::Bubble)
    }

    pub fn without_null(&self) -> StaticType {
        self.without(&StaticType::Null)
    }

    fn without(&self, dropped: &StaticType) -> StaticType {
        match self {
            StaticType::Or(members) => {
                StaticType::union(members.iter().filter(|member| *member != dropped).cloned())
            }
            other if other == dropped => StaticType::Never,
            other => other.clone(),
        }
    }

    pub fn nullable(self) -> StaticType {
        StaticType::union([self, StaticType::Null])
    }

    pub fn or_bubble(self) -> StaticType {
        StaticType::union([self, StaticType::Bubble])
    }

    /// Structural union: flattens, drops `Never`, removes duplicates.
    /// `Invalid` and `Top` absorb everything else.
    pub fn union(types: impl IntoIterator<Item = StaticType>) -> StaticType {
        let mut flat: Vec<StaticType> = Vec::new();
        for ty in types {
            match ty {
                StaticType::Or(members) => flat.extend(members),
                other => flat.push(other),
            }
        }
        if flat.contains(&StaticType::Invalid) {
            return StaticType::Invalid;
        }
        if flat.contains(&StaticType::Top) {
            return StaticType::Top;
        }

        let mut members: Vec<StaticType> = Vec::new();
        for ty in flat {
            if ty != StaticType::Never && !members.contains(&ty) {
                members.push(ty);
            }
        }
        // Null and Bubble render as suffixes so keep them last.
        members.sort_by_key(|member| match member {
            StaticType::Null => 1,
            StaticType::Bubble => 2,
            _ => 0,
        });

        match members.len() {
            0 => StaticType::Never,
            1 => members.pop().unwrap_or(StaticType::Never),
            _ => StaticType::Or(members),
        }
    }

    pub fn substitute(&self, solution: &HashMap<TypeFormalId, StaticType>) -> StaticType {
        if solution.is_empty() {
            return self.clone();
        }
        match self {
            StaticType::Param(formal) => solution
                .get(&formal.id)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            StaticType::Nominal(nominal) => StaticType::Nominal(NominalType {
                shape: nominal.shape,
                name: nominal.name.clone(),
                args: nominal
                    .args
                    .iter()
                    .map(|arg| arg.substitute(solution))
                    .collect(),
            }),
            StaticType::Function(function) => {
                // Inner formals shadow outer solutions.
                let inner: HashMap<TypeFormalId, StaticType> = solution
                    .iter()
                    .filter(|(id, _)| !function.formals.iter().any(|formal| formal.id == **id))
                    .map(|(id, ty)| (*id, ty.clone()))
                    .collect();
                let mut substituted = function.instantiate(&inner);
                substituted.formals = function.formals.clone();
                StaticType::Function(substituted)
            }
            StaticType::Or(members) => {
                StaticType::union(members.iter().map(|member| member.substitute(solution)))
            }
            other => other.clone(),
        }
    }

    pub fn mentions_formal(&self, id: TypeFormalId) -> bool {
        match self {
            StaticType::Param(formal) => formal.id == id,
            StaticType::Nominal(nominal) => nominal.args.iter().any(|arg| arg.mentions_formal(id)),
            StaticType::Function(function) => {
                function.ret.mentions_formal(id)
                    || function.params.iter().any(|param| param.mentions_formal(id))
                    || function
                        .rest
                        .as_deref()
                        .is_some_and(|rest| rest.mentions_formal(id))
            }
            StaticType::Or(members) => members.iter().any(|member| member.mentions_formal(id)),
            _ => false,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, StaticType::Function(_))
    }

    pub fn as_function(&self) -> Option<&FunctionType> {
        match self {
            StaticType::Function(function) => Some(function),
            _ => None,
        }
    }

    pub fn as_nominal(&self) -> Option<&NominalType> {
        match self {
            StaticType::Nominal(nominal) => Some(nominal),
            _ => None,
        }
    }
}

impl fmt::Display for NominalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.args.is_empty() {
            f.write_str("<")?;
            write_joined(f, &self.args, ", ")?;
            f.write_str(">")?;
        }
        Ok(())
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("fn ")?;
        if !self.formals.is_empty() {
            let names = self
                .formals
                .iter()
                .map(|formal| formal.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, "<{names}>")?;
        }
        f.write_str("(")?;
        write_joined(f, &self.params, ", ")?;
        if let Some(rest) = &self.rest {
            if !self.params.is_empty() {
                f.write_str(", ")?;
            }
            write!(f, "...{rest}")?;
        }
        f.write_str("): ")?;
        let ret = self.ret.as_ref();
        let needs_parens = match ret {
            StaticType::Or(members) => {
                members
                    .iter()
                    .filter(|member| **member != StaticType::Null)
                    .count()
                    > 1
            }
            _ => false,
        };
        if needs_parens {
            write!(f, "({ret})")
        } else {
            write!(f, "{ret}")
        }
    }
}

impl fmt::Display for StaticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaticType::Nominal(nominal) => write!(f, "{nominal}"),
            StaticType::Param(formal) => f.write_str(&formal.name),
            StaticType::Function(function) => write!(f, "{function}"),
            StaticType::Or(members) => {
                let rest: Vec<&StaticType> = members
                    .iter()
                    .filter(|member| **member != StaticType::Null)
                    .collect();
                let nullable = rest.len() < members.len();
                match (nullable, rest.as_slice()) {
                    (true, [single]) if single.is_function() => write!(f, "({single})?"),
                    (true, [single]) => write!(f, "{single}?"),
                    (true, _) => {
                        f.write_str("(")?;
                        write_joined(f, rest.iter().copied(), " | ")?;
                        f.write_str(")?")
                    }
                    (false, _) => write_joined(f, members, " | "),
                }
            }
            StaticType::Null => f.write_str("Null"),
            StaticType::Bubble => f.write_str("Bubble"),
            StaticType::Void => f.write_str("Void"),
            StaticType::Never => f.write_str("Never"),
            StaticType::Top => f.write_str("Top"),
            StaticType::Invalid => f.write_str("Invalid"),
        }
    }
}

fn write_joined<'a, I>(f: &mut fmt::Formatter<'_>, items: I, separator: &str) -> fmt::Result
where
    I: IntoIterator<Item = &'a StaticType>,
{
    for (index, item) in items.into_iter().enumerate() {
        if index > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}
