use std::collections::{HashMap, HashSet};

use crate::table::TypeTable;
use crate::types::{StaticType, TypeFormalId, TypeFormalRef};

/// Collects bounds on the type formals of one call and picks a binding for
/// each.
pub(crate) struct Solver<'t> {
    table: &'t TypeTable,
    formals: Vec<TypeFormalRef>,
    /// Formals of other, unfinished calls. Constraints that mention them are
    /// skipped.
    wildcards: &'t HashSet<TypeFormalId>,
    lower: HashMap<TypeFormalId, StaticType>,
    upper: HashMap<TypeFormalId, StaticType>,
}

pub(crate) struct Solution {
    pub bindings: HashMap<TypeFormalId, StaticType>,
    pub open: Vec<TypeFormalRef>,
}

/// A solved formal whose value falls outside its bounds.
pub(crate) struct BoundViolation {
    pub formal: TypeFormalRef,
    pub actual: StaticType,
    pub bounds: Vec<StaticType>,
}

impl<'t> Solver<'t> {
    pub(crate) fn new(
        table: &'t TypeTable,
        formals: Vec<TypeFormalRef>,
        wildcards: &'t HashSet<TypeFormalId>,
    ) -> Self {
        Self {
            table,
            formals,
            wildcards,
            lower: HashMap::new(),
            upper: HashMap::new(),
        }
    }

    fn owns(&self, id: TypeFormalId) -> bool {
        self.formals.iter().any(|formal| formal.id == id)
    }

    fn is_wild(&self, ty: &StaticType) -> bool {
        self.wildcards.iter().any(|id| ty.mentions_formal(*id))
    }

    /// `actual` flows into a slot typed `pattern`.
    pub(crate) fn add_lower(&mut self, pattern: &StaticType, actual: &StaticType) {
        if matches!(actual, StaticType::Invalid | StaticType::Never) || self.is_wild(actual) {
            return;
        }
        match (pattern, actual) {
            (StaticType::Param(formal), _) if self.owns(formal.id) => {
                let joined = match self.lower.get(&formal.id) {
                    Some(existing) => self.table.least_upper_bound(existing, actual),
                    None => actual.clone(),
                };
                self.lower.insert(formal.id, joined);
            }
            (StaticType::Nominal(expected), StaticType::Nominal(given)) => {
                if let Some(viewed) = self.table.supertype_as(given, expected.shape) {
                    for (left, right) in expected.args.iter().zip(viewed.args.iter()) {
                        self.add_lower(left, right);
                    }
                }
            }
            (StaticType::Function(expected), StaticType::Function(given)) => {
                for (left, right) in expected.params.iter().zip(given.params.iter()) {
                    self.add_upper(left, right);
                }
                self.add_lower(&expected.ret, &given.ret);
            }
            (StaticType::Or(_), _) => {
                let mut pattern = pattern.clone();
                let mut actual = actual.clone();
                if pattern.includes_null() {
                    pattern = pattern.without_null();
                    actual = actual.without_null();
                }
                if pattern.includes_bubble() {
                    pattern = pattern.without_bubble();
                    actual = actual.without_bubble();
                }
                if !matches!(pattern, StaticType::Or(_)) && actual != StaticType::Never {
                    self.add_lower(&pattern, &actual);
                }
            }
            _ => {}
        }
    }

    /// A slot typed `pattern` flows into something that expects `expected`.
    pub(crate) fn add_upper(&mut self, pattern: &StaticType, expected: &StaticType) {
        if matches!(expected, StaticType::Invalid | StaticType::Top) || self.is_wild(expected) {
            return;
        }
        match (pattern, expected) {
            (StaticType::Param(formal), _) if self.owns(formal.id) => {
                let met = match self.upper.get(&formal.id) {
                    Some(existing) => self.table.greatest_lower_bound(existing, expected),
                    None => expected.clone(),
                };
                self.upper.insert(formal.id, met);
            }
            (StaticType::Nominal(given), StaticType::Nominal(target)) => {
                if let Some(viewed) = self.table.supertype_as(given, target.shape) {
                    for (left, right) in viewed.args.iter().zip(target.args.iter()) {
                        self.add_upper(left, right);
                    }
                }
            }
            (StaticType::Function(given), StaticType::Function(target)) => {
                for (left, right) in given.params.iter().zip(target.params.iter()) {
                    self.add_lower(left, right);
                }
                self.add_upper(&given.ret, &target.ret);
            }
            (_, StaticType::Or(_)) if !matches!(pattern, StaticType::Or(_)) => {
                let narrowed = expected.without_null().without_bubble();
                if !matches!(narrowed, StaticType::Or(_) | StaticType::Never) {
                    self.add_upper(pattern, &narrowed);
                }
            }
            _ => {}
        }
    }

    /// Explicit arguments win, then lower bounds, then upper bounds. Formals
    /// with none of these stay open.
    pub(crate) fn solve(&self, explicit: &[StaticType]) -> Solution {
        let mut bindings = HashMap::new();
        let mut open = Vec::new();
        for (index, formal) in self.formals.iter().enumerate() {
            let chosen = explicit
                .get(index)
                .or_else(|| self.lower.get(&formal.id))
                .or_else(|| self.upper.get(&formal.id));
            match chosen {
                Some(ty) => {
                    bindings.insert(formal.id, ty.clone());
                }
                None => open.push(formal.clone()),
            }
        }
        Solution { bindings, open }
    }

    /// The binding for a formal nothing constrains: its first bound, or
    /// `AnyValue`.
    pub(crate) fn default_for(table: &TypeTable, formal: &TypeFormalRef) -> StaticType {
        table
            .formal(formal.id)
            .bounds
            .first()
            .cloned()
            .unwrap_or_else(|| table.any_value())
    }

    pub(crate) fn check_bounds(
        table: &TypeTable,
        formals: &[TypeFormalRef],
        bindings: &HashMap<TypeFormalId, StaticType>,
    ) -> Option<BoundViolation> {
        formals.iter().find_map(|formal| {
            let actual = bindings.get(&formal.id)?;
            if actual.mentions_invalid() {
                return None;
            }
            let bounds: Vec<StaticType> = table
                .formal(formal.id)
                .bounds
                .iter()
                .map(|bound| bound.substitute(bindings))
                .collect();
            let fits = bounds.iter().all(|bound| table.is_subtype(actual, bound));
            (!fits).then(|| BoundViolation {
                formal: formal.clone(),
                actual: actual.clone(),
                bounds,
            })
        })
    }
}
