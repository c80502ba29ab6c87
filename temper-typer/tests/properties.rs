//! Property-based tests for type unions, joins, reachability and whole-module
//! typing.

use proptest::prelude::*;
use temper_typer::reachability::analyze;
use temper_typer::{typecheck_module, NodeId, StaticType, TreeBuilder, TyperOptions, TypeTable};

#[derive(Debug, Clone, Copy)]
enum Pick {
    Int,
    String,
    Boolean,
    Float,
    AnyValue,
    MapKey,
    Null,
    Bubble,
    Never,
}

fn resolve(table: &TypeTable, pick: Pick) -> StaticType {
    match pick {
        Pick::Int => table.int32(),
        Pick::String => table.string(),
        Pick::Boolean => table.boolean(),
        Pick::Float => table.float64(),
        Pick::AnyValue => table.any_value(),
        Pick::MapKey => table.simple(table.builtins().map_key),
        Pick::Null => StaticType::Null,
        Pick::Bubble => StaticType::Bubble,
        Pick::Never => StaticType::Never,
    }
}

fn any_pick() -> impl Strategy<Value = Pick> {
    prop_oneof![
        Just(Pick::Int),
        Just(Pick::String),
        Just(Pick::Boolean),
        Just(Pick::Float),
        Just(Pick::AnyValue),
        Just(Pick::MapKey),
        Just(Pick::Null),
        Just(Pick::Bubble),
        Just(Pick::Never),
    ]
}

fn nominal_pick() -> impl Strategy<Value = Pick> {
    prop_oneof![
        Just(Pick::Int),
        Just(Pick::String),
        Just(Pick::Boolean),
        Just(Pick::Float),
        Just(Pick::AnyValue),
        Just(Pick::MapKey),
    ]
}

#[derive(Debug, Clone)]
enum Lit {
    Int(i64),
    Float(f64),
    Text(String),
    Flag(bool),
}

fn any_literal() -> impl Strategy<Value = Lit> {
    prop_oneof![
        any::<i64>().prop_map(Lit::Int),
        (-1.0e6..1.0e6f64).prop_map(Lit::Float),
        "[a-z]{0,6}".prop_map(Lit::Text),
        any::<bool>().prop_map(Lit::Flag),
    ]
}

fn literal(b: &TreeBuilder, value: &Lit) -> NodeId {
    match value {
        Lit::Int(n) => b.int(*n),
        Lit::Float(x) => b.float(*x),
        Lit::Text(s) => b.string(s),
        Lit::Flag(flag) => b.boolean(*flag),
    }
}

proptest! {
    /// Every input ends up below the union.
    #[test]
    fn union_covers_its_members(picks in prop::collection::vec(any_pick(), 1..6)) {
        let table = TypeTable::new();
        let types: Vec<StaticType> = picks.iter().map(|pick| resolve(&table, *pick)).collect();
        let joined = table.union(types.clone());
        for ty in &types {
            prop_assert!(table.is_subtype(ty, &joined), "{} is not below {}", ty, joined);
        }
    }

    /// Reordering the inputs gives an equivalent union.
    #[test]
    fn union_ignores_order(picks in prop::collection::vec(any_pick(), 1..6)) {
        let table = TypeTable::new();
        let types: Vec<StaticType> = picks.iter().map(|pick| resolve(&table, *pick)).collect();
        let forward = table.union(types.clone());
        let backward = table.union(types.into_iter().rev());
        prop_assert!(table.is_subtype(&forward, &backward));
        prop_assert!(table.is_subtype(&backward, &forward));
    }

    #[test]
    fn union_is_idempotent(picks in prop::collection::vec(any_pick(), 1..6)) {
        let table = TypeTable::new();
        let joined = table.union(picks.iter().map(|pick| resolve(&table, *pick)));
        prop_assert_eq!(table.union([joined.clone(), joined.clone()]), joined);
    }

    #[test]
    fn least_upper_bound_is_symmetric(a in nominal_pick(), b in nominal_pick()) {
        let table = TypeTable::new();
        let (a, b) = (resolve(&table, a), resolve(&table, b));
        let joined = table.least_upper_bound(&a, &b);
        prop_assert_eq!(&joined, &table.least_upper_bound(&b, &a));
        prop_assert!(table.is_subtype(&a, &joined));
        prop_assert!(table.is_subtype(&b, &joined));
    }

    /// Typing a module a second time reproduces the first run exactly.
    #[test]
    fn retyping_is_stable(values in prop::collection::vec(any_literal(), 1..6)) {
        let build = || {
            TreeBuilder::build("generated.temper", |b| {
                let mut statements: Vec<NodeId> = values
                    .iter()
                    .enumerate()
                    .map(|(index, value)| b.let_decl(&format!("v{index}"), None, Some(literal(b, value))))
                    .collect();
                let reads = (0..values.len()).map(|index| b.read(&format!("v{index}"))).collect();
                statements.push(b.op("listOf", reads));
                statements
            })
            .expect("module")
        };

        let mut module = build();
        let options = TyperOptions::default();
        let (_, first) = typecheck_module(&mut module, &options);
        prop_assert!(!first.has_errors(), "{:?}", first.render());
        let first_types: Vec<Option<String>> = module
            .tree
            .ids()
            .map(|id| module.tree.type_of(id).map(ToString::to_string))
            .collect();

        let (_, second) = typecheck_module(&mut module, &options);
        prop_assert_eq!(first.render(), second.render());
        let second_types: Vec<Option<String>> = module
            .tree
            .ids()
            .map(|id| module.tree.type_of(id).map(ToString::to_string))
            .collect();
        prop_assert_eq!(first_types, second_types);

        let mut fresh = build();
        let (_, third) = typecheck_module(&mut fresh, &options);
        prop_assert_eq!(first.render(), third.render());
    }

    /// `Invalid` swallows any union it takes part in.
    #[test]
    fn invalid_absorbs_unions(picks in prop::collection::vec(any_pick(), 0..5), at in 0usize..5) {
        let table = TypeTable::new();
        let mut types: Vec<StaticType> = picks.iter().map(|pick| resolve(&table, *pick)).collect();
        let at = at.min(types.len());
        types.insert(at, StaticType::Invalid);
        let joined = table.union(types);
        prop_assert_eq!(&joined, &StaticType::Invalid);
        prop_assert!(joined.mentions_invalid());
    }

    /// An endless loop cuts off everything after it; otherwise the last
    /// statement is the only terminal.
    #[test]
    fn endless_loops_end_reachability(count in 1usize..6, spin in prop::option::of(0usize..6)) {
        let spin = spin.filter(|index| *index < count);
        let module = TreeBuilder::build("generated.temper", |b| {
            (0..count)
                .map(|index| {
                    let position = format!("{}+0", index + 1);
                    if Some(index) == spin {
                        b.place(b.while_loop(b.boolean(true), |_| Vec::new()), &position)
                    } else {
                        b.place(b.int(index as i64), &position)
                    }
                })
                .collect()
        })
        .expect("module");
        let root = module.root().expect("root");
        let analysis = analyze(&module.tree, root, module.output_name);
        let statement = |index: usize| {
            let position = format!("{}+0", index + 1);
            module
                .tree
                .ids()
                .find(|id| module.tree.pos(*id).to_string() == position)
                .expect("statement")
        };

        match spin {
            Some(index) => {
                prop_assert!(!analysis.reaches_exit);
                prop_assert!(analysis.terminals.is_empty());
                for later in index + 1..count {
                    prop_assert!(analysis.unreachable.contains(&statement(later)));
                }
                for earlier in 0..=index {
                    prop_assert!(!analysis.unreachable.contains(&statement(earlier)));
                }
            }
            None => {
                prop_assert!(analysis.reaches_exit);
                prop_assert_eq!(analysis.terminals, vec![statement(count - 1)]);
                prop_assert!(analysis.unreachable.is_empty());
            }
        }
    }
}
