use temper_typer::reachability::{analyze, completes_normally};
use temper_typer::{Fun, Module, NodeId, Reachability, Signature, TreeBuilder};

fn at(module: &Module, position: &str) -> NodeId {
    module
        .tree
        .ids()
        .find(|id| module.tree.pos(*id).to_string() == position)
        .unwrap_or_else(|| panic!("no node at {position}"))
}

fn of_root(module: &Module) -> Reachability {
    let root = module.root().expect("root");
    analyze(&module.tree, root, module.output_name)
}

fn only_function(module: &Module) -> Fun {
    module
        .tree
        .ids()
        .find_map(|id| module.tree.as_fun(id).cloned())
        .expect("a function literal")
}

#[test]
fn both_arms_of_an_if_are_terminals() {
    let module = TreeBuilder::build("reach.temper", |b| {
        let flag = b.let_decl("flag", None, Some(b.boolean(true)));
        let branch = b.if_else(
            b.read("flag"),
            |b| vec![b.place(b.int(1), "2+4")],
            |b| vec![b.place(b.int(2), "3+4")],
        );
        vec![flag, branch]
    })
    .expect("module");

    let analysis = of_root(&module);
    assert_eq!(analysis.terminals, vec![at(&module, "2+4"), at(&module, "3+4")]);
    assert!(analysis.reaches_exit);
    assert!(!analysis.sets_name);
    assert!(analysis.unreachable.is_empty());
}

#[test]
fn later_statements_replace_earlier_terminals() {
    let module = TreeBuilder::build("reach.temper", |b| {
        vec![b.place(b.int(1), "1+0"), b.place(b.string("last"), "2+0")]
    })
    .expect("module");

    assert_eq!(of_root(&module).terminals, vec![at(&module, "2+0")]);
}

#[test]
fn code_after_an_endless_loop_is_unreachable() {
    let module = TreeBuilder::build("reach.temper", |b| {
        let spin = b.while_loop(b.boolean(true), |_| Vec::new());
        vec![spin, b.place(b.int(1), "3+0")]
    })
    .expect("module");

    let analysis = of_root(&module);
    assert!(!analysis.reaches_exit);
    assert!(analysis.terminals.is_empty());
    assert!(analysis.unreachable.contains(&at(&module, "3+0")));
}

#[test]
fn break_lets_control_leave_a_true_loop() {
    let module = TreeBuilder::build("reach.temper", |b| {
        let spin = b.while_loop(b.boolean(true), |b| vec![b.break_(None)]);
        vec![spin, b.place(b.int(1), "3+0")]
    })
    .expect("module");

    let analysis = of_root(&module);
    assert!(analysis.reaches_exit);
    assert_eq!(analysis.terminals, vec![at(&module, "3+0")]);
    assert!(analysis.unreachable.is_empty());
}

#[test]
fn labelled_break_exits_the_outer_loop() {
    let module = TreeBuilder::build("reach.temper", |b| {
        let outer = b.labeled_while("outer", b.boolean(true), |b| {
            vec![b.while_loop(b.boolean(true), |b| vec![b.break_(Some("outer"))])]
        });
        vec![outer, b.place(b.int(1), "4+0")]
    })
    .expect("module");

    let analysis = of_root(&module);
    assert!(analysis.reaches_exit);
    assert_eq!(analysis.terminals, vec![at(&module, "4+0")]);
}

#[test]
fn statements_after_a_jump_are_unreachable() {
    let module = TreeBuilder::build("reach.temper", |b| {
        let lp = b.while_loop(b.op("<", vec![b.int(1), b.int(2)]), |b| {
            vec![b.continue_(None), b.place(b.int(7), "2+4")]
        });
        vec![lp]
    })
    .expect("module");

    let analysis = of_root(&module);
    assert!(analysis.reaches_exit);
    assert!(analysis.unreachable.contains(&at(&module, "2+4")));
}

#[test]
fn assigning_the_output_on_one_branch_only_possibly_sets_it() {
    let module = TreeBuilder::build("reach.temper", |b| {
        let branch = b.if_then(b.op("<", vec![b.int(1), b.int(2)]), |b| {
            vec![b.assign("return__0", b.int(1))]
        });
        vec![branch]
    })
    .expect("module");

    let analysis = of_root(&module);
    assert!(analysis.sets_name);
    assert!(!analysis.definitely_sets_name);
}

#[test]
fn assigning_the_output_directly_ends_terminal_collection() {
    let module = TreeBuilder::build("reach.temper", |b| {
        vec![b.assign("return__0", b.int(1)), b.place(b.int(2), "2+0")]
    })
    .expect("module");

    let analysis = of_root(&module);
    assert!(analysis.sets_name);
    assert!(analysis.definitely_sets_name);
    assert!(analysis.terminals.is_empty());
    assert!(analysis.reaches_exit);
}

#[test]
fn return_sets_the_function_result() {
    let module = TreeBuilder::build("reach.temper", |b| {
        let f = b.fun_decl("f", Signature::new().returns("Int"), |b| {
            vec![b.return_(Some(b.int(1))), b.place(b.int(2), "3+2")]
        });
        vec![f]
    })
    .expect("module");

    let fun = only_function(&module);
    let analysis = analyze(&module.tree, fun.body, Some(fun.return_name));
    assert!(analysis.sets_name);
    assert!(analysis.definitely_sets_name);
    assert!(!analysis.reaches_exit);
    assert!(analysis.terminals.is_empty());
    assert!(analysis.unreachable.contains(&at(&module, "3+2")));
}

#[test]
fn panic_does_not_end_the_block() {
    let module = TreeBuilder::build("reach.temper", |b| {
        vec![b.op("panic", Vec::new()), b.place(b.int(1), "2+0")]
    })
    .expect("module");

    let analysis = of_root(&module);
    assert!(analysis.reaches_exit);
    assert_eq!(analysis.terminals, vec![at(&module, "2+0")]);
}

#[test]
fn completes_normally_looks_at_every_arm() {
    let module = TreeBuilder::build("reach.temper", |b| {
        let f = b.fun_decl("f", Signature::new().param("n", "Int").returns("Int"), |b| {
            let one_arm = b.place(
                b.if_then(b.op("<", vec![b.read("n"), b.int(0)]), |b| {
                    vec![b.return_(Some(b.int(0)))]
                }),
                "2+2",
            );
            let both_arms = b.place(
                b.if_else(
                    b.op("<", vec![b.read("n"), b.int(10)]),
                    |b| vec![b.return_(Some(b.int(1)))],
                    |b| vec![b.return_(Some(b.int(2)))],
                ),
                "3+2",
            );
            vec![one_arm, both_arms]
        });
        vec![f]
    })
    .expect("module");

    assert!(completes_normally(&module.tree, at(&module, "2+2")));
    assert!(!completes_normally(&module.tree, at(&module, "3+2")));
}

#[test]
fn an_endless_loop_after_setting_the_output_still_sets_it() {
    let module = TreeBuilder::build("reach.temper", |b| {
        let set = b.assign("return__0", b.void());
        let spin = b.while_loop(b.boolean(true), |b| vec![b.op("randomInt", Vec::new())]);
        vec![set, spin]
    })
    .expect("module");

    let analysis = of_root(&module);
    assert!(!analysis.reaches_exit);
    assert!(analysis.sets_name);
    assert!(analysis.terminals.is_empty());
}
