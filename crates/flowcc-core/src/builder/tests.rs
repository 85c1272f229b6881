use pretty_assertions::assert_eq;

use super::*;
use crate::ast::{Call, ClassDef, Expr, ExceptHandler, Stmt, StmtKind, TryStmt};
use crate::render::edge_line;

fn stmt(kind: StmtKind) -> Stmt {
    Stmt::new(kind, 1)
}

fn assign(name: &str, value: Expr) -> Stmt {
    stmt(StmtKind::Assign {
        targets: vec![Expr::name(name)],
        value,
    })
}

fn call_stmt(func: &str, args: Vec<Expr>) -> Stmt {
    stmt(StmtKind::Expr(Expr::call(Expr::name(func), args)))
}

fn method_stmt(receiver: &str, method: &str) -> Stmt {
    stmt(StmtKind::Expr(Expr::call(Expr::attr(Expr::name(receiver), method), vec![])))
}

fn print(text: &str) -> Stmt {
    call_stmt("print", vec![Expr::str(text)])
}

fn def(name: &str, params: &[&str], body: Vec<Stmt>) -> FunctionDef {
    FunctionDef {
        name: name.to_string(),
        params: params.iter().map(|p| p.to_string()).collect(),
        decorators: Vec::new(),
        body,
    }
}

fn function(name: &str, params: &[&str], body: Vec<Stmt>) -> Stmt {
    stmt(StmtKind::FunctionDef(def(name, params, body)))
}

fn car_class() -> Stmt {
    let init = def(
        "__init__",
        &["self", "speed"],
        vec![stmt(StmtKind::Assign {
            targets: vec![Expr::attr(Expr::name("self"), "speed")],
            value: Expr::name("speed"),
        })],
    );
    let drive = def("drive", &["self"], vec![print("vroom")]);
    stmt(StmtKind::ClassDef(ClassDef {
        name: "Car".to_string(),
        bases: Vec::new(),
        body: vec![stmt(StmtKind::FunctionDef(init)), stmt(StmtKind::FunctionDef(drive))],
    }))
}

fn build_with(body: Vec<Stmt>, config: &FlowConfig) -> FlowGraph {
    GraphBuilder::new(config, &EntrySelection::default()).build(&Program::new(body))
}

fn build(body: Vec<Stmt>) -> FlowGraph {
    build_with(body, &FlowConfig::default())
}

fn edges(graph: &FlowGraph) -> Vec<String> {
    graph
        .edges()
        .iter()
        .map(|edge| edge_line(graph, edge).trim().to_string())
        .collect()
}

fn texts(graph: &FlowGraph) -> Vec<String> {
    graph.nodes().map(|node| node.text.clone()).collect()
}

#[test]
fn test_empty_program_links_start_to_end() {
    let graph = build(vec![]);
    assert_eq!(edges(&graph), vec!["start1 --> end2"]);
}

#[test]
fn test_if_without_else() {
    let graph = build(vec![stmt(StmtKind::If {
        test: Expr::opaque("x > 0"),
        body: vec![print("pos")],
        orelse: vec![],
    })]);
    assert_eq!(
        edges(&graph),
        vec![
            "start1 --> if_cond3",
            "if_cond3 -->|True| print4",
            "print4 --> merge5",
            "if_cond3 -->|False| merge5",
            "merge5 --> end2",
        ]
    );
    assert_eq!(graph.node(NodeId(4)).map(|n| n.text.as_str()), Some("print(`pos`)"));
}

#[test]
fn test_if_else_both_branches_merge() {
    let graph = build(vec![stmt(StmtKind::If {
        test: Expr::opaque("x > 0"),
        body: vec![print("pos")],
        orelse: vec![print("neg")],
    })]);
    assert_eq!(
        edges(&graph),
        vec![
            "start1 --> if_cond3",
            "if_cond3 -->|True| print4",
            "print4 --> merge5",
            "if_cond3 -->|False| print6",
            "print6 --> merge5",
            "merge5 --> end2",
        ]
    );
}

#[test]
fn test_for_loop_with_break() {
    let graph = build(vec![stmt(StmtKind::For {
        target: Expr::name("i"),
        iter: Expr::name("items"),
        body: vec![
            stmt(StmtKind::If {
                test: Expr::opaque("i > 3"),
                body: vec![stmt(StmtKind::Break)],
                orelse: vec![],
            }),
            stmt(StmtKind::AugAssign {
                target: Expr::name("total"),
                op: "+=".to_string(),
                value: Expr::name("i"),
            }),
        ],
        orelse: vec![],
    })]);
    assert_eq!(
        edges(&graph),
        vec![
            "start1 --> for_loop3",
            "for_loop3 -->|Next Iteration| if_cond5",
            "if_cond5 -->|True| loop_exit4",
            "if_cond5 -->|False| merge6",
            "merge6 --> aug_assign7",
            "aug_assign7 -->|Next Iteration| for_loop3",
            "for_loop3 -->|Done| loop_exit4",
            "loop_exit4 --> end2",
        ]
    );
    assert!(texts(&graph).contains(&"for i in items".to_string()));
}

#[test]
fn test_recursive_return_links_back_to_call() {
    let recursive = Expr::Opaque {
        text: "n * fact(n - 1)".to_string(),
        children: vec![
            Expr::name("n"),
            Expr::call(Expr::name("fact"), vec![Expr::opaque("n - 1")]),
        ],
    };
    let graph = build(vec![
        function(
            "fact",
            &["n"],
            vec![
                stmt(StmtKind::If {
                    test: Expr::opaque("n <= 1"),
                    body: vec![stmt(StmtKind::Return(Some(Expr::int(1))))],
                    orelse: vec![],
                }),
                stmt(StmtKind::Return(Some(recursive))),
            ],
        ),
        call_stmt("fact", vec![Expr::int(5)]),
    ]);
    let edges = edges(&graph);
    assert!(edges.contains(&"start1 --> call3".to_string()));
    assert!(edges.contains(&"return6 --> end_call4".to_string()));
    assert!(edges.contains(&"return8 -->|Recursion| call3".to_string()));
    assert!(edges.contains(&"end_call4 --> end2".to_string()));
    assert_eq!(graph.node(NodeId(3)).map(|n| n.text.as_str()), Some("Call: fact(5)"));
    assert_eq!(graph.nodes_in_scope(&Scope::function("fact")).len(), 3);
}

#[test]
fn test_nesting_limit_stops_splicing() {
    let config = FlowConfig::default().with_max_nesting_depth(1);
    let graph = build_with(
        vec![
            function("b", &[], vec![print("deep")]),
            function("a", &[], vec![call_stmt("b", vec![])]),
            call_stmt("a", vec![]),
        ],
        &config,
    );
    let texts = texts(&graph);
    assert!(texts.contains(&"Call: a()".to_string()));
    assert!(texts.contains(&"Call: b() (Max nesting depth 1 exceeded)".to_string()));
    assert!(!texts.contains(&"print(`deep`)".to_string()));
}

#[test]
fn test_node_budget_reports_once() {
    let config = FlowConfig::default().with_max_nodes(4);
    let graph = build_with(
        vec![
            assign("a", Expr::call(Expr::name("f"), vec![])),
            assign("b", Expr::call(Expr::name("g"), vec![])),
            assign("c", Expr::call(Expr::name("h"), vec![])),
        ],
        &config,
    );
    assert_eq!(graph.node_count(), 4);
    assert_eq!(
        edges(&graph),
        vec![
            "start1 --> assign3",
            "assign3 --> assign4",
            "assign4 -->|Max node limit 4 exceeded| end2",
        ]
    );
}

#[test]
fn test_method_body_drawn_once_and_reused() {
    let graph = build(vec![
        car_class(),
        assign("car", Expr::call(Expr::name("Car"), vec![Expr::int(10)])),
        method_stmt("car", "drive"),
        method_stmt("car", "drive"),
    ]);
    let texts = texts(&graph);
    assert_eq!(texts.iter().filter(|t| *t == "Method: drive()").count(), 1);
    assert!(texts.contains(&"Constructor: __init__(speed)".to_string()));

    let edges = edges(&graph);
    assert!(edges.contains(&"assign4 <-->|Call and Return| method5".to_string()));
    assert!(edges.contains(&"method_call7 <-->|Call and Return| method8".to_string()));
    assert!(edges.contains(&"method_call10 <-->|Call and Return| method8".to_string()));
    assert!(edges.contains(&"print9 --> end2".to_string()));
    assert!(
        graph
            .children_of(&Scope::class("Car"))
            .any(|scope| *scope == Scope::method("Car", "drive"))
    );
}

#[test]
fn test_sequential_flow_uses_one_way_call_edges() {
    let config = FlowConfig::default().with_sequential_flow(true);
    let graph = build_with(
        vec![
            car_class(),
            assign("car", Expr::call(Expr::name("Car"), vec![Expr::int(10)])),
            method_stmt("car", "drive"),
        ],
        &config,
    );
    let edges = edges(&graph);
    assert!(edges.contains(&"assign4 -->|Call| method5".to_string()));
    assert!(edges.contains(&"method_call7 -->|Call| method8".to_string()));
    assert!(edges.iter().all(|edge| !edge.contains("<-->")));
}

#[test]
fn test_method_diagnostics() {
    let graph = build(vec![
        car_class(),
        assign("car", Expr::call(Expr::name("Car"), vec![Expr::int(10)])),
        method_stmt("car", "fly"),
        method_stmt("car", "speed"),
        method_stmt("thing", "spin"),
    ]);
    let texts = texts(&graph);
    assert!(texts.contains(&"❌ Method 'fly' not found in Car".to_string()));
    assert!(texts.contains(&"⚠️ 'speed' is a property, not a method".to_string()));
    assert!(texts.contains(&"❌ Could not resolve class for method 'spin'".to_string()));
}

#[test]
fn test_static_call_on_instance_method() {
    let graph = build(vec![car_class(), method_stmt("Car", "drive")]);
    assert!(
        texts(&graph)
            .contains(&"❌ Instance method 'drive' called on class 'Car' without instantiation".to_string())
    );
}

#[test]
fn test_simple_statements_consolidate() {
    let graph = build(vec![assign("a", Expr::int(1)), assign("b", Expr::int(2))]);
    assert_eq!(graph.node(NodeId(3)).map(|n| n.text.as_str()), Some("a = 1\nb = 2"));
    assert_eq!(edges(&graph), vec!["start1 --> assign3", "assign3 --> end2"]);

    let config = FlowConfig::default().with_merge_common_nodes(false);
    let graph = build_with(vec![assign("a", Expr::int(1)), assign("b", Expr::int(2))], &config);
    assert_eq!(graph.node_count(), 4);
}

#[test]
fn test_only_first_import_is_drawn() {
    let graph = build(vec![
        stmt(StmtKind::Import {
            names: vec!["os".to_string()],
        }),
        stmt(StmtKind::Import {
            names: vec!["sys".to_string()],
        }),
        stmt(StmtKind::ImportFrom {
            module: Some("json".to_string()),
            names: vec!["loads".to_string()],
        }),
    ]);
    assert_eq!(graph.node(NodeId(3)).map(|n| n.text.as_str()), Some("import os\n..."));
    assert_eq!(graph.node_count(), 3);
}

#[test]
fn test_branch_label_survives_undrawn_statement() {
    let graph = build(vec![
        stmt(StmtKind::Import {
            names: vec!["os".to_string()],
        }),
        assign("x", Expr::int(1)),
        stmt(StmtKind::If {
            test: Expr::name("x"),
            body: vec![
                stmt(StmtKind::Import {
                    names: vec!["sys".to_string()],
                }),
                assign("y", Expr::int(2)),
            ],
            orelse: vec![assign("z", Expr::int(3))],
        }),
    ]);
    let edges = edges(&graph);
    assert!(edges.contains(&"if_cond5 -->|True| assign6".to_string()), "{edges:?}");
    assert!(edges.contains(&"if_cond5 -->|False| assign8".to_string()), "{edges:?}");
}

#[test]
fn test_main_guard_gets_its_own_end() {
    let graph = build(vec![stmt(StmtKind::If {
        test: Expr::opaque("__name__ == '__main__'"),
        body: vec![print("hi")],
        orelse: vec![],
    })]);
    assert_eq!(
        edges(&graph),
        vec![
            "start1 --> if_cond3",
            "if_cond3 -->|True| print4",
            "print4 --> end5",
            "if_cond3 -->|False| end2",
        ]
    );
}

#[test]
fn test_try_except_finally() {
    let graph = build(vec![stmt(StmtKind::Try(TryStmt {
        body: vec![assign("x", Expr::call(Expr::name("risky"), vec![]))],
        handlers: vec![ExceptHandler {
            kind: Some(Expr::name("ValueError")),
            name: None,
            body: vec![print("bad")],
        }],
        orelse: vec![],
        finalbody: vec![print("done")],
    }))]);
    assert_eq!(
        edges(&graph),
        vec![
            "start1 --> try3",
            "try3 -->|Try| assign5",
            "assign5 --> merge4",
            "try3 -->|Exception| except6",
            "except6 --> print7",
            "print7 --> merge4",
            "merge4 --> finally8",
            "finally8 --> print9",
            "print9 --> finally8",
            "finally8 --> end2",
        ]
    );
}

#[test]
fn test_exit_call_ends_branch() {
    let exit = Expr::call(Expr::attr(Expr::name("sys"), "exit"), vec![Expr::int(1)]);
    let graph = build(vec![stmt(StmtKind::Expr(exit)), print("unreachable")]);
    assert_eq!(graph.node(NodeId(3)).map(|n| n.text.as_str()), Some("Exit: sys.exit(1)"));
    assert_eq!(edges(&graph), vec!["start1 --> exit_function3"]);
}

#[test]
fn test_breakpoint_marks_node() {
    let config = FlowConfig::default().with_breakpoints([2]);
    let graph = build_with(
        vec![
            Stmt::new(StmtKind::Expr(Expr::call(Expr::name("setup"), vec![])), 1),
            Stmt::new(StmtKind::Expr(Expr::call(Expr::name("work"), vec![])), 2),
        ],
        &config,
    );
    let node = graph.node(NodeId(4)).unwrap();
    assert_eq!(node.text, "🔴 work()");
    assert!(node.highlighted);
    assert_eq!(node.line, Some(2));
    assert!(!graph.node(NodeId(3)).unwrap().highlighted);
}

#[test]
fn test_print_splices_called_functions() {
    let inner = Expr::call(Expr::name("square"), vec![Expr::int(3)]);
    let graph = build(vec![
        function("square", &["x"], vec![stmt(StmtKind::Return(Some(Expr::opaque("x * x"))))]),
        stmt(StmtKind::Expr(Expr::Call(Call {
            func: Box::new(Expr::name("print")),
            args: vec![inner],
            keywords: Vec::new(),
        }))),
    ]);
    let edges = edges(&graph);
    assert!(edges.contains(&"print3 --> call4".to_string()));
    assert!(edges.contains(&"return6 --> end_call5".to_string()));
    let instance = Scope::CallInstance {
        function: "square".to_string(),
        index: 1,
    };
    assert_eq!(graph.nodes_in_scope(&instance).len(), 1);
}
