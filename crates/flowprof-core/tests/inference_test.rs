use flowprof_core::ast::{Arg, AssignTarget, Node, NodeKind, Params, SuperclassRef};
use flowprof_core::{DiagnosticKind, EngineConfig, MethodType, Service, SigType, TextId};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn analyze(body: Vec<Node>) -> Service {
    init_tracing();
    let mut service = Service::with_config(EngineConfig::default());
    let text_id = TextId {
        path: "main.rb".into(),
        version: 0,
    };
    service.update_tree(text_id, Node::program(body)).unwrap();
    service
}

fn messages(service: &Service) -> Vec<String> {
    service
        .diagnostics("main.rb")
        .unwrap()
        .into_iter()
        .map(|d| d.message)
        .collect()
}

fn method_type(req: Vec<SigType>, ret: SigType) -> MethodType {
    MethodType {
        type_params: Vec::new(),
        req,
        opt: Vec::new(),
        rest: None,
        post: Vec::new(),
        block: None,
        ret,
    }
}

#[test]
fn test_wrong_number_of_arguments() {
    let service = analyze(vec![
        Node::def("foo", Params::req(&["a", "b", "c"]), vec![]),
        Node::call(None, "foo", vec![Node::int(1), Node::int(2)]),
    ]);
    let diagnostics = service.diagnostics("main.rb").unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].kind, DiagnosticKind::WrongArity);
    assert_eq!(diagnostics[0].message, "wrong number of arguments (2 for 3)");
    // nothing was bound
    assert_eq!(
        service.method_signatures(&[], false, "foo"),
        vec!["def foo: (untyped, untyped, untyped) -> nil"]
    );
}

#[test]
fn test_splat_binds_middle_params_and_rest() {
    let service = analyze(vec![
        Node::def("f", Params::req(&["a", "b"]).with_rest("r").with_post(&["c"]), vec![]),
        Node::call_with(
            None,
            "f",
            vec![
                Arg::plain(Node::int(1)),
                Arg::splat(Node::array(vec![Node::str("x")])),
                Arg::plain(Node::sym("s")),
            ],
            None,
        ),
    ]);
    assert!(messages(&service).is_empty());
    assert_eq!(
        service.method_signatures(&[], false, "f"),
        vec!["def f: (Integer, String, *String, Symbol) -> nil"]
    );
}

#[test]
fn test_declaration_takes_precedence_over_body() {
    let service = analyze(vec![
        Node::sig(
            "foo",
            vec![method_type(vec![SigType::instance("Integer")], SigType::instance("String"))],
        ),
        Node::def("foo", Params::req(&["n"]), vec![Node::lvar("n")]),
        Node::const_write("X", Node::call(None, "foo", vec![Node::int(1)])),
    ]);
    assert_eq!(service.constant_type(&["X"]).as_deref(), Some("String"));
    // parameters come from the declaration, not from callers
    assert_eq!(
        service.method_signatures(&[], false, "foo"),
        vec!["def foo: (Integer) -> Integer"]
    );
    let diagnostics = service.diagnostics("main.rb").unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].kind, DiagnosticKind::ReturnTypeMismatch);
    assert_eq!(diagnostics[0].message, "expected: String; actual: Integer");
}

#[test]
fn test_overloads_are_matched_by_argument_type() {
    let service = analyze(vec![
        Node::sig(
            "conv",
            vec![
                method_type(vec![SigType::instance("Integer")], SigType::instance("String")),
                method_type(vec![SigType::instance("String")], SigType::instance("Integer")),
            ],
        ),
        Node::const_write("A", Node::call(None, "conv", vec![Node::int(1)])),
        Node::const_write("B", Node::call(None, "conv", vec![Node::str("1")])),
        Node::const_write("C", Node::call(None, "conv", vec![Node::sym("x")])),
    ]);
    assert_eq!(service.constant_type(&["A"]).as_deref(), Some("String"));
    assert_eq!(service.constant_type(&["B"]).as_deref(), Some("Integer"));
    assert_eq!(service.constant_type(&["C"]).as_deref(), Some("untyped"));
    assert_eq!(messages(&service), vec!["failed to resolve overloads"]);
}

#[test]
fn test_undefined_method() {
    let service = analyze(vec![Node::call(Some(Node::int(1)), "nope", vec![])]);
    let diagnostics = service.diagnostics("main.rb").unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].kind, DiagnosticKind::UndefinedMethod);
    assert_eq!(diagnostics[0].message, "undefined method: Integer#nope");
}

#[test]
fn test_class_new_calls_initialize() {
    let service = analyze(vec![
        Node::class(
            "Point",
            None,
            vec![
                Node::def("initialize", Params::req(&["x"]), vec![Node::iasgn("@x", Node::lvar("x"))]),
                Node::def("x", Params::default(), vec![Node::ivar("@x")]),
            ],
        ),
        Node::const_write(
            "P",
            Node::call(Some(Node::const_read("Point")), "new", vec![Node::int(1)]),
        ),
        Node::const_write(
            "X",
            Node::call(Some(Node::const_read("P")), "x", vec![]),
        ),
        Node::call(Some(Node::const_read("Point")), "new", vec![Node::int(1), Node::int(2)]),
    ]);
    assert_eq!(service.constant_type(&["P"]).as_deref(), Some("Point"));
    assert_eq!(service.constant_type(&["X"]).as_deref(), Some("Integer"));
    assert_eq!(messages(&service), vec!["wrong number of arguments (2 for 1)"]);
}

#[test]
fn test_yield_flows_through_block() {
    let service = analyze(vec![
        Node::def("each_item", Params::default(), vec![Node::yield_(vec![Node::int(1)])]),
        Node::call_with(
            None,
            "each_item",
            vec![],
            Some(Node::block(&["x"], vec![Node::lvar("x")])),
        ),
    ]);
    assert_eq!(
        service.method_signatures(&[], false, "each_item"),
        vec!["def each_item: { (Integer) -> Integer } -> Integer"]
    );
}

#[test]
fn test_included_module_and_alias() {
    let service = analyze(vec![
        Node::module("Greeting", vec![Node::def("hello", Params::default(), vec![Node::str("hi")])]),
        Node::class(
            "Person",
            None,
            vec![Node::include("Greeting"), Node::alias("greet", "hello")],
        ),
        Node::const_write(
            "G",
            Node::call(
                Some(Node::call(Some(Node::const_read("Person")), "new", vec![])),
                "greet",
                vec![],
            ),
        ),
    ]);
    assert_eq!(service.constant_type(&["G"]).as_deref(), Some("String"));
    assert!(messages(&service).is_empty());
}

#[test]
fn test_multiple_assignment_from_tuple() {
    let service = analyze(vec![
        Node::masgn(
            vec![
                AssignTarget::Local { name: "a".into() },
                AssignTarget::Local { name: "b".into() },
                AssignTarget::Gvar { name: "$c".into() },
            ],
            Node::array(vec![Node::int(1), Node::str("s")]),
        ),
        Node::const_write("A", Node::lvar("a")),
        Node::const_write("B", Node::lvar("b")),
        Node::const_write("C", Node::gvar("$c")),
    ]);
    assert_eq!(service.constant_type(&["A"]).as_deref(), Some("Integer"));
    assert_eq!(service.constant_type(&["B"]).as_deref(), Some("String"));
    assert_eq!(service.constant_type(&["C"]).as_deref(), Some("nil"));
}

#[test]
fn test_if_joins_branches() {
    let service = analyze(vec![Node::const_write(
        "V",
        Node::if_(Node::true_(), vec![Node::int(1)], vec![]),
    )]);
    assert_eq!(service.constant_type(&["V"]).as_deref(), Some("Integer?"));
}

#[test]
fn test_rerunning_settled_sites_changes_nothing() {
    let mut service = analyze(vec![
        Node::def("id", Params::req(&["v"]), vec![Node::lvar("v")]),
        Node::const_write("X", Node::call(None, "id", vec![Node::int(1)])),
        Node::call(Some(Node::int(1)), "nope", vec![]),
    ]);
    let before = service.env().stats().clone();
    let diagnostics = service.diagnostics("main.rb").unwrap();

    let mut sites = Vec::new();
    service.tree("main.rb").unwrap().walk(&mut |n| {
        if let Some(record) = service.env().node_record(n.id) {
            sites.extend(record.sites());
        }
    });
    assert!(!sites.is_empty());
    let env = service.env_mut();
    for &site in &sites {
        env.add_run(site);
    }
    let runs = env.run_all().unwrap();
    assert!(runs >= sites.len());

    let after = service.env().stats();
    assert_eq!(after.edges_added, before.edges_added);
    assert_eq!(after.edges_removed, before.edges_removed);
    assert_eq!(after.sites_created, before.sites_created);
    assert_eq!(after.sites_destroyed, before.sites_destroyed);
    assert_eq!(service.diagnostics("main.rb").unwrap(), diagnostics);
}

fn generic_class(cpath: &str, params: &[&str], superclass: Option<(&str, Vec<SigType>)>, body: Vec<Node>) -> Node {
    Node::new(NodeKind::Class {
        cpath: vec![cpath.to_string()],
        superclass: superclass.map(|(name, args)| SuperclassRef {
            cpath: vec![name.to_string()],
            args,
        }),
        type_params: params.iter().map(|p| p.to_string()).collect(),
        body,
    })
}

fn generic_module(cpath: &str, params: &[&str], body: Vec<Node>) -> Node {
    Node::new(NodeKind::Module {
        cpath: vec![cpath.to_string()],
        type_params: params.iter().map(|p| p.to_string()).collect(),
        body,
    })
}

fn include_with(cpath: &str, args: Vec<SigType>) -> Node {
    Node::new(NodeKind::Include {
        cpath: vec![cpath.to_string()],
        args,
    })
}

fn call_on_new(class: &str, name: &str) -> Node {
    Node::call(
        Some(Node::call(Some(Node::const_read(class)), "new", vec![])),
        name,
        vec![],
    )
}

#[test]
fn test_self_calls_reach_overrides_in_subclasses() {
    let service = analyze(vec![
        Node::class(
            "Base",
            None,
            vec![
                Node::def("run", Params::default(), vec![Node::call(None, "helper", vec![])]),
                Node::def("helper", Params::default(), vec![Node::int(1)]),
            ],
        ),
        Node::class(
            "Sub",
            Some("Base"),
            vec![Node::def("helper", Params::default(), vec![Node::str("s")])],
        ),
    ]);
    assert_eq!(
        service.method_signatures(&["Base"], false, "run"),
        vec!["def run: -> (Integer | String)"]
    );
    assert!(messages(&service).is_empty());
}

#[test]
fn test_type_arguments_flow_through_superclasses_and_includes() {
    let service = analyze(vec![
        generic_class(
            "Box",
            &["T"],
            None,
            vec![Node::sig("get", vec![method_type(vec![], SigType::var("T"))])],
        ),
        generic_class("IntBox", &[], Some(("Box", vec![SigType::instance("Integer")])), vec![]),
        generic_module(
            "Container",
            &["E"],
            vec![Node::sig("first", vec![method_type(vec![], SigType::var("E"))])],
        ),
        Node::class(
            "Names",
            None,
            vec![include_with("Container", vec![SigType::instance("String")])],
        ),
        // the include argument is read with the map of the including class
        generic_class("Wrapper", &["T"], None, vec![include_with("Container", vec![SigType::var("T")])]),
        generic_class("IntWrapper", &[], Some(("Wrapper", vec![SigType::instance("Integer")])), vec![]),
        Node::const_write("X", call_on_new("IntBox", "get")),
        Node::const_write("Y", call_on_new("Names", "first")),
        Node::const_write("Z", call_on_new("IntWrapper", "first")),
    ]);
    assert_eq!(service.constant_type(&["X"]).as_deref(), Some("Integer"));
    assert_eq!(service.constant_type(&["Y"]).as_deref(), Some("String"));
    assert_eq!(service.constant_type(&["Z"]).as_deref(), Some("Integer"));
    assert!(messages(&service).is_empty());
}

#[test]
fn test_instance_variables_unify_at_the_defining_ancestor() {
    let service = analyze(vec![
        Node::class(
            "Base",
            None,
            vec![Node::def(
                "initialize",
                Params::req(&["x"]),
                vec![Node::iasgn("@v", Node::lvar("x"))],
            )],
        ),
        Node::class(
            "Child",
            Some("Base"),
            vec![
                Node::def("v", Params::default(), vec![Node::ivar("@v")]),
                Node::def("set", Params::default(), vec![Node::iasgn("@v", Node::str("s"))]),
            ],
        ),
        Node::const_write(
            "V",
            Node::call(
                Some(Node::call(Some(Node::const_read("Child")), "new", vec![Node::int(1)])),
                "v",
                vec![],
            ),
        ),
    ]);
    assert_eq!(
        service.method_signatures(&["Child"], false, "v"),
        vec!["def v: -> (Integer | String)"]
    );
    assert_eq!(service.constant_type(&["V"]).as_deref(), Some("(Integer | String)"));
}

#[test]
fn test_alias_cycle_ends_the_lookup() {
    let service = analyze(vec![
        Node::class("A", None, vec![Node::alias("a", "b"), Node::alias("b", "a")]),
        Node::const_write("R", call_on_new("A", "a")),
    ]);
    assert_eq!(service.constant_type(&["R"]).as_deref(), Some("untyped"));
    assert_eq!(messages(&service), vec!["undefined method: A#a"]);
}

#[test]
fn test_global_written_in_one_method_read_in_another() {
    let service = analyze(vec![
        Node::def("set", Params::default(), vec![Node::gasgn("$g", Node::str("s"))]),
        Node::def("get", Params::default(), vec![Node::gvar("$g")]),
        Node::const_write("G", Node::call(None, "get", vec![])),
    ]);
    assert_eq!(
        service.method_signatures(&[], false, "get"),
        vec!["def get: -> String"]
    );
    assert_eq!(service.constant_type(&["G"]).as_deref(), Some("String"));
}
