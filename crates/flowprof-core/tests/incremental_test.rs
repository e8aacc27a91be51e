use flowprof_core::ast::{Node, Params};
use flowprof_core::{EngineConfig, EngineError, MethodType, Service, SigType};
use proptest::prelude::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn json(body: Vec<Node>) -> String {
    serde_json::to_string(&Node::program(body)).unwrap()
}

fn messages(service: &Service, path: &str) -> Vec<String> {
    service
        .diagnostics(path)
        .unwrap()
        .into_iter()
        .map(|d| d.message)
        .collect()
}

fn returns(ret: &str) -> MethodType {
    MethodType {
        type_params: Vec::new(),
        req: Vec::new(),
        opt: Vec::new(),
        rest: None,
        post: Vec::new(),
        block: None,
        ret: SigType::instance(ret),
    }
}

fn constant_program(value: Node) -> String {
    json(vec![
        Node::const_write("X", value),
        Node::sig("foo", vec![returns("Integer")]),
        Node::def("foo", Params::default(), vec![Node::const_read("X")]),
        Node::const_write("Y", Node::call(None, "foo", vec![])),
    ])
}

#[test]
fn test_identical_update_round_trip() {
    init_tracing();
    let mut service = Service::new();
    let source = json(vec![
        Node::class(
            "Counter",
            None,
            vec![Node::def("bump", Params::req(&["by"]), vec![Node::lvar("by")])],
        ),
        Node::const_write(
            "C",
            Node::call(
                Some(Node::call(Some(Node::const_read("Counter")), "new", vec![])),
                "bump",
                vec![Node::int(1)],
            ),
        ),
        Node::call(Some(Node::int(1)), "missing", vec![]),
    ]);

    service.update_file("a.rb", &source).unwrap();
    let declarations = service.dump_declarations("a.rb").unwrap();
    let diagnostics = service.diagnostics("a.rb").unwrap();
    let live = service.env().stats().live_sites.clone();

    service.update_file("a.rb", &source).unwrap();
    assert_eq!(service.version("a.rb"), Some(1));
    assert_eq!(service.dump_declarations("a.rb").unwrap(), declarations);
    assert_eq!(service.diagnostics("a.rb").unwrap(), diagnostics);
    assert_eq!(service.env().stats().live_sites, live);
}

#[test]
fn test_constant_edit_propagates_end_to_end() {
    init_tracing();
    let mut service = Service::new();
    service
        .update_file("a.rb", &constant_program(Node::str("hello")))
        .unwrap();
    assert_eq!(service.constant_type(&["X"]).as_deref(), Some("String"));
    assert_eq!(service.constant_type(&["Y"]).as_deref(), Some("Integer"));
    assert_eq!(
        messages(&service, "a.rb"),
        vec!["expected: Integer; actual: String"]
    );

    service
        .update_file("a.rb", &constant_program(Node::int(42)))
        .unwrap();
    assert_eq!(service.constant_type(&["X"]).as_deref(), Some("Integer"));
    assert_eq!(
        service.method_signatures(&[], false, "foo"),
        vec!["def foo: -> Integer"]
    );
    assert!(messages(&service, "a.rb").is_empty());
}

#[test]
fn test_callee_edit_clears_caller_diagnostic() {
    init_tracing();
    let mut service = Service::new();
    service
        .update_file(
            "lib.rb",
            &json(vec![Node::def("foo", Params::req(&["a", "b", "c"]), vec![])]),
        )
        .unwrap();
    service
        .update_file(
            "main.rb",
            &json(vec![Node::call(None, "foo", vec![Node::int(1), Node::int(2)])]),
        )
        .unwrap();
    assert_eq!(
        messages(&service, "main.rb"),
        vec!["wrong number of arguments (2 for 3)"]
    );

    service
        .update_file(
            "lib.rb",
            &json(vec![Node::def("foo", Params::req(&["a", "b"]), vec![])]),
        )
        .unwrap();
    assert!(messages(&service, "main.rb").is_empty());
    assert_eq!(
        service.method_signatures(&[], false, "foo"),
        vec!["def foo: (Integer, Integer) -> nil"]
    );
}

#[test]
fn test_removing_a_file_retracts_its_definitions() {
    init_tracing();
    let mut service = Service::new();
    service
        .update_file(
            "foo.rb",
            &json(vec![Node::class(
                "Foo",
                None,
                vec![Node::def("bar", Params::default(), vec![Node::int(1)])],
            )]),
        )
        .unwrap();
    service
        .update_file(
            "main.rb",
            &json(vec![Node::const_write(
                "X",
                Node::call(
                    Some(Node::call(Some(Node::const_read("Foo")), "new", vec![])),
                    "bar",
                    vec![],
                ),
            )]),
        )
        .unwrap();
    assert_eq!(service.constant_type(&["X"]).as_deref(), Some("Integer"));

    service.remove_file("foo.rb").unwrap();
    assert_eq!(service.constant_type(&["X"]).as_deref(), Some("untyped"));
    assert_eq!(service.constant_type(&["Foo"]), None);
    assert!(service.tree("foo.rb").is_none());
}

#[test]
fn test_reuse_does_not_change_results() {
    init_tracing();
    let v0 = constant_program(Node::str("a"));
    let v1 = constant_program(Node::nil());

    let mut reusing = Service::new();
    let mut fresh = Service::with_config(EngineConfig::default().without_reuse());
    for service in [&mut reusing, &mut fresh] {
        service.update_file("a.rb", &v0).unwrap();
        service.update_file("a.rb", &v1).unwrap();
    }
    assert_eq!(
        reusing.dump_declarations("a.rb").unwrap(),
        fresh.dump_declarations("a.rb").unwrap()
    );
    assert_eq!(
        reusing.diagnostics("a.rb").unwrap(),
        fresh.diagnostics("a.rb").unwrap()
    );
    assert_eq!(
        reusing.env().stats().live_sites,
        fresh.env().stats().live_sites
    );
}

#[test]
fn test_fuel_bounds_a_drain() {
    let mut service = Service::with_config(EngineConfig::default().with_fuel(1));
    let err = service
        .update_file(
            "a.rb",
            &json(vec![
                Node::def("id", Params::req(&["v"]), vec![Node::lvar("v")]),
                Node::call(None, "id", vec![Node::int(1)]),
            ]),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::FuelExhausted { runs: 1 }));
    assert!(service.tree("a.rb").is_none());
}

fn greeter(include: bool) -> String {
    let body = if include { vec![Node::include("M")] } else { vec![] };
    json(vec![
        Node::module("M", vec![Node::def("hi", Params::default(), vec![Node::int(1)])]),
        Node::class("A", None, body),
        Node::const_write(
            "R",
            Node::call(
                Some(Node::call(Some(Node::const_read("A")), "new", vec![])),
                "hi",
                vec![],
            ),
        ),
    ])
}

#[test]
fn test_reused_include_can_still_be_removed() {
    init_tracing();
    let mut service = Service::new();
    service.update_file("a.rb", &greeter(true)).unwrap();
    service.update_file("a.rb", &greeter(true)).unwrap();
    assert_eq!(service.constant_type(&["R"]).as_deref(), Some("Integer"));

    service.update_file("a.rb", &greeter(false)).unwrap();
    assert_eq!(service.constant_type(&["R"]).as_deref(), Some("untyped"));
    assert_eq!(messages(&service, "a.rb"), vec!["undefined method: A#hi"]);
}

#[test]
fn test_reused_alias_can_still_be_removed() {
    init_tracing();
    let program = |alias: bool| {
        let mut body = vec![Node::def("foo", Params::default(), vec![Node::int(1)])];
        if alias {
            body.push(Node::alias("bar", "foo"));
        }
        json(vec![
            Node::class("A", None, body),
            Node::const_write(
                "R",
                Node::call(
                    Some(Node::call(Some(Node::const_read("A")), "new", vec![])),
                    "bar",
                    vec![],
                ),
            ),
        ])
    };
    let mut service = Service::new();
    service.update_file("a.rb", &program(true)).unwrap();
    service.update_file("a.rb", &program(true)).unwrap();
    assert_eq!(service.constant_type(&["R"]).as_deref(), Some("Integer"));

    service.update_file("a.rb", &program(false)).unwrap();
    assert_eq!(messages(&service, "a.rb"), vec!["undefined method: A#bar"]);
}

#[test]
fn test_reused_constant_declaration_can_still_be_removed() {
    init_tracing();
    let declared = json(vec![Node::sig_const("LIMIT", SigType::instance("Integer"))]);
    let mut service = Service::new();
    service.update_file("a.rb", &declared).unwrap();
    service.update_file("a.rb", &declared).unwrap();
    assert_eq!(service.constant_type(&["LIMIT"]).as_deref(), Some("Integer"));

    service.update_file("a.rb", &json(vec![])).unwrap();
    assert_eq!(service.constant_type(&["LIMIT"]), None);
}

fn ivar_family(base_writes: bool) -> String {
    let base_body = if base_writes {
        vec![Node::def("reset", Params::default(), vec![Node::iasgn("@v", Node::nil())])]
    } else {
        vec![]
    };
    let child = |name: &str, value: Node| {
        Node::class(
            name,
            Some("Base"),
            vec![
                Node::def("write", Params::default(), vec![Node::iasgn("@v", value)]),
                Node::def("read", Params::default(), vec![Node::ivar("@v")]),
            ],
        )
    };
    json(vec![
        Node::class("Base", None, base_body),
        child("Left", Node::str("s")),
        child("Right", Node::int(1)),
    ])
}

#[test]
fn test_reused_ivar_write_can_still_be_removed() {
    init_tracing();
    let mut service = Service::new();
    service.update_file("a.rb", &ivar_family(true)).unwrap();
    service.update_file("a.rb", &ivar_family(true)).unwrap();
    assert_eq!(
        service.method_signatures(&["Left"], false, "read"),
        vec!["def read: -> (Integer | String)?"]
    );

    // without the write in Base each subclass keeps its own variable
    service.update_file("a.rb", &ivar_family(false)).unwrap();
    assert_eq!(
        service.method_signatures(&["Left"], false, "read"),
        vec!["def read: -> String"]
    );
    assert_eq!(
        service.method_signatures(&["Right"], false, "read"),
        vec!["def read: -> Integer"]
    );
}

#[test]
fn test_repeated_edits_do_not_grow_the_arenas() {
    init_tracing();
    let mut service = Service::new();
    let source = json(vec![Node::const_write(
        "X",
        Node::call(Some(Node::int(1)), "nope", vec![]),
    )]);
    service.update_file("a.rb", &source).unwrap();
    service.update_file("a.rb", &source).unwrap();
    let vertices = service.env().vertex_slots();
    let sites = service.env().site_slots();

    for _ in 0..50 {
        service.update_file("a.rb", &source).unwrap();
    }
    assert_eq!(service.env().vertex_slots(), vertices);
    assert_eq!(service.env().site_slots(), sites);
    assert_eq!(service.env().stats().live_site_count(), 1);
    assert_eq!(messages(&service, "a.rb"), vec!["undefined method: Integer#nope"]);
}

#[test]
fn test_failed_update_keeps_previous_version() {
    init_tracing();
    let mut service = Service::with_config(EngineConfig::default().with_fuel(1));
    let v0 = json(vec![Node::const_write("X", Node::int(1))]);
    service.update_file("a.rb", &v0).unwrap();

    let v1 = json(vec![
        Node::const_write("X", Node::str("s")),
        Node::def("id", Params::req(&["v"]), vec![Node::lvar("v")]),
        Node::call(None, "id", vec![Node::int(1)]),
    ]);
    let err = service.update_file("a.rb", &v1).unwrap_err();
    assert!(matches!(err, EngineError::FuelExhausted { .. }));
    assert_eq!(service.version("a.rb"), Some(0));
    assert_eq!(service.constant_type(&["X"]).as_deref(), Some("Integer"));
    assert!(service.method_signatures(&[], false, "id").is_empty());

    // the restored version is still torn down by the next update
    service.update_file("a.rb", &json(vec![])).unwrap();
    assert_eq!(service.constant_type(&["X"]), None);
}

fn literal(choice: u8) -> Node {
    match choice % 4 {
        0 => Node::int(1),
        1 => Node::str("s"),
        2 => Node::nil(),
        _ => Node::array(vec![Node::int(1)]),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_edit_sequence_matches_fresh_analysis(choices in prop::collection::vec(any::<u8>(), 1..6)) {
        let mut edited = Service::new();
        for &choice in &choices {
            edited.update_file("a.rb", &constant_program(literal(choice))).unwrap();
        }
        let last = *choices.last().unwrap();
        let mut fresh = Service::new();
        fresh.update_file("a.rb", &constant_program(literal(last))).unwrap();

        prop_assert_eq!(edited.constant_type(&["X"]), fresh.constant_type(&["X"]));
        prop_assert_eq!(edited.constant_type(&["Y"]), fresh.constant_type(&["Y"]));
        prop_assert_eq!(messages(&edited, "a.rb"), messages(&fresh, "a.rb"));
        prop_assert_eq!(edited.env().stats().live_sites.clone(), fresh.env().stats().live_sites.clone());
    }
}
