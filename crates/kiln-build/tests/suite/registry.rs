use kiln_build::{HandlerRegistry, KindHandler, StaticHandler, TargetKind, GENERIC_HANDLER_ID};

#[derive(Debug)]
struct TestHandler {
    kind: String,
}

impl KindHandler for TestHandler {
    fn output_groups(&self) -> Vec<String> {
        vec![format!("{}_outputs", self.kind)]
    }
}

#[test]
fn unclaimed_kinds_fall_back_to_generic() {
    let registry = HandlerRegistry::new();
    let kind = TargetKind::new("genrule");
    assert_eq!(registry.find_id(&kind), GENERIC_HANDLER_ID);
    assert_eq!(registry.find(&kind).output_groups(), vec!["default".to_string()]);
    assert!(registry.find(&kind).build_flags().is_empty());
}

#[test]
fn first_matching_registration_wins() {
    let mut registry = HandlerRegistry::new();
    registry.register_static(
        "tests",
        |kind| kind.as_str().ends_with("_test"),
        StaticHandler::new(["default", "test_logs"]),
    );
    registry.register(
        "per-kind",
        |_| true,
        |kind| TestHandler {
            kind: kind.to_string(),
        },
    );

    let test = TargetKind::new("java_test");
    assert_eq!(registry.find_id(&test), "tests");
    assert_eq!(
        registry.find(&test).output_groups(),
        vec!["default".to_string(), "test_logs".to_string()]
    );

    let binary = TargetKind::new("py_binary");
    assert_eq!(registry.find_id(&binary), "per-kind");
    assert_eq!(
        registry.find(&binary).output_groups(),
        vec!["py_binary_outputs".to_string()]
    );

    assert_eq!(
        registry.ids().collect::<Vec<_>>(),
        vec!["tests", "per-kind", GENERIC_HANDLER_ID]
    );
}

#[test]
fn reregistering_an_id_replaces_it_in_place() {
    let mut registry = HandlerRegistry::new();
    registry.register_static("a", |_| false, StaticHandler::new(["x"]));
    registry.register_static("b", |_| false, StaticHandler::new(["y"]));
    registry.register_static("a", |_| true, StaticHandler::new(["z"]));

    assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["a", "b", GENERIC_HANDLER_ID]);
    assert_eq!(
        registry.find(&TargetKind::new("sh_binary")).output_groups(),
        vec!["z".to_string()]
    );
}

#[test]
fn lookup_by_id_bypasses_predicates() {
    let registry = HandlerRegistry::with_builtin_handlers();
    let kind = TargetKind::new("genrule");

    let jvm = registry.by_id("jvm", &kind).expect("jvm handler");
    assert!(jvm.output_groups().contains(&"_source_jars".to_string()));
    assert!(registry.by_id(GENERIC_HANDLER_ID, &kind).is_some());
    assert!(registry.by_id("nope", &kind).is_none());
}

#[test]
fn builtin_handlers_cover_common_rule_families() {
    let registry = HandlerRegistry::with_builtin_handlers();
    let cases = [
        ("java_binary", "jvm"),
        ("kt_jvm_library", "jvm"),
        ("android_binary", "android"),
        ("cc_binary", "cc"),
        ("cc_library", GENERIC_HANDLER_ID),
        ("cc_toolchain", GENERIC_HANDLER_ID),
        ("sh_test", GENERIC_HANDLER_ID),
    ];
    for (kind, expected) in cases {
        assert_eq!(registry.find_id(&TargetKind::new(kind)), expected, "{kind}");
    }
    assert_eq!(
        registry.find(&TargetKind::new("cc_test")).build_flags(),
        vec!["--compilation_mode=dbg".to_string()]
    );
}
