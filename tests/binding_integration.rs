//! End-to-end binding behavior over compiled units
//!
//! Each test compiles real markup through the public API, builds a
//! tree, and observes the dataflow.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};

use amsel::{DataSource, Interface, Model};

fn compile(iface: &Arc<Interface>, yaml: &str) -> Arc<amsel::Instantiator> {
    iface.compile_str("test.aml.yaml", yaml).unwrap()
}

// ─────────────────────────────────────────────────────────────────
// Literals, defaults, styling
// ─────────────────────────────────────────────────────────────────

#[test]
fn literal_round_trip() {
    let iface = Interface::new();
    let unit = compile(
        &iface,
        r#"
Stack:
  Orientation: Vertical
  children:
    - Label: { Width: "42", Text: plain }
"#,
    );
    let root = unit.instantiate(&iface).unwrap();
    assert_eq!(root.get_value("Orientation"), json!("Vertical"));
    let label = &root.children()[0];
    assert_eq!(label.get_value("Width"), json!(42));
    assert_eq!(label.get_value("Text"), json!("plain"));
}

#[test]
fn enum_flags_literal() {
    let iface = Interface::new();
    let unit = compile(&iface, "Label: { Anchors: \"left, top\" }");
    let root = unit.instantiate(&iface).unwrap();
    assert_eq!(root.get_value("Anchors"), json!("Left|Top"));
}

#[test]
fn bad_literal_aborts_compile() {
    let iface = Interface::new();
    let err = iface
        .compile_str("bad", "Label: { Width: wide }")
        .unwrap_err();
    assert!(err.to_string().contains("AML-031"));
}

#[test]
fn style_defaults_applied_before_bindings() {
    let iface = Interface::new();
    iface
        .styles()
        .load_str("Big:\n  FontSize: \"30\"\nLabel:\n  FontSize: \"10\"\n")
        .unwrap();
    let unit = compile(
        &iface,
        r#"
Stack:
  children:
    - Label: { Style: Big }
    - Label: { Text: styled }
"#,
    );
    let root = unit.instantiate(&iface).unwrap();
    assert_eq!(root.children()[0].get_value("FontSize"), json!(30));
    assert_eq!(root.children()[1].get_value("FontSize"), json!(10));
}

#[test]
fn quoted_constant_is_a_literal_not_a_binding() {
    let iface = Interface::new();
    let unit = compile(&iface, "Label: { Text: \"{'fixed text'}\" }");
    let root = unit.instantiate(&iface).unwrap();
    assert_eq!(root.get_value("Text"), json!("fixed text"));
    assert!(unit.wiring().is_empty());
}

// ─────────────────────────────────────────────────────────────────
// Tree property bindings
// ─────────────────────────────────────────────────────────────────

#[test]
fn sibling_binding_pushes_and_initializes() {
    let iface = Interface::new();
    let unit = compile(
        &iface,
        r#"
Stack:
  children:
    - TextBox: { Name: Input, Text: "start" }
    - Label: { Text: "{../Input.Text}" }
"#,
    );
    let root = unit.instantiate(&iface).unwrap();
    let input = root.find_by_name("Input").unwrap();
    let label = &root.children()[1];

    // destination initialized with the current source value
    assert_eq!(label.get_value("Text"), json!("start"));

    input.set_value("Text", json!("typed"));
    assert_eq!(label.get_value("Text"), json!("typed"));
}

#[test]
fn one_dispatcher_fans_out_to_all_destinations() {
    let iface = Interface::new();
    let unit = compile(
        &iface,
        r#"
Stack:
  children:
    - Slider: { Name: S, Value: "25" }
    - Label: { Text: "{../S.Value}" }
    - Label: { Width: "{../S.Value}" }
"#,
    );
    // both bindings share the watched node: one dispatcher group
    let summary = unit.binding_summary();
    assert_eq!(summary.dispatcher_groups, 1);
    assert_eq!(summary.channels, 1);

    let root = unit.instantiate(&iface).unwrap();
    let slider = root.find_by_name("S").unwrap();
    slider.set_value("Value", json!(60.0));
    // converted per destination kind
    assert_eq!(root.children()[1].get_value("Text"), json!("60.0"));
    assert_eq!(root.children()[2].get_value("Width"), json!(60));
}

#[test]
fn ancestor_climb_binding() {
    let iface = Interface::new();
    let unit = compile(
        &iface,
        r#"
Stack:
  Gap: "7"
  children:
    - Stack:
        children:
          - Label: { Text: "{../../.Gap}" }
"#,
    );
    let root = unit.instantiate(&iface).unwrap();
    let label = &root.children()[0].children()[0];
    assert_eq!(label.get_value("Text"), json!("7"));
}

#[test]
fn climb_above_root_is_a_compile_error() {
    let iface = Interface::new();
    let err = iface
        .compile_str("deep", "Label: { Text: \"{../../Other.Text}\" }")
        .unwrap_err();
    assert!(err.to_string().contains("AML-012"));
}

#[test]
fn unknown_member_aborts_compile() {
    let iface = Interface::new();
    let err = iface
        .compile_str("bad", "Label: { Nonsense: \"1\" }")
        .unwrap_err();
    assert!(err.to_string().contains("AML-021"));
    // nothing partial is cached
    assert_eq!(iface.unit_cache_len(), 0);
}

#[test]
fn unresolved_name_aborts_compile() {
    let iface = Interface::new();
    let err = iface
        .compile_str("bad", "Stack:\n  children:\n    - Label: { Text: \"{../Ghost.Text}\" }\n")
        .unwrap_err();
    assert!(err.to_string().contains("AML-022"));
}

#[test]
fn name_disambiguation_prefers_own_subtree() {
    let iface = Interface::new();
    // subtree B declares its Caption first; the binding in subtree A
    // must still resolve to A's Caption
    let unit = compile(
        &iface,
        r#"
Stack:
  children:
    - Stack:
        children:
          - Label: { Name: Caption, Text: "from B" }
    - Stack:
        children:
          - Label: { Name: Caption, Text: "from A" }
          - Label: { Text: "{../Caption.Text}" }
"#,
    );
    let root = unit.instantiate(&iface).unwrap();
    let reader = &root.children()[1].children()[1];
    assert_eq!(reader.get_value("Text"), json!("from A"));

    // and repeat compilation resolves identically
    iface.reset_caches();
    let unit2 = iface
        .compile_str(
            "again",
            r#"
Stack:
  children:
    - Stack:
        children:
          - Label: { Name: Caption, Text: "from B" }
    - Stack:
        children:
          - Label: { Name: Caption, Text: "from A" }
          - Label: { Text: "{../Caption.Text}" }
"#,
        )
        .unwrap();
    let root2 = unit2.instantiate(&iface).unwrap();
    assert_eq!(
        root2.children()[1].children()[1].get_value("Text"),
        json!("from A")
    );
}

#[test]
fn two_way_tree_binding_has_no_reentrant_loop() {
    let iface = Interface::new();
    let unit = compile(
        &iface,
        r#"
Stack:
  children:
    - TextBox: { Name: A, Text: "initial" }
    - TextBox: { Name: B, Text: "{^../A.Text}" }
"#,
    );
    let root = unit.instantiate(&iface).unwrap();
    let a = root.find_by_name("A").unwrap();
    let b = root.find_by_name("B").unwrap();
    assert_eq!(b.get_value("Text"), json!("initial"));

    let b_fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&b_fired);
    b.value_changed().subscribe_fn(move |change| {
        if change.member == "Text" {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    });

    // setting A to its current value must not re-fire B
    a.set_value("Text", json!("initial"));
    assert_eq!(b_fired.load(Ordering::Relaxed), 0);

    // a real change fires B exactly once
    a.set_value("Text", json!("changed"));
    assert_eq!(b_fired.load(Ordering::Relaxed), 1);

    // and the reverse direction syncs A
    b.set_value("Text", json!("typed into B"));
    assert_eq!(a.get_value("Text"), json!("typed into B"));
}

#[test]
fn propertyless_notification_drives_bindings() {
    let iface = Interface::new();
    let unit = compile(
        &iface,
        r#"
Stack:
  children:
    - Label: { Name: Ticker }
    - Label: { Text: "{../Ticker.Pulse}" }
"#,
    );
    let root = unit.instantiate(&iface).unwrap();
    let ticker = root.find_by_name("Ticker").unwrap();
    ticker.notify("Pulse", json!("tick"));
    assert_eq!(root.children()[1].get_value("Text"), json!("tick"));
}

// ─────────────────────────────────────────────────────────────────
// Datasource bindings
// ─────────────────────────────────────────────────────────────────

#[test]
fn datasource_binding_mirrors_member_chain() {
    let iface = Interface::new();
    let unit = compile(&iface, "Label: { Text: \"{price.currency}\" }");
    let root = unit.instantiate(&iface).unwrap();

    let model = Model::from_value("Order", json!({"price": {"currency": "EUR"}}));
    root.set_data_source(Some(model.clone()));
    assert_eq!(root.get_value("Text"), json!("EUR"));

    model.set_member("price", json!({"currency": "USD"}));
    assert_eq!(root.get_value("Text"), json!("USD"));
}

#[test]
fn datasource_reassignment_detaches_old_object() {
    let iface = Interface::new();
    let unit = compile(&iface, "Label: { Text: \"{name}\" }");
    let root = unit.instantiate(&iface).unwrap();

    let first = Model::from_value("P", json!({"name": "first"}));
    let second = Model::from_value("P", json!({"name": "second"}));

    root.set_data_source(Some(first.clone()));
    assert_eq!(root.get_value("Text"), json!("first"));

    // destination re-initialized from the new object immediately
    root.set_data_source(Some(second.clone()));
    assert_eq!(root.get_value("Text"), json!("second"));

    // a later change to the old object must not affect the node
    first.set_member("name", json!("stale"));
    assert_eq!(root.get_value("Text"), json!("second"));

    second.set_member("name", json!("fresh"));
    assert_eq!(root.get_value("Text"), json!("fresh"));
}

#[test]
fn two_way_datasource_binding_writes_back() {
    let iface = Interface::new();
    let unit = compile(&iface, "Checkbox: { IsChecked: \"{^done}\" }");
    let root = unit.instantiate(&iface).unwrap();

    let model = Model::from_value("Todo", json!({"done": false}));
    root.set_data_source(Some(model.clone()));
    // the datasource side wins the initial value
    assert_eq!(root.get_value("IsChecked"), json!(false));

    root.set_value("IsChecked", json!(true));
    assert_eq!(model.get("done"), Some(json!(true)));

    model.set_member("done", json!(false));
    assert_eq!(root.get_value("IsChecked"), json!(false));
}

#[test]
fn shape_mismatch_degrades_that_binding_only() {
    let iface = Interface::new();
    let unit = compile(
        &iface,
        r#"
Stack:
  children:
    - Label: { Text: "{title}" }
    - Label: { Text: "{missing.deeply}" }
"#,
    );
    let root = unit.instantiate(&iface).unwrap();
    let model = Model::from_value("Duck", json!({"title": "works"}));
    root.set_data_source(None);
    for child in root.children() {
        child.set_data_source(Some(model.clone()));
    }
    assert_eq!(root.children()[0].get_value("Text"), json!("works"));
    // the mismatched binding stayed a no-op; the default survives
    assert_eq!(root.children()[1].get_value("Text"), json!(""));
}

#[test]
fn declared_datasource_type_checked_at_compile_time() {
    let iface = Interface::new();
    // Label is a registered type with no 'Frequency' member
    let err = iface
        .compile_str(
            "bad",
            "Label: { DataSourceType: Label, Text: \"{Frequency}\" }",
        )
        .unwrap_err();
    assert!(err.to_string().contains("AML-021"));

    // unregistered declared types stay duck-typed
    iface
        .compile_str(
            "ok",
            "Label: { DataSourceType: WeatherReport, Text: \"{Frequency}\" }",
        )
        .unwrap();
}

// ─────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────

#[test]
fn inline_handler_runs_assignments() {
    let iface = Interface::new();
    let unit = compile(
        &iface,
        r#"
Stack:
  children:
    - Button:
        Caption: toggle
        MouseClick: "{IsPressed=true; Status.Text='clicked'}"
    - Label: { Name: Status }
"#,
    );
    let root = unit.instantiate(&iface).unwrap();
    let button = &root.children()[0];
    button.raise_event("MouseClick", Value::Null);
    assert_eq!(button.get_value("IsPressed"), json!(true));
    assert_eq!(root.find_by_name("Status").unwrap().get_value("Text"), json!("clicked"));
}

#[test]
fn named_handler_invokes_datasource_method() {
    let iface = Interface::new();
    let unit = compile(&iface, "Button: { Caption: save, MouseClick: on_save }");
    let root = unit.instantiate(&iface).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let model = Model::new("Form");
    model.on(
        "on_save",
        Arc::new(move |_sender, _args| {
            counter.fetch_add(1, Ordering::Relaxed);
        }),
    );
    root.set_data_source(Some(model));

    root.raise_event("MouseClick", Value::Null);
    assert_eq!(calls.load(Ordering::Relaxed), 1);

    // a datasource without the method degrades to a no-op
    root.set_data_source(Some(Model::new("Other")));
    root.raise_event("MouseClick", Value::Null);
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

// ─────────────────────────────────────────────────────────────────
// Templates
// ─────────────────────────────────────────────────────────────────

#[test]
fn default_template_binds_host_members() {
    let iface = Interface::new();
    let unit = compile(&iface, "Window: { Caption: \"My Window\" }");
    let root = unit.instantiate(&iface).unwrap();

    let title = root.find_by_name("TitleBar").unwrap();
    assert_eq!(title.get_value("Text"), json!("My Window"));

    root.set_value("Caption", json!("Renamed"));
    assert_eq!(title.get_value("Text"), json!("Renamed"));
}

#[test]
fn inline_template_overrides_default() {
    let iface = Interface::new();
    let unit = compile(
        &iface,
        r#"
Window:
  Caption: inline
  children:
    - Template:
        children:
          - Stack:
              children:
                - Label: { Name: Custom, Text: "{./Caption}" }
                - Container: { Name: Content }
"#,
    );
    let root = unit.instantiate(&iface).unwrap();
    assert!(root.find_by_name("TitleBar").is_none());
    assert_eq!(
        root.find_by_name("Custom").unwrap().get_value("Text"),
        json!("inline")
    );
}

#[test]
fn window_content_lands_in_content_slot() {
    let iface = Interface::new();
    let unit = compile(
        &iface,
        r#"
Window:
  Caption: holder
  children:
    - Label: { Name: Body, Text: inside }
"#,
    );
    let root = unit.instantiate(&iface).unwrap();
    let body = root.find_by_name("Body").unwrap();
    // rendered parent is the template's content container, the
    // logical parent stays the templated host
    assert_eq!(body.parent().unwrap().name().as_deref(), Some("Content"));
    assert!(Arc::ptr_eq(&body.logical_parent().unwrap(), &root));
}

#[test]
fn template_rebinds_when_logical_parent_changes() {
    let iface = Interface::new();
    let unit = compile(&iface, "Window: { Caption: first }");
    let root = unit.instantiate(&iface).unwrap();
    let template_root = root.template_child().unwrap();
    let title = root.find_by_name("TitleBar").unwrap();
    assert_eq!(title.get_value("Text"), json!("first"));

    // re-home the same template instance under a different host
    let other_unit = compile(&iface, "Window: { Caption: second }");
    let other = other_unit.instantiate(&iface).unwrap();
    template_root.set_logical_parent(Some(&other));
    assert_eq!(title.get_value("Text"), json!("second"));

    // the old host no longer feeds the binding
    root.set_value("Caption", json!("ignored"));
    assert_eq!(title.get_value("Text"), json!("second"));

    other.set_value("Caption", json!("updated"));
    assert_eq!(title.get_value("Text"), json!("updated"));
}

#[test]
fn item_templates_expand_rows_per_data_type() {
    let iface = Interface::new();
    let unit = compile(
        &iface,
        r#"
ListBox:
  children:
    - ItemTemplate:
        DataTest: kind
        DataType: fruit
        children:
          - Label: { Text: "{label}" }
    - ItemTemplate:
        DataType: default
        children:
          - Button: { Caption: "{label}" }
"#,
    );
    let root = unit.instantiate(&iface).unwrap();
    root.set_value(
        "Data",
        json!([
            {"kind": "fruit", "label": "apple"},
            {"kind": "tool", "label": "hammer"}
        ]),
    );

    let rows = root.children();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].type_name(), "Label");
    assert_eq!(rows[0].get_value("Text"), json!("apple"));
    assert_eq!(rows[1].type_name(), "Button");
    assert_eq!(rows[1].get_value("Caption"), json!("hammer"));

    // reassigning the data rebuilds the rows
    root.set_value("Data", json!([{"kind": "fruit", "label": "pear"}]));
    let rows = root.children();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_value("Text"), json!("pear"));
}

#[test]
fn item_fetch_pulls_rows_from_datasource() {
    let iface = Interface::new();
    let unit = compile(
        &iface,
        r#"
ListBox:
  children:
    - ItemTemplate:
        Data: entries
        children:
          - Label: { Text: "{label}" }
"#,
    );
    let root = unit.instantiate(&iface).unwrap();
    let model = Model::from_value(
        "Feed",
        json!({"entries": [{"label": "one"}, {"label": "two"}]}),
    );
    root.set_data_source(Some(model));
    let rows = root.children();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].get_value("Text"), json!("two"));
}

// ─────────────────────────────────────────────────────────────────
// Reuse and concurrency
// ─────────────────────────────────────────────────────────────────

#[test]
fn one_compiled_unit_builds_independent_trees() {
    let iface = Interface::new();
    let unit = compile(
        &iface,
        r#"
Stack:
  children:
    - TextBox: { Name: Input, Text: shared }
    - Label: { Text: "{../Input.Text}" }
"#,
    );
    let tree_a = unit.instantiate(&iface).unwrap();
    let tree_b = unit.instantiate(&iface).unwrap();

    tree_a
        .find_by_name("Input")
        .unwrap()
        .set_value("Text", json!("only A"));
    assert_eq!(tree_a.children()[1].get_value("Text"), json!("only A"));
    assert_eq!(tree_b.children()[1].get_value("Text"), json!("shared"));
}

#[test]
fn concurrent_instantiation_from_one_unit() {
    let iface = Interface::new();
    let unit = compile(
        &iface,
        r#"
Stack:
  children:
    - Slider: { Name: S, Value: "10" }
    - Label: { Text: "{../S.Value}" }
"#,
    );

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let iface = Arc::clone(&iface);
            let unit = Arc::clone(&unit);
            std::thread::spawn(move || {
                let tree = unit.instantiate(&iface).unwrap();
                let slider = tree.find_by_name("S").unwrap();
                slider.set_value("Value", json!(i as f64));
                tree.children()[1].get_value("Text")
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), json!(format!("{}.0", i)));
    }
}
