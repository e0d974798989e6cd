//! Tests for the binding engine
//!
//! - bind reads values (or stores defaults) and converts them to field types
//! - save writes field values back, natively unless a converter/format opts in
//! - tracked instances follow tree changes until unregistered or dropped

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rstest::{fixture, rstest};

use preftree::application::binding::{
    KeyResolutionStrategy, Preference, PreferencesManager, SharedInstance,
};
use preftree::application::ApplicationError;
use preftree::domain::{
    Callable, DomainError, ListenerError, PrefValue, PreferenceChangeEvent, Preferences,
};
use preftree::util::testing;

// ============================================================
// bindable types
// ============================================================

#[derive(Debug, Default)]
struct Server {
    timeout: u64,
    host: String,
    proxy: Option<String>,
}

preftree::bindable! {
    Server {
        tracked: true,
        fields {
            timeout: u64 => Preference::new().key("server.timeout").default_value("30"),
            host: String => Preference::new().key("server.host"),
        }
        optional {
            proxy: String => Preference::new().key("server.proxy"),
        }
    }
}

#[derive(Debug, Default)]
struct Base {
    verbose: bool,
}

preftree::bindable! {
    Base {
        fields {
            verbose: bool => Preference::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Window {
    base: Base,
    title: String,
}

preftree::bindable! {
    Window {
        base: base,
        fields {
            title: String => Preference::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Release {
    released: Option<NaiveDate>,
    tags: Vec<String>,
    greeting: String,
    summary: String,
    broken: u32,
    unkeyed: u32,
}

preftree::bindable! {
    Release {
        fields {
            tags: Vec<String> => Preference::new().key("app.tags").converter("list"),
            greeting: String => Preference::new().key("app.greeting").args(["Ada"]),
            summary: String => Preference::new().key("app.summary").args(["a", "b"]),
            broken: u32 => Preference::new().key("app.broken").converter("nope"),
            unkeyed: u32 => Preference::new().key("nokey"),
        }
        optional {
            released: NaiveDate => Preference::new().key("app.released").format("%d.%m.%Y"),
        }
    }
}

struct Fixture {
    prefs: Preferences,
    manager: PreferencesManager,
}

#[fixture]
fn fx() -> Fixture {
    testing::init_test_setup();
    let prefs = Preferences::new();
    let manager = PreferencesManager::new(prefs.clone(), KeyResolutionStrategy::DeclaringType);
    Fixture { prefs, manager }
}

fn shared_server() -> (Arc<Mutex<Server>>, SharedInstance) {
    let server = Arc::new(Mutex::new(Server::default()));
    let instance: SharedInstance = server.clone();
    (server, instance)
}

// ============================================================
// bind / save
// ============================================================

#[rstest]
fn given_missing_key_with_default_when_bind_then_default_stored_and_applied(fx: Fixture) {
    let (server, instance) = shared_server();

    let report = fx.manager.bind_shared(&instance);

    assert!(report.is_clean(), "{:?}", report.failures);
    assert_eq!(server.lock().unwrap().timeout, 30);
    assert_eq!(
        fx.prefs.find_node("server").and_then(|n| n.get("timeout")),
        Some(PrefValue::text("30"))
    );
    assert!(report.handle.is_some());
}

#[rstest]
fn given_missing_key_without_default_when_bind_then_attribute_untouched(fx: Fixture) {
    let mut server = Server {
        host: "keep".to_string(),
        ..Server::default()
    };

    let report = fx.manager.bind(&mut server);

    assert_eq!(server.host, "keep");
    assert_eq!(report.skipped.len(), 2);
    assert!(report.handle.is_none());
}

#[rstest]
fn given_native_value_when_bind_then_assigned_without_conversion(fx: Fixture) {
    fx.prefs.node("server").unwrap().put("host", "example.org").unwrap();
    let mut server = Server::default();

    fx.manager.bind(&mut server);

    assert_eq!(server.host, "example.org");
}

#[rstest]
fn given_bound_server_when_save_then_native_values_stored(fx: Fixture) {
    let (server, instance) = shared_server();
    fx.manager.bind_shared(&instance);
    server.lock().unwrap().timeout = 99;

    let report = fx.manager.save_shared(&instance);

    assert!(report.is_clean());
    let node = fx.prefs.find_node("server").unwrap();
    assert_eq!(node.get("timeout"), Some(PrefValue::Int(99)));
    assert_eq!(node.get("host"), Some(PrefValue::text("")));
}

#[rstest]
fn given_empty_optional_when_save_then_key_removed(fx: Fixture) {
    fx.prefs
        .node("server")
        .unwrap()
        .put("proxy", "http://old")
        .unwrap();
    let server = Server::default();

    let report = fx.manager.save(&server);

    assert_eq!(report.removed, vec!["server.proxy"]);
    assert!(!fx.prefs.find_node("server").unwrap().contains_key("proxy"));
}

#[rstest]
fn given_inherited_attribute_when_bind_then_declaring_type_path_used(fx: Fixture) {
    fx.prefs.node_for::<Base>().unwrap().put("verbose", true).unwrap();
    fx.prefs.node_for::<Window>().unwrap().put("title", "main").unwrap();
    let mut window = Window::default();

    let report = fx.manager.bind(&mut window);

    assert!(report.is_clean());
    assert!(window.base.verbose);
    assert_eq!(window.title, "main");
}

#[rstest]
fn given_instance_type_strategy_when_bind_then_runtime_type_path_used() {
    testing::init_test_setup();
    let prefs = Preferences::new();
    let manager = PreferencesManager::new(prefs.clone(), KeyResolutionStrategy::InstanceType);
    prefs.node_for::<Window>().unwrap().put("verbose", true).unwrap();
    let mut window = Window::default();

    manager.bind(&mut window);

    assert!(window.base.verbose);
    assert!(!prefs.contains_node_for::<Base>());
}

#[rstest]
fn given_format_converter_and_arguments_when_bind_then_each_resolved(fx: Fixture) {
    let app = fx.prefs.node("app").unwrap();
    app.put("released", "24.12.2023").unwrap();
    app.put("tags", "a, b").unwrap();
    app.put("greeting", "Hello, {0}!").unwrap();
    app.put(
        "summary",
        Callable::new(|args| PrefValue::Text(format!("{} items", args.len()))),
    )
    .unwrap();
    app.put("broken", "1").unwrap();
    let mut release = Release::default();

    let report = fx.manager.bind(&mut release);

    assert_eq!(release.released, NaiveDate::from_ymd_opt(2023, 12, 24));
    assert_eq!(release.tags, vec!["a", "b"]);
    assert_eq!(release.greeting, "Hello, Ada!");
    assert_eq!(release.summary, "2 items");
    assert_eq!(release.broken, 0);

    let failed: Vec<&str> = report.failures.iter().map(|f| f.attribute.as_str()).collect();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().any(|a| a.ends_with("Release.unkeyed")));
    assert!(failed.iter().any(|a| a.ends_with("Release.broken")));
    assert!(report.failures.iter().any(|f| matches!(
        f.error,
        ApplicationError::Domain(DomainError::InvalidPath(_))
    )));
}

#[rstest]
fn given_format_when_save_then_stored_as_formatted_text(fx: Fixture) {
    let release = Release {
        released: NaiveDate::from_ymd_opt(2024, 1, 5),
        tags: vec!["x".to_string(), "y".to_string()],
        ..Release::default()
    };

    fx.manager.save(&release);

    let app = fx.prefs.find_node("app").unwrap();
    assert_eq!(app.get("released"), Some(PrefValue::text("05.01.2024")));
    assert_eq!(app.get("tags"), Some(PrefValue::text("x,y")));
}

// ============================================================
// live re-synchronization
// ============================================================

#[rstest]
fn given_tracked_server_when_value_changes_then_attribute_follows(fx: Fixture) {
    let (server, instance) = shared_server();
    fx.manager.bind_shared(&instance);
    let node = fx.prefs.find_node("server").unwrap();

    node.put("timeout", "45").unwrap();
    assert_eq!(server.lock().unwrap().timeout, 45);

    node.put("timeout", 60).unwrap();
    assert_eq!(server.lock().unwrap().timeout, 60);
}

#[rstest]
fn given_tracked_required_attribute_when_key_removed_then_attribute_kept(fx: Fixture) {
    let (server, instance) = shared_server();
    fx.manager.bind_shared(&instance);

    fx.prefs.find_node("server").unwrap().remove("timeout").unwrap();

    assert_eq!(server.lock().unwrap().timeout, 30);
}

#[rstest]
fn given_tracked_optional_when_key_removed_then_attribute_cleared(fx: Fixture) {
    let (server, instance) = shared_server();
    fx.prefs
        .node("server")
        .unwrap()
        .put("proxy", "http://old")
        .unwrap();
    fx.manager.bind_shared(&instance);
    assert_eq!(server.lock().unwrap().proxy.as_deref(), Some("http://old"));

    fx.prefs.find_node("server").unwrap().remove("proxy").unwrap();

    assert_eq!(server.lock().unwrap().proxy, None);
}

#[test]
fn given_earlier_listener_overriding_value_when_put_then_attribute_matches_tree() {
    testing::init_test_setup();
    let prefs = Preferences::new();
    let tree = prefs.clone();
    prefs.add_preference_listener(Arc::new(
        move |event: &PreferenceChangeEvent| -> Result<(), ListenerError> {
            if event.key == "timeout" && event.new_value == Some(PrefValue::Int(45)) {
                if let Some(node) = tree.find_node(&event.path) {
                    node.put("timeout", 99)
                        .map_err(|err| ListenerError::new(err.to_string()))?;
                }
            }
            Ok(())
        },
    ));
    let manager = PreferencesManager::new(prefs.clone(), KeyResolutionStrategy::DeclaringType);
    let (server, instance) = shared_server();
    manager.bind_shared(&instance);

    prefs.find_node("server").unwrap().put("timeout", 45).unwrap();

    assert_eq!(
        prefs.find_node("server").and_then(|n| n.get("timeout")),
        Some(PrefValue::Int(99))
    );
    assert_eq!(server.lock().unwrap().timeout, 99);
}

#[rstest]
fn given_tracked_server_when_node_recreated_then_rebound_with_default(fx: Fixture) {
    let (server, instance) = shared_server();
    fx.manager.bind_shared(&instance);
    fx.prefs.find_node("server").unwrap().put("timeout", 45).unwrap();
    fx.prefs.remove_node("server").unwrap();

    fx.prefs.node("server").unwrap();

    assert_eq!(server.lock().unwrap().timeout, 30);
    assert_eq!(
        fx.prefs.find_node("server").and_then(|n| n.get("timeout")),
        Some(PrefValue::text("30"))
    );
}

#[rstest]
fn given_unconvertible_update_when_put_then_listener_failure_reported(fx: Fixture) {
    let (server, instance) = shared_server();
    fx.manager.bind_shared(&instance);

    let result = fx.prefs.find_node("server").unwrap().put("timeout", "soon");

    assert!(matches!(result, Err(DomainError::ListenersFailed { .. })));
    assert_eq!(server.lock().unwrap().timeout, 30);
    assert_eq!(
        fx.prefs.find_node("server").and_then(|n| n.get("timeout")),
        Some(PrefValue::text("soon"))
    );
}

#[rstest]
fn given_unregistered_handle_when_value_changes_then_attribute_unchanged(fx: Fixture) {
    let (server, instance) = shared_server();
    let handle = fx.manager.bind_shared(&instance).handle.unwrap();

    assert!(fx.manager.unregister(handle));
    fx.prefs.find_node("server").unwrap().put("timeout", 45).unwrap();

    assert_eq!(server.lock().unwrap().timeout, 30);
    assert!(!fx.manager.is_tracked(&instance));
}

#[rstest]
fn given_dropped_instance_when_value_changes_then_entry_pruned(fx: Fixture) {
    let (server, instance) = shared_server();
    fx.manager.bind_shared(&instance);
    drop(server);
    drop(instance);

    fx.prefs.find_node("server").unwrap().put("timeout", 45).unwrap();

    assert!(fx.manager.store().is_empty());
}

#[rstest]
fn given_rebind_of_same_instance_when_bind_shared_then_single_entry(fx: Fixture) {
    let (_server, instance) = shared_server();

    let first = fx.manager.bind_shared(&instance).handle;
    let second = fx.manager.bind_shared(&instance).handle;

    assert_eq!(first, second);
    assert_eq!(fx.manager.store().len(), 1);
}

#[rstest]
fn given_dropped_manager_when_value_changes_then_listeners_removed(fx: Fixture) {
    let (server, instance) = shared_server();
    fx.manager.bind_shared(&instance);
    let prefs = fx.prefs.clone();
    drop(fx);

    prefs.find_node("server").unwrap().put("timeout", 45).unwrap();

    assert_eq!(server.lock().unwrap().timeout, 30);
    assert_eq!(prefs.notifier().preference_listener_count(), 0);
}
