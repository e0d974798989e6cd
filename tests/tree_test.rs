//! Tests for the preferences tree and its change notification
//!
//! - node(path) creates missing ancestors and reports each exactly once
//! - put/remove fire one event per actual change
//! - listener failures surface after the mutation is applied

use std::sync::{Arc, Mutex};

use rstest::{fixture, rstest};

use preftree::domain::{
    DomainError, ListenerError, NodeChangeEvent, NodeChangeKind, PrefValue,
    PreferenceChangeEvent, Preferences,
};
use preftree::util::testing;

type Log<T> = Arc<Mutex<Vec<T>>>;

struct Recorded {
    prefs: Preferences,
    nodes: Log<NodeChangeEvent>,
    changes: Log<PreferenceChangeEvent>,
}

#[fixture]
fn recorded() -> Recorded {
    testing::init_test_setup();
    let prefs = Preferences::new();
    let nodes: Log<NodeChangeEvent> = Arc::default();
    let changes: Log<PreferenceChangeEvent> = Arc::default();

    let sink = Arc::clone(&nodes);
    prefs.add_node_listener(Arc::new(move |event: &NodeChangeEvent| {
        sink.lock().unwrap().push(event.clone());
        Ok(())
    }));
    let sink = Arc::clone(&changes);
    prefs.add_preference_listener(Arc::new(move |event: &PreferenceChangeEvent| {
        sink.lock().unwrap().push(event.clone());
        Ok(())
    }));

    Recorded {
        prefs,
        nodes,
        changes,
    }
}

fn paths(log: &Log<NodeChangeEvent>) -> Vec<(NodeChangeKind, String)> {
    log.lock()
        .unwrap()
        .iter()
        .map(|e| (e.kind, e.path.clone()))
        .collect()
}

// ============================================================
// node() / remove_node()
// ============================================================

#[rstest]
fn given_missing_ancestors_when_node_then_added_root_to_leaf(recorded: Recorded) {
    let node = recorded.prefs.node("a/b/c").unwrap();

    assert_eq!(node.path(), "/a/b/c");
    assert_eq!(
        paths(&recorded.nodes),
        vec![
            (NodeChangeKind::Added, "/a".to_string()),
            (NodeChangeKind::Added, "/a/b".to_string()),
            (NodeChangeKind::Added, "/a/b/c".to_string()),
        ]
    );
}

#[rstest]
fn given_existing_node_when_node_again_then_same_node_and_no_event(recorded: Recorded) {
    let first = recorded.prefs.node("a/b").unwrap();
    recorded.nodes.lock().unwrap().clear();

    let second = recorded.prefs.node("/a//b/").unwrap();

    assert!(first.ptr_eq(&second));
    assert!(recorded.nodes.lock().unwrap().is_empty());
}

#[rstest]
#[case("")]
#[case("/")]
fn given_root_path_when_node_then_root(recorded: Recorded, #[case] path: &str) {
    let node = recorded.prefs.node(path).unwrap();

    assert!(node.is_root());
    assert_eq!(node.path(), "/");
    assert!(recorded.nodes.lock().unwrap().is_empty());
}

#[rstest]
fn given_subtree_when_remove_node_then_single_removed_event(recorded: Recorded) {
    recorded.prefs.node("a/b/c").unwrap();
    recorded.nodes.lock().unwrap().clear();

    let removed = recorded.prefs.remove_node("a/b").unwrap();

    assert_eq!(removed.map(|n| n.name().to_string()), Some("b".to_string()));
    assert_eq!(
        paths(&recorded.nodes),
        vec![(NodeChangeKind::Removed, "/a/b".to_string())]
    );
    assert!(!recorded.prefs.contains_node("a/b/c"));
    assert!(recorded.prefs.contains_node("a"));
}

#[rstest]
fn given_root_when_remove_node_then_invalid_path(recorded: Recorded) {
    assert!(matches!(
        recorded.prefs.remove_node("/"),
        Err(DomainError::InvalidPath(_))
    ));
}

#[rstest]
fn given_missing_node_when_contains_node_then_false_without_creating(recorded: Recorded) {
    assert!(!recorded.prefs.contains_node("nope/deeper"));
    assert!(recorded.prefs.root().child_names().is_empty());
    assert!(recorded.nodes.lock().unwrap().is_empty());
}

// ============================================================
// put() / remove() / clear()
// ============================================================

#[rstest]
fn given_same_value_twice_when_put_then_one_event(recorded: Recorded) {
    let node = recorded.prefs.node("server").unwrap();

    node.put("timeout", 30).unwrap();
    node.put("timeout", 30).unwrap();

    assert_eq!(node.get("timeout"), Some(PrefValue::Int(30)));
    let changes = recorded.changes.lock().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].dotted_path(), "server.timeout");
    assert_eq!(changes[0].old_value, None);
    assert_eq!(changes[0].new_value, Some(PrefValue::Int(30)));
}

#[rstest]
fn given_changed_value_when_put_then_event_carries_old_and_new(recorded: Recorded) {
    let node = recorded.prefs.node("server").unwrap();
    node.put("host", "a").unwrap();

    node.put("host", "b").unwrap();

    let changes = recorded.changes.lock().unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[1].old_value, Some(PrefValue::text("a")));
    assert_eq!(changes[1].new_value, Some(PrefValue::text("b")));
}

#[rstest]
fn given_missing_key_when_remove_then_no_event(recorded: Recorded) {
    let node = recorded.prefs.root();

    assert_eq!(node.remove("nope").unwrap(), None);
    assert!(recorded.changes.lock().unwrap().is_empty());
}

#[rstest]
fn given_present_key_when_remove_then_event_with_no_new_value(recorded: Recorded) {
    let node = recorded.prefs.root();
    node.put("theme", "dark").unwrap();

    let removed = node.remove("theme").unwrap();

    assert_eq!(removed, Some(PrefValue::text("dark")));
    let changes = recorded.changes.lock().unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[1].new_value, None);
}

#[rstest]
fn given_properties_when_clear_then_one_removal_event_per_key(recorded: Recorded) {
    let node = recorded.prefs.node("ui").unwrap();
    node.put("a", 1).unwrap();
    node.put("b", 2).unwrap();
    recorded.changes.lock().unwrap().clear();

    node.clear().unwrap();

    assert!(node.keys().is_empty());
    let keys: Vec<String> = recorded
        .changes
        .lock()
        .unwrap()
        .iter()
        .map(|e| e.key.clone())
        .collect();
    assert_eq!(keys, vec!["a", "b"]);
}

#[rstest]
fn given_blank_key_when_put_then_invalid_path(recorded: Recorded) {
    assert!(matches!(
        recorded.prefs.root().put("  ", 1),
        Err(DomainError::InvalidPath(_))
    ));
}

#[rstest]
fn given_mixed_list_when_put_then_invalid_value_names_path(recorded: Recorded) {
    let node = recorded.prefs.node("net").unwrap();
    let mixed = PrefValue::List(vec![PrefValue::text("a"), PrefValue::Int(1)]);

    match node.put("hosts", mixed) {
        Err(DomainError::InvalidValue { path, .. }) => assert_eq!(path, "net.hosts"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(recorded.changes.lock().unwrap().is_empty());
}

// ============================================================
// listeners
// ============================================================

#[rstest]
fn given_failing_listener_when_put_then_later_listeners_run_and_value_stored(recorded: Recorded) {
    recorded
        .prefs
        .add_preference_listener(Arc::new(|_: &PreferenceChangeEvent| {
            Err(ListenerError::new("boom"))
        }));
    let late: Log<String> = Arc::default();
    let sink = Arc::clone(&late);
    recorded
        .prefs
        .add_preference_listener(Arc::new(move |e: &PreferenceChangeEvent| {
            sink.lock().unwrap().push(e.key.clone());
            Ok(())
        }));

    let result = recorded.prefs.root().put("theme", "dark");

    match result {
        Err(DomainError::ListenersFailed { failures, .. }) => assert_eq!(failures.len(), 1),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(recorded.prefs.root().get("theme"), Some(PrefValue::text("dark")));
    assert_eq!(*late.lock().unwrap(), vec!["theme"]);
}

#[rstest]
fn given_listener_mutating_tree_when_notified_then_no_deadlock(recorded: Recorded) {
    let prefs = recorded.prefs.clone();
    recorded
        .prefs
        .add_preference_listener(Arc::new(move |e: &PreferenceChangeEvent| {
            if e.key != "trigger" {
                return Ok(());
            }
            prefs
                .node("audit")
                .and_then(|audit| audit.put("last", e.key.as_str()))
                .map_err(|err| ListenerError::new(err.to_string()))
        }));

    recorded.prefs.root().put("trigger", true).unwrap();

    assert_eq!(
        recorded.prefs.find_node("audit").and_then(|n| n.get("last")),
        Some(PrefValue::text("trigger"))
    );
}

#[rstest]
fn given_removed_listener_when_put_then_not_called(recorded: Recorded) {
    let calls: Log<()> = Arc::default();
    let sink = Arc::clone(&calls);
    let id = recorded
        .prefs
        .add_preference_listener(Arc::new(move |_: &PreferenceChangeEvent| {
            sink.lock().unwrap().push(());
            Ok(())
        }));
    assert!(recorded.prefs.remove_preference_listener(id));

    recorded.prefs.root().put("x", 1).unwrap();

    assert!(calls.lock().unwrap().is_empty());
}

// ============================================================
// merge() / copy() / type-keyed nodes
// ============================================================

#[rstest]
fn given_two_trees_when_merge_then_other_wins_without_events(recorded: Recorded) {
    let server = recorded.prefs.node("server").unwrap();
    server.put("timeout", 30).unwrap();
    server.put("host", "a").unwrap();
    let other = Preferences::new();
    let other_server = other.node("server").unwrap();
    other_server.put("timeout", 60).unwrap();
    other.node("server/tls").unwrap().put("enabled", true).unwrap();
    recorded.nodes.lock().unwrap().clear();
    recorded.changes.lock().unwrap().clear();

    recorded.prefs.root().merge(&other.root());

    assert_eq!(server.get("timeout"), Some(PrefValue::Int(60)));
    assert_eq!(server.get("host"), Some(PrefValue::text("a")));
    assert_eq!(
        recorded.prefs.find_node("server/tls").and_then(|n| n.get("enabled")),
        Some(PrefValue::Bool(true))
    );
    assert!(recorded.nodes.lock().unwrap().is_empty());
    assert!(recorded.changes.lock().unwrap().is_empty());
}

#[rstest]
fn given_node_when_merge_with_itself_then_unchanged(recorded: Recorded) {
    let node = recorded.prefs.node("a").unwrap();
    node.put("k", 1).unwrap();
    recorded.prefs.node("a/b").unwrap().put("j", 2).unwrap();
    let before = node.snapshot();

    node.merge(&node);

    assert_eq!(node.snapshot(), before);
}

#[rstest]
fn given_tree_when_copy_then_independent_and_equal(recorded: Recorded) {
    recorded.prefs.node("a/b").unwrap().put("k", "v").unwrap();

    let copy = recorded.prefs.copy();
    copy.node("a/b").unwrap().put("k", "changed").unwrap();

    assert_eq!(
        recorded.prefs.find_node("a/b").and_then(|n| n.get("k")),
        Some(PrefValue::text("v"))
    );
    assert_eq!(copy.notifier().preference_listener_count(), 0);
}

mod app {
    pub mod config {
        pub struct Server;
    }
}

#[rstest]
fn given_type_when_node_for_then_path_from_type_name(recorded: Recorded) {
    let node = recorded.prefs.node_for::<app::config::Server>().unwrap();

    assert!(node.path().ends_with("/app/config/Server"));
    assert!(recorded.prefs.contains_node_for::<app::config::Server>());

    recorded
        .prefs
        .remove_node_for::<app::config::Server>()
        .unwrap();
    assert!(!recorded.prefs.contains_node_for::<app::config::Server>());
}

#[rstest]
fn given_string_value_when_get_converted_then_parsed(recorded: Recorded) {
    let node = recorded.prefs.node("server").unwrap();
    node.put("port", "8080").unwrap();

    assert_eq!(node.get_converted::<u16>("port", 0).unwrap(), 8080);
    assert_eq!(node.get_converted::<u16>("missing", 7).unwrap(), 7);

    node.put("port", "not-a-number").unwrap();
    assert!(matches!(
        node.get_converted::<u16>("port", 0),
        Err(DomainError::Conversion { .. })
    ));
}

// ============================================================
// concurrent access
// ============================================================

const THREADS: i64 = 8;
const ROUNDS: i64 = 50;
const KEYS: i64 = 4;

#[rstest]
fn given_threads_on_overlapping_keys_when_put_then_every_change_linearized(recorded: Recorded) {
    std::thread::scope(|scope| {
        for thread in 0..THREADS {
            let prefs = &recorded.prefs;
            scope.spawn(move || {
                for round in 0..ROUNDS {
                    let node = prefs.node("a/b/c").unwrap();
                    let key = format!("k{}", round % KEYS);
                    node.put(&key, thread * 1000 + round).unwrap();
                    node.put("shared", true).unwrap();
                }
            });
        }
    });

    assert_eq!(
        paths(&recorded.nodes),
        vec![
            (NodeChangeKind::Added, "/a".to_string()),
            (NodeChangeKind::Added, "/a/b".to_string()),
            (NodeChangeKind::Added, "/a/b/c".to_string()),
        ]
    );

    let changes = recorded.changes.lock().unwrap();
    let shared: Vec<_> = changes.iter().filter(|e| e.key == "shared").collect();
    assert_eq!(shared.len(), 1);

    let leaf = recorded.prefs.find_node("a/b/c").unwrap();
    for k in 0..KEYS {
        let key = format!("k{k}");
        let put: Vec<PrefValue> = (0..THREADS)
            .flat_map(|thread| {
                (0..ROUNDS)
                    .filter(move |round| round % KEYS == k)
                    .map(move |round| PrefValue::Int(thread * 1000 + round))
            })
            .collect();
        let events: Vec<_> = changes.iter().filter(|e| e.key == key).collect();
        assert_eq!(events.len(), put.len(), "one event per distinct put on {key}");

        let last = leaf.get(&key).unwrap();
        assert!(put.contains(&last), "{key} holds a value nobody put");

        // every value except the last one was replaced exactly once
        let mut replaced: Vec<PrefValue> =
            events.iter().filter_map(|e| e.old_value.clone()).collect();
        let mut expected: Vec<PrefValue> = put.into_iter().filter(|v| *v != last).collect();
        replaced.sort_by_key(|v| v.to_plain_string());
        expected.sort_by_key(|v| v.to_plain_string());
        assert_eq!(replaced, expected);
        assert_eq!(events.iter().filter(|e| e.old_value.is_none()).count(), 1);
    }
}
