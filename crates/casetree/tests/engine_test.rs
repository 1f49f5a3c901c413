use std::sync::{Arc, Mutex};

use casetree::{Node, NullReporter, PanicError, Reporter, RunConfig, TestContext, Tree};

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

// ============================================================================
// Setup accumulation
// ============================================================================

#[test]
fn setup_chain_accumulates_root_to_leaf() {
    let seen = new_log();
    let record = seen.clone();

    let root: Arc<Node<i64, i64, ()>> = Arc::new(Node {
        id: "root".into(),
        setup: Some(Arc::new(|cx, _req, _v| (cx, 1))),
        run: Some(Arc::new(|_cx, req, _v| Ok(*req))),
        children: vec![Arc::new(Node {
            id: "child".into(),
            setup: Some(Arc::new(|cx, req, _v| (cx, req + 1))),
            assert: Some(Arc::new(move |_t, _cx, req, _v, result| {
                record
                    .lock()
                    .unwrap()
                    .push(format!("req={req} res={:?}", result.as_ref().ok()));
            })),
            ..Node::default()
        })],
        ..Node::default()
    });

    let tree = Tree::build(root, vec![]).unwrap();
    let mut t = NullReporter::new();
    tree.run_path(&mut t, &["root", "child"]);

    assert_eq!(entries(&seen), vec!["req=2 res=Some(2)"]);
    assert!(t.result.failures.is_empty());
}

#[test]
fn setup_order_is_structural_not_declaration_order() {
    // child is declared first in the flat list but still sets up second
    let seen = new_log();
    let record = seen.clone();

    let child: Arc<Node<i64, i64, ()>> = Arc::new(Node {
        id: "child".into(),
        parent_id: Some("root".into()),
        setup: Some(Arc::new(|cx, req, _v| (cx, req + 1))),
        run: Some(Arc::new(|_cx, req, _v| Ok(*req))),
        assert: Some(Arc::new(move |_t, _cx, _req, _v, result| {
            record.lock().unwrap().push(format!("{:?}", result.as_ref().ok()));
        })),
        ..Node::default()
    });
    let root: Arc<Node<i64, i64, ()>> = Arc::new(Node {
        id: "root".into(),
        setup: Some(Arc::new(|cx, _req, _v| (cx, 1))),
        ..Node::default()
    });

    let tree = Tree::build(root, vec![child]).unwrap();
    let mut t = NullReporter::new();
    tree.run_path(&mut t, &["root", "child"]);

    assert_eq!(entries(&seen), vec!["Some(2)"]);
}

// ============================================================================
// Runner resolution
// ============================================================================

#[test]
fn nearest_runner_wins() {
    let seen = new_log();
    let record = seen.clone();

    let root: Arc<Node<i64, i64, ()>> = Arc::new(Node {
        id: "root".into(),
        run: Some(Arc::new(|_cx, _req, _v| Ok(1))),
        children: vec![Arc::new(Node {
            id: "mid".into(),
            run: Some(Arc::new(|_cx, _req, _v| Ok(2))),
            children: vec![Arc::new(Node {
                id: "leaf".into(),
                assert: Some(Arc::new(move |_t, _cx, _req, _v, result| {
                    record.lock().unwrap().push(format!("{:?}", result.as_ref().ok()));
                })),
                ..Node::default()
            })],
            ..Node::default()
        })],
        ..Node::default()
    });

    let tree = Tree::build(root, vec![]).unwrap();
    let mut t = NullReporter::new();
    tree.run_path(&mut t, &["root", "mid", "leaf"]);

    assert_eq!(entries(&seen), vec!["Some(2)"]);
}

#[test]
fn missing_runner_is_reported_not_fatal() {
    let root: Arc<Node<i64, i64, ()>> = Arc::new(Node {
        id: "root".into(),
        children: vec![Arc::new(Node {
            id: "leaf".into(),
            assert: Some(Arc::new(|_t, _cx, _req, _v, _result| {})),
            ..Node::default()
        })],
        ..Node::default()
    });

    let tree = Tree::build(root, vec![]).unwrap();
    let mut t = NullReporter::new();
    tree.run_path(&mut t, &["root", "leaf"]);

    assert_eq!(t.result.failures, vec!["missing runner: leaf".to_string()]);
}

// ============================================================================
// Assertion chain and inheritance cutoff
// ============================================================================

fn asserting_node(id: &str, label: &'static str, inherit: bool, log: &Log) -> Node<i64, i64, ()> {
    let record = log.clone();
    Node {
        id: id.into(),
        inherit_assert: inherit,
        assert: Some(Arc::new(move |_t, _cx, _req, _v, _result| {
            record.lock().unwrap().push(label.to_string());
        })),
        ..Node::default()
    }
}

#[test]
fn assert_chain_stops_at_non_inheriting_node() {
    let order = new_log();

    let grandchild = asserting_node("grandchild", "C", true, &order);
    let mut child = asserting_node("child", "B", false, &order);
    let mut root = asserting_node("root", "A", true, &order);
    root.run = Some(Arc::new(|_cx, _req, _v| Ok(0)));
    child.children = vec![Arc::new(grandchild)];
    root.children = vec![Arc::new(child)];

    let tree = Tree::build(Arc::new(root), vec![]).unwrap();
    let mut t = NullReporter::new();
    tree.run_path(&mut t, &["root", "child", "grandchild"]);

    // A is cut off; ancestors still assert before descendants
    assert_eq!(entries(&order), vec!["B", "C"]);

    order.lock().unwrap().clear();
    tree.run_path(&mut t, &["root", "child"]);
    // the non-inheriting node's own assert still fires, its ancestors' don't
    assert_eq!(entries(&order), vec!["B"]);
}

#[test]
fn full_chain_runs_root_to_leaf_when_inheriting() {
    let order = new_log();

    let mut child = asserting_node("child", "B", true, &order);
    let mut root = asserting_node("root", "A", true, &order);
    root.run = Some(Arc::new(|_cx, _req, _v| Ok(0)));
    child.children = vec![Arc::new(asserting_node("leaf", "C", true, &order))];
    root.children = vec![Arc::new(child)];

    let tree = Tree::build(Arc::new(root), vec![]).unwrap();
    let mut t = NullReporter::new();
    tree.run_path(&mut t, &["root", "child", "leaf"]);

    assert_eq!(entries(&order), vec!["A", "B", "C"]);
}

#[test]
fn assert_self_always_runs_last() {
    let order = new_log();
    let record = order.clone();

    let mut leaf = asserting_node("leaf", "own", true, &order);
    leaf.inherit_assert = false;
    leaf.assert_self = Some(Arc::new(move |_t, _cx, _req, _v, _result| {
        record.lock().unwrap().push("self".to_string());
    }));
    let mut root = asserting_node("root", "A", true, &order);
    root.run = Some(Arc::new(|_cx, _req, _v| Ok(0)));
    root.children = vec![Arc::new(leaf)];

    let tree = Tree::build(Arc::new(root), vec![]).unwrap();
    let mut t = NullReporter::new();
    tree.run_path(&mut t, &["root", "leaf"]);

    // inheritance is cut off, yet assert_self still closes the chain
    assert_eq!(entries(&order), vec!["own", "self"]);
}

// ============================================================================
// Panic isolation
// ============================================================================

#[test]
fn runner_panic_becomes_an_error_for_asserts() {
    let seen = new_log();
    let record = seen.clone();

    let root: Arc<Node<i64, i64, ()>> = Arc::new(Node {
        id: "root".into(),
        run: Some(Arc::new(|_cx, _req, _v| panic!("boom in runner"))),
        children: vec![Arc::new(Node {
            id: "leaf".into(),
            assert: Some(Arc::new(move |_t, _cx, _req, _v, result| {
                let err = result.as_ref().err().expect("expected a captured panic");
                record.lock().unwrap().push(err.to_string());
                assert!(err.downcast_ref::<PanicError>().is_some());
            })),
            ..Node::default()
        })],
        ..Node::default()
    });

    let tree = Tree::build(root, vec![]).unwrap();
    let mut t = NullReporter::new();
    tree.run_path(&mut t, &["root", "leaf"]);

    assert_eq!(entries(&seen), vec!["panic: boom in runner"]);
    // the assert chose not to fail the case, so the engine didn't either
    assert!(t.result.failures.is_empty());
}

#[test]
fn assert_panic_unwinds_to_the_grouping_boundary() {
    // hook panics are not isolated by the engine; the reporter's run()
    // boundary records them and keeps siblings alive
    let root: Arc<Node<i64, i64, ()>> = Arc::new(Node {
        id: "root".into(),
        run: Some(Arc::new(|_cx, _req, _v| Ok(0))),
        children: vec![
            Arc::new(Node {
                id: "angry".into(),
                assert: Some(Arc::new(|_t, _cx, _req, _v, _result| {
                    panic!("assert blew up")
                })),
                ..Node::default()
            }),
            Arc::new(Node {
                id: "calm".into(),
                assert: Some(Arc::new(|_t, _cx, _req, _v, _result| {})),
                ..Node::default()
            }),
        ],
        ..Node::default()
    });

    let tree = Tree::build(root, vec![]).unwrap();
    let mut t = NullReporter::new();
    tree.run(&mut t);

    assert_eq!(t.result.failed, 1);
    assert_eq!(t.result.passed, 1);
    assert!(t.result.failures[0].contains("assert blew up"));
}

// ============================================================================
// Variant expansion
// ============================================================================

#[test]
fn multiple_variants_fan_out_as_named_subruns() {
    let seen = new_log();
    let record = seen.clone();

    let root: Arc<Node<i64, i64, (), i64>> = Arc::new(Node {
        id: "root".into(),
        run: Some(Arc::new(move |_cx, _req, v| {
            record.lock().unwrap().push(format!("v={v}"));
            Ok(*v)
        })),
        children: vec![Arc::new(Node {
            id: "leaf".into(),
            variants: vec![1, 2, 3],
            assert: Some(Arc::new(|t, _cx, _req, v, result| {
                if result.as_ref().ok() != Some(v) {
                    t.error("variant did not reach the runner");
                }
            })),
            ..Node::default()
        })],
        ..Node::default()
    });

    let tree = Tree::build(root, vec![]).unwrap();
    let mut t = NullReporter::new();
    tree.run(&mut t);

    assert_eq!(entries(&seen), vec!["v=1", "v=2", "v=3"]);
    assert_eq!(
        t.runs,
        vec!["root/leaf", "root/leaf/1", "root/leaf/2", "root/leaf/3"]
    );
    assert!(t.result.failures.is_empty());
}

#[test]
fn single_variant_runs_inline_without_subgrouping() {
    let root: Arc<Node<i64, i64, (), i64>> = Arc::new(Node {
        id: "root".into(),
        run: Some(Arc::new(|_cx, _req, v| Ok(*v))),
        children: vec![Arc::new(Node {
            id: "leaf".into(),
            variants: vec![7],
            assert: Some(Arc::new(|t, _cx, _req, _v, result| {
                if result.as_ref().ok() != Some(&7) {
                    t.error("expected the single variant");
                }
            })),
            ..Node::default()
        })],
        ..Node::default()
    });

    let tree = Tree::build(root, vec![]).unwrap();
    let mut t = NullReporter::new();
    tree.run(&mut t);

    assert_eq!(t.runs, vec!["root/leaf"]);
    assert!(t.result.failures.is_empty());
}

#[test]
fn nearest_declared_variants_win() {
    let seen = new_log();
    let record = seen.clone();

    let root: Arc<Node<i64, i64, (), i64>> = Arc::new(Node {
        id: "root".into(),
        variants: vec![10, 20],
        run: Some(Arc::new(move |_cx, _req, v| {
            record.lock().unwrap().push(v.to_string());
            Ok(*v)
        })),
        children: vec![Arc::new(Node {
            id: "leaf".into(),
            variants: vec![99],
            assert: Some(Arc::new(|_t, _cx, _req, _v, _result| {})),
            ..Node::default()
        })],
        ..Node::default()
    });

    let tree = Tree::build(root, vec![]).unwrap();
    let mut t = NullReporter::new();
    tree.run_path(&mut t, &["root", "leaf"]);

    // the leaf's own variants shadow the root's
    assert_eq!(entries(&seen), vec!["99"]);
}

#[test]
fn run_path_variant_forces_one_variant_inline() {
    let seen = new_log();
    let record = seen.clone();

    let root: Arc<Node<i64, i64, (), i64>> = Arc::new(Node {
        id: "root".into(),
        run: Some(Arc::new(move |_cx, _req, v| {
            record.lock().unwrap().push(v.to_string());
            Ok(*v)
        })),
        children: vec![Arc::new(Node {
            id: "leaf".into(),
            variants: vec![1, 2, 3],
            assert: Some(Arc::new(|_t, _cx, _req, _v, _result| {})),
            ..Node::default()
        })],
        ..Node::default()
    });

    let tree = Tree::build(root, vec![]).unwrap();
    let mut t = NullReporter::new();
    tree.run_path_variant(&mut t, &["root", "leaf"], 2);

    assert_eq!(entries(&seen), vec!["2"]);
    assert!(t.runs.is_empty()); // inline: no sub-run was opened
}

// ============================================================================
// Context capability
// ============================================================================

#[derive(Default)]
struct EnvContext {
    ready: bool,
}

impl TestContext for EnvContext {
    fn on_init(&mut self, t: &mut dyn Reporter) {
        self.ready = true;
        t.log("context initialized");
    }
}

#[test]
fn context_hook_runs_before_setup() {
    let seen = new_log();
    let record = seen.clone();

    let root: Arc<Node<i64, i64, EnvContext>> = Arc::new(Node {
        id: "root".into(),
        setup: Some(Arc::new(move |cx: EnvContext, req, _v| {
            record
                .lock()
                .unwrap()
                .push(format!("ready_in_setup={}", cx.ready));
            (cx, req)
        })),
        run: Some(Arc::new(|_cx, _req, _v| Ok(0))),
        children: vec![Arc::new(Node {
            id: "leaf".into(),
            assert: Some(Arc::new(|_t, cx, _req, _v, _result| {
                assert!(cx.ready);
            })),
            ..Node::default()
        })],
        ..Node::default()
    });

    let tree = Tree::build(root, vec![]).unwrap();
    let mut t = NullReporter::new();
    tree.run_path(&mut t, &["root", "leaf"]);

    assert_eq!(entries(&seen), vec!["ready_in_setup=true"]);
    assert_eq!(t.logs, vec!["context initialized".to_string()]);
}

// ============================================================================
// Discovery and reporting semantics
// ============================================================================

#[test]
fn run_all_discovers_only_asserting_nodes() {
    let root: Arc<Node<i64, i64, ()>> = Arc::new(Node {
        id: "root".into(),
        run: Some(Arc::new(|_cx, _req, _v| Ok(0))),
        children: vec![
            Arc::new(Node {
                id: "plain".into(), // no assert: structure only
                children: vec![Arc::new(Node {
                    id: "asserting".into(),
                    assert: Some(Arc::new(|_t, _cx, _req, _v, _result| {})),
                    ..Node::default()
                })],
                ..Node::default()
            }),
            Arc::new(Node {
                id: "self-asserting".into(),
                assert_self: Some(Arc::new(|_t, _cx, _req, _v, _result| {})),
                ..Node::default()
            }),
        ],
        ..Node::default()
    });

    let tree = Tree::build(root, vec![]).unwrap();
    let mut t = NullReporter::new();
    tree.run(&mut t);

    assert_eq!(t.runs, vec!["root/plain/asserting", "root/self-asserting"]);
    assert_eq!(t.result.passed, 2);
}

#[test]
fn unknown_path_is_reported_and_siblings_keep_running() {
    let root: Arc<Node<i64, i64, ()>> = Arc::new(Node {
        id: "root".into(),
        run: Some(Arc::new(|_cx, _req, _v| Ok(0))),
        children: vec![Arc::new(Node {
            id: "leaf".into(),
            assert: Some(Arc::new(|_t, _cx, _req, _v, _result| {})),
            ..Node::default()
        })],
        ..Node::default()
    });

    let tree = Tree::build(root, vec![]).unwrap();
    let mut t = NullReporter::new();
    tree.run_path(&mut t, &["root", "ghost"]);
    tree.run_path(&mut t, &["root", "leaf"]);

    assert_eq!(t.result.failed, 1);
    assert_eq!(t.result.failures, vec!["case not found: root".to_string()]);
}

#[test]
fn run_node_accepts_the_original_reference() {
    let seen = new_log();
    let record = seen.clone();

    let child: Arc<Node<i64, i64, ()>> = Arc::new(Node {
        id: "child".into(),
        assert: Some(Arc::new(move |_t, _cx, _req, _v, result| {
            record.lock().unwrap().push(format!("{:?}", result.as_ref().ok()));
        })),
        ..Node::default()
    });
    let root: Arc<Node<i64, i64, ()>> = Arc::new(Node {
        id: "root".into(),
        run: Some(Arc::new(|_cx, _req, _v| Ok(5))),
        ..Node::default()
    });

    let tree = Tree::build(root, vec![child.clone()]).unwrap();
    let mut t = NullReporter::new();
    tree.run_node(&mut t, &child);

    assert_eq!(entries(&seen), vec!["Some(5)"]);
}

#[test]
fn run_node_reports_unknown_nodes() {
    let tree: Tree<i64, i64, ()> = Tree::build(
        Arc::new(Node {
            id: "root".into(),
            ..Node::default()
        }),
        vec![],
    )
    .unwrap();

    let stranger: Arc<Node<i64, i64, ()>> = Arc::new(Node {
        id: "stranger".into(),
        ..Node::default()
    });

    let mut t = NullReporter::new();
    tree.run_node(&mut t, &stranger);

    assert_eq!(t.result.failures, vec!["node not found: stranger".to_string()]);
}

fn two_leaf_tree() -> Tree<i64, i64, ()> {
    let root: Arc<Node<i64, i64, ()>> = Arc::new(Node {
        id: "root".into(),
        run: Some(Arc::new(|_cx, _req, _v| Ok(0))),
        children: vec![
            Arc::new(Node {
                id: "alpha".into(),
                assert: Some(Arc::new(|_t, _cx, _req, _v, _result| {})),
                ..Node::default()
            }),
            Arc::new(Node {
                id: "beta".into(),
                assert: Some(Arc::new(|_t, _cx, _req, _v, _result| {})),
                ..Node::default()
            }),
        ],
        ..Node::default()
    });
    Tree::build(root, vec![]).unwrap()
}

#[test]
fn config_filter_selects_matching_case_paths() {
    let tree = two_leaf_tree();
    let mut t = NullReporter::new();
    let config = RunConfig {
        filter: Some("alpha".into()),
        list: false,
    };
    tree.run_with_config(&mut t, &config);

    assert_eq!(t.runs, vec!["root/alpha"]);
    assert_eq!(t.result.passed, 1);
}

#[test]
fn config_list_mode_prints_without_running() {
    let tree = two_leaf_tree();
    let mut t = NullReporter::new();
    let config = RunConfig {
        filter: None,
        list: true,
    };
    tree.run_with_config(&mut t, &config);

    assert!(t.runs.is_empty());
    assert_eq!(t.result.passed, 0);
    assert_eq!(t.logs, vec!["root/alpha".to_string(), "root/beta".to_string()]);
}

// ============================================================================
// The concrete end-to-end scenario
// ============================================================================

#[test]
fn detached_child_scenario_asserts_twenty_two() {
    let root: Arc<Node<i64, i64, ()>> = Arc::new(Node {
        id: "root".into(),
        setup: Some(Arc::new(|cx, _req, _v| (cx, 1))),
        ..Node::default()
    });
    let child: Arc<Node<i64, i64, ()>> = Arc::new(Node {
        id: "child".into(),
        parent_id: Some("root".into()),
        setup: Some(Arc::new(|cx, req, _v| (cx, req + 10))),
        run: Some(Arc::new(|_cx, req, _v| Ok(req * 2))),
        assert: Some(Arc::new(|t, _cx, _req, _v, result| {
            if result.as_ref().ok() != Some(&22) {
                t.error(&format!("expected 22, got {result:?}"));
            }
        })),
        ..Node::default()
    });

    let tree = Tree::build(root, vec![child]).unwrap();
    let mut t = NullReporter::new();
    tree.run_path(&mut t, &["root", "child"]);

    assert!(t.result.failures.is_empty(), "{:?}", t.result.failures);
}
