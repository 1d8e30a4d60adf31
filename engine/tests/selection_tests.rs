use hakitree_engine::selection::{AuxiliaryKind, NodeStatus};
use hakitree_engine::{
    AuxiliaryRequest, AuxiliaryValue, AwakeningConfig, AwakeningNode, DefaultResolver,
    EngineConfig, EngineError, HakiEngine, RandomFilter, Rng, SelectOutcome, SelectionKey,
    SelectionStateMachine, Session, SkillCatalog, SkillTree,
};

fn catalog(json: &str) -> SkillCatalog {
    let tree = SkillTree::from_json("t", "T", json, 5).expect("tree should parse");
    SkillCatalog::new(vec![tree]).expect("catalog should index")
}

fn cancel(_: &AuxiliaryRequest) -> Option<AuxiliaryValue> {
    None
}

#[test]
fn prerequisite_and_dependent_rules_follow_the_budget_walkthrough() {
    let catalog = catalog(
        r#"[
            {"id": "a", "name": "A", "cost": 3},
            {"id": "b", "name": "B", "cost": 4, "requires": ["a"], "requiresOperator": "and"}
        ]"#,
    );
    let awakening = AwakeningNode::default();
    let machine = SelectionStateMachine::new(&catalog, &awakening);
    let mut session = Session::new(10);

    let err = machine
        .select_request(&mut session, "t", "b", &mut DefaultResolver)
        .unwrap_err();
    assert!(matches!(err, EngineError::PrerequisiteUnmet(_)));

    machine
        .select_request(&mut session, "t", "a", &mut DefaultResolver)
        .expect("select a");
    machine
        .select_request(&mut session, "t", "b", &mut DefaultResolver)
        .expect("select b");
    assert_eq!(session.remaining(&catalog), 3);

    let err = machine.deselect_request(&mut session, "t", "a").unwrap_err();
    match err {
        EngineError::DependentStillSelected { key, dependent } => {
            assert_eq!(key, SelectionKey::new("t", "a"));
            assert_eq!(dependent, SelectionKey::new("t", "b"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(session.is_selected("t", "a"));

    machine.deselect_request(&mut session, "t", "b").expect("deselect b");
    machine.deselect_request(&mut session, "t", "a").expect("deselect a");
    assert_eq!(session.remaining(&catalog), 10);
    assert_eq!(session.selected_len(), 0);
}

#[test]
fn cancelled_prompt_rolls_the_selection_back() {
    let catalog = catalog(
        r#"[{"id": "c", "name": "C", "cost": 3, "effects": [{"type": "pool_choice", "default": 4}]}]"#,
    );
    let awakening = AwakeningNode::default();
    let machine = SelectionStateMachine::new(&catalog, &awakening);
    let mut session = Session::new(10);
    let before = session.clone();

    let err = machine
        .select_request(&mut session, "t", "c", &mut cancel)
        .unwrap_err();
    assert!(matches!(err, EngineError::AuxiliaryCancelled(_)));
    assert_eq!(session.remaining(&catalog), 10);
    assert!(!session.is_selected("t", "c"));
    assert!(session.pending().is_none());
    assert_eq!(session, before);
}

#[test]
fn resolver_value_is_stored_with_the_selection() {
    let catalog = catalog(
        r#"[{"id": "c", "name": "C", "cost": 3, "effects": [{"type": "pool_choice"}]}]"#,
    );
    let awakening = AwakeningNode::default();
    let machine = SelectionStateMachine::new(&catalog, &awakening);
    let mut session = Session::new(10);

    let mut asked = Vec::new();
    let mut resolver = |req: &AuxiliaryRequest| -> Option<AuxiliaryValue> {
        asked.push(req.kind);
        Some(AuxiliaryValue::PoolChoice(8))
    };
    let key = machine
        .select_request(&mut session, "t", "c", &mut resolver)
        .expect("select");
    assert_eq!(asked, vec![AuxiliaryKind::PoolChoice { default: 5 }]);
    assert_eq!(session.pool_choice(&key), Some(8));
}

#[test]
fn awakening_prompt_wins_over_pool_choice() {
    let config = EngineConfig::default();
    let engine = HakiEngine::bundled(config).expect("bundled trees");
    let machine = engine.selection();
    let mut session = engine.new_session();

    let outcome = machine
        .begin_select(&mut session, "armament-tree", "armament_awakening")
        .expect("begin");
    let SelectOutcome::Pending(request) = outcome else {
        panic!("awakening needs input");
    };
    assert_eq!(
        request.kind,
        AuxiliaryKind::Awakening {
            default: AwakeningConfig { pool: 5, cap: 2 }
        }
    );
    machine
        .resolve_pending(
            &mut session,
            AuxiliaryValue::Awakening(AwakeningConfig { pool: 7, cap: 3 }),
        )
        .expect("resolve");

    let stats = engine.stats(&session);
    assert_eq!(stats.pool, 7);
    assert_eq!(stats.cap_attack, 3);
    assert_eq!(stats.cap_defend, 3);
}

#[test]
fn or_dependent_survives_while_another_parent_stays_selected() {
    let catalog = catalog(
        r#"[
            {"id": "a", "name": "A", "type": "offense", "cost": 1},
            {"id": "b", "name": "B", "type": "defense", "cost": 1},
            {"id": "either", "name": "Either", "type": "offense", "requires": ["a", "b"], "requiresOperator": "or", "cost": 1},
            {"id": "shared", "name": "Shared", "requires": ["a", "b"], "cost": 1}
        ]"#,
    );
    let awakening = AwakeningNode::default();
    let machine = SelectionStateMachine::new(&catalog, &awakening);
    let mut session = Session::new(10);
    for id in ["a", "b", "either", "shared"] {
        machine
            .select_request(&mut session, "t", id, &mut DefaultResolver)
            .expect("select");
    }

    machine.deselect_request(&mut session, "t", "a").expect("b still covers");
    let err = machine.deselect_request(&mut session, "t", "b").unwrap_err();
    assert!(matches!(err, EngineError::DependentStillSelected { .. }));
}

#[test]
fn and_dependent_blocks_either_parent() {
    let catalog = catalog(
        r#"[
            {"id": "a", "name": "A", "type": "offense", "cost": 1},
            {"id": "b", "name": "B", "type": "offense", "cost": 1},
            {"id": "both", "name": "Both", "type": "offense", "requires": ["a", "b"], "cost": 1}
        ]"#,
    );
    let awakening = AwakeningNode::default();
    let machine = SelectionStateMachine::new(&catalog, &awakening);
    let mut session = Session::new(10);

    machine
        .select_request(&mut session, "t", "a", &mut DefaultResolver)
        .expect("select a");
    let err = machine
        .select_request(&mut session, "t", "both", &mut DefaultResolver)
        .unwrap_err();
    assert!(matches!(err, EngineError::PrerequisiteUnmet(_)));
    machine
        .select_request(&mut session, "t", "b", &mut DefaultResolver)
        .expect("select b");
    machine
        .select_request(&mut session, "t", "both", &mut DefaultResolver)
        .expect("select both");

    assert!(machine.deselect_request(&mut session, "t", "a").is_err());
    assert!(machine.deselect_request(&mut session, "t", "b").is_err());
}

#[test]
fn budget_is_enforced_and_may_go_negative_when_lowered() {
    let catalog = catalog(
        r#"[
            {"id": "a", "name": "A", "cost": 6},
            {"id": "b", "name": "B", "cost": 5}
        ]"#,
    );
    let awakening = AwakeningNode::default();
    let machine = SelectionStateMachine::new(&catalog, &awakening);
    let mut session = Session::new(10);

    machine
        .select_request(&mut session, "t", "a", &mut DefaultResolver)
        .expect("select a");
    let err = machine
        .select_request(&mut session, "t", "b", &mut DefaultResolver)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::BudgetExceeded {
            cost: 5,
            remaining: 4,
            ..
        }
    ));

    session.total_points = 4;
    assert_eq!(session.remaining(&catalog), -2);
    assert_eq!(session.remaining_display(&catalog), 0);
    assert!(session.is_selected("t", "a"));
}

#[test]
fn repeated_select_and_deselect_are_no_ops() {
    let catalog = catalog(r#"[{"id": "a", "name": "A", "cost": 2}]"#);
    let awakening = AwakeningNode::default();
    let machine = SelectionStateMachine::new(&catalog, &awakening);
    let mut session = Session::new(10);

    machine.deselect_request(&mut session, "t", "a").expect("unselected is fine");
    machine
        .select_request(&mut session, "t", "a", &mut DefaultResolver)
        .expect("select");
    machine
        .select_request(&mut session, "t", "a", &mut DefaultResolver)
        .expect("select again");
    assert_eq!(session.remaining(&catalog), 8);
}

#[test]
fn node_status_reflects_selection_and_prerequisites() {
    let catalog = catalog(
        r#"[
            {"id": "a", "name": "A", "cost": 1},
            {"id": "b", "name": "B", "type": "offense", "requires": "a", "cost": 1}
        ]"#,
    );
    let awakening = AwakeningNode::default();
    let machine = SelectionStateMachine::new(&catalog, &awakening);
    let graph = catalog.graph("t").expect("tree");
    let mut session = Session::new(10);

    assert_eq!(session.node_status(graph, "a"), Some(NodeStatus::Available));
    assert_eq!(session.node_status(graph, "b"), Some(NodeStatus::Locked));
    machine
        .select_request(&mut session, "t", "a", &mut DefaultResolver)
        .expect("select");
    assert_eq!(session.node_status(graph, "a"), Some(NodeStatus::Selected));
    assert_eq!(session.node_status(graph, "b"), Some(NodeStatus::Available));
    assert_eq!(session.node_status(graph, "ghost"), None);
}

#[test]
fn randomize_with_a_seed_is_reproducible_and_respects_rules() {
    let engine = HakiEngine::bundled(EngineConfig::default()).expect("bundled trees");
    let machine = engine.selection();
    let filter = RandomFilter::All;

    let run = |seed: u64| {
        let mut session = Session::new(15);
        let report = machine
            .randomize_fill(
                &mut session,
                |tree, node| filter.matches(tree, node),
                &mut Rng::new(seed),
            )
            .expect("randomize");
        (session, report)
    };

    let (first, report) = run(42);
    let (second, _) = run(42);
    assert_eq!(first, second);
    assert!(!report.picked.is_empty());
    assert!(report.remaining >= 0);
    assert_eq!(report.remaining, first.remaining(engine.catalog()));

    for key in first.selected() {
        let graph = engine.catalog().graph(&key.tree).expect("tree");
        let node = graph.node(&key.skill).expect("node");
        assert!(hakitree_engine::graph::prerequisites_satisfied(node, |r| {
            first.is_selected(&key.tree, r)
        }));
    }
}

#[test]
fn randomize_role_filter_stays_in_its_tree() {
    let engine = HakiEngine::bundled(EngineConfig::default()).expect("bundled trees");
    let machine = engine.selection();
    let filter = RandomFilter::parse_mode("obs-defense").expect("mode");
    let mut session = Session::new(30);

    machine
        .randomize_fill(&mut session, |tree, node| filter.matches(tree, node), &mut Rng::new(9))
        .expect("randomize");
    assert!(session.selected_len() > 0);
    for key in session.selected() {
        assert_eq!(key.tree, "observation-tree");
        let node = engine.catalog().node(&key.tree, &key.skill).expect("node");
        assert_ne!(node.kind, hakitree_engine::SkillType::Offense);
    }
}

#[test]
fn randomize_with_no_budget_picks_nothing() {
    let engine = HakiEngine::bundled(EngineConfig::default()).expect("bundled trees");
    let machine = engine.selection();
    let mut session = Session::new(0);
    let report = machine
        .randomize_fill(&mut session, |_, _| true, &mut Rng::new(1))
        .expect("randomize");
    assert!(report.picked.is_empty());
    assert_eq!(session.selected_len(), 0);
}
