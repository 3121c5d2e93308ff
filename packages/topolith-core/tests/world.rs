use topolith_core::{ErrorCode, ItemParams, ItemType, RelParams, World};

fn item_params(pairs: &[(&str, &str)]) -> ItemParams {
    let map = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    ItemParams::from_map(&map).unwrap()
}

fn rel_params(pairs: &[(&str, &str)]) -> RelParams {
    let map = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    RelParams::from_map(&map).unwrap()
}

#[test]
fn item_create_with_empty_id_is_invalid() {
    let mut w = World::new("w");
    let err = w.item_create("", ItemParams::default()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Invalid);
}

#[test]
fn item_create_is_idempotent_on_matching_params() {
    let mut w = World::new("w");
    w.item_create("db", item_params(&[("external", "true")]))
        .unwrap();
    let again = w
        .item_create("db", item_params(&[("external", "true")]))
        .unwrap();
    assert!(again.external);
    assert_eq!(w.item_list(0).len(), 1);
}

#[test]
fn item_create_conflicts_on_mismatched_params() {
    let mut w = World::new("w");
    w.item_create("db", item_params(&[("external", "true")]))
        .unwrap();
    let err = w
        .item_create("db", item_params(&[("external", "false")]))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);
    assert_eq!(err.message(), "parameter mismatch");
    // The existing item is unchanged.
    assert!(w.item_fetch("db").unwrap().external);
}

#[test]
fn item_set_accepts_type_by_name_or_integer() {
    let mut w = World::new("w");
    w.item_create("db", ItemParams::default()).unwrap();
    w.item_set("db", item_params(&[("type", "database")])).unwrap();
    assert_eq!(w.item_fetch("db").unwrap().item_type, ItemType::Database);
    w.item_set("db", item_params(&[("type", "7")])).unwrap();
    assert_eq!(w.item_fetch("db").unwrap().item_type, ItemType::Server);
    // Bad numeric type errors but other fields still land.
    let err = w
        .item_set("db", item_params(&[("type", "99"), ("name", "kept")]))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);
    assert_eq!(w.item_fetch("db").unwrap().name, "kept");
    assert_eq!(w.item_fetch("db").unwrap().item_type, ItemType::Server);
}

#[test]
fn item_set_on_missing_item_is_not_found() {
    let mut w = World::new("w");
    let err = w.item_set("ghost", ItemParams::default()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[test]
fn item_delete_cascades_to_rels_and_reparents_children() {
    let mut w = World::new("w");
    for id in ["sys", "svc", "db"] {
        w.item_create(id, ItemParams::default()).unwrap();
    }
    w.nest("svc", "sys").unwrap();
    w.rel_create("svc", "db", RelParams::default()).unwrap();
    w.rel_create("db", "sys", RelParams::default()).unwrap();

    w.item_delete("sys").unwrap();
    assert!(w.item_fetch("sys").is_none());
    // svc re-parents to the root.
    assert_eq!(w.parent("svc").unwrap(), None);
    // Every rel touching sys is gone; the unrelated one stays.
    assert_eq!(w.rel_list(0).len(), 1);
    assert_eq!(w.rel_list(0)[0].id(), "svc::db");
    w.validate_sync().unwrap();
}

#[test]
fn item_delete_missing_is_a_noop() {
    let mut w = World::new("w");
    w.item_delete("ghost").unwrap();
    assert!(w.item_list(0).is_empty());
}

#[test]
fn item_list_honors_limit() {
    let mut w = World::new("w");
    for id in ["a", "b", "c"] {
        w.item_create(id, ItemParams::default()).unwrap();
    }
    assert_eq!(w.item_list(0).len(), 3);
    assert_eq!(w.item_list(2).len(), 2);
}

#[test]
fn item_clear_resets_named_fields() {
    let mut w = World::new("w");
    w.item_create(
        "db",
        item_params(&[("name", "Postgres"), ("external", "true")]),
    )
    .unwrap();
    w.item_clear("db", &["name".to_string()]).unwrap();
    let item = w.item_fetch("db").unwrap();
    assert_eq!(item.name, "");
    assert!(item.external);
}

#[test]
fn nest_and_free_move_items() {
    let mut w = World::new("w");
    w.item_create("server", ItemParams::default()).unwrap();
    w.item_create("client", ItemParams::default()).unwrap();
    w.nest("client", "server").unwrap();
    assert!(w.is_in("client", "server", false));
    assert!(w.is_in("client", "server", true));
    assert_eq!(w.parent("client").unwrap(), Some("server".to_string()));
    assert_eq!(w.components("server").unwrap(), vec!["client".to_string()]);

    w.free("client").unwrap();
    assert!(!w.is_in("client", "server", false));
    assert_eq!(w.parent("client").unwrap(), None);
}

#[test]
fn nest_missing_endpoints_are_not_found() {
    let mut w = World::new("w");
    w.item_create("a", ItemParams::default()).unwrap();
    assert_eq!(
        w.nest("ghost", "a").unwrap_err().code(),
        ErrorCode::NotFound
    );
    assert_eq!(
        w.nest("a", "ghost").unwrap_err().code(),
        ErrorCode::NotFound
    );
}

#[test]
fn nest_under_self_or_descendant_is_a_conflict() {
    let mut w = World::new("w");
    for id in ["a", "b", "c"] {
        w.item_create(id, ItemParams::default()).unwrap();
    }
    w.nest("b", "a").unwrap();
    w.nest("c", "b").unwrap();
    assert_eq!(w.nest("a", "a").unwrap_err().code(), ErrorCode::Conflict);
    assert_eq!(w.nest("a", "c").unwrap_err().code(), ErrorCode::Conflict);
    // The tree is untouched.
    assert_eq!(w.parent("a").unwrap(), None);
}

#[test]
fn nest_below_existing_ancestor_is_a_noop() {
    let mut w = World::new("w");
    for id in ["a", "b", "c"] {
        w.item_create(id, ItemParams::default()).unwrap();
    }
    w.nest("b", "a").unwrap();
    w.nest("c", "b").unwrap();
    // c already sits under a transitively; nest is a no-op.
    w.nest("c", "a").unwrap();
    assert_eq!(w.parent("c").unwrap(), Some("b".to_string()));
}

#[test]
fn rel_create_requires_both_endpoints() {
    let mut w = World::new("w");
    w.item_create("a", ItemParams::default()).unwrap();
    assert_eq!(
        w.rel_create("a", "ghost", RelParams::default())
            .unwrap_err()
            .code(),
        ErrorCode::NotFound
    );
    assert_eq!(
        w.rel_create("ghost", "a", RelParams::default())
            .unwrap_err()
            .code(),
        ErrorCode::NotFound
    );
}

#[test]
fn rel_create_conflicts_on_mismatched_params() {
    let mut w = World::new("w");
    w.item_create("a", ItemParams::default()).unwrap();
    w.item_create("b", ItemParams::default()).unwrap();
    w.rel_create("a", "b", rel_params(&[("verb", "reads")]))
        .unwrap();
    // Matching params are idempotent.
    w.rel_create("a", "b", rel_params(&[("verb", "reads")]))
        .unwrap();
    let err = w
        .rel_create("a", "b", rel_params(&[("verb", "writes")]))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Conflict);
    assert_eq!(w.rel_list(0).len(), 1);
}

#[test]
fn rel_fetch_strict_and_subtree_expansion() {
    let mut w = World::new("w");
    for id in ["A", "B", "a1", "b1"] {
        w.item_create(id, ItemParams::default()).unwrap();
    }
    w.nest("a1", "A").unwrap();
    w.nest("b1", "B").unwrap();
    w.rel_create("a1", "b1", RelParams::default()).unwrap();

    let found = w.rel_fetch("A", "B", false);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id(), "a1::b1");
    assert!(w.rel_fetch("A", "B", true).is_empty());

    // With no descendants the non-strict fetch degenerates to strict lookup.
    assert_eq!(w.rel_fetch("a1", "b1", false).len(), 1);
    assert!(w.rel_fetch("b1", "a1", false).is_empty());
}

#[test]
fn rel_to_and_rel_from_invert_the_strict_flag() {
    let mut w = World::new("w");
    for id in ["A", "a1", "x"] {
        w.item_create(id, ItemParams::default()).unwrap();
    }
    w.nest("a1", "A").unwrap();
    w.rel_create("x", "a1", RelParams::default()).unwrap();
    w.rel_create("a1", "x", RelParams::default()).unwrap();

    // Non-strict matches the single id only.
    assert!(w.rel_to("A", false).is_empty());
    assert_eq!(w.rel_to("a1", false).len(), 1);
    // Strict expands to descendants.
    assert_eq!(w.rel_to("A", true).len(), 1);
    assert!(w.rel_from("A", false).is_empty());
    assert_eq!(w.rel_from("A", true).len(), 1);
}

#[test]
fn rel_set_and_clear_update_fields() {
    let mut w = World::new("w");
    w.item_create("a", ItemParams::default()).unwrap();
    w.item_create("b", ItemParams::default()).unwrap();
    w.rel_create("a", "b", rel_params(&[("verb", "reads"), ("async", "true")]))
        .unwrap();
    w.rel_set("a", "b", rel_params(&[("mechanism", "HTTPS")]))
        .unwrap();
    let rel = &w.rel_fetch("a", "b", true)[0];
    assert_eq!(rel.mechanism, "HTTPS");
    assert!(rel.async_);

    w.rel_clear("a", "b", &["async".to_string()]).unwrap();
    assert!(!w.rel_fetch("a", "b", true)[0].async_);

    assert_eq!(
        w.rel_set("a", "ghost", RelParams::default())
            .unwrap_err()
            .code(),
        ErrorCode::NotFound
    );
}

#[test]
fn world_serde_round_trips_under_world_equality() {
    let source = "$$world\nversion=1\nid=1\nname=worldname\nexpanded=\"this is expanded data\"\ntree{nil::[tree{item \"2\" external=false::[tree{item \"1\" external=false::[]}]} tree{item \"3\" external=false::[]}]}\nrel \"3\" \"2\"\nrel \"1\" \"2\"\nendworld$$";
    let w: World = source.parse().unwrap();
    assert_eq!(w.version(), 1);
    assert_eq!(w.id(), "1");
    assert_eq!(w.name(), "worldname");
    assert_eq!(w.expanded(), "this is expanded data");
    assert_eq!(w.item_list(0).len(), 3);
    assert_eq!(w.rel_list(0).len(), 2);
    assert_eq!(w.parent("1").unwrap(), Some("2".to_string()));

    let w2: World = w.to_string().parse().unwrap();
    assert!(w.semantic_eq(&w2));
}

#[test]
fn canonical_serialization_is_stable() {
    let source = "$$world\nversion=1\nid=w\nname=w\nexpanded=\ntree{nil::[tree{item \"A\"::[tree{item \"a1\"::[]}]} tree{item \"B\"::[]}]}\nrel \"a1\" \"B\"\nendworld$$";
    let w: World = source.parse().unwrap();
    assert_eq!(w.to_string(), source);
}

#[test]
fn rel_endpoints_stay_closed_over_items() {
    let mut w = World::new("w");
    for id in ["a", "b"] {
        w.item_create(id, ItemParams::default()).unwrap();
    }
    w.rel_create("a", "b", RelParams::default()).unwrap();
    w.item_delete("b").unwrap();
    assert!(w.rel_list(0).is_empty());
    w.validate_sync().unwrap();
}
