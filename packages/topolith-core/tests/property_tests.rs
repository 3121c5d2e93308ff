use proptest::prelude::*;
use topolith_core::grammar::{parse, Statement};
use topolith_core::{App, Item, ItemParams, ItemType, Rel, RelParams, Tree, World};

fn id_strategy() -> impl Strategy<Value = String> {
    // Ids may need quoting (spaces, punctuation) but never contain quotes or
    // newlines.
    proptest::string::string_regex("[a-zA-Z0-9_-]{1,8}( [a-zA-Z0-9_-]{1,8})?").unwrap()
}

fn text_strategy() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-zA-Z0-9_ .,:-]{0,16}").unwrap()
}

fn item_type_strategy() -> impl Strategy<Value = ItemType> {
    prop_oneof![
        Just(ItemType::Unset),
        Just(ItemType::Person),
        Just(ItemType::Database),
        Just(ItemType::Queue),
        Just(ItemType::Blobstore),
        Just(ItemType::Browser),
        Just(ItemType::Mobile),
        Just(ItemType::Server),
        Just(ItemType::Device),
        Just(ItemType::Code),
    ]
}

fn item_strategy() -> impl Strategy<Value = Item> {
    (
        id_strategy(),
        any::<bool>(),
        item_type_strategy(),
        text_strategy(),
        text_strategy(),
        text_strategy(),
    )
        .prop_map(|(id, external, item_type, name, mechanism, expanded)| Item {
            id,
            external,
            item_type,
            name: name.trim().to_string(),
            mechanism: mechanism.trim().to_string(),
            expanded: expanded.trim().to_string(),
        })
}

fn rel_strategy() -> impl Strategy<Value = Rel> {
    (
        id_strategy(),
        id_strategy(),
        text_strategy(),
        text_strategy(),
        any::<bool>(),
        text_strategy(),
    )
        .prop_map(|(from, to, verb, mechanism, async_, expanded)| Rel {
            from,
            to,
            verb: verb.trim().to_string(),
            mechanism: mechanism.trim().to_string(),
            async_,
            expanded: expanded.trim().to_string(),
        })
}

proptest! {
    #[test]
    fn item_repr_round_trips(item in item_strategy()) {
        let repr = item.to_string();
        let parsed = Item::from_repr(&repr).unwrap();
        prop_assert_eq!(parsed, item);
    }

    #[test]
    fn rel_repr_round_trips(rel in rel_strategy()) {
        let repr = rel.to_string();
        let parsed = Rel::from_repr(&repr).unwrap();
        prop_assert_eq!(parsed, rel);
    }

    #[test]
    fn tree_round_trips(parents in proptest::collection::vec(0usize..6, 1..8)) {
        // Build a forest: node i attaches under one of the nodes 0..i, or the
        // root when the drawn parent is not yet placed.
        let mut tree = Tree::new();
        let ids: Vec<String> = (0..parents.len()).map(|i| format!("n{i}")).collect();
        for (i, &p) in parents.iter().enumerate() {
            let parent = if p < i { Some(ids[p].as_str()) } else { None };
            tree.add_or_move(&ids[i], parent).unwrap();
        }
        tree.validate().unwrap();

        let items = ids
            .iter()
            .map(|id| (id.clone(), Item::new(id.clone())))
            .collect();
        let rendered = tree.render(&items);
        let parsed = match parse(&rendered) {
            Ok(Statement::Tree(node)) => node,
            other => {
                prop_assert!(false, "not a tree statement: {:?}", other);
                unreachable!()
            }
        };
        let (reparsed, _) = Tree::from_parsed(&parsed).unwrap();
        for id in &ids {
            prop_assert_eq!(reparsed.parent_of(id), tree.parent_of(id));
            prop_assert_eq!(reparsed.children_of(id), tree.children_of(id));
        }
    }

    #[test]
    fn world_round_trips_under_world_equality(
        items in proptest::collection::vec(item_strategy(), 1..6),
        nest_pairs in proptest::collection::vec((0usize..6, 0usize..6), 0..4),
        rel_pairs in proptest::collection::vec((0usize..6, 0usize..6), 0..4),
    ) {
        let mut world = World::new("prop-world");
        let mut ids: Vec<String> = Vec::new();
        for item in &items {
            if world.item_fetch(&item.id).is_some() {
                continue;
            }
            let params = ItemParams::capture(item);
            world.item_create(&item.id, params).unwrap();
            ids.push(item.id.clone());
        }
        for (a, b) in nest_pairs {
            let (a, b) = (a % ids.len(), b % ids.len());
            // Cyclic nests are rejected; ignore them here.
            let _ = world.nest(&ids[a], &ids[b]);
        }
        for (a, b) in rel_pairs {
            let (a, b) = (a % ids.len(), b % ids.len());
            world.rel_create(&ids[a], &ids[b], RelParams::default()).unwrap();
        }
        world.validate_sync().unwrap();

        let reparsed: World = world.to_string().parse().unwrap();
        prop_assert!(world.semantic_eq(&reparsed));
        // Serialization is a fixed point.
        prop_assert_eq!(reparsed.to_string(), world.to_string());
    }

    #[test]
    fn executed_commands_undo_to_the_pre_state(script in proptest::collection::vec(0usize..8, 1..12)) {
        let lines = [
            "item create a",
            "item create b type=server",
            "rel create a b verb=uses",
            "nest a in b",
            "item set a name=\"A\"",
            "free a",
            "item delete a",
            "rel delete a b",
        ];
        let mut app = App::new(World::new("prop"));
        let mut snapshots: Vec<World> = Vec::new();
        for step in &script {
            snapshots.push(app.world().clone());
            // Failures are fine: failed commands record no-op inverses.
            let _ = app.exec(lines[*step]);
        }
        for expected in snapshots.iter().rev() {
            app.undo().unwrap();
            prop_assert!(app.world().semantic_eq(expected));
        }
        prop_assert!(!app.can_undo());
    }
}
