use topolith_core::grammar::{parse, Statement};
use topolith_core::{App, Command, ErrorCode, Output, World};

fn app() -> App {
    App::new(World::new("test-world"))
}

fn exec(app: &mut App, line: &str) -> String {
    app.exec(line)
}

fn command_for(line: &str) -> Command {
    match parse(line) {
        Ok(Statement::Command(attrs)) => Command::from_input(&attrs).unwrap(),
        other => panic!("expected command for {line:?}, got {other:?}"),
    }
}

#[test]
fn execute_then_undo_restores_the_world() {
    // One mutating command of each shape, applied on top of a small base
    // world; every one must undo back to the exact pre-state.
    let base = [
        "item create sys",
        "item create svc name=\"Service\"",
        "item create db external=true type=database",
        "nest svc in sys",
        "rel create svc db verb=writes",
    ];
    let mutations = [
        "item create cache type=queue",
        "item create db external=true type=database", // idempotent create
        "item set svc name=\"Renamed\" mechanism=Rust",
        "item clear db external type",
        "item delete db",
        "item delete ghost", // no-op delete
        "nest db in sys",
        "free svc",
        "item svc",                   // create-or-fetch, existing
        "item cache2 name=\"fresh\"", // create-or-set, fresh
        "item svc name=\"Other\"",    // create-or-set, existing
        "rel create db svc verb=reads",
        "rel svc db async=true", // create-or-set, existing
        "rel set svc db mechanism=HTTPS",
        "rel clear svc db verb",
        "rel delete svc db",
        "rel delete svc ghost", // no-op delete
    ];

    for mutation in mutations {
        let mut app = app();
        for line in base {
            let response = exec(&mut app, line);
            assert!(response.contains("200 ok"), "base setup failed: {line}\n{response}");
        }
        let before = app.world().clone();
        exec(&mut app, mutation);
        app.undo().unwrap();
        assert!(
            app.world().semantic_eq(&before),
            "undo did not restore the world for {mutation:?}\nbefore:\n{before}\nafter:\n{}",
            app.world()
        );
    }
}

#[test]
fn undo_then_redo_reproduces_the_post_state() {
    let mut app = app();
    for line in [
        "item create sys",
        "item create svc",
        "nest svc in sys",
        "rel create svc sys verb=calls",
        "item set svc name=\"Service\"",
    ] {
        exec(&mut app, line);
    }
    let after = app.world().clone();
    app.undo().unwrap();
    app.undo().unwrap();
    app.redo().unwrap();
    app.redo().unwrap();
    assert!(app.world().semantic_eq(&after));
}

#[test]
fn undo_delete_restores_nesting_and_rels() {
    let mut app = app();
    for line in [
        "item create sys",
        "item create svc",
        "item create db name=\"Postgres\"",
        "nest db in sys",
        "item create inner",
        "nest inner in db",
        "rel create svc db verb=writes",
    ] {
        exec(&mut app, line);
    }
    let before = app.world().clone();
    exec(&mut app, "item delete db");
    assert!(app.world().item_fetch("db").is_none());
    // Children were re-parented, rels cascaded away.
    assert_eq!(app.world().parent("inner").unwrap(), Some("sys".to_string()));
    assert!(app.world().rel_list(0).is_empty());

    app.undo().unwrap();
    let restored = app.world();
    assert!(restored.semantic_eq(&before));
    assert_eq!(restored.item_fetch("db").unwrap().name, "Postgres");
    assert_eq!(restored.parent("db").unwrap(), Some("sys".to_string()));
    assert_eq!(restored.parent("inner").unwrap(), Some("db".to_string()));
    assert_eq!(restored.rel_list(0).len(), 1);
}

#[test]
fn plural_nest_and_free_undo_per_id() {
    let mut app = app();
    for line in [
        "item create box",
        "item create a",
        "item create b",
        "item create c",
        "nest c in box",
    ] {
        exec(&mut app, line);
    }
    let before = app.world().clone();
    exec(&mut app, "nest a b c in box");
    assert_eq!(app.world().components("box").unwrap().len(), 3);
    app.undo().unwrap();
    assert!(app.world().semantic_eq(&before));

    exec(&mut app, "nest a b in box");
    let nested = app.world().clone();
    exec(&mut app, "free a b");
    assert_eq!(app.world().parent("a").unwrap(), None);
    app.undo().unwrap();
    assert!(app.world().semantic_eq(&nested));
}

#[test]
fn cursor_discipline() {
    let mut app = app();
    assert!(!app.can_undo());
    assert!(!app.can_redo());

    exec(&mut app, "item create a");
    exec(&mut app, "item create b");
    assert!(app.can_undo());
    assert!(!app.can_redo());
    assert_eq!(app.history().len(), 2);

    app.undo().unwrap();
    assert!(app.can_undo());
    assert!(app.can_redo());
    assert_eq!(app.history().len(), 1);

    // A new command truncates the redoable tail.
    exec(&mut app, "item create c");
    assert!(!app.can_redo());
    assert_eq!(app.history().len(), 2);
    assert!(app.world().item_fetch("b").is_none());
    assert!(app.world().item_fetch("c").is_some());

    app.undo().unwrap();
    app.undo().unwrap();
    assert!(!app.can_undo());
    assert_eq!(app.undo().unwrap(), 0);
    assert_eq!(app.redo().unwrap(), 1);
    assert!(app.world().item_fetch("a").is_some());
}

#[test]
fn queries_are_recorded_with_noop_undo() {
    let mut app = app();
    exec(&mut app, "item create a");
    let before = app.world().clone();
    for line in ["item? a", "item fetch a", "item list", "world", "in? a a"] {
        exec(&mut app, line);
    }
    assert_eq!(app.history().len(), 6);
    // Undoing the queries leaves the world alone.
    for _ in 0..5 {
        app.undo().unwrap();
        assert!(app.world().semantic_eq(&before));
    }
    // The final undo reverses the create.
    app.undo().unwrap();
    assert!(app.world().item_fetch("a").is_none());
}

#[test]
fn failed_executes_are_recorded_and_undo_as_noops() {
    let mut app = app();
    exec(&mut app, "item create a");
    // NotFound set: recorded, undo is a no-op.
    let response = exec(&mut app, "item set ghost name=\"x\"");
    assert!(response.contains("404 error"));
    assert!(app.can_undo());
    let before = app.world().clone();
    app.undo().unwrap();
    assert!(app.world().semantic_eq(&before));
}

#[test]
fn commands_render_canonical_reparseable_text() {
    let lines = [
        "item create \"db\" external=true name=\"Postgres\"",
        "item set \"db\" type=database",
        "item clear \"db\" name",
        "item delete \"db\"",
        "nest \"a\" \"b\" in \"box\"",
        "free \"a\"",
        "item? \"db\"",
        "in? \"a\" \"box\"",
        "rel create \"a\" \"b\" verb=\"writes\"",
        "rel fetch \"a\" \"b\" --strict",
        "rel delete \"a\" \"b\"",
        "to? \"a\"",
        "from? \"a\"",
        "world",
    ];
    for line in lines {
        let command = command_for(line);
        let rendered = command.to_string();
        let reparsed = command_for(&rendered);
        assert_eq!(
            reparsed, command,
            "canonical text did not round-trip for {line:?} -> {rendered:?}"
        );
    }
}

#[test]
fn outputs_render_reparseable_objects() {
    let mut app = app();
    exec(&mut app, "item create a");
    exec(&mut app, "item create b");
    exec(&mut app, "rel create a b verb=likes");

    let mut fetch = command_for("rel fetch a b");
    let mut world = app.world().clone();
    let output = fetch.execute(&mut world).unwrap();
    match &output {
        Output::Rels(rels) => assert_eq!(rels.len(), 1),
        other => panic!("expected rels, got {other:?}"),
    }
    assert!(parse(&output.to_string()).is_ok());

    let mut list = command_for("item list");
    let output = list.execute(&mut world).unwrap();
    assert_eq!(output.to_string(), "\"a\" \"b\"");
    assert!(parse(&output.to_string()).is_ok());
}

#[test]
fn rel_queries_honor_ids_flag() {
    let mut app = app();
    exec(&mut app, "item create a");
    exec(&mut app, "item create b");
    exec(&mut app, "rel create a b");
    let mut world = app.world().clone();

    let mut query = command_for("from? a --ids");
    let output = query.execute(&mut world).unwrap();
    assert_eq!(output, Output::Ids(vec!["a::b".to_string()]));
}

#[test]
fn rel_shortcut_without_second_id_is_invalid_at_construction() {
    let attrs = match parse("rel lonely") {
        Ok(Statement::Command(attrs)) => attrs,
        other => panic!("expected command, got {other:?}"),
    };
    let err = Command::from_input(&attrs).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Invalid);
}
