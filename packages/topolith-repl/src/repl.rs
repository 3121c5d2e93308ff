use anyhow::Result;
use colored::Colorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Editor, Helper};

use topolith_core::App;

pub enum Control {
    Continue,
    Exit,
}

const KEYWORDS: &[(&str, &str)] = &[
    ("item", "Manage items"),
    ("items", "List items"),
    ("rel", "Manage relationships"),
    ("world", "Show the world"),
    ("in?", "Check item containment"),
    ("to?", "Rels into an item"),
    ("from?", "Rels out of an item"),
    ("nest", "Nest items"),
    ("free", "Free items"),
    ("undo", "Undo last action"),
    ("redo", "Redo reversed action"),
    ("save", "Store the world"),
    ("load", "Load a world"),
    ("worlds", "List saved worlds"),
    ("exit", "Quit"),
];

struct ReplHelper;

impl Completer for ReplHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> std::result::Result<(usize, Vec<Pair>), ReadlineError> {
        // Complete only the leading keyword.
        let head = &line[..pos];
        if head.contains(' ') {
            return Ok((pos, Vec::new()));
        }
        let candidates = KEYWORDS
            .iter()
            .filter(|(kw, _)| kw.starts_with(head))
            .map(|(kw, _)| Pair {
                display: kw.to_string(),
                replacement: kw.to_string(),
            })
            .collect();
        Ok((0, candidates))
    }
}

impl Hinter for ReplHelper {
    type Hint = String;
}
impl Highlighter for ReplHelper {}
impl Validator for ReplHelper {}
impl Helper for ReplHelper {}

pub fn run(app: &mut App) -> Result<()> {
    println!("Interactive console. Type 'exit' or Ctrl-D to quit.");
    let mut editor: Editor<ReplHelper, rustyline::history::DefaultHistory> = Editor::new()?;
    editor.set_helper(Some(ReplHelper));

    loop {
        match editor.readline(">>> ") {
            Ok(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(&line);
                match dispatch(app, &line) {
                    Ok(Control::Continue) => {}
                    Ok(Control::Exit) => break,
                    Err(err) => eprintln!("{}", err.to_string().red()),
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Route one input line: shell directives are handled here, everything else
/// goes through the core application.
pub fn dispatch(app: &mut App, line: &str) -> Result<Control> {
    let mut words = line.split_whitespace();
    let head = words.next().unwrap_or_default();
    match head {
        "exit" | "quit" => return Ok(Control::Exit),
        "undo" | ".undo" => match app.undo() {
            Ok(remaining) => println!("{} {remaining} undoable", "ok:".green()),
            Err(err) => eprintln!("{}", err.to_string().red()),
        },
        "redo" | ".redo" => match app.redo() {
            Ok(remaining) => println!("{} {remaining} redoable", "ok:".green()),
            Err(err) => eprintln!("{}", err.to_string().red()),
        },
        "save" | ".save" => match app.save() {
            Ok(path) => println!("{} saved to {}", "ok:".green(), path.display()),
            Err(err) => eprintln!("{}", err.to_string().red()),
        },
        "load" | ".load" => {
            let Some(name) = words.next() else {
                eprintln!("{}", "load requires a world name".red());
                return Ok(Control::Continue);
            };
            match app.load(name) {
                Ok(()) => println!("{} loaded {name}", "ok:".green()),
                Err(err) => eprintln!("{}", err.to_string().red()),
            }
        }
        "worlds" => match app.store().list_worlds() {
            Ok(names) => {
                for name in names {
                    println!("{name}");
                }
            }
            Err(err) => eprintln!("{}", err.to_string().red()),
        },
        _ => {
            let response = app.exec(line);
            print_response(&response);
        }
    }
    Ok(Control::Continue)
}

/// Print a response block, coloring the trailing status line.
fn print_response(response: &str) {
    let mut lines = response.lines().peekable();
    while let Some(line) = lines.next() {
        if lines.peek().is_none() {
            if line.contains(" ok ") || line.ends_with(" ok") {
                println!("{}", line.green());
            } else {
                println!("{}", line.yellow());
            }
        } else {
            println!("{line}");
        }
    }
}
