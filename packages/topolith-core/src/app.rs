use tracing::{debug, warn};

use crate::command::{Command, Output};
use crate::error::{Error, Result};
use crate::grammar::{self, Statement};
use crate::persist::WorldStore;
use crate::world::World;

/// Owns the single mutable [`World`], the linear command log with its
/// undo/redo cursor, and the persistence collaborator. `exec` is the public
/// entry point: parse → build command → execute → format response.
pub struct App {
    world: World,
    commands: Vec<Command>,
    cursor: isize,
    store: WorldStore,
}

impl App {
    pub fn new(world: World) -> Self {
        App {
            world,
            commands: Vec::new(),
            cursor: -1,
            store: WorldStore::new(),
        }
    }

    pub fn with_store(world: World, store: WorldStore) -> Self {
        App {
            world,
            commands: Vec::new(),
            cursor: -1,
            store,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Replace the world (e.g. after a load); the command log is discarded.
    pub fn reset_world(&mut self, world: World) {
        self.world = world;
        self.commands.clear();
        self.cursor = -1;
    }

    pub fn store(&self) -> &WorldStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut WorldStore {
        &mut self.store
    }

    /// Executed commands up to the cursor, oldest first.
    pub fn history(&self) -> &[Command] {
        &self.commands[..(self.cursor + 1) as usize]
    }

    pub fn can_undo(&self) -> bool {
        self.cursor >= 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.commands.len() as isize - 1
    }

    /// Parse one input line (or world blob) to a command, execute it, and
    /// format the response block:
    ///
    /// ```text
    /// <object canonical-form>
    /// $$$$
    /// <status-code> <ok|error> "<message>"
    /// ```
    ///
    /// Inputs that fail to parse are not recorded in the log. The produced
    /// response must itself re-parse; a malformed response is an internal
    /// error.
    pub fn exec(&mut self, input: &str) -> String {
        let response = match self.exec_inner(input) {
            Ok(output) => format_response(&output, &ok_status("")),
            Err(err) => format_response(&Output::None, &err.status_line()),
        };
        match grammar::parse(&response) {
            Ok(Statement::Response(_)) => response,
            _ => {
                let err = Error::internal("generated response does not re-parse")
                    .with_data("input", input);
                format_response(&Output::None, &err.status_line())
            }
        }
    }

    fn exec_inner(&mut self, input: &str) -> Result<Output> {
        let attrs = match grammar::parse(input)? {
            Statement::Command(attrs) => attrs,
            _ => {
                return Err(Error::invalid("invalid input: expected a command")
                    .with_data("input", input));
            }
        };
        let command = Command::from_input(&attrs)?;
        self.run(command)
    }

    /// Append the command and execute it. The command is recorded before its
    /// world effects so undo stays symmetric even for no-op executions; every
    /// failing execute path leaves an inverse that is a no-op.
    pub fn run(&mut self, command: Command) -> Result<Output> {
        self.commands.truncate((self.cursor + 1) as usize);
        self.commands.push(command);
        self.cursor += 1;
        let idx = self.cursor as usize;
        debug!(command = %self.commands[idx], "executing");
        self.commands[idx].execute(&mut self.world)
    }

    /// Reverse the command at the cursor. Returns the number of commands
    /// still undoable. On failure the world snapshot taken before the undo is
    /// restored, the log is discarded, and the error surfaces.
    pub fn undo(&mut self) -> Result<usize> {
        if self.cursor < 0 {
            return Ok(0);
        }
        let snapshot = self.world.clone();
        let command = &self.commands[self.cursor as usize];
        if let Err(err) = command.undo(&mut self.world) {
            warn!(%err, "undo failed; restoring world and discarding command log");
            self.world = snapshot;
            self.commands.clear();
            self.cursor = -1;
            return Err(err);
        }
        self.cursor -= 1;
        Ok((self.cursor + 1) as usize)
    }

    /// Re-execute the command after the cursor. Returns the number of
    /// commands still redoable. Failure handling mirrors [`App::undo`].
    pub fn redo(&mut self) -> Result<usize> {
        if !self.can_redo() {
            return Ok(0);
        }
        let snapshot = self.world.clone();
        let idx = (self.cursor + 1) as usize;
        if let Err(err) = self.commands[idx].execute(&mut self.world) {
            warn!(%err, "redo failed; restoring world and discarding command log");
            self.world = snapshot;
            self.commands.clear();
            self.cursor = -1;
            return Err(err);
        }
        self.cursor += 1;
        Ok(self.commands.len() - (self.cursor + 1) as usize)
    }

    /// Save the current world through the persistence collaborator.
    pub fn save(&self) -> Result<std::path::PathBuf> {
        self.store.save(&self.world)
    }

    /// Load a world by name, replacing the current one and its history.
    pub fn load(&mut self, name: &str) -> Result<()> {
        let world = self.store.load(name)?;
        self.reset_world(world);
        Ok(())
    }
}

fn ok_status(message: &str) -> String {
    format!("200 ok \"{message}\"")
}

fn format_response(output: &Output, status: &str) -> String {
    format!("{output}\n$$$$\n{status}")
}
