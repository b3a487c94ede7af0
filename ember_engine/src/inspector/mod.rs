//! # Game Inspector
//!
//! The editor-side companion of a [`GameWorld`]: the selection state and the
//! command history. All editor mutations of the world go through commands
//! appended here, which is what makes them reversible.
//!
//! The history is a single ordered list with a cursor at the last applied
//! command. Undo moves the cursor left, redo moves it right, and appending
//! discards everything to the right of the cursor: once a new command is
//! recorded after an undo, the undone commands are unreachable. That is
//! standard editor undo-stack behavior and is kept deliberately.

pub mod commands;

use crate::world::GameWorld;
use commands::{CmdDuplicateSpecial, CmdExistingObjectCreation, CmdObjectDeletion, CommandError, InspectorCmd};
use ember_shared::{GameUpdateSets, ObjectId};
use log::info;
use std::collections::BTreeSet;

/// Which objects the editor currently has selected.
#[derive(Default)]
pub struct SelectionState {
    items: Vec<ObjectId>,
    primary: ObjectId,
    change_index: u64,
}

impl SelectionState {
    pub fn items(&self) -> &[ObjectId] {
        &self.items
    }

    pub fn has_selection(&self) -> bool {
        !self.items.is_empty()
    }

    pub fn is_selected(&self, id: ObjectId) -> bool {
        self.items.contains(&id)
    }

    pub fn primary(&self) -> ObjectId {
        self.primary
    }

    /// Counter bumped on every selection (or selected-object) change; tools
    /// watch it to refresh cached state such as gizmo anchors.
    pub fn change_index(&self) -> u64 {
        self.change_index
    }

    pub fn bump_change_index(&mut self) {
        self.change_index += 1;
    }

    pub fn select(&mut self, id: ObjectId, as_primary: bool) {
        if id.is_null() {
            return;
        }
        if !self.items.contains(&id) {
            self.items.push(id);
        }
        if as_primary || self.primary.is_null() {
            self.primary = id;
        }
        self.bump_change_index();
    }

    pub fn deselect(&mut self, id: ObjectId) {
        let before = self.items.len();
        self.items.retain(|x| *x != id);
        if self.primary == id {
            self.primary = self.items.first().copied().unwrap_or(ObjectId::NONE);
        }
        if self.items.len() != before {
            self.bump_change_index();
        }
    }

    pub fn toggle(&mut self, id: ObjectId) {
        if self.is_selected(id) {
            self.deselect(id);
        } else {
            self.select(id, false);
        }
    }

    pub fn deselect_all(&mut self) {
        if !self.items.is_empty() {
            self.items.clear();
            self.primary = ObjectId::NONE;
            self.bump_change_index();
        }
    }

    pub fn all_selected(&self) -> BTreeSet<ObjectId> {
        self.items.iter().copied().collect()
    }
}

/// The world/selection pair a command mutates. The history itself is not
/// reachable from here, so a command can never re-enter the undo machinery.
pub struct EditContext<'a> {
    pub world: &'a mut GameWorld,
    pub selection: &'a mut SelectionState,
}

struct CommandHistory {
    commands: Vec<Box<dyn InspectorCmd>>,
    /// Index of the last applied command; -1 when nothing is applied.
    cursor: isize,
}

impl CommandHistory {
    fn new() -> Self {
        Self {
            commands: Vec::new(),
            cursor: -1,
        }
    }
}

/// The editor hub: owns the world, the selection and the command history.
pub struct GameInspector {
    pub world: GameWorld,
    selection: SelectionState,
    history: CommandHistory,
}

impl GameInspector {
    pub fn new(world: GameWorld) -> Self {
        Self {
            world,
            selection: SelectionState::default(),
            history: CommandHistory::new(),
        }
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut SelectionState {
        &mut self.selection
    }

    /// Steps the world and drops destroyed objects from the selection.
    pub fn update(&mut self, update_sets: &GameUpdateSets) {
        let destroyed = self.world.update(update_sets);
        for id in destroyed {
            self.selection.deselect(id);
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.cursor >= 0
    }

    pub fn can_redo(&self) -> bool {
        self.history.cursor + 1 < self.history.commands.len() as isize
    }

    pub fn history_len(&self) -> usize {
        self.history.commands.len()
    }

    /// Records a command. With `apply_now` the command is applied first and
    /// only recorded when it succeeds; without it the caller has already
    /// performed the change by hand and only wants it reversible.
    ///
    /// Appending truncates every command after the cursor: redo history is
    /// unreachable after a divergent append.
    pub fn append_command(
        &mut self,
        mut cmd: Box<dyn InspectorCmd>,
        apply_now: bool,
    ) -> Result<(), CommandError> {
        if apply_now {
            let mut ctx = EditContext {
                world: &mut self.world,
                selection: &mut self.selection,
            };
            cmd.apply(&mut ctx)?;
        }

        info!("{}", cmd.text());

        let keep = (self.history.cursor + 1) as usize;
        self.history.commands.truncate(keep);
        self.history.commands.push(cmd);
        self.history.cursor = self.history.commands.len() as isize - 1;
        Ok(())
    }

    /// Undoes the command at the cursor. Returns false when there is
    /// nothing to undo.
    pub fn undo_command(&mut self) -> Result<bool, CommandError> {
        if self.history.cursor < 0 {
            return Ok(false);
        }

        let Self {
            world,
            selection,
            history,
        } = self;
        let cmd = &mut history.commands[history.cursor as usize];
        info!("Undo '{}'", cmd.text());

        let mut ctx = EditContext { world, selection };
        cmd.undo(&mut ctx)?;
        history.cursor -= 1;
        Ok(true)
    }

    /// Redoes the command after the cursor. Returns false at the end of the
    /// history.
    pub fn redo_command(&mut self) -> Result<bool, CommandError> {
        if !self.can_redo() {
            return Ok(false);
        }

        let Self {
            world,
            selection,
            history,
        } = self;
        let cmd = &mut history.commands[(history.cursor + 1) as usize];
        info!("Redo '{}'", cmd.text());

        let mut ctx = EditContext { world, selection };
        cmd.redo(&mut ctx)?;
        history.cursor += 1;
        Ok(true)
    }

    /// Duplicates the selected objects as one reversible command and selects
    /// the duplicates. Returns the new ids.
    pub fn duplicate_selection(&mut self) -> Result<Vec<ObjectId>, CommandError> {
        let sources = self.selection.all_selected();
        if sources.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = CmdDuplicateSpecial::new(sources);
        {
            let mut ctx = EditContext {
                world: &mut self.world,
                selection: &mut self.selection,
            };
            cmd.apply(&mut ctx)?;
        }
        let created = cmd.created_ids().to_vec();
        self.append_command(Box::new(cmd), false)?;

        self.selection.deselect_all();
        for id in &created {
            self.selection.select(*id, false);
        }
        Ok(created)
    }

    /// Deletes the selected objects (optionally with everything below them
    /// in the hierarchy) as one reversible command.
    pub fn delete_selection(
        &mut self,
        delete_hierarchy_under_selection: bool,
    ) -> Result<(), CommandError> {
        let mut targets = self.selection.all_selected();
        if targets.is_empty() {
            return Ok(());
        }

        if delete_hierarchy_under_selection {
            for id in targets.clone() {
                self.world.get_all_children(&mut targets, id);
            }
        }

        let cmd = CmdObjectDeletion::new(&self.world, targets)?;
        self.append_command(Box::new(cmd), true)
    }

    /// Instantiates a serialized prefab into the world, selects the new
    /// objects and (optionally) records the creation in the history.
    pub fn instantiate_prefab_from_json(
        &mut self,
        prefab_json: &str,
        generate_new_ids: bool,
        create_history: bool,
    ) -> Result<Vec<ObjectId>, CommandError> {
        let created = self
            .world
            .instantiate_prefab_from_json(prefab_json, generate_new_ids)?;

        self.selection.deselect_all();
        for id in &created {
            self.selection.select(*id, false);
        }

        if create_history && !created.is_empty() {
            let cmd =
                CmdExistingObjectCreation::new(&self.world, created.iter().copied().collect())?;
            self.append_command(Box::new(cmd), false)?;
        }
        Ok(created)
    }
}
