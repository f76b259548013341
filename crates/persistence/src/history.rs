use shared::snapshot::GameSnapshot;

pub const MAX_HISTORY_ENTRIES: usize = 50;

/// Linear undo/redo stack of persisted game states.
#[derive(Debug, Clone)]
pub struct GameHistory {
    states: Vec<GameSnapshot>,
    index: usize,
}

impl GameHistory {
    pub fn new(initial: GameSnapshot) -> Self {
        Self {
            states: vec![initial],
            index: 0,
        }
    }

    pub fn current(&self) -> &GameSnapshot {
        &self.states[self.index]
    }

    /// Records a new state, dropping any redo tail. Identical states are ignored.
    pub fn push(&mut self, snapshot: GameSnapshot) {
        if *self.current() == snapshot {
            return;
        }
        self.states.truncate(self.index + 1);
        self.states.push(snapshot);
        if self.states.len() > MAX_HISTORY_ENTRIES {
            let overflow = self.states.len() - MAX_HISTORY_ENTRIES;
            self.states.drain(..overflow);
        }
        self.index = self.states.len() - 1;
    }

    pub fn reset(&mut self, snapshot: GameSnapshot) {
        self.states.clear();
        self.states.push(snapshot);
        self.index = 0;
    }

    pub fn undo(&mut self) -> Option<&GameSnapshot> {
        if !self.can_undo() {
            return None;
        }
        self.index -= 1;
        Some(&self.states[self.index])
    }

    pub fn redo(&mut self) -> Option<&GameSnapshot> {
        if !self.can_redo() {
            return None;
        }
        self.index += 1;
        Some(&self.states[self.index])
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.states.len()
    }
}
