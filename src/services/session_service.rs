use std::collections::VecDeque;

use serde::Serialize;

use crate::models::action::ProposedAction;
use crate::models::outcome::{ExecutionOutcome, ExecutionReport};

pub const DEFAULT_HISTORY_TURNS: usize = 3;
const MAX_SUMMARY_LINES: usize = 20;

/// One instruction, the plan it produced and what became of it.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub instruction: String,
    pub actions: Vec<ProposedAction>,
    pub outcomes: Vec<ExecutionOutcome>,
    pub declined: bool,
}

impl Turn {
    pub fn summary(&self) -> String {
        let mut text = format!("Instruction: \"{}\"", self.instruction);
        if self.actions.is_empty() {
            text.push_str("\nResult: no actions were proposed.");
            return text;
        }
        if self.declined {
            text.push_str(&format!(
                "\nResult: {} proposed action(s) were declined by the user; nothing was moved.",
                self.actions.len()
            ));
            for action in self.actions.iter().take(MAX_SUMMARY_LINES) {
                text.push_str(&format!("\n- {} -> {}", action.source, action.destination));
            }
            return text;
        }

        let report = ExecutionReport::from_outcomes(self.outcomes.clone());
        text.push_str(&format!(
            "\nResult: {} proposed action(s); {}.",
            self.actions.len(),
            report.summary()
        ));
        for outcome in self.outcomes.iter().take(MAX_SUMMARY_LINES) {
            text.push_str(&format!(
                "\n- {} -> {}: {}",
                outcome.source,
                outcome.destination,
                outcome.status.as_str()
            ));
            if let Some(reason) = outcome.reason {
                text.push_str(&format!(" ({})", reason.as_str()));
            }
        }
        if self.outcomes.len() > MAX_SUMMARY_LINES {
            text.push_str(&format!(
                "\n- ... {} more",
                self.outcomes.len() - MAX_SUMMARY_LINES
            ));
        }
        text
    }
}

/// Fixed-capacity window over the most recent turns of one session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    turns: VecDeque<Turn>,
    capacity: usize,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_TURNS)
    }
}

impl SessionContext {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, turn: Turn) {
        while self.turns.len() >= self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn summaries(&self) -> Vec<String> {
        self.turns.iter().map(Turn::summary).collect()
    }
}
