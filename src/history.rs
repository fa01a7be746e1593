//! Improvement history: an append-only JSON array rewritten in full on each
//! append.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One completed improvement round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementRound {
    /// 1-based sequence number
    pub round: usize,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub pass_rate: f64,
    pub under_triggers: usize,
    pub over_triggers: usize,
}

/// History log, optionally backed by a file.
#[derive(Debug)]
pub struct History {
    path: Option<PathBuf>,
    rounds: Vec<ImprovementRound>,
}

impl History {
    /// Load from a JSON file; a missing file is an empty history.
    pub fn load(path: &Path) -> Result<Self> {
        let rounds = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read history {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("invalid history file {}", path.display()))?
        } else {
            Vec::new()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            rounds,
        })
    }

    /// History that is never persisted.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            rounds: Vec::new(),
        }
    }

    /// Append one round and rewrite the backing file with the full list.
    pub fn append(&mut self, round: ImprovementRound) -> Result<()> {
        self.rounds.push(round);
        if let Some(path) = &self.path {
            let content = serde_json::to_string_pretty(&self.rounds)?;
            std::fs::write(path, content)
                .with_context(|| format!("failed to write history {}", path.display()))?;
        }
        Ok(())
    }

    /// The most recent `n` rounds, oldest first.
    pub fn last(&self, n: usize) -> &[ImprovementRound] {
        let start = self.rounds.len().saturating_sub(n);
        &self.rounds[start..]
    }

    pub fn next_round(&self) -> usize {
        self.rounds.len() + 1
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(n: usize) -> ImprovementRound {
        ImprovementRound {
            round: n,
            timestamp: Utc::now(),
            description: format!("description {n}"),
            pass_rate: 0.5,
            under_triggers: 1,
            over_triggers: 0,
        }
    }

    #[test]
    fn test_append_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut history = History::load(&path).unwrap();
        assert!(history.is_empty());
        history.append(round(1)).unwrap();
        history.append(round(2)).unwrap();

        let reloaded = History::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.next_round(), 3);
        assert_eq!(reloaded.last(5)[0].description, "description 1");
    }

    #[test]
    fn test_last_window() {
        let mut history = History::in_memory();
        for n in 1..=5 {
            history.append(round(n)).unwrap();
        }
        let last = history.last(3);
        assert_eq!(last.len(), 3);
        assert_eq!(last[0].round, 3);
        assert_eq!(last[2].round, 5);
    }
}
