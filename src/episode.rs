//! Episode/run logging in JSON-lines format.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Configuration;
use crate::error::DomainError;

/// One timestep of a recorded episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeStep {
    /// Step index within the episode.
    pub timestep: usize,
    /// True environment state, if known (not available to the agent).
    pub state: Vec<f64>,
    /// Action taken.
    pub action: Vec<f64>,
    /// Observation received.
    pub observation: Vec<f64>,
    /// Reward received.
    pub reward: f64,
    /// Free-form step annotation (belief_mean, ess, filter_active, ...).
    pub info: Value,
}

/// A full recorded episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    /// Episode index within a run.
    pub episode_id: u64,
    /// First 16 hex characters of the configuration's BLAKE3 digest.
    pub config_hash: String,
    /// Recorded steps, in order.
    pub steps: Vec<EpisodeStep>,
    /// Cumulative discounted return, filled in by `compute_return`.
    pub total_return: f64,
}

impl Episode {
    /// Start a new, empty episode for `episode_id` against `config`.
    pub fn new(episode_id: u64, config: &Configuration) -> Result<Self, DomainError> {
        Ok(Self {
            episode_id,
            config_hash: config_hash(config)?,
            steps: Vec::new(),
            total_return: 0.0,
        })
    }

    /// Append a step record.
    pub fn add_step(
        &mut self,
        state: Vec<f64>,
        action: Vec<f64>,
        observation: Vec<f64>,
        reward: f64,
        info: Value,
    ) {
        let timestep = self.steps.len();
        self.steps.push(EpisodeStep {
            timestep,
            state,
            action,
            observation,
            reward,
            info,
        });
    }

    /// Number of recorded steps.
    #[must_use]
    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    /// Compute and store the discounted return over all recorded steps.
    pub fn compute_return(&mut self, discount: f64) -> f64 {
        let mut total = 0.0;
        let mut factor = 1.0;
        for step in &self.steps {
            total += factor * step.reward;
            factor *= discount;
        }
        self.total_return = total;
        total
    }

    /// Serialize this episode as one JSON-lines record (no trailing
    /// newline).
    pub fn to_jsonl(&self) -> Result<String, DomainError> {
        #[derive(Serialize)]
        struct Record<'a> {
            episode_id: u64,
            config_hash: &'a str,
            total_return: f64,
            num_steps: usize,
            steps: &'a [EpisodeStep],
        }
        let record = Record {
            episode_id: self.episode_id,
            config_hash: &self.config_hash,
            total_return: self.total_return,
            num_steps: self.steps.len(),
            steps: &self.steps,
        };
        serde_json::to_string(&record).map_err(|e| DomainError::Json(e.to_string()))
    }

    /// Append this episode as one line to `path`, creating parent
    /// directories and the file if necessary.
    pub fn save(&self, path: &Path) -> Result<(), DomainError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DomainError::Io(e.to_string()))?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| DomainError::Io(e.to_string()))?;
        writeln!(file, "{}", self.to_jsonl()?).map_err(|e| DomainError::Io(e.to_string()))?;
        Ok(())
    }

    /// Read all episode records from a JSON-lines file.
    pub fn load_all(path: &Path) -> Result<Vec<Episode>, DomainError> {
        let text = std::fs::read_to_string(path).map_err(|e| DomainError::Io(e.to_string()))?;
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(|e| DomainError::Json(e.to_string())))
            .collect()
    }
}

/// First 16 hex characters of the BLAKE3 digest of `config`'s canonical
/// JSON serialization.
pub fn config_hash(config: &Configuration) -> Result<String, DomainError> {
    let canonical = config.canonical_json()?;
    let digest = blake3::hash(canonical.as_bytes());
    Ok(digest.to_hex()[..16].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_hash_is_stable() {
        let config = Configuration::default();
        let a = config_hash(&config).unwrap();
        let b = config_hash(&config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn config_hash_changes_with_config() {
        let mut config = Configuration::default();
        let a = config_hash(&config).unwrap();
        config.seed = 7;
        let b = config_hash(&config).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn episode_round_trips_through_jsonl() {
        let config = Configuration::default();
        let mut episode = Episode::new(0, &config).unwrap();
        episode.add_step(
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.05, 0.02],
            -1.0,
            json!({"belief_ess": 100.0}),
        );
        episode.compute_return(0.98);
        let line = episode.to_jsonl().unwrap();
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["episode_id"], 0);
        assert_eq!(parsed["num_steps"], 1);
    }

    #[test]
    fn save_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episodes.jsonl");
        let config = Configuration::default();
        for id in 0..3 {
            let mut episode = Episode::new(id, &config).unwrap();
            episode.add_step(vec![0.0], vec![0.0], vec![0.0], 0.0, json!({}));
            episode.save(&path).unwrap();
        }
        let loaded = Episode::load_all(&path).unwrap();
        assert_eq!(loaded.len(), 3);
    }
}
