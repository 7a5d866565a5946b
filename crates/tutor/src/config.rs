use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strumlight_domain::{io::read_document, DomainError};

use crate::feedback::OpenStringRule;
use crate::runner::LinkLossPolicy;
use crate::session::{AdvancePolicy, SessionOptions};
use crate::simulate::{AlwaysCorrect, RandomVerdicts, Silent, VerdictGenerator};

/// Practice settings, loaded from YAML or JSON. Missing keys take defaults.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct SessionConfig {
    pub policy: AdvancePolicy,
    pub tick_interval_ms: u64,
    pub grace_delay_ms: u64,
    pub open_strings: OpenStringRule,
    pub capo: Option<u8>,
    pub link_loss: LinkLossPolicy,
    pub simulation: Option<SimulationConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let options = SessionOptions::default();
        Self {
            policy: options.policy,
            tick_interval_ms: 16,
            grace_delay_ms: options.grace_delay_ms,
            open_strings: options.open_strings,
            capo: None,
            link_loss: LinkLossPolicy::default(),
            simulation: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum SimulationConfig {
    AlwaysCorrect {
        #[serde(default = "default_reaction_ms")]
        reaction_ms: u64,
    },
    Silent,
    Random {
        success_rate: f64,
        #[serde(default = "default_reaction_ms")]
        reaction_ms: u64,
        #[serde(default)]
        seed: Option<u64>,
    },
}

fn default_reaction_ms() -> u64 {
    400
}

impl SimulationConfig {
    pub fn build(&self) -> Box<dyn VerdictGenerator> {
        match self {
            SimulationConfig::AlwaysCorrect { reaction_ms } => {
                Box::new(AlwaysCorrect::new(*reaction_ms))
            }
            SimulationConfig::Silent => Box::new(Silent),
            SimulationConfig::Random {
                success_rate,
                reaction_ms,
                seed,
            } => Box::new(RandomVerdicts::new(*success_rate, *reaction_ms, *seed)),
        }
    }
}

impl SessionConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let config: Self = read_document(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.tick_interval_ms == 0 {
            return Err(DomainError::validation("tick_interval_ms must be positive"));
        }
        if let Some(capo) = self.capo {
            if capo > 12 {
                return Err(DomainError::validation(format!(
                    "capo fret {capo} must be between 0 and 12"
                )));
            }
        }
        if let Some(SimulationConfig::Random { success_rate, .. }) = &self.simulation {
            if !(0.0..=1.0).contains(success_rate) {
                return Err(DomainError::validation(format!(
                    "success_rate {success_rate} must be within 0..=1"
                )));
            }
        }
        Ok(())
    }

    pub fn options(&self) -> SessionOptions {
        SessionOptions {
            policy: self.policy,
            grace_delay_ms: self.grace_delay_ms,
            open_strings: self.open_strings,
            capo: self.capo,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
