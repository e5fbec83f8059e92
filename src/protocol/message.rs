use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One trainer request per wire line, keyed by agent id where per-agent.
/// `Step` actions carry the raw seven-channel layout: forward, strafe,
/// rotate, look as continuous values, then jump, place-block and
/// remove-block thresholded at 0.5.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrainerRequest {
    Reset {
        episode: u64,
        #[serde(default)]
        regenerate: bool,
    },
    Step {
        actions: BTreeMap<u32, [f32; 7]>,
    },
    Stop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrainerResponse {
    Reset {
        observations: BTreeMap<u32, Vec<f32>>,
    },
    Step {
        observations: BTreeMap<u32, Vec<f32>>,
        rewards: BTreeMap<u32, f32>,
        dones: BTreeMap<u32, bool>,
        episode_done: bool,
    },
    Error {
        message: String,
    },
}
