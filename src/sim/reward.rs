use crate::infra::{RewardConfig, Role};
use crate::sim::{Agent, PerceptionSnapshot};

/// Step facts the reward pass needs beyond the agent's own perception.
/// `seen_by_seeker` is computed against the complete live seeker roster,
/// not the hider's own (observer-local) visible list.
#[derive(Debug, Clone, Copy, Default)]
pub struct RewardContext {
    pub seeking: bool,
    pub seen_by_seeker: bool,
    pub nearest_seeker_distance: Option<f32>,
}

/// Episode-end facts for the one-shot terminal adjustment.
#[derive(Debug, Clone, Copy)]
pub struct EpisodeOutcome {
    pub hiders_caught: usize,
    pub total_hiders: usize,
}

pub struct RewardSystem {
    config: RewardConfig,
}

impl RewardSystem {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    /// Dense per-step shaping. Non-zero only during the seeking phase and
    /// only for live agents. The shaping terms are deliberately small:
    /// over a whole episode they stay an order of magnitude below the
    /// terminal objective rewards, so the policy cannot profit from
    /// farming them instead of playing the game.
    pub fn step_reward(
        &self,
        agent: &Agent,
        perception: &PerceptionSnapshot,
        context: &RewardContext,
    ) -> f32 {
        if !context.seeking || agent.is_found() {
            return 0.0;
        }

        let mut total = self.config.time_penalty;
        match agent.role {
            Role::Seeker => {
                total += self.config.seeker_visible_bonus * perception.visible.len() as f32;
                if let Some(nearest) = perception.visible.first()
                    && nearest.distance < self.config.seeker_proximity_cutoff
                {
                    let closeness = 1.0 - nearest.distance / self.config.seeker_proximity_cutoff;
                    total += self.config.seeker_proximity_max * closeness;
                }
            }
            Role::Hider => {
                if context.seen_by_seeker {
                    total -= self.config.hider_hidden_bonus;
                } else {
                    total += self.config.hider_hidden_bonus;
                }
                if let Some(distance) = context.nearest_seeker_distance {
                    let threshold = self.config.hider_distance_threshold;
                    if distance > threshold {
                        let span = self.config.hider_distance_cutoff - threshold;
                        let fraction = ((distance - threshold) / span).min(1.0);
                        total += self.config.hider_distance_max * fraction;
                    }
                }
            }
        }
        total
    }

    /// One-shot terminal adjustment, layered on top of whatever per-step
    /// reward the agent already accumulated for its final step.
    pub fn terminal_reward(&self, agent: &Agent, outcome: &EpisodeOutcome) -> f32 {
        match agent.role {
            Role::Seeker => {
                if outcome.hiders_caught == 0 {
                    self.config.caught_none_penalty
                } else {
                    let mut total = self.config.catch_bonus * outcome.hiders_caught as f32;
                    if outcome.hiders_caught == outcome.total_hiders {
                        total += self.config.all_caught_bonus;
                    }
                    total
                }
            }
            Role::Hider => {
                if agent.is_found() {
                    self.config.caught_penalty
                } else {
                    self.config.survival_bonus
                }
            }
        }
    }
}
