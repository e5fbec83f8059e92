use std::collections::BTreeMap;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::infra::AgentId;
use crate::protocol::{JsonLinesTransport, ProtocolError, TrainerRequest, TrainerResponse};
use crate::sim::{AgentAction, EpisodeCoordinator, StepOutput};

/// Drives one trainer connection through the synchronous reset/step
/// protocol. Every receive is bounded by the round-trip ceiling; a
/// trainer that goes quiet past it aborts the run rather than stalling
/// training silently.
pub struct TrainerSession<S> {
    coordinator: EpisodeCoordinator,
    transport: JsonLinesTransport<S>,
    round_trip_ceiling: Duration,
}

impl<S: AsyncRead + AsyncWrite> TrainerSession<S> {
    pub fn new(coordinator: EpisodeCoordinator, stream: S, round_trip_ceiling: Duration) -> Self {
        Self {
            coordinator,
            transport: JsonLinesTransport::new(stream),
            round_trip_ceiling,
        }
    }

    pub async fn run(mut self) -> Result<(), ProtocolError> {
        loop {
            let request = match timeout(self.round_trip_ceiling, self.transport.recv()).await {
                Err(_elapsed) => {
                    error!(
                        ceiling_secs = self.round_trip_ceiling.as_secs_f64(),
                        "trainer round trip exceeded its ceiling, aborting run"
                    );
                    return Err(ProtocolError::Timeout {
                        ceiling: self.round_trip_ceiling,
                    });
                }
                Ok(Ok(Some(request))) => request,
                Ok(Ok(None)) => {
                    info!("trainer disconnected");
                    return Ok(());
                }
                Ok(Err(err)) => {
                    warn!(error = %err, "closing session on unreadable message");
                    return Err(self.abort(err).await);
                }
            };

            match request {
                TrainerRequest::Reset {
                    episode,
                    regenerate,
                } => match self.coordinator.reset(episode, regenerate) {
                    Ok(observations) => {
                        self.transport
                            .send(&reset_response(observations))
                            .await?;
                    }
                    Err(err) => return Err(self.abort(err.into()).await),
                },
                TrainerRequest::Step { actions } => {
                    let actions: BTreeMap<AgentId, AgentAction> = actions
                        .into_iter()
                        .map(|(id, raw)| (AgentId(id), AgentAction::from_array(raw)))
                        .collect();
                    match self.coordinator.step(&actions) {
                        Ok(output) => self.transport.send(&step_response(output)).await?,
                        Err(err) => return Err(self.abort(err.into()).await),
                    }
                }
                TrainerRequest::Stop => {
                    // A stop between steps still yields the terminal
                    // payload so the trainer's episode bookkeeping closes
                    // cleanly
                    if let Some(output) = self.coordinator.stop_now() {
                        self.transport.send(&step_response(output)).await?;
                    }
                    info!("trainer requested stop");
                    return Ok(());
                }
            }
        }
    }

    /// Report the failure on the wire if possible, then hand it back as
    /// the session's result.
    async fn abort(&mut self, err: ProtocolError) -> ProtocolError {
        let _ = self
            .transport
            .send(&TrainerResponse::Error {
                message: err.to_string(),
            })
            .await;
        err
    }
}

fn reset_response(observations: BTreeMap<AgentId, Vec<f32>>) -> TrainerResponse {
    TrainerResponse::Reset {
        observations: observations
            .into_iter()
            .map(|(id, obs)| (id.0, obs))
            .collect(),
    }
}

fn step_response(output: StepOutput) -> TrainerResponse {
    TrainerResponse::Step {
        observations: output
            .observations
            .into_iter()
            .map(|(id, obs)| (id.0, obs))
            .collect(),
        rewards: output.rewards.into_iter().map(|(id, r)| (id.0, r)).collect(),
        dones: output.dones.into_iter().map(|(id, d)| (id.0, d)).collect(),
        episode_done: output.episode_done,
    }
}
