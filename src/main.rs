use dotenv::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use voxseek::infra::SimConfig;
use voxseek::protocol::{ProtocolError, TrainerSession};
use voxseek::sim::{EpisodeCoordinator, ProximityCatchRule};
use voxseek::world::TerrainWorldSource;

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("voxseek=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    let config = SimConfig::from_env();
    let listener = TcpListener::bind(&config.session.bind).await?;
    tracing::info!(bind = %config.session.bind, "listening for trainer");

    // One trainer at a time: the step protocol is synchronous, so nothing
    // is gained from concurrent sessions
    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::info!(%peer, "trainer connected");

        let world_source =
            TerrainWorldSource::new(config.world.clone(), config.session.world_ready_timeout);
        let catch_rule = ProximityCatchRule::new(config.catch.clone(), config.vision.clone());
        let coordinator =
            EpisodeCoordinator::new(config.clone(), Box::new(world_source), Box::new(catch_rule));

        let session = TrainerSession::new(coordinator, stream, config.session.step_timeout);
        match session.run().await {
            Ok(()) => tracing::info!("trainer session closed"),
            Err(err @ ProtocolError::Timeout { .. }) => {
                tracing::error!(error = %err, "training run aborted");
                return Err(Box::new(err) as Box<dyn std::error::Error>);
            }
            Err(err) => tracing::error!(error = %err, "trainer session failed"),
        }
    }
}
