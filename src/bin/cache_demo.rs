/// demo: look up a few keys through the supervised cache while the
/// supervisor follows redis availability.
///
/// usage: cache-demo [key ...]
///
/// start and stop redis while it runs to watch the backend swap.
use std::time::Duration;

use anyhow::Result;
use log::*;

use cache_supervisor::demo::DemoCacheService;
use cache_supervisor::status::to_json;
use cache_supervisor::{logging, CacheSupervisor, SupervisorConfig, VERSION};

const ROUNDS: usize = 12;
const PAUSE: Duration = Duration::from_secs(5);

#[async_std::main]
async fn main() -> Result<()> {
    logging::init(logging::DEFAULT_CONFIG_FILE)?;

    let config = SupervisorConfig::from_env()?;
    info!("cache-demo version: {}, config: {:?}", VERSION, config);

    let mut keys: Vec<String> = std::env::args().skip(1).collect();
    if keys.is_empty() {
        keys.push("k1".to_string());
    }

    let supervisor = CacheSupervisor::from_config(&config).await?;
    let service = DemoCacheService::new(supervisor.facade());

    for round in 0..ROUNDS {
        for key in keys.iter() {
            let body = service.respond(key).await;
            info!(
                "round: {}, backend: {}, GET /cache/{} -> {}",
                round,
                supervisor.current_kind(),
                key,
                body
            );
        }

        async_std::task::sleep(PAUSE).await;
    }

    let status = supervisor.status().await?;
    info!("status: {}", to_json(&status));

    supervisor.shutdown().await
}
