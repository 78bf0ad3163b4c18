use std::process::ExitCode;

use fleetmetrics::core::{config, logging};
use fleetmetrics::{FleetMetrics, FleetResult};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let mut args = std::env::args().skip(1);
    let Some(config_path) = args.next() else {
        eprintln!("usage: fleetmetrics <config.yaml> [--once]");
        return ExitCode::from(2);
    };
    let once = args.next().as_deref() == Some("--once");

    match run(&config_path, once).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "fleetmetrics exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config_path: &str, once: bool) -> FleetResult<()> {
    let config = config::load_config(config_path)?;
    let engine = FleetMetrics::from_config(config)?;

    if once {
        let outcome = engine.trigger_once(None).await?;
        println!("{}", serde_json::to_string_pretty(&outcome.kpis)?);
        Ok(())
    } else {
        engine.run().await
    }
}
