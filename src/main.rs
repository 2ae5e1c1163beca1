use network_policy_engine::config::{
    DEFAULT_LOG_CONFIG, DEFAULT_PLAN_FILE, ENV_LOG_CONFIG, ENV_PLAN,
};
use network_policy_engine::output::print_outcomes;
use network_policy_engine::plan::{load_plan, replay};
use network_policy_engine::{EngineConfig, ProvisioningEngine};
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    // Do as little as possible in main.rs as it can't contain any tests
    dotenv::dotenv().ok();
    let log_config =
        std::env::var(ENV_LOG_CONFIG).unwrap_or_else(|_| DEFAULT_LOG_CONFIG.to_string());
    log4rs::init_file(&log_config, Default::default())?;
    log::info!("#Start main()");

    let plan_file = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(ENV_PLAN).ok())
        .unwrap_or_else(|| DEFAULT_PLAN_FILE.to_string());

    let config = EngineConfig::from_env()?;
    let engine = ProvisioningEngine::new(config);
    let plan = load_plan(&plan_file)?;
    let outcomes = replay(&engine, &plan);
    print_outcomes(&outcomes);

    log::info!("#End main()");
    Ok(())
}
