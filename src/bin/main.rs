#[cfg(not(target_arch = "wasm32"))]
#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;
    use murmur::core::db::seed_demo_data;
    use murmur::server::{build_state, run, ServerConfig};

    let config = ServerConfig::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str())).init();

    let state = build_state(&config)?;
    if config.seed {
        seed_demo_data(state.store.as_ref(), state.detector.as_ref())?;
    }

    run(&config.bind_address, state).await?;
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {}
