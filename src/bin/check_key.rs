use stage_loop::{init_tracing, AppConfig, KeyProber, LoopError};

#[tokio::main]
async fn main() -> stage_loop::Result<()> {
    let cfg = AppConfig::load()?;
    init_tracing(&cfg.logging)?;

    let api_key = cfg.probe.api_key.clone().ok_or_else(|| {
        LoopError::Config("set STAGE_LOOP_PROBE_API_KEY or OPENAI_API_KEY".into())
    })?;

    let prober = KeyProber::from_config(&cfg.probe)?;
    let verdict = prober.check_key(&api_key).await;
    println!("{verdict:?}");
    Ok(())
}
