use stage_loop::{basic_toolkit, build_model, init_tracing, AppConfig, StageLoop};

#[tokio::main]
async fn main() -> stage_loop::Result<()> {
    let cfg = AppConfig::load()?;
    init_tracing(&cfg.logging)?;

    let model = build_model(&cfg.model)?;
    let mut agent = StageLoop::new(model)
        .with_tools(basic_toolkit())
        .with_policy(cfg.agent.policy());

    let report = agent.run(cfg.agent.goal.clone()).await?;

    println!("{}", serde_json::to_string_pretty(report.history())?);
    Ok(())
}
