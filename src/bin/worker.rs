#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = talenttrack::run_worker().await {
        eprintln!("talenttrack-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
