#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = talenttrack::run().await {
        eprintln!("talenttrack fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
