#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = thptqg_exam::run().await {
        eprintln!("thptqg-exam fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
