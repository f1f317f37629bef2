use anyhow::Result;

use stayline_runtime::{init_tracing, run, RuntimeConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = RuntimeConfig::from_env()?;
    run(config).await
}
