use anyhow::Result;
use scancast::{discover_broadcast, Config};

use crate::Cli;

pub async fn main(_cli: &Cli, cfg: &Config) -> Result<()> {
    let addr = discover_broadcast().await?;
    println!("broadcast address: {}", addr);
    println!("frames target {}:{}", addr, cfg.transport.port);
    Ok(())
}
