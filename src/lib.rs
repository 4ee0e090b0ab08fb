pub mod cli;
pub mod config;
pub mod llm;
pub mod models;
pub mod server;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

use cli::Args;
use log::{ info, warn };
use server::Server;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr());
    info!("Provider API Key: {}", if args.resolved_api_key().is_some() { "configured" } else { "MISSING" });
    info!("Provider Base URL: {}", args.gemini_base_url);
    info!("Chat Model: {}", args.chat_model);
    info!("Analysis Model: {}", args.analysis_model);
    info!("Storage Bucket: {}", args.bucket_name);
    if let Some(host) = &args.storage_emulator_host {
        info!("Storage Emulator: {}", host);
    }
    info!("Local Config Fallback: {}", args.local_config_path.display());
    info!("Static Directory: {}", args.static_dir.display());
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    if !args.static_dir.join("index.html").exists() {
        warn!("No index.html in {}. The web client will not be served.", args.static_dir.display());
    }

    let server = Server::new(args);
    server.run().await?;

    Ok(())
}
