//! Server command implementation

use anyhow::Result;
use spendlens_core::Settings;
use spendlens_server::ServerConfig;

pub async fn cmd_serve(settings: Settings, no_auth: bool) -> Result<()> {
    let config = ServerConfig::from_settings(&settings, no_auth);

    println!("🚀 Starting spendlens web server...");
    println!("   Data: {}", settings.data_dir.display());
    println!(
        "   Listening: http://{}:{}",
        settings.server.host, settings.server.port
    );
    if let Some(dir) = &settings.server.static_dir {
        println!("   Static files: {}", dir.display());
    }
    if !config.allowed_origins.is_empty() {
        println!("   CORS origins: {}", config.allowed_origins.join(", "));
    }
    match &config.credentials {
        Some(creds) => println!("   🔒 Authentication: Basic (user {})", creds.username),
        None if no_auth => {
            println!();
            println!("   ⚠️  Authentication DISABLED - do not expose to network!");
        }
        None => println!("   ℹ️  Authentication off (set USERNAME and PASSWORD to enable)"),
    }
    println!();

    spendlens_server::serve(settings, config).await
}
