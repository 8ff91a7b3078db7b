//! `easel playground` — Start the HTTP playground.

use easel_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    if !config.has_api_key() {
        return Err("No chat API key configured. Run `easel doctor` for setup help.".into());
    }

    println!("Easel Playground");
    println!("   Listening: http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   Agents:    {}", easel_agent::available_agents().join(", "));
    println!("   Sessions:  up to {}", config.gateway.max_sessions);

    easel_gateway::start(config).await?;

    Ok(())
}
