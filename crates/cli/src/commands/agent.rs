//! `easel agent` — Interactive or single-message chat mode.

use easel_agent::{AgentFactory, AgentKind};
use easel_config::AppConfig;
use easel_core::event::EventBus;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(
    agent_id: &str,
    message: Option<String>,
    user_id: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early — give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No chat API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export DASHSCOPE_API_KEY='sk-...'   (recommended)");
        eprintln!("    export OPENAI_API_KEY='sk-...'      (for OpenAI direct)");
        eprintln!("    export EASEL_API_KEY='sk-...'       (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_path().display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    if AgentKind::lookup(agent_id).is_none() {
        tracing::warn!(agent = agent_id, "Unknown agent, using scholar");
    }
    let kind = AgentKind::from_id(agent_id);

    let event_bus = Arc::new(EventBus::default());
    let factory = AgentFactory::from_config(&config, event_bus)?;
    let mut agent = factory.create(kind, user_id, None);

    agent.start().await;

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let result = agent.run(&msg).await;
        eprint!("\r              \r");
        agent.shutdown().await;
        println!("{}", result?);
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║          Easel Agent — Interactive Mode        ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Agent:     {}", agent.name());
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    match agent.tool_state() {
        Some(state) => println!("  Tools:     {} ({state})", config.tool_server.name),
        None => println!("  Tools:     none"),
    }
    println!("  Session:   {}", agent.session_id());
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit" | "/exit" | "/quit" | ":q") {
            break;
        }

        eprint!("  ...");
        match agent.run(line).await {
            Ok(response) => {
                eprint!("\r     \r");
                println!();
                for line in response.lines() {
                    println!("  {} > {line}", agent.name());
                }
                println!();
            }
            Err(e) => {
                eprint!("\r     \r");
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    agent.shutdown().await;

    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}
