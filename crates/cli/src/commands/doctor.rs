//! `easel doctor` — Check configuration and the tool server.

use easel_config::AppConfig;
use std::process::Stdio;
use std::time::Duration;

const COMMAND_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

const OPTIONAL_TOOL_VARS: [(&str, &str); 2] = [
    ("WAVESPEED_API_HOST", "API host"),
    ("WAVESPEED_API_RESOURCE_MODE", "resource mode"),
];

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Easel Doctor — Configuration Check");
    println!("=====================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_path();
    if config_path.exists() {
        println!("  ✅ Config file: {}", config_path.display());
    } else {
        println!("  ⚠️  No config file — using defaults (run `easel onboard`)");
    }

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("  ❌ Config file invalid: {e}");
            print_hints();
            return Ok(());
        }
    };

    // Chat model
    match config.api_key.as_deref() {
        Some(key) => println!(
            "  ✅ Chat API key: {} ({} / {})",
            mask_secret(key),
            config.default_provider,
            config.default_model
        ),
        None => {
            println!("  ❌ Chat API key: not set");
            issues += 1;
        }
    }

    // Tool server credential
    let tool = &config.tool_server;
    match tool.api_key.as_deref() {
        Some(key) => println!("  ✅ {}: {}", tool.api_key_env, mask_secret(key)),
        None => {
            println!("  ❌ {}: not set (image generation disabled)", tool.api_key_env);
            issues += 1;
        }
    }

    for (name, description) in OPTIONAL_TOOL_VARS {
        match tool.env.get(name) {
            Some(value) => println!("  ✅ {name}: {value} ({description})"),
            None => println!("  ⚠️  {name}: not set ({description}, optional)"),
        }
    }

    // Tool server binary
    if command_runs(&tool.command, COMMAND_CHECK_TIMEOUT).await {
        println!("  ✅ {}: command available", tool.command);
    } else {
        println!("  ❌ {}: command not available", tool.command);
        issues += 1;
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed! Image generation should work.");
    } else {
        println!("  ⚠️  {issues} issue(s) found.");
        print_hints();
    }

    Ok(())
}

fn print_hints() {
    println!("\n💡 Setup:");
    println!("   1. Chat model:        export DASHSCOPE_API_KEY='sk-...'");
    println!("   2. Image generation:  export WAVESPEED_API_KEY='...'");
    println!("   3. Tool server:       pip install wavespeed-mcp");
    println!("   4. Config file:       easel onboard");
    println!();
}

/// Show the first 8 characters of a secret.
pub fn mask_secret(value: &str) -> String {
    if value.chars().count() > 8 {
        let prefix: String = value.chars().take(8).collect();
        format!("{prefix}...")
    } else {
        "***".into()
    }
}

/// Whether `<command> --help` exits successfully within `timeout`.
pub async fn command_runs(command: &str, timeout: Duration) -> bool {
    let child = tokio::process::Command::new(command)
        .arg("--help")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();

    let Ok(mut child) = child else {
        return false;
    };

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            tracing::debug!(command, error = %e, "Command check failed");
            false
        }
        Err(_) => {
            tracing::debug!(command, "Command check timed out");
            false
        }
    }
}
