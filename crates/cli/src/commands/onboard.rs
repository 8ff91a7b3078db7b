//! `easel onboard` — First-time setup.

use easel_config::AppConfig;
use std::path::Path;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("Easel — First-Time Setup");
    println!("========================\n");

    let created = write_default_config(&AppConfig::config_path())?;
    let config_path = AppConfig::config_path();

    if created {
        println!("✅ Created config.toml at: {}", config_path.display());
        println!("\n📝 Next steps:");
        println!("   1. export DASHSCOPE_API_KEY='sk-...'   (chat model)");
        println!("   2. export WAVESPEED_API_KEY='...'      (image generation, optional)");
        println!("   3. Run: easel doctor");
        println!("   4. Run: easel agent\n");
    } else {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    }

    Ok(())
}

/// Write the default config to `path` unless a file is already there.
/// Returns whether a file was written.
pub fn write_default_config(path: &Path) -> std::io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(true)
}
