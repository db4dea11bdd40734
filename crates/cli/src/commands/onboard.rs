//! `vocalis onboard` — First-time setup.

use vocalis_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Vocalis — First-Time Setup");
    println!("==========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Set your model API key:   export OPENAI_API_KEY=sk-...");
    println!("   2. Point to a memory server: export AGENT_MEMORY_SERVER_URL=http://localhost:8000");
    println!("      (or set backend = \"in_memory\" under [memory] to try it without one)");
    println!("   3. Start talking:            vocalis agent\n");
    Ok(())
}
