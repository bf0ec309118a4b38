//! `persona status`: show configuration status.

use crate::runtime::open_store;
use persona_config::AppConfig;
use persona_security::CredentialStore;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let orch = &config.orchestrator;

    println!("🧭 Persona Status");
    println!("=================");
    println!("  Config dir:    {}", AppConfig::config_dir().display());
    println!("  Provider:      {} ({})", config.provider.name, config.provider.base_url);
    println!("  Model chain:   {}", orch.model_chain.join(" → "));
    println!(
        "  Retries:       {} rounds, backoff {}–{} ms, timeout {}s",
        orch.max_retries, orch.base_delay_ms, orch.max_delay_ms, orch.timeout_secs
    );
    println!("  Site key:      {}", if config.api_key.is_some() { "configured" } else { "missing" });
    println!(
        "  Vault key:     {}",
        if config.vault.master_key.is_some() { "configured" } else { "missing" }
    );
    println!("  Knowledge:     {} seed documents", config.knowledge.documents.len());

    match config.vault.store.as_str() {
        "memory" => println!("  Credentials:   in-memory (lost on exit)"),
        _ => {
            let store = open_store(&config)?;
            println!(
                "  Credentials:   {} on file ({})",
                store.count().await?,
                config.credentials_path().display()
            );
        }
    }

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file; run `persona config > {}`", config_path.display());
    }

    Ok(())
}
