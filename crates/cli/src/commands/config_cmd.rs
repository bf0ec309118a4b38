//! `persona config`: print the default configuration or its location.

use persona_config::AppConfig;

pub fn show() {
    println!("{}", AppConfig::default_toml());
}

pub fn path() {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
}
