//! `config validate` / `config show`.

use crate::cli::ConfigCommand;
use crate::config::GatewayConfig;

pub fn run(cmd: ConfigCommand, config: &GatewayConfig, config_path: &str) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Validate => {
            let errors = config.validate();
            if errors.is_empty() {
                println!("{config_path}: OK, no issues found");
                return Ok(());
            }
            for e in &errors {
                let tag = match e.severity {
                    oc_domain::config::ConfigSeverity::Error => "ERROR",
                    oc_domain::config::ConfigSeverity::Warning => "WARN",
                };
                println!("[{tag}] {}: {}", e.field, e.message);
            }
            if GatewayConfig::has_errors(&errors) {
                anyhow::bail!("configuration has errors");
            }
            Ok(())
        }
        ConfigCommand::Show => {
            let toml = toml::to_string_pretty(config)?;
            print!("{toml}");
            Ok(())
        }
    }
}
