//! `oc doctor` — diagnostic checks against the resolved configuration,
//! grounded in the teacher's `cli/doctor.rs` check-and-print shape.

use std::path::Path;

use crate::config::GatewayConfig;

pub async fn run(config: &GatewayConfig, config_path: &str) -> anyhow::Result<bool> {
    let mut all_passed = true;

    all_passed &= check_config_file(config_path);
    all_passed &= check_config_validation(config);
    all_passed &= check_writable_dir("state_dir", &config.core.sessions.store_path);
    all_passed &= check_writable_dir("pairing store_dir", &config.state_dir);
    all_passed &= check_channels_configured(config);

    Ok(all_passed)
}

fn print_check(name: &str, passed: bool, detail: &str) -> bool {
    let tag = if passed { "PASS" } else { "FAIL" };
    println!("[{tag}] {name}: {detail}");
    passed
}

fn check_config_file(config_path: &str) -> bool {
    let exists = Path::new(config_path).exists();
    print_check(
        "config file",
        true,
        &format!("{config_path} {}", if exists { "found" } else { "not found, using defaults" }),
    )
}

fn check_config_validation(config: &GatewayConfig) -> bool {
    let errors = config.validate();
    let has_errors = GatewayConfig::has_errors(&errors);
    print_check(
        "config validation",
        !has_errors,
        &format!("{} issue(s) ({} error(s))", errors.len(), errors.iter().filter(|e| e.severity == oc_domain::config::ConfigSeverity::Error).count()),
    )
}

fn check_writable_dir(name: &str, path: impl AsRef<Path>) -> bool {
    let path = path.as_ref();
    let dir = if path.extension().is_some() { path.parent().unwrap_or(Path::new(".")) } else { path };

    match std::fs::create_dir_all(dir) {
        Ok(()) => {
            let probe = dir.join(".oc-doctor-write-probe");
            match std::fs::write(&probe, b"ok") {
                Ok(()) => {
                    let _ = std::fs::remove_file(&probe);
                    print_check(name, true, &format!("{} is writable", dir.display()))
                }
                Err(e) => print_check(name, false, &format!("{} is not writable: {e}", dir.display())),
            }
        }
        Err(e) => print_check(name, false, &format!("cannot create {}: {e}", dir.display())),
    }
}

fn check_channels_configured(config: &GatewayConfig) -> bool {
    let configured = config.channels.webhooks.iter().filter(|(_, h)| !h.url.trim().is_empty()).count();
    print_check(
        "channel webhooks",
        true,
        &format!("{configured}/{} channel(s) have a webhook URL configured (others log-only)", config.channels.webhooks.len()),
    )
}
