//! Web server command.

use textdigest::config::Settings;

use crate::cli::icons::{arrow, warning};

/// Start the web server.
pub async fn cmd_serve(settings: &Settings, bind: &str) -> anyhow::Result<()> {
    let (host, port) = parse_bind_address(bind)?;

    if !settings.storage_dir.is_dir() {
        eprintln!(
            "{} Storage directory {} does not exist yet",
            warning(),
            settings.storage_dir.display()
        );
    }

    println!(
        "{} Starting textdigest server at http://{}:{}",
        arrow(),
        host,
        port
    );
    println!("  Storage: {}", settings.storage_dir.display());
    println!("  Reports: {}", settings.reports_dir.display());
    println!("  Press Ctrl+C to stop");

    textdigest::server::serve(settings, &host, port).await
}

/// Parse a bind address that can be:
/// - Just a port: "3030" -> 127.0.0.1:3030
/// - Just a host: "0.0.0.0" -> 0.0.0.0:3030
/// - Host and port: "0.0.0.0:3030" -> 0.0.0.0:3030
fn parse_bind_address(bind: &str) -> anyhow::Result<(String, u16)> {
    let bind = bind.trim();
    if bind.is_empty() {
        anyhow::bail!("Bind address must not be empty");
    }

    // Try parsing as just a port number
    if let Ok(port) = bind.parse::<u16>() {
        return Ok(("127.0.0.1".to_string(), port));
    }

    // Try parsing as host:port
    if let Some((host, port_str)) = bind.rsplit_once(':') {
        if let Ok(port) = port_str.parse::<u16>() {
            return Ok((host.to_string(), port));
        }
    }

    // Must be just a host, use default port
    Ok((bind.to_string(), 3030))
}
