//! Configuration management commands.

use console::style;

use textdigest::config::{Config, Settings};

/// Print the effective configuration as TOML.
///
/// Values are shown after environment overrides and path resolution, so the
/// output can be saved as a config file that reproduces this run.
pub fn cmd_config_show(settings: &Settings, loaded: &Config) -> anyhow::Result<()> {
    match loaded.source_path {
        Some(ref path) => eprintln!("{} {}", style("# Loaded from").dim(), path.display()),
        None => eprintln!("{}", style("# No config file found, using defaults").dim()),
    }

    print!("{}", effective_config(settings).to_toml()?);
    Ok(())
}

fn effective_config(settings: &Settings) -> Config {
    Config {
        storage_dir: Some(settings.storage_dir.display().to_string()),
        default_source: Some(settings.default_source.clone()),
        reports_dir: Some(settings.reports_dir.display().to_string()),
        bind: Some(settings.bind.clone()),
        llm: settings.llm.clone(),
        analysis: settings.analysis.clone(),
        source_path: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_effective_config_round_trips_through_toml() {
        let mut settings = Settings::default();
        settings.storage_dir = PathBuf::from("/srv/texts");
        settings.llm.model = "llama3".to_string();

        let rendered = effective_config(&settings).to_toml().unwrap();
        assert!(rendered.contains("storage_dir = \"/srv/texts\""));
        assert!(rendered.contains("[llm]"));

        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.llm.model, "llama3");
        assert_eq!(parsed.default_source.as_deref(), Some("ejemplo1.txt"));
    }

    #[test]
    fn test_default_sections_are_omitted() {
        let rendered = effective_config(&Settings::default()).to_toml().unwrap();
        assert!(!rendered.contains("[llm]"));
        assert!(!rendered.contains("[analysis]"));
    }
}
