//! LLM backend inspection command.

use console::style;

use textdigest::config::Settings;
use textdigest::llm::LlmClient;

use crate::cli::icons::{error, warning};

/// List available LLM models.
pub async fn cmd_llm_models(settings: &Settings) -> anyhow::Result<()> {
    let config = &settings.llm;
    let llm_client = LlmClient::new(config.clone())?;

    println!("\n{}", style("LLM Configuration").bold());
    println!("{}", "-".repeat(40));
    println!("{:<20} {}", "Endpoint:", config.endpoint);
    println!("{:<20} {}", "Current Model:", config.model);
    println!("{:<20} {:.2}", "Temperature:", config.temperature);
    println!("{:<20} {}", "Context Window:", config.num_ctx);
    println!("{:<20} {}", "Threads:", config.num_thread);
    println!("{:<20} {}s", "Request Timeout:", config.timeout_secs);
    println!("{:<20} {}", "Max Retries:", config.max_retries);

    if !llm_client.is_available().await {
        println!(
            "\n{} LLM service not available at {}",
            warning(),
            config.endpoint
        );
        println!("  Make sure Ollama is running: ollama serve");
        return Ok(());
    }

    println!("\n{}", style("Available Models").bold());
    println!("{}", "-".repeat(40));

    match llm_client.list_models().await {
        Ok(models) => {
            if models.is_empty() {
                println!("  No models installed");
                println!("  Install one with: ollama pull {}", config.model);
            } else {
                for model in models {
                    // Ollama reports "name:tag"; the config usually omits ":latest"
                    let marker = if model == config.model
                        || model.strip_suffix(":latest") == Some(config.model.as_str())
                    {
                        style("*").green().to_string()
                    } else {
                        " ".to_string()
                    };
                    println!("{} {}", marker, model);
                }
            }
        }
        Err(e) => {
            println!("{} Failed to list models: {}", error(), e);
        }
    }

    Ok(())
}
