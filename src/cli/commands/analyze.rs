//! One-shot analysis command.

use anyhow::Context;
use console::style;

use textdigest::analysis::{AnalysisResult, Analyzer, ExecutionStrategy, PersistMode};
use textdigest::config::Settings;

use crate::cli::icons::{arrow, success, warning};

/// Analyze one source and print the result.
pub async fn cmd_analyze(
    settings: &Settings,
    path: Option<&str>,
    json: bool,
    no_save: bool,
    strategy: Option<ExecutionStrategy>,
) -> anyhow::Result<()> {
    let mut analyzer = Analyzer::from_settings(settings).context("Failed to build LLM client")?;
    if let Some(strategy) = strategy {
        analyzer = analyzer.with_strategy(strategy);
    }

    let reference = path.unwrap_or(&settings.default_source);
    let mode = if no_save {
        PersistMode::Skip
    } else {
        PersistMode::Save
    };

    if !json {
        eprintln!(
            "{} Analyzing {} with {} ({:?})",
            arrow(),
            reference,
            settings.llm.model,
            analyzer.strategy()
        );
    }

    let result = analyzer
        .analyze_with(path, mode)
        .await
        .with_context(|| format!("Analysis of {} failed", reference))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(settings, &result, no_save);
    }

    Ok(())
}

fn print_result(settings: &Settings, result: &AnalysisResult, no_save: bool) {
    println!("\n{}", style("Summary").bold());
    println!("{}", "-".repeat(40));
    println!("{}", result.summary.text);
    println!("{:<12} {}", "Sentiment:", style(&result.summary.sentiment).cyan());

    println!("\n{}", style("Key Points").bold());
    println!("{}", "-".repeat(40));
    println!("{}", result.key_points.text);
    println!(
        "{:<12} {}",
        "Sentiment:",
        style(&result.key_points.sentiment).cyan()
    );

    println!();
    match result.report_ref {
        Some(ref name) => println!(
            "{} Report saved to {}",
            success(),
            settings.reports_dir.join(name).display()
        ),
        None if no_save => {}
        None => println!("{} Report could not be saved (see log)", warning()),
    }
}
