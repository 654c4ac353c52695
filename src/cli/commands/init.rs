//! Init command - first-run setup.

use crate::cli::Output;
use crate::config::Settings;
use crate::transcription::is_api_key_configured;
use console::style;

/// Run the init command: directories, database, seed data, config file.
pub fn run_init(settings: &Settings) -> anyhow::Result<()> {
    Output::header("Hark Setup");
    println!();

    // Step 1: Prerequisites
    println!("{}", style("Step 1: Checking prerequisites").bold().cyan());
    println!();

    let mut missing = Vec::new();
    if std::process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .is_err()
    {
        missing.push("yt-dlp");
    }

    if missing.is_empty() {
        Output::success("All required tools are installed!");
    } else {
        Output::warning("Some tools are missing:");
        for tool in &missing {
            println!("  {} {} - not found", style("x").red(), style(tool).bold());
        }
        println!();
        println!("  Media download requires yt-dlp. Install it and re-run 'hark init'.");
    }

    println!();

    // Step 2: API key
    println!("{}", style("Step 2: Checking API configuration").bold().cyan());
    println!();

    if is_api_key_configured() {
        Output::success("OpenAI API key is configured!");
    } else {
        Output::warning("OPENAI_API_KEY environment variable is not set.");
        println!();
        println!("  Hark requires an OpenAI API key for transcription and embeddings.");
        println!("  {}", style("export OPENAI_API_KEY='sk-...'").green());
    }

    println!();

    // Step 3: Directories and database
    println!("{}", style("Step 3: Setting up storage").bold().cyan());
    println!();

    std::fs::create_dir_all(settings.data_dir())?;
    std::fs::create_dir_all(settings.temp_dir())?;
    Output::success(&format!("Data directory: {}", settings.data_dir().display()));

    let store = super::open_store(settings)?;
    Output::success(&format!("Database: {}", settings.sqlite_path().display()));

    if store.seed_defaults()? {
        Output::success("Seeded default subject and user (IDs 1 and 1).");
    } else {
        Output::info("Subjects and users already present, skipping seed.");
    }

    println!();

    // Step 4: Config file
    println!("{}", style("Step 4: Configuration file").bold().cyan());
    println!();

    let config_path = Settings::default_config_path();
    if config_path.exists() {
        Output::info(&format!("Config file exists: {}", config_path.display()));
    } else {
        settings.save_to(&config_path)?;
        Output::success(&format!("Created config file: {}", config_path.display()));
    }

    println!();
    println!("{}", style("Setup Complete!").bold().green());
    println!();
    println!("Next steps:");
    println!("  {} Submit your first source", style("hark submit <url>").cyan());
    println!("  {} Ask about a completed session", style("hark ask <id> \"<question>\"").cyan());
    println!("  {} Run the HTTP API", style("hark serve").cyan());

    Ok(())
}
