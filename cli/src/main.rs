//! Skein CLI: run one prompt through the kernel loop.
//!
//! `skein --config skein.json --prompt "What time is it?"` loads the config,
//! wires the agent, tools, and optional memory store, runs the loop, and
//! prints the response, the recorded tool calls, and the iteration count.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use config::RuntimeConfig;
use skein::tools::builtin::register_builtin_tools;
use skein::{
    Kernel, KernelConfig, Level, OpenAiCompatAgent, SqliteMemory, ToolRegistry, TracingObserver,
};

#[derive(Parser, Debug)]
#[command(name = "skein")]
#[command(about = "Skein: run a prompt through the agent kernel")]
struct Args {
    /// Path of the JSON configuration file
    #[arg(long, value_name = "PATH")]
    config: PathBuf,

    /// The user prompt to run
    #[arg(long, value_name = "TEXT")]
    prompt: String,

    /// Overrides the configured system prompt
    #[arg(long, value_name = "TEXT")]
    system_prompt: Option<String>,

    /// Overrides the configured memory store path
    #[arg(long, value_name = "PATH")]
    memory: Option<PathBuf>,

    /// Iteration budget: negative keeps the configured value, 0 is unbounded,
    /// positive bounds the loop
    #[arg(long, value_name = "N", default_value_t = -1, allow_hyphen_values = true)]
    max_iterations: i64,

    /// Log runtime events down to the Verbose floor
    #[arg(short, long)]
    verbose: bool,
}

/// Truncates tool output for display, appending an ellipsis past `max_chars`.
fn truncate_for_display(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max_chars).collect();
        out.push('…');
        out
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let mut config = RuntimeConfig::load(&args.config)?;
    if let Some(system_prompt) = args.system_prompt {
        config.system_prompt = system_prompt;
    }
    if let Some(memory) = args.memory {
        config.memory.path = Some(memory.display().to_string());
    }
    if args.max_iterations >= 0 {
        config.max_iterations = args.max_iterations as u32;
    }

    let mut agent_config = config.agent.clone();
    if agent_config.provider.api_key.is_none() {
        agent_config.provider.api_key = std::env::var("OPENAI_API_KEY").ok();
    }
    let agent = Arc::new(OpenAiCompatAgent::from_config("default", &agent_config));

    let tools = Arc::new(ToolRegistry::new());
    register_builtin_tools(&tools).await?;

    let observer = Arc::new(TracingObserver::with_min_level(if args.verbose {
        Level::Verbose
    } else {
        Level::Info
    }));

    let mut kernel = Kernel::new(agent, tools)
        .with_observer(observer)
        .with_config(KernelConfig {
            max_iterations: config.max_iterations,
            system_prompt: if config.system_prompt.is_empty() {
                None
            } else {
                Some(config.system_prompt.clone())
            },
        });
    if let Some(path) = &config.memory.path {
        kernel = kernel.with_memory(Arc::new(SqliteMemory::new(path)?));
    }

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let result = kernel.run(&token, &args.prompt).await?;

    println!("Response: {}", result.response);
    for (i, record) in result.tool_calls.iter().enumerate() {
        println!(
            "[{i}] {}({}): {}",
            record.call.name,
            record.call.arguments,
            truncate_for_display(&record.result, 200)
        );
    }
    println!("Iterations: {}", result.iterations);
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);
    if let Err(e) = run(args).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: truncation keeps short strings and appends an ellipsis
    /// past the limit.
    #[test]
    fn truncation_appends_ellipsis() {
        assert_eq!(truncate_for_display("short", 200), "short");
        let long = "x".repeat(250);
        let shown = truncate_for_display(&long, 200);
        assert_eq!(shown.chars().count(), 201);
        assert!(shown.ends_with('…'));
    }

    /// **Scenario**: missing required flags make the parser exit with usage
    /// (clap reports code 2).
    #[test]
    fn required_flags_enforced() {
        let err = Args::try_parse_from(["skein"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let ok = Args::try_parse_from([
            "skein",
            "--config",
            "skein.json",
            "--prompt",
            "hello",
            "--max-iterations",
            "-1",
        ])
        .unwrap();
        assert_eq!(ok.max_iterations, -1);
        assert!(!ok.verbose);
    }
}
