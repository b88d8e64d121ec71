//! Ask command - run a recursive investigation over one document.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;
use console::Style;
use sleuth_agent::{AgentConfig, LogCategory, RecursiveAgent, SharedLogSink, ToolCallingMode};
use sleuth_config::{Backend, Overrides, ResolvedSettings, ToolMode};
use sleuth_llm::{GeminiBackend, GeminiConfig, OpenAiBackend, OpenAiConfig, SharedBackend};

use super::{Context, open_document};

/// Arguments for the ask command.
#[derive(Args, Debug)]
pub struct AskArgs {
    /// Document to investigate
    pub file: PathBuf,

    /// The question to answer
    pub query: String,

    /// Deepest sub-agent level allowed to call the model
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Model identifier
    #[arg(short, long)]
    pub model: Option<String>,

    /// Model service: gemini, openai, groq or ollama
    #[arg(short, long)]
    pub backend: Option<Backend>,

    /// Pause before each sub-agent spawn, in milliseconds
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Let the chat session dispatch tool calls
    #[arg(long)]
    pub auto: bool,
}

/// Run the ask command.
pub async fn run(args: AskArgs, ctx: &Context) -> Result<()> {
    let environment = open_document(&args.file)?;

    let overrides = Overrides {
        backend: args.backend,
        model: args.model.clone(),
        max_depth: args.max_depth,
        rate_limit_delay_ms: args.delay_ms,
        mode: args.auto.then_some(ToolMode::Automatic),
    };
    let settings = ResolvedSettings::resolve(&ctx.config, &overrides)
        .context("Failed to resolve model settings")?;

    if ctx.verbose {
        let dim = Style::new().dim();
        eprintln!(
            "{}",
            dim.apply_to(format!(
                "Backend: {} ({}), max depth {}",
                settings.backend, settings.model_name, settings.max_depth
            ))
        );
        eprintln!("{}", dim.apply_to(environment.metadata()));
        eprintln!();
    }

    let backend = build_backend(&settings)?;
    let agent = RecursiveAgent::new(backend, environment, agent_config(&settings))
        .with_log_sink(console_sink());

    tracing::info!(file = %args.file.display(), query = %args.query, "Investigation started");
    let answer = agent.run(&args.query).await;
    tracing::info!(answer_len = answer.len(), "Investigation finished");

    if ctx.json_output {
        let out = serde_json::json!({
            "query": args.query,
            "answer": answer,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", answer);
    }

    Ok(())
}

fn agent_config(settings: &ResolvedSettings) -> AgentConfig {
    let mode = match settings.mode {
        ToolMode::Manual => ToolCallingMode::Manual,
        ToolMode::Automatic => ToolCallingMode::Automatic,
    };

    AgentConfig::new(&settings.model_name)
        .with_max_depth(settings.max_depth)
        .with_rate_limit_delay(settings.rate_limit_delay)
        .with_max_tokens(settings.max_tokens)
        .with_temperature(settings.temperature)
        .with_mode(mode)
}

fn build_backend(settings: &ResolvedSettings) -> Result<SharedBackend> {
    let key = settings.api_key_value().unwrap_or_default().to_string();

    let backend: SharedBackend = match settings.backend {
        Backend::Gemini => {
            let mut config = GeminiConfig::new(key)
                .with_model(&settings.model_name)
                .with_timeout(settings.timeout)
                .with_retries(settings.retry_max, settings.retry_backoff);
            if let Some(ref url) = settings.base_url {
                config = config.with_base_url(url);
            }
            Arc::new(GeminiBackend::new(config)?)
        }
        Backend::Openai | Backend::Groq | Backend::Ollama => {
            let mut config = match settings.backend {
                Backend::Groq => OpenAiConfig::groq(key),
                Backend::Ollama => OpenAiConfig::ollama(),
                _ => OpenAiConfig::openai(key),
            }
            .with_model(&settings.model_name)
            .with_timeout(settings.timeout)
            .with_retries(settings.retry_max, settings.retry_backoff);
            if let Some(ref url) = settings.base_url {
                config = config.with_base_url(url);
            }
            Arc::new(OpenAiBackend::new(config)?)
        }
    };

    Ok(backend)
}

/// Style progress events by category and write them to stderr.
fn console_sink() -> SharedLogSink {
    Arc::new(|message: &str, category: LogCategory| {
        let style = match category {
            LogCategory::Running => Style::new().cyan().bold(),
            LogCategory::Read => Style::new().blue(),
            LogCategory::Search => Style::new().magenta(),
            LogCategory::Recursion => Style::new().yellow().bold(),
            LogCategory::Tool => Style::new().red(),
            LogCategory::Complete => Style::new().green(),
            LogCategory::Neutral => Style::new().dim(),
        };
        eprintln!("{}", style.apply_to(message));
    })
}
