//! Minimal agent runtime CLI.
//!
//! Runs an agent over a task with a chosen provider, designs agent specs from
//! a prompt, and lists the built-in tools.

use std::path::{Path, PathBuf};
use std::time::Duration;

use agent_maker::agent::Agent;
use agent_maker::core::spec::AgentSpec;
use agent_maker::design::{DEFAULT_FALLBACK_NAME, design_spec};
use agent_maker::exit_codes;
use agent_maker::io::config::{RuntimeConfig, load_config, write_config};
use agent_maker::io::process::split_command;
use agent_maker::io::prompt::render_system_prompt;
use agent_maker::io::provider::{CommandProvider, DummyProvider, Provider, ScriptedProvider};
use agent_maker::io::spec_file::{load_spec, write_spec};
use agent_maker::logging;
use agent_maker::runner::Runner;
use agent_maker::tools::registry::expand_names;
use agent_maker::tools::{ToolRegistry, list_builtin_tools};
use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};

const DEFAULT_CONFIG_PATH: &str = "agent-maker.toml";

#[derive(Parser)]
#[command(name = "agent-maker", version, about = "Minimal tool-using agent runtime")]
struct Cli {
    /// Runtime config file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the built-in tools.
    ListTools,
    /// Run an agent on a task until it answers or the step budget runs out.
    Run(RunArgs),
    /// Ask the provider for an agent spec and write it to a file.
    Design(DesignArgs),
    /// Validate a spec file and print it normalized.
    Spec {
        #[arg(long)]
        spec: PathBuf,
    },
    /// Print the effective config, or write it with `--write`.
    Config {
        #[arg(long)]
        write: bool,
    },
}

#[derive(Args)]
struct ProviderArgs {
    #[arg(long, value_enum, default_value_t = ProviderKind::Dummy)]
    provider: ProviderKind,

    /// Response script for `--provider script` (JSON array or one per line).
    #[arg(long)]
    script: Option<PathBuf>,

    /// Command line for `--provider command`.
    #[arg(long)]
    command: Option<String>,

    #[arg(long, default_value_t = 120)]
    provider_timeout_secs: u64,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderKind {
    Dummy,
    Script,
    Command,
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    task: String,

    /// Tool names, comma separated or repeated. Ignored with `--spec`.
    #[arg(long, value_delimiter = ',', default_value = "todo,fs")]
    tools: Vec<String>,

    /// Build the agent from a spec file instead of `--tools`.
    #[arg(long, conflicts_with = "tools")]
    spec: Option<PathBuf>,

    #[arg(long, default_value = "agent")]
    name: String,

    #[arg(long)]
    max_steps: Option<u32>,

    #[arg(long)]
    workspace: Option<PathBuf>,

    #[arg(long)]
    run_dir: Option<PathBuf>,

    #[command(flatten)]
    provider: ProviderArgs,
}

#[derive(Args)]
struct DesignArgs {
    #[arg(long)]
    prompt: String,

    #[arg(long, default_value = "spec.json")]
    out: PathBuf,

    #[arg(long, default_value = DEFAULT_FALLBACK_NAME)]
    fallback_name: String,

    #[arg(long)]
    run_dir: Option<PathBuf>,

    #[command(flatten)]
    provider: ProviderArgs,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::ListTools => cmd_list_tools(),
        Command::Run(args) => cmd_run(&cli.config, args),
        Command::Design(args) => cmd_design(&cli.config, args),
        Command::Spec { spec } => cmd_spec(&spec),
        Command::Config { write } => cmd_config(&cli.config, write),
    }
}

fn runtime_config(path: &Path) -> Result<RuntimeConfig> {
    let mut cfg = load_config(path)?;
    cfg.apply_env_overrides(|key| std::env::var(key).ok());
    cfg.validate()?;
    Ok(cfg)
}

fn build_provider(args: &ProviderArgs) -> Result<Box<dyn Provider>> {
    let provider: Box<dyn Provider> = match args.provider {
        ProviderKind::Dummy => Box::new(DummyProvider),
        ProviderKind::Script => {
            let Some(path) = &args.script else {
                bail!("--provider script requires --script FILE");
            };
            Box::new(ScriptedProvider::from_file(path)?)
        }
        ProviderKind::Command => {
            let Some(line) = &args.command else {
                bail!("--provider command requires --command CMD");
            };
            let argv = split_command(line).context("parse --command")?;
            Box::new(CommandProvider::new(
                argv,
                Duration::from_secs(args.provider_timeout_secs),
            )?)
        }
    };
    Ok(provider)
}

fn cmd_list_tools() -> Result<i32> {
    for tool in list_builtin_tools() {
        println!("- {}: {}", tool.name, tool.description);
    }
    Ok(exit_codes::OK)
}

fn cmd_run(config_path: &Path, args: RunArgs) -> Result<i32> {
    let mut cfg = runtime_config(config_path)?;
    if let Some(workspace) = args.workspace {
        cfg.tools.workspace = workspace;
    }
    if let Some(run_dir) = args.run_dir {
        cfg.run_dir = run_dir;
    }
    let provider = build_provider(&args.provider)?;

    let mut agent = match &args.spec {
        Some(path) => Agent::from_spec(&load_spec(path)?, &cfg.tools, provider)?,
        None => {
            let tools = ToolRegistry::from_names(&args.tools, &cfg.tools)?;
            let prompt = render_system_prompt(&args.name, "", &tools)?;
            Agent::new(args.name.clone(), prompt, tools, provider)
        }
    };

    let mut runner = Runner::from_config(&cfg);
    if let Some(max_steps) = args.max_steps {
        if max_steps == 0 {
            bail!("--max-steps must be > 0");
        }
        runner = runner.with_max_steps(max_steps);
    }
    let result = runner.run(&mut agent, &args.task)?;

    if let Some(path) = &result.trace_path {
        eprintln!("trace: {}", path.display());
    }
    if result.is_final() {
        println!("Final: {}", result.output);
        Ok(exit_codes::OK)
    } else {
        eprintln!(
            "no final answer after {} steps (run {})",
            result.steps, result.run_id
        );
        Ok(exit_codes::INCOMPLETE)
    }
}

fn cmd_design(config_path: &Path, args: DesignArgs) -> Result<i32> {
    let mut cfg = runtime_config(config_path)?;
    if let Some(run_dir) = args.run_dir {
        cfg.run_dir = run_dir;
    }
    let provider = build_provider(&args.provider)?;
    let (spec, _) = design_spec(
        &Runner::from_config(&cfg),
        provider,
        &args.prompt,
        &args.fallback_name,
    )?;
    write_spec(&args.out, &spec)?;
    println!("{}", args.out.display());
    Ok(exit_codes::OK)
}

fn cmd_spec(path: &Path) -> Result<i32> {
    let spec: AgentSpec = load_spec(path)?;
    expand_names(&spec.tools)?;
    let rendered = serde_json::to_string_pretty(&spec.to_value()).context("serialize spec")?;
    println!("{rendered}");
    Ok(exit_codes::OK)
}

fn cmd_config(config_path: &Path, write: bool) -> Result<i32> {
    let cfg = runtime_config(config_path)?;
    if write {
        write_config(config_path, &cfg)?;
        println!("{}", config_path.display());
    } else {
        print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
    }
    Ok(exit_codes::OK)
}
