mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;

use cli::{Cli, Commands};
use stepexec_core::config::ResourceLimits;
use stepexec_core::helper::HelperRequest;
use stepexec_core::observability;
use stepexec_core::step::{ExecutionRequest, Step};
use stepexec_engine::helper::HelperConfig;
use stepexec_engine::{engine, helper, interp};

fn main() -> Result<()> {
    observability::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            request,
            input,
            timeout,
            max_output_mb,
        } => {
            let raw = read_arg(&request)?;
            let mut request: ExecutionRequest =
                serde_json::from_str(&raw).context("Parse ExecutionRequest JSON")?;
            if input.is_some() {
                request.input_path = input;
            }
            let limits = ResourceLimits::from_env().with_cli_overrides(timeout, max_output_mb);
            let result = engine::run_step_with_limits(&request, &limits);
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Helper {
            request,
            script,
            project,
            sdk_module,
            timeout,
        } => {
            let raw = read_arg(&request)?;
            let request: HelperRequest =
                serde_json::from_str(&raw).context("Parse HelperRequest JSON")?;
            let mut config = HelperConfig::new(script, project);
            if let Some(module) = sdk_module {
                config.sdk_module = module;
            }
            let limits = ResourceLimits::from_env().with_cli_overrides(timeout, None);
            let result = helper::invoke_with_limits(&request, &config, &limits);
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Resolve { step } => {
            let raw = read_arg(&step)?;
            let step: Step = serde_json::from_str(&raw).context("Parse Step JSON")?;
            let resolved = interp::resolve(&step);
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "interpreter": resolved.path,
                    "venvUsed": resolved.venv_used,
                    "venvRoot": resolved.venv_root,
                }))?
            );
        }
    }

    Ok(())
}

/// Read a CLI payload argument: a file path, or stdin when "-".
fn read_arg(arg: &str) -> Result<String> {
    if arg == "-" {
        let mut s = String::new();
        std::io::stdin().read_to_string(&mut s)?;
        Ok(s)
    } else {
        std::fs::read_to_string(arg).with_context(|| format!("Read {}", arg))
    }
}
