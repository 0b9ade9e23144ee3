//! Dataset-versioning helper invocation.
//!
//! The helper is a pre-built SDK-backed CLI script: no wrapper synthesis,
//! just runner resolution, an availability probe, bounded execution via
//! [`crate::exec`], and extraction of one marker-delimited JSON payload from
//! the helper's mixed log+payload stdout.

use std::path::{Path, PathBuf};

use stepexec_core::config::ResourceLimits;
use stepexec_core::helper::{HelperInvocationResult, HelperRequest};
use thiserror::Error;

use crate::exec::{self, ExecOptions};
use crate::interp;
use crate::protocol;

/// Sentinel printed by the availability probe on a working runtime.
pub const PROBE_SENTINEL: &str = "STEPEXEC_HELPER_OK";

/// Default SDK module the probe imports.
pub const DEFAULT_SDK_MODULE: &str = "dataset_sdk";

/// How the helper is invoked: a program plus fixed leading arguments
/// (e.g. `uv run python`).
#[derive(Debug, Clone)]
pub struct HelperRunner {
    pub program: PathBuf,
    pub prefix_args: Vec<String>,
}

/// Configuration for one helper invocation.
#[derive(Debug, Clone)]
pub struct HelperConfig {
    /// Path to the helper CLI script on disk.
    pub script_path: PathBuf,
    /// Project directory: probed for `uv.lock` and local venvs, and used as
    /// the helper's working directory.
    pub project_dir: PathBuf,
    /// Module imported by the availability probe.
    pub sdk_module: String,
    /// Extra environment (resolved credentials), passed through verbatim.
    pub env: Vec<(String, String)>,
}

impl HelperConfig {
    pub fn new(script_path: impl Into<PathBuf>, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            script_path: script_path.into(),
            project_dir: project_dir.into(),
            sdk_module: DEFAULT_SDK_MODULE.to_string(),
            env: Vec::new(),
        }
    }
}

/// Helper failure taxonomy, on top of [`exec::ExecError`].
#[derive(Debug, Error)]
pub enum HelperError {
    #[error("Helper runtime unavailable: {reason}. {hint}")]
    RuntimeUnavailable { reason: String, hint: String },

    #[error("Helper script missing: {}", .0.display())]
    ScriptMissing(PathBuf),
}

/// Resolve how to invoke the helper.
///
/// Preference order: a project-local `uv` setup (`uv.lock` present and `uv`
/// on PATH), then a validated local venv's interpreter, then `uv run`
/// regardless — it can provision an environment on demand.
pub fn resolve_runner(config: &HelperConfig) -> HelperRunner {
    let uv_runner = || HelperRunner {
        program: PathBuf::from("uv"),
        prefix_args: vec!["run".to_string(), "python".to_string()],
    };

    if config.project_dir.join("uv.lock").is_file() && which::which("uv").is_ok() {
        return uv_runner();
    }

    for name in interp::VENV_DIR_NAMES {
        let candidate = config.project_dir.join(name);
        if interp::is_valid_venv(&candidate) {
            let step = venv_only_step(&candidate);
            let resolved = interp::resolve(&step);
            if resolved.venv_used {
                return HelperRunner {
                    program: resolved.path,
                    prefix_args: Vec::new(),
                };
            }
        }
    }

    uv_runner()
}

// interp::resolve wants a Step; synthesize a minimal custom-venv one so the
// interpreter-selection rules stay in one place.
fn venv_only_step(venv_root: &Path) -> stepexec_core::step::Step {
    serde_json::from_value(serde_json::json!({
        "id": "helper",
        "venvMode": "custom",
        "venvPath": venv_root.to_string_lossy(),
    }))
    .expect("static helper step json is valid")
}

/// Probe whether the helper's runtime can import the SDK at all.
///
/// Success is judged by the sentinel appearing in combined stdout+stderr
/// together with a zero exit code. Unavailability carries a remediation
/// hint rather than a bare error.
pub fn probe_runtime(
    config: &HelperConfig,
    limits: &ResourceLimits,
) -> Result<HelperRunner, HelperError> {
    let runner = resolve_runner(config);
    let hint = format!("Install the SDK with: pip install {}", config.sdk_module);

    let mut args = runner.prefix_args.clone();
    args.push("-c".to_string());
    args.push(format!(
        "import {}; print('{}')",
        config.sdk_module, PROBE_SENTINEL
    ));
    let (program, args) = build_command(&runner.program, &args);

    let mut opts = ExecOptions::from_limits(limits);
    opts.cwd = Some(config.project_dir.clone());
    opts.env = config.env.clone();

    match exec::run(&program, &args, &opts) {
        Ok(out) => {
            let combined = format!("{}{}", out.stdout, out.stderr);
            if out.exit_code == 0 && combined.contains(PROBE_SENTINEL) {
                Ok(runner)
            } else {
                Err(HelperError::RuntimeUnavailable {
                    reason: combine_output(&out.stdout, &out.stderr),
                    hint,
                })
            }
        }
        Err(e) => Err(HelperError::RuntimeUnavailable {
            reason: e.to_string(),
            hint,
        }),
    }
}

/// Invoke the helper with limits from the environment.
pub fn invoke(request: &HelperRequest, config: &HelperConfig) -> HelperInvocationResult {
    invoke_with_limits(request, config, &ResourceLimits::from_env())
}

/// Invoke the helper and decode its marker-delimited JSON payload.
/// All failures are returned as structured results, never propagated.
pub fn invoke_with_limits(
    request: &HelperRequest,
    config: &HelperConfig,
    limits: &ResourceLimits,
) -> HelperInvocationResult {
    if !config.script_path.is_file() {
        return HelperInvocationResult::err(
            HelperError::ScriptMissing(config.script_path.clone()).to_string(),
        );
    }

    let runner = match probe_runtime(config, limits) {
        Ok(runner) => runner,
        Err(e) => return HelperInvocationResult::err(e.to_string()),
    };

    let mut args = runner.prefix_args.clone();
    args.push(config.script_path.display().to_string());
    args.extend(request.to_args());
    let (program, args) = build_command(&runner.program, &args);

    let mut opts = ExecOptions::from_limits(limits);
    opts.cwd = Some(config.project_dir.clone());
    opts.env = config.env.clone();

    tracing::info!(
        script = %config.script_path.display(),
        runner = %program.display(),
        "Invoking helper"
    );

    let out = match exec::run(&program, &args, &opts) {
        Ok(out) => out,
        Err(e) => {
            let (stdout, stderr) = e.partial_output();
            let detail = combine_output(stdout, stderr);
            let message = if detail.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", e, detail)
            };
            return HelperInvocationResult::err(message);
        }
    };

    if out.exit_code != 0 {
        return HelperInvocationResult::err(format!(
            "Helper exited with code {}: {}",
            out.exit_code,
            combine_output(&out.stdout, &out.stderr)
        ));
    }

    // Exit code 0 without a decodable payload is a protocol violation by
    // the helper, distinct from the helper reporting a structured failure.
    let raw = match protocol::extract_json(&out.stdout) {
        Some(raw) => raw,
        None => {
            return HelperInvocationResult::err(format!(
                "Helper produced no JSON payload despite exit code 0: {}",
                combine_output(&out.stdout, &out.stderr)
            ));
        }
    };

    let payload: serde_json::Value = match serde_json::from_str(raw) {
        Ok(payload) => payload,
        Err(e) => {
            return HelperInvocationResult::err(format!(
                "Helper JSON payload malformed ({}): {}",
                e,
                combine_output(&out.stdout, &out.stderr)
            ));
        }
    };

    if payload.get("success").and_then(|v| v.as_bool()) == Some(false) {
        let error = payload
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("Helper reported failure")
            .to_string();
        return HelperInvocationResult {
            success: false,
            payload: Some(payload),
            error: Some(error),
        };
    }

    HelperInvocationResult::ok(payload)
}

/// Build the (program, argv) pair for this OS — the single place where
/// platform-conditional shell quoting lives. On the Windows family the
/// invocation is routed through `cmd /C` with explicit quoting to avoid
/// shell argument-splitting bugs; elsewhere the argv is passed verbatim.
pub fn build_command(program: &Path, args: &[String]) -> (PathBuf, Vec<String>) {
    if cfg!(windows) {
        let line = windows_command_line(&program.to_string_lossy(), args);
        (
            PathBuf::from("cmd"),
            vec!["/C".to_string(), line],
        )
    } else {
        (program.to_path_buf(), args.to_vec())
    }
}

/// Quote program + args into one cmd.exe-safe command line.
fn windows_command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program.to_string())
        .chain(args.iter().cloned())
        .map(|a| quote_windows_arg(&a))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_windows_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '"']) {
        return arg.to_string();
    }
    // Double inner quotes, wrap the whole argument.
    format!("\"{}\"", arg.replace('"', "\"\""))
}

fn combine_output(stdout: &str, stderr: &str) -> String {
    let stderr = stderr.trim();
    let stdout = stdout.trim();
    match (stderr.is_empty(), stdout.is_empty()) {
        (false, false) => format!("{} | {}", stderr, stdout),
        (false, true) => stderr.to_string(),
        (true, false) => stdout.to_string(),
        (true, true) => String::new(),
    }
}
