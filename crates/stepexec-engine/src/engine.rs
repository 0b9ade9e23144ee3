//! Step execution orchestration.
//!
//! One request/response cycle per call, no shared mutable state: resolve the
//! interpreter, synthesize the wrapper, write it to a uniquely named temp
//! file, run it bounded, decode the output protocol, clean up. Failures are
//! always returned as `ExecutionResult` values, never propagated past this
//! boundary.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use stepexec_core::config::ResourceLimits;
use stepexec_core::step::{ExecutionRequest, ExecutionResult, ScriptSource, Step};

use crate::exec::{self, ExecOptions};
use crate::interp;
use crate::protocol;
use crate::wrapper;

/// Temp wrapper file, deleted best-effort on every exit path.
struct WrapperFile {
    path: PathBuf,
}

impl Drop for WrapperFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Run a step with limits from the environment.
pub fn run_step(request: &ExecutionRequest) -> ExecutionResult {
    run_step_with_limits(request, &ResourceLimits::from_env())
}

/// Run a step with explicit resource limits.
pub fn run_step_with_limits(request: &ExecutionRequest, limits: &ResourceLimits) -> ExecutionResult {
    let step = &request.step;
    let input_path = request.input_path.as_deref();

    // Disabled steps succeed without spawning anything; the input passes
    // straight through.
    if !step.enabled {
        let outputs: Vec<String> = input_path.iter().map(|p| p.to_string()).collect();
        return ExecutionResult::success(step, outputs, input_path, String::new(), String::new());
    }

    // Configuration errors are detected before any process is spawned.
    if step.input.enabled && input_path.is_none() {
        return ExecutionResult::failure(
            step,
            "Input path is required when input binding is enabled",
            String::new(),
            String::new(),
        );
    }

    let body = match resolve_script_body(step) {
        Ok(body) => body,
        Err(message) => {
            return ExecutionResult::failure(step, message, String::new(), String::new());
        }
    };

    let interpreter = interp::resolve(step);
    tracing::info!(
        step_id = %step.id,
        interpreter = %interpreter.path.display(),
        venv_used = interpreter.venv_used,
        "Executing step"
    );

    let source = wrapper::synthesize(step, input_path, &body);
    let wrapper_file = match write_wrapper(step, &source) {
        Ok(file) => file,
        Err(e) => {
            return ExecutionResult::failure(
                step,
                format!("Failed to write wrapper program: {}", e),
                String::new(),
                String::new(),
            );
        }
    };

    // Relative paths inside user scripts resolve from the script's own
    // directory; inline scripts fall back to the wrapper's directory.
    let cwd = step
        .script_path
        .as_deref()
        .map(Path::new)
        .and_then(Path::parent)
        .filter(|p| p.is_dir())
        .map(Path::to_path_buf)
        .or_else(|| wrapper_file.path.parent().map(Path::to_path_buf));

    let mut opts = ExecOptions::from_limits(limits);
    opts.cwd = cwd;

    let start = Instant::now();
    let args = vec![wrapper_file.path.display().to_string()];
    let output = match exec::run(&interpreter.path, &args, &opts) {
        Ok(output) => output,
        Err(e) => {
            let (stdout, stderr) = e.partial_output();
            let expected = expected_variables(step);
            let decoded = protocol::decode(stdout, &expected, None);
            return ExecutionResult::failure(
                step,
                e.to_string(),
                decoded.clean_stdout,
                stderr.to_string(),
            );
        }
    };

    let expected = expected_variables(step);
    let fallback = if step.input.enabled { input_path } else { None };
    let decoded = protocol::decode(&output.stdout, &expected, fallback);

    if output.exit_code != 0 {
        return ExecutionResult::failure(
            step,
            format!("Script exited with code {}", output.exit_code),
            decoded.clean_stdout,
            output.stderr,
        );
    }

    // Output capture disabled: the input path is the sole output.
    let output_paths = if step.output.enabled {
        decoded.values
    } else {
        input_path.iter().map(|p| p.to_string()).collect()
    };

    tracing::info!(
        step_id = %step.id,
        elapsed_ms = start.elapsed().as_millis() as u64,
        outputs = output_paths.len(),
        "Step completed"
    );

    ExecutionResult::success(
        step,
        output_paths,
        input_path,
        decoded.clean_stdout,
        output.stderr,
    )
}

fn expected_variables(step: &Step) -> Vec<String> {
    if step.output.enabled {
        step.output.variable_names()
    } else {
        Vec::new()
    }
}

fn resolve_script_body(step: &Step) -> Result<String, String> {
    match step.script_source {
        ScriptSource::Inline => step
            .inline_script
            .clone()
            .ok_or_else(|| "Missing inline script text".to_string()),
        ScriptSource::Local => {
            let path = step
                .script_path
                .as_deref()
                .ok_or_else(|| "Missing script path".to_string())?;
            if !Path::new(path).is_file() {
                return Err(format!("Script file not found: {}", path));
            }
            fs::read_to_string(path).map_err(|e| format!("Failed to read script {}: {}", path, e))
        }
    }
}

/// Write the wrapper program to a temp file named from the step id and a
/// creation timestamp, so concurrent requests never collide.
fn write_wrapper(step: &Step, source: &str) -> std::io::Result<WrapperFile> {
    let name = format!(
        "stepexec_{}_{}.py",
        sanitize_id(&step.id),
        chrono::Utc::now().timestamp_millis()
    );
    let path = std::env::temp_dir().join(name);
    fs::write(&path, source)?;
    Ok(WrapperFile { path })
}

fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_json(json: &str) -> ExecutionRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_disabled_step_mirrors_input_without_spawning() {
        // Interpreter path is bogus on purpose: a spawn attempt would fail.
        let req = request_json(
            r#"{"step": {"id": "s1", "enabled": false, "venvMode": "custom",
                         "venvPath": "/definitely/not/here"},
                "inputPath": "/tmp/in.csv"}"#,
        );
        let res = run_step(&req);
        assert!(res.success);
        assert_eq!(res.output_paths, vec!["/tmp/in.csv"]);
        assert_eq!(res.output_path.as_deref(), Some("/tmp/in.csv"));
    }

    #[test]
    fn test_missing_input_is_a_configuration_error() {
        let req = request_json(
            r#"{"step": {"id": "s1", "scriptSource": "inline", "inlineScript": "pass"}}"#,
        );
        let res = run_step(&req);
        assert!(!res.success);
        assert!(res.error.unwrap().contains("Input path"));
    }

    #[test]
    fn test_missing_local_script_reports_path() {
        let req = request_json(
            r#"{"step": {"id": "s1", "scriptSource": "local",
                         "scriptPath": "/no/such/script.py"},
                "inputPath": "/tmp/in.csv"}"#,
        );
        let res = run_step(&req);
        assert!(!res.success);
        assert_eq!(
            res.error.as_deref(),
            Some("Script file not found: /no/such/script.py")
        );
    }

    #[test]
    fn test_missing_inline_text_is_a_configuration_error() {
        let req = request_json(
            r#"{"step": {"id": "s1", "scriptSource": "inline"}, "inputPath": "/tmp/in.csv"}"#,
        );
        let res = run_step(&req);
        assert!(!res.success);
        assert!(res.error.unwrap().contains("inline script"));
    }

    #[test]
    fn test_sanitize_id() {
        assert_eq!(sanitize_id("step 1/äöü"), "step_1____");
        assert_eq!(sanitize_id("s1-ok_2"), "s1-ok_2");
    }
}
