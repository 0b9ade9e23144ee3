//! Interpreter resolution: pick the Python a step runs with.
//!
//! Resolution is infallible by policy: a misconfigured or missing venv must
//! not block execution, only change which interpreter is used. Every branch
//! degrades to the ambient interpreter. Nothing here is cached — venvs may
//! be added or removed between calls.

use std::path::{Path, PathBuf};

use stepexec_core::step::{ScriptSource, Step, VenvMode};

/// Conventional venv directory names probed by `auto` mode, in priority
/// order. List order wins over discovery order.
pub const VENV_DIR_NAMES: &[&str] = &[".venv", "venv", ".env", "env", "virtualenv"];

/// Resolved interpreter for a step: executable path and venv provenance.
#[derive(Debug, Clone)]
pub struct ResolvedInterpreter {
    /// Path to the interpreter executable.
    pub path: PathBuf,
    /// Whether a virtual environment was used.
    pub venv_used: bool,
    /// Root of the venv when `venv_used` is true.
    pub venv_root: Option<PathBuf>,
}

impl ResolvedInterpreter {
    fn ambient() -> Self {
        Self {
            path: ambient_interpreter(),
            venv_used: false,
            venv_root: None,
        }
    }

    fn from_venv(root: &Path) -> Self {
        Self {
            path: venv_interpreter(root),
            venv_used: true,
            venv_root: Some(root.to_path_buf()),
        }
    }
}

/// The interpreter used when no venv applies: `python3` on unix,
/// `python` on Windows (resolved through PATH at spawn time).
pub fn ambient_interpreter() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("python")
    } else {
        PathBuf::from("python3")
    }
}

/// Resolve the interpreter for a step according to its venv mode.
pub fn resolve(step: &Step) -> ResolvedInterpreter {
    match step.venv_mode {
        VenvMode::None => ResolvedInterpreter::ambient(),
        VenvMode::Custom => {
            if let Some(ref raw) = step.venv_path {
                let root = expand_home(raw);
                if is_valid_venv(&root) {
                    return ResolvedInterpreter::from_venv(&root);
                }
                tracing::debug!(
                    step_id = %step.id,
                    venv_path = %root.display(),
                    "Configured venv invalid, falling back to ambient interpreter"
                );
            }
            ResolvedInterpreter::ambient()
        }
        VenvMode::Auto => resolve_auto(step),
    }
}

fn resolve_auto(step: &Step) -> ResolvedInterpreter {
    // Only local scripts have a directory to search next to.
    if step.script_source == ScriptSource::Local {
        if let Some(parent) = step
            .script_path
            .as_deref()
            .map(Path::new)
            .and_then(Path::parent)
        {
            for name in VENV_DIR_NAMES {
                let candidate = parent.join(name);
                if is_valid_venv(&candidate) {
                    return ResolvedInterpreter::from_venv(&candidate);
                }
            }
        }
    }

    if let Some(ref raw) = step.resolved_venv_path {
        let root = expand_home(raw);
        if is_valid_venv(&root) {
            return ResolvedInterpreter::from_venv(&root);
        }
    }

    ResolvedInterpreter::ambient()
}

/// Expand a leading `~/` using the user's home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}

/// A directory is a usable venv when it exists and carries either the
/// `pyvenv.cfg` metadata file or an activation script.
pub fn is_valid_venv(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    if dir.join("pyvenv.cfg").is_file() {
        return true;
    }
    activation_script(dir).is_file()
}

fn activation_script(dir: &Path) -> PathBuf {
    if cfg!(windows) {
        dir.join("Scripts").join("activate.bat")
    } else {
        dir.join("bin").join("activate")
    }
}

/// Interpreter binary inside a validated venv. On Windows the location is
/// fixed; elsewhere prefer `python3` and fall back to `python`.
fn venv_interpreter(root: &Path) -> PathBuf {
    if cfg!(windows) {
        return root.join("Scripts").join("python.exe");
    }
    let python3 = root.join("bin").join("python3");
    if python3.is_file() {
        python3
    } else {
        root.join("bin").join("python")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn step_json(json: &str) -> Step {
        serde_json::from_str(json).unwrap()
    }

    fn make_venv(root: &Path) {
        std::fs::create_dir_all(root).unwrap();
        std::fs::write(root.join("pyvenv.cfg"), "home = /usr/bin\n").unwrap();
    }

    #[test]
    fn test_mode_none_ignores_filesystem() {
        let step = step_json(r#"{"id": "s1", "venvMode": "none"}"#);
        let resolved = resolve(&step);
        assert!(!resolved.venv_used);
        assert_eq!(resolved.path, ambient_interpreter());
    }

    #[test]
    fn test_custom_missing_path_degrades_to_ambient() {
        let step = step_json(
            r#"{"id": "s1", "venvMode": "custom", "venvPath": "/nonexistent/venv-xyz"}"#,
        );
        let resolved = resolve(&step);
        assert!(!resolved.venv_used);
        assert_eq!(resolved.path, ambient_interpreter());
    }

    #[test]
    fn test_custom_valid_venv_is_used() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("env");
        make_venv(&root);
        let step = step_json(&format!(
            r#"{{"id": "s1", "venvMode": "custom", "venvPath": "{}"}}"#,
            root.display()
        ));
        let resolved = resolve(&step);
        assert!(resolved.venv_used);
        assert_eq!(resolved.venv_root.as_deref(), Some(root.as_path()));
    }

    #[test]
    fn test_auto_prefers_list_order_over_discovery() {
        let dir = TempDir::new().unwrap();
        // Both "venv" and ".venv" validate; ".venv" is earlier in the list.
        make_venv(&dir.path().join("venv"));
        make_venv(&dir.path().join(".venv"));
        let script = dir.path().join("train.py");
        std::fs::write(&script, "pass\n").unwrap();

        let step = step_json(&format!(
            r#"{{"id": "s1", "scriptPath": "{}"}}"#,
            script.display()
        ));
        let resolved = resolve(&step);
        assert!(resolved.venv_used);
        assert_eq!(
            resolved.venv_root.as_deref(),
            Some(dir.path().join(".venv").as_path())
        );
    }

    #[test]
    fn test_auto_falls_back_to_resolved_hint_then_ambient() {
        let dir = TempDir::new().unwrap();
        let hint = dir.path().join("older-env");
        make_venv(&hint);
        let step = step_json(&format!(
            r#"{{"id": "s1", "scriptSource": "inline", "inlineScript": "pass",
                "resolvedVenvPath": "{}"}}"#,
            hint.display()
        ));
        let resolved = resolve(&step);
        assert!(resolved.venv_used);
        assert_eq!(resolved.venv_root.as_deref(), Some(hint.as_path()));

        let step = step_json(r#"{"id": "s1", "scriptSource": "inline", "inlineScript": "pass"}"#);
        assert!(!resolve(&step).venv_used);
    }

    #[test]
    fn test_validation_requires_marker_or_activation() {
        let dir = TempDir::new().unwrap();
        let bare = dir.path().join("bare");
        std::fs::create_dir_all(&bare).unwrap();
        assert!(!is_valid_venv(&bare));

        // Activation script alone is enough.
        let act = dir.path().join("act");
        if cfg!(windows) {
            std::fs::create_dir_all(act.join("Scripts")).unwrap();
            std::fs::write(act.join("Scripts").join("activate.bat"), "").unwrap();
        } else {
            std::fs::create_dir_all(act.join("bin")).unwrap();
            std::fs::write(act.join("bin").join("activate"), "").unwrap();
        }
        assert!(is_valid_venv(&act));
    }

    #[cfg(unix)]
    #[test]
    fn test_venv_interpreter_prefers_python3() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("env");
        make_venv(&root);
        std::fs::create_dir_all(root.join("bin")).unwrap();
        std::fs::write(root.join("bin").join("python"), "").unwrap();
        assert_eq!(venv_interpreter(&root), root.join("bin").join("python"));
        std::fs::write(root.join("bin").join("python3"), "").unwrap();
        assert_eq!(venv_interpreter(&root), root.join("bin").join("python3"));
    }
}
