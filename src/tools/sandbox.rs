//! Model-authored Python, run out of process.
//!
//! Every call gets a fresh scratch directory as its working directory. Declared
//! inputs are copied in before the run and declared outputs are copied back to
//! the workspace afterwards; nothing else the code writes survives. The child
//! runs `python -I` under `ulimit` limits with a cleared environment, closed
//! stdin and a wall-clock timeout.
//!
//! Inside the interpreter an audit hook enforces the boundary: process and
//! socket events are refused, writes must resolve inside the scratch directory,
//! and reads are limited to the scratch directory and the interpreter's
//! library paths.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{string_arg, string_params, Tool, ToolError, Workspace};
use crate::config::SandboxConfig;

const RUNNER_FILE: &str = "__sandbox_runner__.py";
const CODE_FILE: &str = "__agent_code__.py";
const FILE_SIZE_LIMIT_BLOCKS: u64 = 200 * 1024;
const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Modules the submitted code may not import
const BLOCKED_MODULES: &[&str] = &[
    "subprocess",
    "_posixsubprocess",
    "posix",
    "nt",
    "ctypes",
    "_ctypes",
    "multiprocessing",
    "_multiprocessing",
    "socket",
    "_socket",
    "ssl",
    "select",
    "pty",
    "urllib",
    "http",
    "requests",
    "importlib",
    "_imp",
];

const RUNNER: &str = r#"import builtins
import os
import sys

_BLOCKED = frozenset(sys.argv[1].split(","))
_SCRATCH = os.path.realpath(os.getcwd())

with open(sys.argv[2], encoding="utf-8") as _f:
    _source = _f.read()

g = {"__name__": "__main__", "__builtins__": builtins}
for _alias, _module in (("pd", "pandas"), ("np", "numpy")):
    try:
        g[_alias] = __import__(_module)
    except ImportError:
        pass


def _denied(*_args, **_kwargs):
    raise PermissionError("process and network access are disabled in this sandbox")


try:
    import _posixsubprocess
    _posixsubprocess.fork_exec = _denied
except ImportError:
    pass

_LIBRARY_ROOTS = tuple(
    os.path.realpath(p)
    for p in [sys.prefix, sys.base_prefix, sys.exec_prefix, sys.base_exec_prefix,
              "/usr/lib", "/usr/lib64", "/usr/local/lib", "/usr/share", "/lib", "/lib64"]
    + [p for p in sys.path if p]
)
_DEVICES = frozenset(("/dev/null", "/dev/urandom"))
_WRITE_FLAGS = os.O_WRONLY | os.O_RDWR | os.O_APPEND | os.O_CREAT | os.O_TRUNC
_PROCESS_EVENTS = frozenset((
    "os.system", "os.exec", "os.spawn", "os.posix_spawn", "os.fork", "os.forkpty",
    "os.kill", "os.killpg", "subprocess.Popen", "pty.spawn", "ctypes.dlopen",
    "sys.addaudithook",
))
_WRITE_EVENTS = frozenset((
    "os.remove", "os.rmdir", "os.mkdir", "os.chmod", "os.chown", "os.chflags",
    "os.truncate", "os.utime", "os.chdir",
))


def _within(path, root):
    return path == root or path.startswith(root.rstrip(os.sep) + os.sep)


def _check_path(path, write):
    if isinstance(path, int):
        return
    resolved = os.path.realpath(os.fsdecode(os.fspath("." if path is None else path)))
    if _within(resolved, _SCRATCH) or resolved in _DEVICES:
        return
    if not write and any(_within(resolved, root) for root in _LIBRARY_ROOTS):
        return
    raise PermissionError("access to '%s' is outside the sandbox directory" % resolved)


def _audit(event, args):
    if event in _PROCESS_EVENTS or event.startswith("socket."):
        raise PermissionError("process and network access are disabled in this sandbox")
    if event == "open":
        path, mode, flags = args
        write = (isinstance(mode, str) and any(c in mode for c in "wax+")) or (
            isinstance(flags, int) and flags & _WRITE_FLAGS
        )
        _check_path(path, bool(write))
    elif event in _WRITE_EVENTS:
        _check_path(args[0], True)
    elif event in ("os.rename", "os.link", "os.symlink"):
        _check_path(args[0], True)
        _check_path(args[1], True)
    elif event in ("os.listdir", "os.scandir"):
        _check_path(args[0], False)


_real_import = builtins.__import__


def _guarded_import(name, globals=None, locals=None, fromlist=(), level=0):
    if globals is g and name.split(".")[0] in _BLOCKED:
        raise ImportError("import of '%s' is blocked in this sandbox" % name)
    return _real_import(name, globals, locals, fromlist, level)


builtins.__import__ = _guarded_import
sys.addaudithook(_audit)

exec(compile(_source, "<agent_code>", "exec"), g)
"#;

#[derive(Debug)]
pub struct SandboxRun {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    /// Declared outputs copied back to the workspace
    pub harvested: Vec<String>,
}

impl SandboxRun {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Clone)]
pub struct Sandbox {
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Reject code that imports a blocked module before anything is spawned
    pub fn screen(code: &str) -> Result<(), ToolError> {
        if code.contains("__import__") {
            return Err(ToolError::Sandbox("dynamic imports via __import__ are not allowed".to_string()));
        }
        for statement in code.lines().flat_map(|l| l.split(';')) {
            let statement = statement.trim();
            let modules: Vec<&str> = if let Some(rest) = statement.strip_prefix("import ") {
                rest.split(',')
                    .filter_map(|m| m.split_whitespace().next())
                    .collect()
            } else if let Some(rest) = statement.strip_prefix("from ") {
                rest.split_whitespace().next().into_iter().collect()
            } else {
                continue;
            };

            for module in modules {
                let root = module.split('.').next().unwrap_or(module);
                if BLOCKED_MODULES.contains(&root) {
                    return Err(ToolError::Sandbox(format!("import of '{}' is not allowed", module)));
                }
            }
        }
        Ok(())
    }

    /// Run `code` in a fresh scratch directory.
    ///
    /// `inputs` are workspace files copied in under the same name; `outputs`
    /// are copied back to the workspace when the run succeeds.
    pub async fn run(
        &self,
        code: &str,
        workspace: &Workspace,
        inputs: &[String],
        outputs: &[String],
    ) -> Result<SandboxRun, ToolError> {
        Self::screen(code)?;

        let scratch = tempfile::Builder::new()
            .prefix("crew-sandbox-")
            .tempdir()
            .map_err(|e| ToolError::Execution(format!("cannot create scratch directory: {}", e)))?;
        let dir = scratch.path();

        for name in inputs {
            let source = workspace.path(name);
            if source.exists() {
                tokio::fs::copy(&source, dir.join(name))
                    .await
                    .map_err(|e| ToolError::Execution(format!("cannot stage {}: {}", name, e)))?;
            }
        }
        write_file(&dir.join(RUNNER_FILE), RUNNER).await?;
        write_file(&dir.join(CODE_FILE), code).await?;

        let limits = format!(
            "ulimit -t {cpu} 2>/dev/null; ulimit -v {mem} 2>/dev/null; ulimit -f {fsize} 2>/dev/null; ulimit -c 0 2>/dev/null; \
             exec \"$0\" -I -B {runner} {blocked} {code}",
            cpu = self.config.timeout_secs + 1,
            mem = self.config.memory_limit_mb * 1024,
            fsize = FILE_SIZE_LIMIT_BLOCKS,
            runner = RUNNER_FILE,
            blocked = BLOCKED_MODULES.join(","),
            code = CODE_FILE,
        );

        let child = Command::new("sh")
            .arg("-c")
            .arg(&limits)
            .arg(&self.config.python_bin)
            .current_dir(dir)
            .env_clear()
            .env("PATH", std::env::var("PATH").unwrap_or_else(|_| DEFAULT_PATH.to_string()))
            .env("HOME", dir)
            .env("TMPDIR", dir)
            .env("MPLBACKEND", "Agg")
            .env("OMP_NUM_THREADS", "1")
            .env("OPENBLAS_NUM_THREADS", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::Execution(format!("failed to start {}: {}", self.config.python_bin, e)))?;

        debug!(scratch = %dir.display(), "Started sandboxed interpreter");
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| ToolError::Execution(format!("failed to collect output: {}", e)))?,
            Err(_) => {
                warn!(timeout_secs = self.config.timeout_secs, "Sandboxed code timed out");
                return Err(ToolError::Execution(format!(
                    "timed out after {} seconds",
                    self.config.timeout_secs
                )));
            }
        };

        let max = self.config.max_output_bytes;
        let mut run = SandboxRun {
            stdout: truncate_output(String::from_utf8_lossy(&output.stdout).into_owned(), max),
            stderr: truncate_output(String::from_utf8_lossy(&output.stderr).into_owned(), max),
            exit_code: output.status.code(),
            harvested: Vec::new(),
        };

        if run.success() {
            for name in outputs {
                let produced = dir.join(name);
                if produced.is_file() {
                    let target = workspace.resolve(name)?;
                    tokio::fs::copy(&produced, &target)
                        .await
                        .map_err(|e| ToolError::Execution(format!("cannot save {}: {}", name, e)))?;
                    run.harvested.push(name.clone());
                }
            }
        }

        info!(exit_code = ?run.exit_code, harvested = ?run.harvested, "Sandboxed code finished");
        Ok(run)
    }
}

async fn write_file(path: &Path, contents: &str) -> Result<(), ToolError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| ToolError::Execution(format!("cannot write {}: {}", path.display(), e)))
}

fn truncate_output(mut text: String, max: usize) -> String {
    if text.len() <= max {
        return text;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str("\n... (output truncated)");
    text
}

/// `execute_python_code`, with the files it may read and the files it may produce
pub struct ExecutePythonCodeTool {
    sandbox: Sandbox,
    workspace: Workspace,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl ExecutePythonCodeTool {
    pub fn new(config: SandboxConfig, workspace: Workspace) -> Self {
        Self {
            sandbox: Sandbox::new(config),
            workspace,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn stage_input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(name.into());
        self
    }

    pub fn harvest_output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }
}

#[async_trait]
impl Tool for ExecutePythonCodeTool {
    fn name(&self) -> &str {
        "execute_python_code"
    }

    fn description(&self) -> &str {
        "Execute Python code and return everything it prints. pandas is available as pd and \
         numpy as np when installed. Read and write files by bare name in the current directory; \
         paths outside it are not accessible. Network access and subprocesses are disabled."
    }

    fn parameters(&self) -> Value {
        string_params(&[("code", "Python source to execute; use print() to return results")])
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        let code = string_arg(&args, "code")?;
        let run = self
            .sandbox
            .run(&code, &self.workspace, &self.inputs, &self.outputs)
            .await?;

        if !run.success() {
            let status = run
                .exit_code
                .map_or_else(|| "killed by signal".to_string(), |c| format!("exit status {}", c));
            let mut message = format!("{}\n{}", status, run.stderr.trim_end());
            if !run.stdout.trim().is_empty() {
                message.push_str(&format!("\nOutput before failure:\n{}", run.stdout.trim_end()));
            }
            return Err(ToolError::Execution(message));
        }

        let mut out = if run.stdout.is_empty() {
            "Code executed successfully with no output.".to_string()
        } else {
            run.stdout
        };
        if !run.harvested.is_empty() {
            out.push_str(&format!("\nFiles saved to workspace: {}", run.harvested.join(", ")));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn tool(dir: &Path, timeout_secs: u64) -> ExecutePythonCodeTool {
        let config = SandboxConfig {
            timeout_secs,
            ..SandboxConfig::default()
        };
        ExecutePythonCodeTool::new(config, Workspace::new(dir))
    }

    #[test]
    fn test_screen_rejects_blocked_imports() {
        assert!(Sandbox::screen("import subprocess").is_err());
        assert!(Sandbox::screen("import os, socket as s").is_err());
        assert!(Sandbox::screen("from urllib.request import urlopen").is_err());
        assert!(Sandbox::screen("x = 1; import ctypes").is_err());
        assert!(Sandbox::screen("m = __import__('os')").is_err());
        assert!(Sandbox::screen("import posix").is_err());
        assert!(Sandbox::screen("from _socket import socket").is_err());
        assert!(Sandbox::screen("import _posixsubprocess").is_err());
        assert!(Sandbox::screen("import pandas as pd\nfrom collections import Counter").is_ok());
    }

    #[test]
    fn test_truncate_output_respects_char_boundaries() {
        let text = truncate_output("héllo".to_string(), 2);
        assert!(text.starts_with('h'));
        assert!(text.ends_with("(output truncated)"));
    }

    #[tokio::test]
    async fn test_blocked_import_never_spawns() {
        let dir = tempfile::tempdir().unwrap();
        let err = tool(dir.path(), 5)
            .invoke(json!({"code": "import subprocess\nsubprocess.run(['ls'])"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("subprocess"));
    }

    #[tokio::test]
    async fn test_prints_are_returned() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let out = tool(dir.path(), 20)
            .invoke(json!({"code": "print('churn rate is 0.25')"}))
            .await
            .unwrap();
        assert!(out.contains("churn rate is 0.25"));
    }

    #[tokio::test]
    async fn test_syntax_error_is_reported() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let err = tool(dir.path(), 20)
            .invoke(json!({"code": "def broken(:\n    pass"}))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Error executing code"));
        assert!(message.contains("SyntaxError"));
    }

    #[tokio::test]
    async fn test_process_spawning_is_denied() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let err = tool(dir.path(), 20)
            .invoke(json!({"code": "import os\nos.system('echo hi')"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("PermissionError"));
    }

    #[tokio::test]
    async fn test_spawning_through_loaded_modules_is_denied() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let code = "import sys\nrc = sys.modules['posix'].system('echo SPAWNED_$((6*7))')\nprint('rc', rc)";
        let err = tool(dir.path(), 20).invoke(json!({ "code": code })).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("PermissionError"));
        assert!(!message.contains("SPAWNED_42"));
    }

    #[tokio::test]
    async fn test_raw_sockets_are_denied() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        // asyncio pulls in _socket on the interpreter's behalf
        let code = "import asyncio, sys\ns = sys.modules['_socket'].socket()\nprint('raw socket created')";
        let err = tool(dir.path(), 20).invoke(json!({ "code": code })).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("PermissionError"));
        assert!(!message.contains("raw socket created"));
    }

    #[tokio::test]
    async fn test_absolute_paths_outside_scratch_are_denied() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let ticket = dir.path().join("jira_ticket.txt");
        std::fs::write(&ticket, "PROJ-1").unwrap();

        let code = format!("open({:?}, 'w').write('overwritten')", ticket.display().to_string());
        let err = tool(dir.path(), 20).invoke(json!({ "code": code })).await.unwrap_err();
        assert!(err.to_string().contains("PermissionError"));
        assert_eq!(std::fs::read_to_string(&ticket).unwrap(), "PROJ-1");

        let err = tool(dir.path(), 20)
            .invoke(json!({"code": "print(open('/etc/passwd').read())"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("outside the sandbox directory"));
    }

    #[tokio::test]
    async fn test_only_declared_outputs_are_harvested() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("uploaded_data.csv"), "a,b\n1,2\n").unwrap();
        let tool = tool(dir.path(), 20)
            .stage_input("uploaded_data.csv")
            .harvest_output("cleaned_data.csv");

        let code = "rows = open('uploaded_data.csv').read()\n\
                    open('cleaned_data.csv', 'w').write(rows)\n\
                    open('scratch.txt', 'w').write('tmp')\n\
                    print('done')";
        let out = tool.invoke(json!({ "code": code })).await.unwrap();

        assert!(out.contains("Files saved to workspace: cleaned_data.csv"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("cleaned_data.csv")).unwrap(),
            "a,b\n1,2\n"
        );
        assert!(!dir.path().join("scratch.txt").exists());
    }

    #[tokio::test]
    async fn test_timeout_kills_the_run() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let err = tool(dir.path(), 1)
            .invoke(json!({"code": "while True:\n    pass"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
