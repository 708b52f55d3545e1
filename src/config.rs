use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LLMConfig,
    pub pipeline: PipelineConfig,
    pub sandbox: SandboxConfig,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub google_api_key: String,
    pub api_base: String,
    pub capable_model: String,
    pub capable_temperature: f32,
    pub fast_model: String,
    pub fast_temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory holding every artifact of a run
    pub workspace_dir: PathBuf,
    pub max_iterations: usize,
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub python_bin: String,
    pub timeout_secs: u64,
    pub memory_limit_mb: u64,
    pub max_output_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            python_bin: "python3".to_string(),
            timeout_secs: 30,
            memory_limit_mb: 1024,
            max_output_bytes: 64 * 1024,
        }
    }
}

impl LLMConfig {
    /// The credential to use, preferring a non-empty per-request override
    pub fn resolve_api_key(&self, override_key: Option<&str>) -> Option<String> {
        override_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .or_else(|| {
                let key = self.google_api_key.trim();
                (!key.is_empty()).then(|| key.to_string())
            })
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig {
                port: parse_var("PORT", "8501")?,
                host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            },
            llm: LLMConfig {
                google_api_key: env::var("GOOGLE_API_KEY").unwrap_or_default(),
                api_base: env::var("GEMINI_API_BASE")
                    .unwrap_or_else(|_| DEFAULT_GEMINI_API_BASE.to_string()),
                capable_model: env::var("CAPABLE_MODEL")
                    .unwrap_or_else(|_| "gemini-2.5-pro".to_string()),
                capable_temperature: parse_var("CAPABLE_TEMPERATURE", "0.7")?,
                fast_model: env::var("FAST_MODEL")
                    .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
                fast_temperature: parse_var("FAST_TEMPERATURE", "0.5")?,
                timeout_secs: parse_var("LLM_TIMEOUT_SECS", "300")?,
                max_retries: parse_var("LLM_MAX_RETRIES", "3")?,
            },
            pipeline: PipelineConfig {
                workspace_dir: env::var("WORKSPACE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(".")),
                max_iterations: parse_var("MAX_AGENT_ITERATIONS", "15")?,
            },
            sandbox: SandboxConfig {
                python_bin: env::var("PYTHON_BIN").unwrap_or_else(|_| "python3".to_string()),
                timeout_secs: parse_var("SANDBOX_TIMEOUT_SECS", "30")?,
                memory_limit_mb: parse_var("SANDBOX_MEMORY_MB", "1024")?,
                max_output_bytes: parse_var("SANDBOX_MAX_OUTPUT_BYTES", "65536")?,
            },
            log_dir: env::var("LOG_DIR").ok().map(PathBuf::from),
        })
    }

    /// Defaults without reading the environment, rooted at `workspace_dir`
    pub fn for_workspace(workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            server: ServerConfig {
                port: 8501,
                host: "127.0.0.1".to_string(),
            },
            llm: LLMConfig {
                google_api_key: String::new(),
                api_base: DEFAULT_GEMINI_API_BASE.to_string(),
                capable_model: "gemini-2.5-pro".to_string(),
                capable_temperature: 0.7,
                fast_model: "gemini-2.5-flash".to_string(),
                fast_temperature: 0.5,
                timeout_secs: 300,
                max_retries: 3,
            },
            pipeline: PipelineConfig {
                workspace_dir: workspace_dir.into(),
                max_iterations: 15,
            },
            sandbox: SandboxConfig::default(),
            log_dir: None,
        }
    }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid value for {}", name))
}
