use std::{collections::HashMap, time::Duration};

use anyhow::Result;

use crate::router::DEFAULT_STICKINESS;

/// Which inference service the agents talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceKind {
    Gemini,
    Ollama,
    /// No model; every agent answers from its fallback templates.
    Disabled,
}

impl InferenceKind {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gemini" | "" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            "none" | "off" | "disabled" => Ok(Self::Disabled),
            other => anyhow::bail!("INFERENCE_BACKEND must be gemini, ollama or none (got {other:?})"),
        }
    }
}

/// Full service configuration, from the process environment with a `.env`
/// file in the working directory as fallback.
#[derive(Debug, Clone)]
pub struct Config {
    // Web
    pub web_bind: String,
    pub web_port: u16,

    /// Empty selects the in-memory store.
    pub database_url: String,

    // Inference
    pub inference: InferenceKind,
    pub google_api_key: String,
    pub gemini_model: String,
    pub gemini_general_model: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub inference_timeout_s: u64,

    // Routing and context
    pub router_stickiness: f64,
    pub context_history_limit: usize,
    pub join_history_limit: usize,

    // Session sweep
    pub sweep_interval_s: u64,
    pub idle_timeout_s: u64,
}

fn parse_dotenv(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            let v = v.trim().trim_matches('"');
            map.insert(k.trim().to_string(), v.to_string());
        }
    }
    map
}

/// Lookup order: process environment (when enabled), then the file map.
struct Vars {
    process_env: bool,
    file: HashMap<String, String>,
}

impl Vars {
    fn get(&self, key: &str) -> Option<String> {
        let from_env = if self.process_env { std::env::var(key).ok() } else { None };
        from_env.or_else(|| self.file.get(key).cloned())
    }

    fn str(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let file = std::fs::read_to_string(".env")
            .map(|c| parse_dotenv(&c))
            .unwrap_or_default();
        Self::build(&Vars { process_env: true, file })
    }

    /// Builds from `KEY=VALUE` text only, ignoring the process environment.
    pub fn from_dotenv_str(contents: &str) -> Result<Self> {
        Self::build(&Vars {
            process_env: false,
            file: parse_dotenv(contents),
        })
    }

    fn build(vars: &Vars) -> Result<Self> {
        let inference = InferenceKind::parse(&vars.str("INFERENCE_BACKEND", "gemini"))?;
        let router_stickiness = vars.parsed("ROUTER_STICKINESS", DEFAULT_STICKINESS);
        if !router_stickiness.is_finite() || router_stickiness < 0.0 {
            anyhow::bail!("ROUTER_STICKINESS must be a non-negative number");
        }

        Ok(Config {
            web_bind: vars.str("WEB_BIND", "0.0.0.0"),
            web_port: vars.parsed("PORT", 8080),
            database_url: vars.str("DATABASE_URL", ""),
            inference,
            google_api_key: vars.str("GOOGLE_AI_API_KEY", ""),
            gemini_model: vars.str("GEMINI_MODEL", "gemini-1.5-flash"),
            gemini_general_model: vars.str("GEMINI_GENERAL_MODEL", "gemini-2.5-pro"),
            ollama_url: vars.str("OLLAMA_URL", "http://localhost:11434"),
            ollama_model: vars.str("OLLAMA_MODEL", "llama3.1"),
            inference_timeout_s: vars.parsed("INFERENCE_TIMEOUT_S", 30),
            router_stickiness,
            context_history_limit: vars.parsed("CONTEXT_HISTORY_LIMIT", 10),
            join_history_limit: vars.parsed("JOIN_HISTORY_LIMIT", 20),
            sweep_interval_s: vars.parsed("SWEEP_INTERVAL_S", 300),
            idle_timeout_s: vars.parsed("IDLE_TIMEOUT_S", 3600),
        })
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_s.max(1))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_s.max(1))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_s)
    }
}
