use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use meetingmind_ai::{ProviderConfig, ProviderKind};
use serde::Deserialize;

use crate::catalog::{DEFAULT_MODEL_ID, ModelCatalog};
use crate::orchestrator::AgentFailurePolicy;
use crate::transport::WireEncoding;

const DEFAULT_CONF_DIR_NAME: &str = ".meetingmind";
const CONFIG_FILE_NAME: &str = "meetingmind.toml";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_STATIC_DIR: &str = "static";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEVELOPMENT_ENVIRONMENT: &str = "development";

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub environment: String,
    pub bind_addr: String,
    pub static_dir: PathBuf,
    pub default_model: String,
    /// `None` disables the per-call bound.
    pub upstream_timeout: Option<Duration>,
    pub wire_encoding: WireEncoding,
    pub providers: HashMap<ProviderKind, ProviderConfig>,
    pub jwks_url: Option<String>,
    pub orchestrator: OrchestratorSettings,
    pub catalog: ModelCatalog,
    pub log: LogSettings,
}

impl RelayConfig {
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case(DEVELOPMENT_ENVIRONMENT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub coordinator_model: String,
    pub agent_model: String,
    pub synthesis_model: String,
    pub failure_policy: AgentFailurePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    /// Directory for `gateway.log`; no file output when unset.
    pub path: Option<PathBuf>,
    pub stdout: bool,
}

#[derive(Debug, Deserialize, Default)]
struct MeetingMindTomlFile {
    #[serde(default)]
    environment: Option<String>,
    #[serde(default)]
    default_model: Option<String>,
    #[serde(default)]
    upstream_timeout_ms: Option<u64>,
    #[serde(default)]
    wire_encoding: Option<String>,
    #[serde(default)]
    server: MeetingMindTomlServer,
    #[serde(default)]
    log: MeetingMindTomlLog,
    #[serde(default)]
    providers: HashMap<String, MeetingMindTomlProvider>,
    #[serde(default)]
    auth: MeetingMindTomlAuth,
    #[serde(default)]
    orchestrator: MeetingMindTomlOrchestrator,
    #[serde(default)]
    models: HashMap<String, String>,
    #[serde(default)]
    env: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Default)]
struct MeetingMindTomlServer {
    #[serde(default)]
    bind: Option<String>,
    #[serde(default)]
    static_dir: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct MeetingMindTomlLog {
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    stdout: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct MeetingMindTomlProvider {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct MeetingMindTomlAuth {
    #[serde(default)]
    jwks_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct MeetingMindTomlOrchestrator {
    #[serde(default)]
    coordinator_model: Option<String>,
    #[serde(default)]
    agent_model: Option<String>,
    #[serde(default)]
    synthesis_model: Option<String>,
    #[serde(default)]
    failure_policy: Option<String>,
}

static CONF_DIR: OnceLock<PathBuf> = OnceLock::new();

pub fn init_conf_dir(conf_dir: Option<PathBuf>) {
    let resolved = conf_dir
        .as_deref()
        .map(resolve_conf_dir_arg)
        .unwrap_or_else(default_conf_dir);
    let _ = CONF_DIR.set(resolved);
}

pub fn current_conf_dir() -> PathBuf {
    CONF_DIR.get().cloned().unwrap_or_else(default_conf_dir)
}

fn default_conf_dir() -> PathBuf {
    home_dir().join(DEFAULT_CONF_DIR_NAME)
}

fn resolve_conf_dir_arg(path: &Path) -> PathBuf {
    let expanded = expand_path_with_home(path);
    if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(expanded)
    }
}

fn expand_path_with_home(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if raw == "~" {
        return home_dir();
    }
    if let Some(suffix) = raw.strip_prefix("~/") {
        return home_dir().join(suffix);
    }
    path.to_path_buf()
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_config_path() -> PathBuf {
    current_conf_dir().join(CONFIG_FILE_NAME)
}

/// Loads `path` when it exists; a missing file means "environment only".
pub fn load_relay_config(path: &Path) -> Result<RelayConfig, String> {
    let content = if path.exists() {
        std::fs::read_to_string(path)
            .map_err(|error| format!("read {} failed: {error}", path.display()))?
    } else {
        String::new()
    };
    parse_relay_config(&content, &|key| std::env::var(key).ok())
}

/// Parses `content`, consulting `[env]` and then `process_env` for `$NAME`
/// values and for settings the file leaves out.
pub fn parse_relay_config(
    content: &str,
    process_env: &dyn Fn(&str) -> Option<String>,
) -> Result<RelayConfig, String> {
    let parsed: MeetingMindTomlFile = toml::from_str(content)
        .map_err(|error| format!("parse {CONFIG_FILE_NAME} failed: {error}"))?;
    let env = ConfigEnv {
        map: &parsed.env,
        process_env,
    };

    let environment = parsed
        .environment
        .as_deref()
        .and_then(|value| env.resolve(value))
        .or_else(|| env.lookup("ENVIRONMENT"))
        .unwrap_or_else(|| "production".to_string());

    let bind_addr = match parsed
        .server
        .bind
        .as_deref()
        .and_then(|value| env.resolve(value))
    {
        Some(bind) => bind,
        None => {
            let port = match env.lookup("PORT") {
                Some(port) => port
                    .trim()
                    .parse::<u16>()
                    .map_err(|error| format!("invalid PORT '{port}': {error}"))?,
                None => DEFAULT_PORT,
            };
            format!("0.0.0.0:{port}")
        }
    };

    let static_dir = parsed
        .server
        .static_dir
        .as_deref()
        .and_then(|value| env.resolve(value))
        .map(|value| expand_path_with_home(Path::new(&value)))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR));

    let default_model = parsed
        .default_model
        .as_deref()
        .and_then(|value| env.resolve(value))
        .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string());

    let upstream_timeout_ms = parsed
        .upstream_timeout_ms
        .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_MS);
    let upstream_timeout =
        (upstream_timeout_ms > 0).then(|| Duration::from_millis(upstream_timeout_ms));

    let wire_encoding = match parsed.wire_encoding.as_deref() {
        Some(value) => value.parse::<WireEncoding>()?,
        None => WireEncoding::default(),
    };

    let providers = resolve_providers(&parsed.providers, &env)?;

    let jwks_url = parsed
        .auth
        .jwks_url
        .as_deref()
        .and_then(|value| env.resolve(value))
        .or_else(|| env.lookup("CLERK_JWKS_URL"));

    let failure_policy = match parsed.orchestrator.failure_policy.as_deref() {
        Some(value) => value.parse::<AgentFailurePolicy>()?,
        None => AgentFailurePolicy::default(),
    };
    let orchestrator_model = |value: &Option<String>| {
        value
            .as_deref()
            .and_then(|value| env.resolve(value))
            .unwrap_or_else(|| default_model.clone())
    };
    let orchestrator = OrchestratorSettings {
        coordinator_model: orchestrator_model(&parsed.orchestrator.coordinator_model),
        agent_model: orchestrator_model(&parsed.orchestrator.agent_model),
        synthesis_model: orchestrator_model(&parsed.orchestrator.synthesis_model),
        failure_policy,
    };

    let mut catalog = ModelCatalog::builtin();
    let mut extra_models = parsed.models.iter().collect::<Vec<_>>();
    extra_models.sort();
    for (id, display_name) in extra_models {
        catalog.insert(id, display_name);
    }

    let log = LogSettings {
        level: parsed
            .log
            .level
            .as_deref()
            .and_then(|value| env.resolve(value))
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        path: parsed
            .log
            .path
            .as_deref()
            .and_then(|value| env.resolve(value))
            .map(|value| expand_path_with_home(Path::new(&value))),
        stdout: parsed.log.stdout.unwrap_or(true),
    };

    Ok(RelayConfig {
        environment,
        bind_addr,
        static_dir,
        default_model,
        upstream_timeout,
        wire_encoding,
        providers,
        jwks_url,
        orchestrator,
        catalog,
        log,
    })
}

fn resolve_providers(
    providers: &HashMap<String, MeetingMindTomlProvider>,
    env: &ConfigEnv<'_>,
) -> Result<HashMap<ProviderKind, ProviderConfig>, String> {
    for name in providers.keys() {
        if !ProviderKind::ALL
            .iter()
            .any(|kind| kind.as_str() == name.trim().to_ascii_lowercase())
        {
            return Err(format!(
                "unsupported provider '{name}' (expected 'google' or 'openai')"
            ));
        }
    }

    let mut resolved = HashMap::new();
    for kind in ProviderKind::ALL {
        let section = providers
            .iter()
            .find(|(name, _)| name.trim().eq_ignore_ascii_case(kind.as_str()))
            .map(|(_, section)| section);
        let api_key = section
            .and_then(|section| section.api_key.as_deref())
            .and_then(|value| env.resolve(value))
            .or_else(|| {
                kind.api_key_envs()
                    .iter()
                    .find_map(|name| env.lookup(name))
            });
        let base_url = section
            .and_then(|section| section.base_url.as_deref())
            .and_then(|value| env.resolve(value));
        resolved.insert(kind, ProviderConfig { api_key, base_url });
    }
    Ok(resolved)
}

struct ConfigEnv<'a> {
    map: &'a HashMap<String, String>,
    process_env: &'a dyn Fn(&str) -> Option<String>,
}

impl ConfigEnv<'_> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.map
            .get(key)
            .cloned()
            .or_else(|| (self.process_env)(key))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    /// Literal values pass through; `$NAME` resolves from the environment.
    fn resolve(&self, value: &str) -> Option<String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Some(env_key) = trimmed.strip_prefix('$') {
            return self.lookup(env_key);
        }
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse_relay_config("", &no_env).expect("empty config parses");
        assert_eq!(config.environment, "production");
        assert!(!config.is_development());
        assert_eq!(config.bind_addr, "0.0.0.0:8000");
        assert_eq!(config.static_dir, PathBuf::from("static"));
        assert_eq!(config.default_model, "gemini-2.5-flash-lite");
        assert_eq!(config.upstream_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.wire_encoding, WireEncoding::Json);
        assert_eq!(
            config.orchestrator.failure_policy,
            AgentFailurePolicy::Degrade
        );
        assert_eq!(config.orchestrator.agent_model, "gemini-2.5-flash-lite");
        assert!(!config.providers[&ProviderKind::Google].has_api_key());
        assert!(config.jwks_url.is_none());
        assert!(config.log.stdout);
        assert!(config.log.path.is_none());
    }

    #[test]
    fn process_env_supplies_keys_port_and_environment() {
        let env = |key: &str| match key {
            "GEMINI_API_KEY" => Some("gemini-key".to_string()),
            "OPENAI_API_KEY" => Some("openai-key".to_string()),
            "PORT" => Some("9090".to_string()),
            "ENVIRONMENT" => Some("development".to_string()),
            "CLERK_JWKS_URL" => Some("https://clerk.example/.well-known/jwks.json".to_string()),
            _ => None,
        };
        let config = parse_relay_config("", &env).expect("config parses");
        assert!(config.is_development());
        assert_eq!(config.bind_addr, "0.0.0.0:9090");
        assert_eq!(
            config.providers[&ProviderKind::Google].api_key.as_deref(),
            Some("gemini-key")
        );
        assert_eq!(
            config.providers[&ProviderKind::OpenAi].api_key.as_deref(),
            Some("openai-key")
        );
        assert_eq!(
            config.jwks_url.as_deref(),
            Some("https://clerk.example/.well-known/jwks.json")
        );
    }

    #[test]
    fn file_values_resolve_env_references() {
        let content = r#"
environment = "staging"
default_model = "gpt-4o-mini"
upstream_timeout_ms = 0
wire_encoding = "lines"

[env]
GOOGLE_KEY = "from-env-table"

[server]
bind = "127.0.0.1:18080"
static_dir = "/srv/meetingmind/static"

[log]
level = "debug"
path = "/tmp/meetingmind-logs"
stdout = false

[providers.google]
api_key = "$GOOGLE_KEY"
base_url = "http://127.0.0.1:9999/v1beta"

[providers.openai]
api_key = "literal-openai"

[auth]
jwks_url = "https://auth.example/jwks"

[orchestrator]
coordinator_model = "gpt-4o-mini"
synthesis_model = "gemini-2.5-flash-lite"
failure_policy = "fail_fast"

[models]
"gpt-4.1" = "GPT-4.1"
"#;
        let config = parse_relay_config(content, &no_env).expect("config parses");
        assert_eq!(config.environment, "staging");
        assert_eq!(config.bind_addr, "127.0.0.1:18080");
        assert_eq!(config.static_dir, PathBuf::from("/srv/meetingmind/static"));
        assert_eq!(config.default_model, "gpt-4o-mini");
        assert_eq!(config.upstream_timeout, None);
        assert_eq!(config.wire_encoding, WireEncoding::Lines);
        assert_eq!(
            config.providers[&ProviderKind::Google],
            ProviderConfig {
                api_key: Some("from-env-table".to_string()),
                base_url: Some("http://127.0.0.1:9999/v1beta".to_string()),
            }
        );
        assert_eq!(
            config.providers[&ProviderKind::OpenAi].api_key.as_deref(),
            Some("literal-openai")
        );
        assert_eq!(config.jwks_url.as_deref(), Some("https://auth.example/jwks"));
        assert_eq!(
            config.orchestrator,
            OrchestratorSettings {
                coordinator_model: "gpt-4o-mini".to_string(),
                agent_model: "gpt-4o-mini".to_string(),
                synthesis_model: "gemini-2.5-flash-lite".to_string(),
                failure_policy: AgentFailurePolicy::FailFast,
            }
        );
        assert_eq!(config.catalog.display_name("gpt-4.1"), "GPT-4.1");
        assert_eq!(
            config.log,
            LogSettings {
                level: "debug".to_string(),
                path: Some(PathBuf::from("/tmp/meetingmind-logs")),
                stdout: false,
            }
        );
    }

    #[test]
    fn rejects_unknown_provider_sections_and_bad_values() {
        let error = parse_relay_config("[providers.anthropic]\napi_key = \"x\"\n", &no_env)
            .expect_err("unknown provider");
        assert!(error.contains("anthropic"));

        let error = parse_relay_config("wire_encoding = \"xml\"\n", &no_env)
            .expect_err("bad encoding");
        assert!(error.contains("wire_encoding"));

        let bad_port = |key: &str| (key == "PORT").then(|| "eighty".to_string());
        let error = parse_relay_config("", &bad_port).expect_err("bad port");
        assert!(error.contains("PORT"));
    }

    #[test]
    fn missing_file_falls_back_to_environment() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config =
            load_relay_config(&dir.path().join("absent.toml")).expect("missing file is fine");
        assert_eq!(config.default_model, "gemini-2.5-flash-lite");
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("meetingmind.toml");
        std::fs::write(&path, "default_model = \"gpt-4o-mini\"\n").expect("write config");
        let config = load_relay_config(&path).expect("config loads");
        assert_eq!(config.default_model, "gpt-4o-mini");
    }
}
