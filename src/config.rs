//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__ENGINE__MAX_RETRIES=3`）。
//! 这些值在构造编排器时固定，不支持按调用覆盖。

use std::path::Path;

use serde::Deserialize;

use crate::core::EngineOptions;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineSection,
    pub routing: RoutingSection,
}

/// [engine] 段：单次尝试时间预算、重试次数、固定重试间隔、图执行并发上限
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    /// 额外尝试次数（总尝试次数 = max_retries + 1）
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 固定间隔，不做指数退避
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_concurrent_graphs")]
    pub max_concurrent_graphs: usize,
}

fn default_timeout_secs() -> f64 {
    30.0
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_max_concurrent_graphs() -> usize {
    8
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_concurrent_graphs: default_max_concurrent_graphs(),
        }
    }
}

/// [routing] 段：strict = true 时未映射的意图返回 RoutingError
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RoutingSection {
    #[serde(default)]
    pub strict: bool,
}

/// 默认配置文件候选位置，取第一个存在的
const DEFAULT_CONFIG_CANDIDATES: &[&str] =
    &["config/default.toml", "../config/default.toml", "default.toml"];

const ENV_PREFIX: &str = "HIVE";

/// 加载配置并校验 [engine] 段
///
/// 源的叠加顺序：默认文件 → 显式传入的文件（不存在则跳过）→ 环境变量 `HIVE__*`。
/// 引擎参数在这里就转换一次 EngineOptions，非法值在启动时暴露而不是在第一次调用时。
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, config::ConfigError> {
    let default_file = DEFAULT_CONFIG_CANDIDATES
        .iter()
        .map(Path::new)
        .find(|p| p.exists());
    let explicit_file = config_path.filter(|p| p.exists());

    let builder = default_file
        .into_iter()
        .chain(explicit_file)
        .fold(config::Config::builder(), |builder, path| {
            builder.add_source(config::File::from(path))
        })
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    EngineOptions::try_from(&cfg.engine)?;
    Ok(cfg)
}
