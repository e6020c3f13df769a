//! Configuration management for the escrow tooling
//!
//! Loads configuration from a TOML file with environment variable substitution.
//! Both `${VAR}` and `${VAR:-default}` forms are supported, so the familiar
//! `.env`-style keys (`PROVIDER_URL`, `MNEMONIC`, ...) can drive every section.

use crate::error::{EscrowError, EscrowResult};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(:-)?").unwrap();
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub network: NetworkConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub contracts: ContractsConfig,
    #[serde(default)]
    pub compiler: CompilerConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub swap: SwapConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub provider_url: String,
    #[serde(default = "default_confirmations")]
    pub tx_required_confirmations: u64,
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub gas_price_strategy: GasPriceStrategy,
    #[serde(default)]
    pub gas_limit_buffer_percent: u64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum GasPriceStrategy {
    Legacy,
    #[default]
    Eip1559,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletConfig {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub mnemonic: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractsConfig {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub bridge_address: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub atomic_swap_address: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub token_address: Option<String>,
    #[serde(default = "default_bridge_contract")]
    pub bridge_contract: String,
    #[serde(default = "default_swap_contract")]
    pub swap_contract: String,
    #[serde(default = "default_token_interface")]
    pub token_interface: String,
    #[serde(default = "default_mock_token")]
    pub mock_token_contract: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompilerConfig {
    #[serde(default = "default_compiler_binary")]
    pub binary: PathBuf,
    #[serde(default = "default_language")]
    pub language: String,
    /// Source unit name -> file path
    #[serde(default)]
    pub sources: BTreeMap<String, PathBuf>,
    /// Import prefix -> directory
    #[serde(default)]
    pub remappings: BTreeMap<String, PathBuf>,
    #[serde(default = "default_true")]
    pub optimizer: bool,
    #[serde(default = "default_true")]
    pub via_ir: bool,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub relayer_address: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub treasury_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    #[serde(default = "default_token_name")]
    pub name: String,
    #[serde(default = "default_token_symbol")]
    pub symbol: String,
    #[serde(default = "default_token_decimals")]
    pub decimals: u8,
    /// Whole tokens, scaled by 10^18 at deployment
    #[serde(default = "default_token_supply")]
    pub supply: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub transfer_amount: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SwapConfig {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub secret: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub recipient: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub expiry_ts: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub asset: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub amount: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub desired_asset: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub desired_amount: Option<String>,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            bridge_address: None,
            atomic_swap_address: None,
            token_address: None,
            bridge_contract: default_bridge_contract(),
            swap_contract: default_swap_contract(),
            token_interface: default_token_interface(),
            mock_token_contract: default_mock_token(),
        }
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            binary: default_compiler_binary(),
            language: default_language(),
            sources: BTreeMap::new(),
            remappings: BTreeMap::new(),
            optimizer: true,
            via_ir: true,
            cache_dir: None,
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            name: default_token_name(),
            symbol: default_token_symbol(),
            decimals: default_token_decimals(),
            supply: default_token_supply(),
            transfer_amount: None,
        }
    }
}

fn default_confirmations() -> u64 {
    2
}

fn default_confirmation_timeout() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    1_000
}

fn default_true() -> bool {
    true
}

fn default_compiler_binary() -> PathBuf {
    PathBuf::from("hypc")
}

fn default_language() -> String {
    "Hyperion".to_string()
}

fn default_bridge_contract() -> String {
    "ZondBridge".to_string()
}

fn default_swap_contract() -> String {
    "ZondAtomicSwap".to_string()
}

fn default_token_interface() -> String {
    "IERC20".to_string()
}

fn default_mock_token() -> String {
    "MockERC20".to_string()
}

fn default_token_name() -> String {
    "Mock Token".to_string()
}

fn default_token_symbol() -> String {
    "MOCK".to_string()
}

fn default_token_decimals() -> u8 {
    18
}

fn default_token_supply() -> String {
    "1000000".to_string()
}

/// Substituted variables that were never set come through as empty strings
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.and_then(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }))
}

impl Settings {
    /// Load settings from the given file, `ZOND_ESCROW_CONFIG`, or `config/default.toml`
    pub fn load(path: Option<&Path>) -> EscrowResult<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var("ZOND_ESCROW_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config/default.toml"));

        let config_str = std::fs::read_to_string(&config_path).map_err(|e| {
            EscrowError::Config(format!(
                "Failed to read config file {:?}: {}",
                config_path, e
            ))
        })?;

        let mut settings = Self::from_toml(&config_str)?;
        settings.compiler.rebase(config_path.parent().unwrap_or(Path::new(".")));
        Ok(settings)
    }

    /// Parse settings from TOML text after substituting environment variables
    pub fn from_toml(input: &str) -> EscrowResult<Self> {
        let substituted = substitute_env_vars(input);
        let settings: Settings = toml::from_str(&substituted)
            .map_err(|e| EscrowError::Config(format!("Failed to parse configuration: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> EscrowResult<()> {
        if self.network.provider_url.trim().is_empty() {
            return Err(EscrowError::Config(
                "network.provider_url is empty (set PROVIDER_URL)".to_string(),
            ));
        }
        if self.network.tx_required_confirmations == 0 {
            return Err(EscrowError::Config(
                "network.tx_required_confirmations must be at least 1".to_string(),
            ));
        }
        if self.network.poll_interval_ms == 0 {
            return Err(EscrowError::Config(
                "network.poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl CompilerConfig {
    /// Resolve relative source and remapping paths against the config file's parent directory
    fn rebase(&mut self, base: &Path) {
        if base.as_os_str().is_empty() {
            return;
        }
        for path in self.sources.values_mut().chain(self.remappings.values_mut()) {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        if let Some(dir) = self.cache_dir.as_mut() {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }
}

/// Return a configured value, rejecting absent values and `your_..._here` placeholders
pub fn require<'a>(value: &'a Option<String>, key: &str) -> EscrowResult<&'a str> {
    match value.as_deref() {
        Some(v) if !is_placeholder(v) => Ok(v),
        Some(_) => Err(EscrowError::Config(format!(
            "{} still holds its placeholder value",
            key
        ))),
        None => Err(EscrowError::Config(format!("{} is not set", key))),
    }
}

/// Placeholders shipped in sample environment files, e.g. `your_mnemonic_here`
pub fn is_placeholder(value: &str) -> bool {
    let v = value.trim().to_ascii_lowercase();
    v.starts_with("your_") && v.ends_with("_here")
}

/// Substitute environment variables in the format ${VAR_NAME} or ${VAR_NAME:-default}.
///
/// A default is part of the template and may itself reference a variable. Values
/// read from the environment are spliced in once, escaped for a TOML basic string,
/// and never scanned for further references.
fn substitute_env_vars(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(cap) = ENV_VAR.captures(rest) {
        let (Some(open), Some(name)) = (cap.get(0), cap.get(1)) else {
            break;
        };
        let body = &rest[open.end()..];
        let Some(close) = closing_brace(body) else {
            break;
        };
        output.push_str(&rest[..open.start()]);

        // `${NAME` followed by anything other than `}` or `:-` is left untouched
        if cap.get(2).is_none() && close != 0 {
            output.push_str(open.as_str());
            rest = body;
            continue;
        }

        match env::var(name.as_str()) {
            Ok(value) if !value.is_empty() => output.push_str(&escape_toml(&value)),
            _ => output.push_str(&substitute_env_vars(&body[..close])),
        }
        rest = &body[close + 1..];
    }

    output.push_str(rest);
    output
}

/// Offset of the `}` closing a reference whose body starts at `body`
fn closing_brace(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 => return Some(i),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Escape `value` so a TOML basic string reads it back unchanged
fn escape_toml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c if c.is_control() => escaped.push_str(&format!("\\u{:04X}", c as u32)),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [network]
        provider_url = "http://127.0.0.1:8545"
    "#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("ZOND_ESCROW_TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${ZOND_ESCROW_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_env_var_default_used_when_unset() {
        env::remove_var("ZOND_ESCROW_UNSET_VAR");
        let result = substitute_env_vars("depth = ${ZOND_ESCROW_UNSET_VAR:-2}");
        assert_eq!(result, "depth = 2");
    }

    #[test]
    fn test_nested_default_resolves_inner_variable() {
        env::remove_var("ZOND_ESCROW_OUTER_VAR");
        env::set_var("ZOND_ESCROW_INNER_VAR", "Zabc");
        let result = substitute_env_vars("r = \"${ZOND_ESCROW_OUTER_VAR:-${ZOND_ESCROW_INNER_VAR}}\"");
        assert_eq!(result, "r = \"Zabc\"");

        env::set_var("ZOND_ESCROW_OUTER_VAR", "Zdef");
        let result = substitute_env_vars("r = \"${ZOND_ESCROW_OUTER_VAR:-${ZOND_ESCROW_INNER_VAR}}\"");
        assert_eq!(result, "r = \"Zdef\"");
    }

    #[test]
    fn test_env_values_are_not_expanded_again() {
        env::set_var("ZOND_ESCROW_REFERENCING_SECRET", "${ZOND_ESCROW_REFERENCED_VAR}");
        env::set_var("ZOND_ESCROW_REFERENCED_VAR", "hijacked");
        let input = format!(
            "{}\n[swap]\nsecret = \"${{ZOND_ESCROW_REFERENCING_SECRET}}\"\n",
            MINIMAL
        );
        let settings = Settings::from_toml(&input).unwrap();
        assert_eq!(
            settings.swap.secret.as_deref(),
            Some("${ZOND_ESCROW_REFERENCED_VAR}")
        );
    }

    #[test]
    fn test_env_values_survive_toml_escaping() {
        let raw = "my\"se\\cret\\t\\u0041\ttab";
        env::set_var("ZOND_ESCROW_QUOTED_SECRET", raw);
        let input = format!(
            "{}\n[swap]\nsecret = \"${{ZOND_ESCROW_QUOTED_SECRET}}\"\n",
            MINIMAL
        );
        let settings = Settings::from_toml(&input).unwrap();
        assert_eq!(settings.swap.secret.as_deref(), Some(raw));
    }

    #[test]
    fn test_unterminated_reference_left_verbatim() {
        let result = substitute_env_vars("a = \"${ZOND_ESCROW_OPEN\"");
        assert_eq!(result, "a = \"${ZOND_ESCROW_OPEN\"");
    }

    #[test]
    fn test_defaults_applied() {
        let settings = Settings::from_toml(MINIMAL).unwrap();
        assert_eq!(settings.network.tx_required_confirmations, 2);
        assert_eq!(settings.network.gas_price_strategy, GasPriceStrategy::Eip1559);
        assert_eq!(settings.contracts.swap_contract, "ZondAtomicSwap");
        assert_eq!(settings.token.decimals, 18);
        assert!(settings.swap.secret.is_none());
    }

    #[test]
    fn test_empty_values_read_as_unset() {
        env::remove_var("ZOND_ESCROW_EMPTY_SECRET");
        let input = format!(
            "{}\n[swap]\nsecret = \"${{ZOND_ESCROW_EMPTY_SECRET}}\"\nrecipient = \"  \"\n",
            MINIMAL
        );
        let settings = Settings::from_toml(&input).unwrap();
        assert!(settings.swap.secret.is_none());
        assert!(settings.swap.recipient.is_none());
    }

    #[test]
    fn test_zero_confirmations_rejected() {
        let input = r#"
            [network]
            provider_url = "http://127.0.0.1:8545"
            tx_required_confirmations = 0
        "#;
        assert!(matches!(
            Settings::from_toml(input),
            Err(EscrowError::Config(_))
        ));
    }

    #[test]
    fn test_require_rejects_placeholder() {
        let placeholder = Some("your_mnemonic_here".to_string());
        assert!(require(&placeholder, "MNEMONIC").is_err());
        assert!(require(&None, "MNEMONIC").is_err());
        let real = Some("abandon ability".to_string());
        assert_eq!(require(&real, "MNEMONIC").unwrap(), "abandon ability");
    }
}
