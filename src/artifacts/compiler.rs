//! Compiler driver speaking the standard-JSON interface

use crate::config::CompilerConfig;
use crate::error::{EscrowError, EscrowResult};

use async_trait::async_trait;
use ethers::abi::Abi;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Something that turns a standard-JSON input document into a standard-JSON output document
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(&self, input: &Value) -> EscrowResult<Value>;
}

/// The `hypc` binary invoked with `--standard-json`
pub struct HypcCompiler {
    binary: PathBuf,
}

impl HypcCompiler {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl Compiler for HypcCompiler {
    async fn compile(&self, input: &Value) -> EscrowResult<Value> {
        let mut child = Command::new(&self.binary)
            .arg("--standard-json")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EscrowError::Compilation {
                diagnostics: vec![format!("failed to start {:?}: {}", self.binary, e)],
            })?;

        debug!("Executing command: {:?} --standard-json", self.binary);

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&serde_json::to_vec(input)?).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EscrowError::Compilation {
                diagnostics: vec![format!("{:?} exited with {}: {}", self.binary, output.status, stderr.trim())],
            });
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

/// Build the standard-JSON input document for a set of sources
pub fn standard_json_input(config: &CompilerConfig, sources: &BTreeMap<String, String>) -> Value {
    let sources: serde_json::Map<String, Value> = sources
        .iter()
        .map(|(unit, content)| (unit.clone(), json!({ "content": content })))
        .collect();

    json!({
        "language": config.language,
        "sources": sources,
        "settings": {
            "optimizer": { "enabled": config.optimizer },
            "viaIR": config.via_ir,
            "outputSelection": { "*": { "*": ["*"] } }
        }
    })
}

/// The subset of the standard-JSON output this tool reads
#[derive(Debug, Deserialize)]
pub struct CompilerOutput {
    #[serde(default)]
    pub errors: Vec<Diagnostic>,
    /// Source unit -> contract name -> output
    #[serde(default)]
    pub contracts: BTreeMap<String, BTreeMap<String, RawContract>>,
}

#[derive(Debug, Deserialize)]
pub struct Diagnostic {
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "formattedMessage")]
    pub formatted_message: Option<String>,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.severity.eq_ignore_ascii_case("error")
    }

    pub fn text(&self) -> String {
        self.formatted_message
            .clone()
            .unwrap_or_else(|| self.message.clone())
    }
}

#[derive(Debug, Deserialize)]
pub struct RawContract {
    #[serde(default)]
    pub abi: Abi,
    /// Bytecode section; emitted under `zvm` by hypc and `evm` by solc-compatible tools
    #[serde(alias = "evm")]
    pub zvm: Option<VmOutput>,
}

#[derive(Debug, Deserialize)]
pub struct VmOutput {
    pub bytecode: Option<BytecodeObject>,
}

#[derive(Debug, Deserialize)]
pub struct BytecodeObject {
    #[serde(default)]
    pub object: String,
}
