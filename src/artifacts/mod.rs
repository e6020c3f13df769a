//! Contract artifact resolution
//!
//! Compiles the configured source units (plus everything they import) in one
//! compilation, or loads a cached result of the same compilation, and exposes the
//! interface and bytecode of every contract by name.

mod compiler;
mod imports;

pub use compiler::{standard_json_input, Compiler, CompilerOutput, HypcCompiler};
pub use imports::collect_sources;

use crate::abi::{Arg, ContractHandle};
use crate::config::CompilerConfig;
use crate::error::{EscrowError, EscrowResult};

use ethers::abi::Abi;
use ethers::types::{Address, Bytes};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// A compiled contract
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    pub name: String,
    pub source_unit: String,
    pub abi: Abi,
    /// `None` for interfaces and abstract contracts
    pub bytecode: Option<Bytes>,
}

impl ContractArtifact {
    /// Bind the interface to a deployed address
    pub fn at(&self, address: Address) -> ContractHandle {
        ContractHandle::new(self.name.clone(), address, self.abi.clone())
    }

    /// Creation code followed by the ABI-encoded constructor arguments
    pub fn deployment_data(&self, args: &[Arg]) -> EscrowResult<Bytes> {
        let code = self.bytecode.clone().ok_or_else(|| {
            EscrowError::Abi(format!("{} has no bytecode to deploy", self.name))
        })?;

        match self.abi.constructor() {
            Some(constructor) => {
                if constructor.inputs.len() != args.len() {
                    return Err(EscrowError::Abi(format!(
                        "{} constructor takes {} arguments, got {}",
                        self.name,
                        constructor.inputs.len(),
                        args.len()
                    )));
                }
                let tokens = constructor
                    .inputs
                    .iter()
                    .zip(args.iter().cloned())
                    .map(|(param, arg)| arg.into_token(&param.kind))
                    .collect::<EscrowResult<Vec<_>>>()?;
                constructor
                    .encode_input(code.to_vec(), &tokens)
                    .map(Bytes::from)
                    .map_err(|e| EscrowError::Abi(format!("{} constructor: {}", self.name, e)))
            }
            None if args.is_empty() => Ok(code),
            None => Err(EscrowError::Abi(format!(
                "{} has no constructor but {} arguments were given",
                self.name,
                args.len()
            ))),
        }
    }
}

/// Every contract of one compilation, keyed by contract name
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    contracts: BTreeMap<String, ContractArtifact>,
}

impl ArtifactSet {
    /// Extract artifacts from compiler output; any error-severity diagnostic fails the whole set
    pub fn from_output(output: CompilerOutput) -> EscrowResult<Self> {
        let (errors, warnings): (Vec<_>, Vec<_>) =
            output.errors.into_iter().partition(|d| d.is_error());
        for warning in &warnings {
            warn!("Compiler: {}", warning.text().trim());
        }
        if !errors.is_empty() {
            return Err(EscrowError::Compilation {
                diagnostics: errors.iter().map(|d| d.text()).collect(),
            });
        }

        let mut contracts = BTreeMap::new();
        for (unit, by_name) in output.contracts {
            for (name, raw) in by_name {
                let bytecode = raw
                    .zvm
                    .and_then(|vm| vm.bytecode)
                    .map(|b| b.object)
                    .filter(|object| !object.trim_start_matches("0x").is_empty())
                    .map(|object| {
                        hex::decode(object.trim_start_matches("0x"))
                            .map(Bytes::from)
                            .map_err(|e| EscrowError::Compilation {
                                diagnostics: vec![format!("{}:{} bytecode: {}", unit, name, e)],
                            })
                    })
                    .transpose()?;

                if contracts.contains_key(&name) {
                    warn!("Contract name {} defined in several units, keeping the last ({})", name, unit);
                }
                contracts.insert(
                    name.clone(),
                    ContractArtifact {
                        name,
                        source_unit: unit.clone(),
                        abi: raw.abi,
                        bytecode,
                    },
                );
            }
        }

        Ok(Self { contracts })
    }

    /// Artifact for `contract`, or `ArtifactNotFound`
    pub fn get(&self, contract: &str) -> EscrowResult<&ContractArtifact> {
        self.contracts
            .get(contract)
            .ok_or_else(|| EscrowError::ArtifactNotFound {
                contract: contract.to_string(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.contracts.keys().map(String::as_str)
    }

}

/// Resolves artifacts by compiling the configured sources, with an optional on-disk cache
pub struct ArtifactResolver<P> {
    compiler: P,
    config: CompilerConfig,
}

impl<P: Compiler> ArtifactResolver<P> {
    pub fn new(compiler: P, config: CompilerConfig) -> Self {
        Self { compiler, config }
    }

    /// Compile (or load the cached compilation of) every configured unit
    pub async fn load(&self) -> EscrowResult<ArtifactSet> {
        if self.config.sources.is_empty() {
            return Err(EscrowError::Config(
                "compiler.sources lists no source units".to_string(),
            ));
        }

        let sources = collect_sources(&self.config.sources, &self.config.remappings)?;
        let input = standard_json_input(&self.config, &sources);
        let cache_file = self.cache_file(&input)?;

        let raw = match cache_file.as_ref().filter(|path| path.is_file()) {
            Some(path) => {
                debug!("Loading cached compilation {:?}", path);
                serde_json::from_slice(&tokio::fs::read(path).await?)?
            }
            None => {
                info!("Compiling {} source units", sources.len());
                self.compiler.compile(&input).await?
            }
        };

        let artifacts = ArtifactSet::from_output(serde_json::from_value(raw.clone())?)?;
        debug!(
            "Resolved contracts: {}",
            artifacts.names().collect::<Vec<_>>().join(", ")
        );

        if let Some(path) = cache_file.filter(|path| !path.is_file()) {
            if let Some(dir) = path.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            tokio::fs::write(&path, serde_json::to_vec(&raw)?).await?;
            debug!("Cached compilation at {:?}", path);
        }

        Ok(artifacts)
    }

    /// Cache entries are keyed by the SHA-256 of the full input document
    fn cache_file(&self, input: &serde_json::Value) -> EscrowResult<Option<PathBuf>> {
        let Some(dir) = self.config.cache_dir.as_ref() else {
            return Ok(None);
        };
        let digest = Sha256::digest(serde_json::to_vec(input)?);
        Ok(Some(dir.join(format!("{}.json", hex::encode(digest)))))
    }
}
