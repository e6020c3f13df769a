//! Typed call arguments and ABI-bound contract handles

use crate::chain::ChainClient;
use crate::error::{EscrowError, EscrowResult};

use ethers::abi::{Abi, Function, ParamType, Token};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use std::str::FromStr;

/// A call argument, coerced into a token against the parameter type the ABI declares
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Address(Address),
    Uint(U256),
    Bytes32([u8; 32]),
    /// Free-form text: a string, a hex byte string or an address, depending on the parameter
    Text(String),
}

impl Arg {
    pub fn into_token(self, kind: &ParamType) -> EscrowResult<Token> {
        let token = match (self, kind) {
            (Arg::Address(a), ParamType::Address) => Token::Address(a),
            (Arg::Uint(v), ParamType::Uint(_)) => Token::Uint(v),
            (Arg::Uint(v), ParamType::Int(_)) => Token::Int(v),
            (Arg::Bytes32(b), ParamType::FixedBytes(32)) => Token::FixedBytes(b.to_vec()),
            (Arg::Bytes32(b), ParamType::Bytes) => Token::Bytes(b.to_vec()),
            (Arg::Text(s), ParamType::String) => Token::String(s),
            (Arg::Text(s), ParamType::Address) => Token::Address(parse_address(&s)?),
            (Arg::Text(s), ParamType::Bytes) => Token::Bytes(text_bytes(&s)),
            (Arg::Text(s), ParamType::FixedBytes(n)) => {
                let raw = text_bytes(&s);
                if raw.len() > *n {
                    return Err(EscrowError::Abi(format!(
                        "{:?} does not fit bytes{}",
                        s, n
                    )));
                }
                let mut fixed = vec![0u8; *n];
                fixed[..raw.len()].copy_from_slice(&raw);
                Token::FixedBytes(fixed)
            }
            (Arg::Text(s), ParamType::Uint(_)) => Token::Uint(parse_amount(&s, "argument")?),
            (arg, kind) => {
                return Err(EscrowError::Abi(format!(
                    "argument {:?} cannot be encoded as {}",
                    arg, kind
                )))
            }
        };
        Ok(token)
    }
}

/// `0x`-prefixed hex decodes to its bytes, anything else is taken as UTF-8
fn text_bytes(s: &str) -> Vec<u8> {
    s.strip_prefix("0x")
        .and_then(|h| hex::decode(h).ok())
        .unwrap_or_else(|| s.as_bytes().to_vec())
}

/// Parse an address in either the `Z`-prefixed or the `0x`-prefixed form
pub fn parse_address(input: &str) -> EscrowResult<Address> {
    let trimmed = input.trim();
    let body = trimmed
        .strip_prefix('Z')
        .or_else(|| trimmed.strip_prefix('z'))
        .or_else(|| trimmed.strip_prefix("0x"))
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| EscrowError::InvalidAddress(input.to_string()))?;
    if body.len() != 40 {
        return Err(EscrowError::InvalidAddress(input.to_string()));
    }
    Address::from_str(body).map_err(|_| EscrowError::InvalidAddress(input.to_string()))
}

/// Canonical display form of an address
pub fn display_address(address: &Address) -> String {
    format!("Z{}", hex::encode(address.as_bytes()))
}

/// Parse a decimal (or `0x` hex) integer amount in smallest units
pub fn parse_amount(input: &str, name: &str) -> EscrowResult<U256> {
    let trimmed = input.trim();
    let parsed = match trimmed.strip_prefix("0x") {
        Some(h) => U256::from_str_radix(h, 16).map_err(|e| e.to_string()),
        None => U256::from_dec_str(trimmed).map_err(|e| e.to_string()),
    };
    parsed.map_err(|e| EscrowError::invalid(name, format!("{:?}: {}", input, e)))
}

/// A deployed contract: name, address and interface
#[derive(Debug, Clone)]
pub struct ContractHandle {
    pub name: String,
    pub address: Address,
    pub abi: Abi,
}

impl ContractHandle {
    pub fn new(name: impl Into<String>, address: Address, abi: Abi) -> Self {
        Self {
            name: name.into(),
            address,
            abi,
        }
    }

    /// Resolve `method` by name and arity
    pub fn function(&self, method: &str, arity: usize) -> EscrowResult<&Function> {
        let candidates = self.abi.functions_by_name(method).map_err(|_| {
            EscrowError::Abi(format!("{} has no method {}", self.name, method))
        })?;
        candidates
            .iter()
            .find(|f| f.inputs.len() == arity)
            .ok_or_else(|| {
                EscrowError::Abi(format!(
                    "{}.{} takes no overload with {} arguments",
                    self.name, method, arity
                ))
            })
    }

    /// ABI-encode a call to `method`
    pub fn encode(&self, method: &str, args: &[Arg]) -> EscrowResult<Bytes> {
        let function = self.function(method, args.len())?;
        let tokens = function
            .inputs
            .iter()
            .zip(args.iter().cloned())
            .map(|(param, arg)| arg.into_token(&param.kind))
            .collect::<EscrowResult<Vec<_>>>()?;
        function
            .encode_input(&tokens)
            .map(Bytes::from)
            .map_err(|e| EscrowError::Abi(format!("{}.{}: {}", self.name, method, e)))
    }

    /// Decode the return data of `method`
    pub fn decode(&self, method: &str, arity: usize, data: &[u8]) -> EscrowResult<Vec<Token>> {
        let function = self.function(method, arity)?;
        function
            .decode_output(data)
            .map_err(|e| EscrowError::Abi(format!("{}.{} output: {}", self.name, method, e)))
    }

    /// Read-only call against current chain state
    pub async fn read<C: ChainClient + ?Sized>(
        &self,
        client: &C,
        method: &str,
        args: &[Arg],
    ) -> EscrowResult<Vec<Token>> {
        let data = self.encode(method, args)?;
        let tx: TypedTransaction = TransactionRequest::new().to(self.address).data(data).into();
        let output = client.call(&tx).await?;
        self.decode(method, args.len(), &output)
    }
}

/// Single-value token accessors used when decoding call results
pub fn token_address(token: &Token) -> EscrowResult<Address> {
    token
        .clone()
        .into_address()
        .ok_or_else(|| EscrowError::Abi(format!("expected address, got {:?}", token)))
}

pub fn token_uint(token: &Token) -> EscrowResult<U256> {
    token
        .clone()
        .into_uint()
        .ok_or_else(|| EscrowError::Abi(format!("expected uint, got {:?}", token)))
}

pub fn token_bool(token: &Token) -> EscrowResult<bool> {
    token
        .clone()
        .into_bool()
        .ok_or_else(|| EscrowError::Abi(format!("expected bool, got {:?}", token)))
}

pub fn token_bytes32(token: &Token) -> EscrowResult<[u8; 32]> {
    match token {
        Token::FixedBytes(b) if b.len() == 32 => {
            let mut out = [0u8; 32];
            out.copy_from_slice(b);
            Ok(out)
        }
        other => Err(EscrowError::Abi(format!("expected bytes32, got {:?}", other))),
    }
}

/// Render string, bytes and address tokens as text
pub fn token_text(token: &Token) -> String {
    match token {
        Token::String(s) => s.clone(),
        Token::Bytes(b) => match std::str::from_utf8(b) {
            Ok(s) if s.chars().all(|c| !c.is_control()) => s.to_string(),
            _ => format!("0x{}", hex::encode(b)),
        },
        Token::Address(a) => display_address(a),
        other => other.to_string(),
    }
}
