//! Turns the JSON argument values of a manifest into ABI tokens, guided by
//! the parameter types of the constructor or function being called.

use ethers::{
    abi::{Param, ParamType, Token},
    types::{Address, Bytes, I256, U256},
};
use eyre::{eyre, Result};
use fixed_point::parse_units;
use serde_json::Value;

/// Tokenizes a full argument list. `resolve` maps a reference (without the
/// `$`) to an address.
pub fn tokenize_all(
    values: &[Value],
    params: &[Param],
    resolve: &impl Fn(&str) -> Result<Address>,
) -> Result<Vec<Token>> {
    if values.len() != params.len() {
        return Err(eyre!(
            "expected {} arguments ({}), got {}",
            params.len(),
            params
                .iter()
                .map(|p| format!("{} {}", p.kind, p.name))
                .collect::<Vec<_>>()
                .join(", "),
            values.len()
        ));
    }
    values
        .iter()
        .zip(params)
        .map(|(value, param)| {
            tokenize(value, &param.kind, resolve)
                .map_err(|e| eyre!("argument {}: {}", param.name, e))
        })
        .collect()
}

pub fn tokenize(
    value: &Value,
    kind: &ParamType,
    resolve: &impl Fn(&str) -> Result<Address>,
) -> Result<Token> {
    match (kind, value) {
        (ParamType::Address, Value::String(s)) => Ok(Token::Address(address(s, resolve)?)),
        (ParamType::Uint(bits), value) => {
            let n = unsigned(value, resolve)?;
            if *bits < 256 && n.bits() > *bits {
                return Err(eyre!("{} does not fit in uint{}", n, bits));
            }
            Ok(Token::Uint(n))
        }
        (ParamType::Int(bits), value) => {
            let n = signed(value)?;
            let fits = *bits == 256 || {
                let bound = I256::from(2_i64).pow((*bits - 1) as u32);
                n >= -bound && n < bound
            };
            if !fits {
                return Err(eyre!("{} does not fit in int{}", n, bits));
            }
            Ok(Token::Int(n.into_raw()))
        }
        (ParamType::Bool, Value::Bool(b)) => Ok(Token::Bool(*b)),
        (ParamType::String, Value::String(s)) => Ok(Token::String(s.clone())),
        (ParamType::Bytes, Value::String(s)) => Ok(Token::Bytes(hex(s)?.to_vec())),
        (ParamType::FixedBytes(size), Value::String(s)) => {
            let bytes = hex(s)?;
            if bytes.len() != *size {
                return Err(eyre!("expected {} bytes, got {}", size, bytes.len()));
            }
            Ok(Token::FixedBytes(bytes.to_vec()))
        }
        (ParamType::Array(inner), Value::Array(values)) => Ok(Token::Array(
            values
                .iter()
                .map(|v| tokenize(v, inner, resolve))
                .collect::<Result<_>>()?,
        )),
        (ParamType::FixedArray(inner, size), Value::Array(values)) => {
            if values.len() != *size {
                return Err(eyre!("expected {} elements, got {}", size, values.len()));
            }
            Ok(Token::FixedArray(
                values
                    .iter()
                    .map(|v| tokenize(v, inner, resolve))
                    .collect::<Result<_>>()?,
            ))
        }
        (ParamType::Tuple(kinds), Value::Array(values)) => {
            if values.len() != kinds.len() {
                return Err(eyre!(
                    "expected a tuple of {} values, got {}",
                    kinds.len(),
                    values.len()
                ));
            }
            Ok(Token::Tuple(
                values
                    .iter()
                    .zip(kinds)
                    .map(|(v, k)| tokenize(v, k, resolve))
                    .collect::<Result<_>>()?,
            ))
        }
        (kind, value) => Err(eyre!("can't use {} as {}", value, kind)),
    }
}

fn address(s: &str, resolve: &impl Fn(&str) -> Result<Address>) -> Result<Address> {
    match s.strip_prefix('$') {
        Some(name) => resolve(name),
        None => s
            .parse::<Address>()
            .map_err(|e| eyre!("{:?} is not an address: {}", s, e)),
    }
}

/// Unsigned integers are JSON numbers or literal strings like `"1_000e6"`.
/// A reference is accepted too and becomes the address as an integer.
fn unsigned(value: &Value, resolve: &impl Fn(&str) -> Result<Address>) -> Result<U256> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| eyre!("{} is not an unsigned integer", n)),
        Value::String(s) if s.starts_with('$') => {
            Ok(U256::from_big_endian(address(s, resolve)?.as_bytes()))
        }
        Value::String(s) => parse_units(s, 0),
        other => Err(eyre!("{} is not an unsigned integer", other)),
    }
}

fn signed(value: &Value) -> Result<I256> {
    let (negative, magnitude) = match value {
        Value::Number(n) => match n.as_i64() {
            Some(n) => return Ok(I256::from(n)),
            None => return Err(eyre!("{} is not an integer", n)),
        },
        Value::String(s) => match s.strip_prefix('-') {
            Some(rest) => (true, parse_units(rest, 0)?),
            None => (false, parse_units(s, 0)?),
        },
        other => return Err(eyre!("{} is not an integer", other)),
    };
    let n = I256::checked_from_sign_and_abs(
        if negative {
            ethers::types::Sign::Negative
        } else {
            ethers::types::Sign::Positive
        },
        magnitude,
    )
    .ok_or_else(|| eyre!("{} overflows int256", value))?;
    Ok(n)
}

fn hex(s: &str) -> Result<Bytes> {
    s.parse::<Bytes>()
        .map_err(|e| eyre!("{:?} is not hex: {}", s, e))
}
