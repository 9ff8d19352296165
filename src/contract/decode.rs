//! Typed decoding of contract call results

use crate::error::{OperatorError, OperatorResult};

use ethers::abi::Token;
use ethers::types::{Address, U256};

/// A value that can be built from the decoded outputs of one method
pub trait CallResult: Sized {
    fn from_tokens(method: &str, tokens: Vec<Token>) -> OperatorResult<Self>;
}

impl CallResult for U256 {
    fn from_tokens(method: &str, tokens: Vec<Token>) -> OperatorResult<Self> {
        let [token] = exactly::<1>(method, tokens)?;
        uint(method, token)
    }
}

/// Require exactly `N` output tokens
pub fn exactly<const N: usize>(method: &str, tokens: Vec<Token>) -> OperatorResult<[Token; N]> {
    let len = tokens.len();
    tokens.try_into().map_err(|_| {
        OperatorError::decoding(method, format!("expected {} outputs, got {}", N, len))
    })
}

pub fn uint(method: &str, token: Token) -> OperatorResult<U256> {
    match token {
        Token::Uint(value) => Ok(value),
        other => Err(mismatch(method, "uint", &other)),
    }
}

pub fn address(method: &str, token: Token) -> OperatorResult<Address> {
    match token {
        Token::Address(value) => Ok(value),
        other => Err(mismatch(method, "address", &other)),
    }
}

/// Decode a dynamic or fixed array, mapping each element with `item`
pub fn array<T>(
    method: &str,
    token: Token,
    item: impl Fn(&str, Token) -> OperatorResult<T>,
) -> OperatorResult<Vec<T>> {
    match token {
        Token::Array(items) | Token::FixedArray(items) => {
            items.into_iter().map(|t| item(method, t)).collect()
        }
        other => Err(mismatch(method, "array", &other)),
    }
}

pub fn tuple(method: &str, token: Token) -> OperatorResult<Vec<Token>> {
    match token {
        Token::Tuple(fields) => Ok(fields),
        other => Err(mismatch(method, "tuple", &other)),
    }
}

fn mismatch(method: &str, expected: &str, got: &Token) -> OperatorError {
    OperatorError::decoding(method, format!("expected {}, got {:?}", expected, got))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_requires_single_uint() {
        let value = U256::from_tokens("stakedInto", vec![Token::Uint(42.into())]).unwrap();
        assert_eq!(value, U256::from(42));

        let err = U256::from_tokens("stakedInto", vec![]).unwrap_err();
        assert!(matches!(err, OperatorError::Decoding { .. }));

        let err =
            U256::from_tokens("stakedInto", vec![Token::Bool(true)]).unwrap_err();
        assert!(err.to_string().contains("expected uint"));
    }

    #[test]
    fn test_array_maps_elements() {
        let token = Token::Array(vec![
            Token::Address(Address::repeat_byte(1)),
            Token::Address(Address::repeat_byte(2)),
        ]);
        let addresses = array("m", token, address).unwrap();
        assert_eq!(addresses, vec![Address::repeat_byte(1), Address::repeat_byte(2)]);

        let bad = Token::Array(vec![Token::Uint(1.into())]);
        assert!(array("m", bad, address).is_err());
    }
}
