//! Contract interface handling
//!
//! A [`ContractDescriptor`] pairs a contract address with its parsed ABI and is
//! the only place call data is encoded and return data decoded. Descriptors are
//! immutable once built and are shared behind an `Arc`.

pub mod decode;
pub mod provider;
pub mod source;

pub use decode::CallResult;
pub use provider::InterfaceProvider;
pub use source::{ExplorerSource, FileSource, InterfaceSource};

use crate::error::{OperatorError, OperatorResult};

use ethers::abi::{Abi, Function, Token};
use ethers::types::{Address, Bytes};

/// Callable surface of one deployed contract
#[derive(Debug, Clone)]
pub struct ContractDescriptor {
    address: Address,
    abi: Abi,
}

impl ContractDescriptor {
    /// Parse an ABI JSON document for the contract at `address`
    pub fn from_json(address: Address, abi_json: &str) -> OperatorResult<Self> {
        let abi: Abi = serde_json::from_str(abi_json).map_err(|e| {
            OperatorError::Interface(format!("Malformed ABI for {:?}: {}", address, e))
        })?;

        if abi.functions.is_empty() {
            return Err(OperatorError::Interface(format!(
                "ABI for {:?} declares no functions",
                address
            )));
        }

        Ok(Self { address, abi })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn abi(&self) -> &Abi {
        &self.abi
    }

    /// Look up a method by name
    pub fn function(&self, method: &str) -> OperatorResult<&Function> {
        self.abi
            .function(method)
            .map_err(|_| OperatorError::encoding(method, "method not declared in contract ABI"))
    }

    /// Encode selector and arguments for `method`
    pub fn encode_call(&self, method: &str, args: &[Token]) -> OperatorResult<Bytes> {
        let function = self.function(method)?;
        function
            .encode_input(args)
            .map(Bytes::from)
            .map_err(|e| OperatorError::encoding(method, e))
    }

    /// Decode the raw return data of `method`
    pub fn decode_output(&self, method: &str, data: &[u8]) -> OperatorResult<Vec<Token>> {
        let function = self
            .function(method)
            .map_err(|_| OperatorError::decoding(method, "method not declared in contract ABI"))?;
        function
            .decode_output(data)
            .map_err(|e| OperatorError::decoding(method, e))
    }

    /// Find the method whose selector prefixes `data`
    pub fn method_for_selector(&self, data: &[u8]) -> Option<&Function> {
        let selector = data.get(..4)?;
        self.abi
            .functions()
            .find(|f| f.short_signature().as_slice() == selector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{operator_descriptor, OPERATOR_ABI};
    use ethers::types::U256;

    #[test]
    fn test_malformed_abi_is_rejected() {
        let err = ContractDescriptor::from_json(Address::zero(), "{not json").unwrap_err();
        assert!(matches!(err, OperatorError::Interface(_)));

        let err = ContractDescriptor::from_json(Address::zero(), "[]").unwrap_err();
        assert!(matches!(err, OperatorError::Interface(_)));
    }

    #[test]
    fn test_encode_rejects_unknown_method_and_bad_args() {
        let descriptor = operator_descriptor();

        let err = descriptor.encode_call("selfDestruct", &[]).unwrap_err();
        assert!(matches!(err, OperatorError::Encoding { .. }));

        // stake(address,uint256) given arguments in the wrong order
        let err = descriptor
            .encode_call(
                "stake",
                &[Token::Uint(U256::one()), Token::Address(Address::zero())],
            )
            .unwrap_err();
        assert!(matches!(err, OperatorError::Encoding { .. }));
    }

    #[test]
    fn test_encode_prefixes_selector() {
        let descriptor = operator_descriptor();
        let data = descriptor
            .encode_call(
                "stake",
                &[Token::Address(Address::repeat_byte(1)), Token::Uint(U256::from(30))],
            )
            .unwrap();

        let function = descriptor.method_for_selector(&data).unwrap();
        assert_eq!(function.name, "stake");
        assert_eq!(data.len(), 4 + 32 * 2);
    }

    #[test]
    fn test_decode_rejects_short_output() {
        let descriptor = operator_descriptor();
        let err = descriptor
            .decode_output("valueWithoutEarnings", &[0u8; 7])
            .unwrap_err();
        assert!(matches!(err, OperatorError::Decoding { .. }));
    }

    #[test]
    fn test_fixture_abi_parses() {
        let descriptor = ContractDescriptor::from_json(Address::zero(), OPERATOR_ABI).unwrap();
        assert!(descriptor.function("getSponsorshipsAndEarnings").is_ok());
        assert!(descriptor.function("undelegationQueue").is_ok());
    }
}
