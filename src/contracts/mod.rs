// Contracts Module - hand-built ABI fragments for every read the pipeline issues.
//
// Functions are assembled from `ParamType`s instead of `abigen!` bindings so calldata can be
// encoded without a client and packed straight into a Multicall3 batch.

pub mod erc20;
pub mod multicall3;
pub mod oft;

use ethers::abi::{Function, Param, ParamType, StateMutability};

fn param(kind: ParamType) -> Param {
    Param {
        name: String::new(),
        kind,
        internal_type: None,
    }
}

#[allow(deprecated)]
pub(crate) fn function(
    name: &str,
    inputs: Vec<ParamType>,
    outputs: Vec<ParamType>,
    state_mutability: StateMutability,
) -> Function {
    Function {
        name: name.to_string(),
        inputs: inputs.into_iter().map(param).collect(),
        outputs: outputs.into_iter().map(param).collect(),
        constant: None,
        state_mutability,
    }
}
