//! Contract bindings generated with alloy's `sol!` macro.

use alloy::sol;

// The multisig holds one ERC20 token and releases it once `threshold`
// owners have confirmed a transfer.
sol! {
    #[sol(rpc)]
    contract SimpleERC20Multisig {
        function confirmTransaction(uint256 txId) external;
        function depositTokens(uint256 amount) external;
        function executeTransaction(uint256 txId) external;
        function hasConfirmed(uint256 txId, address owner) external view returns (bool);
        function isOwner(address account) external view returns (bool);
        function owners(uint256 index) external view returns (address);
        function submitTransaction(address to, uint256 amount) external returns (uint256 txId);
        function threshold() external view returns (uint256);
        function token() external view returns (address);
        function tokenBalance() external view returns (uint256);
        function transactions(uint256 index) external view returns (address to, uint256 amount, bool executed, uint256 confirmations);
    }
}

sol! {
    #[sol(rpc)]
    contract ERC20 {
        function name() public view returns (string memory);
        function symbol() public view returns (string memory);
        function decimals() public view returns (uint8);
        function totalSupply() public view returns (uint256);
        function balanceOf(address account) public view returns (uint256);
        function allowance(address owner, address spender) public view returns (uint256);
        function approve(address spender, uint256 amount) public returns (bool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, U256};
    use alloy::sol_types::SolCall;

    #[test]
    fn test_multisig_selectors() {
        assert_eq!(SimpleERC20Multisig::thresholdCall::SELECTOR, [0x42, 0xcd, 0xe4, 0xe8]);
        assert_eq!(SimpleERC20Multisig::isOwnerCall::SELECTOR, [0x2f, 0x54, 0xbf, 0x6e]);
        assert_eq!(SimpleERC20Multisig::ownersCall::SELECTOR, [0x02, 0x5e, 0x7c, 0x27]);
    }

    #[test]
    fn test_erc20_selectors() {
        assert_eq!(ERC20::approveCall::SELECTOR, [0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(ERC20::allowanceCall::SELECTOR, [0xdd, 0x62, 0xed, 0x3e]);
        assert_eq!(ERC20::balanceOfCall::SELECTOR, [0x70, 0xa0, 0x82, 0x31]);
    }

    #[test]
    fn test_submit_calldata_layout() {
        let call = SimpleERC20Multisig::submitTransactionCall {
            to: address!("00000000000000000000000000000000000000aa"),
            amount: U256::from(5u8),
        };
        let data = call.abi_encode();
        assert_eq!(data.len(), 4 + 32 + 32);
        assert_eq!(data[4 + 31], 0xaa);
        assert_eq!(data[4 + 32 + 31], 5);
    }
}
