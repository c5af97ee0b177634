pub use ITransferToken::ITransferTokenEvents as TransferTokenEvent;

crate::sol! {
    /// ERC-20 token on the foreign chain.
    ///
    /// A deposit is a `Transfer` whose `to` is the foreign bridge address.
    #[derive(Debug, PartialEq, Eq)]
    interface ITransferToken {
        function totalSupply() external view returns (uint256);

        function balanceOf(address owner) external view returns (uint256);

        event Transfer(address indexed from, address indexed to, uint256 value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;
    use alloy_sol_types::SolEvent;

    #[test]
    fn transfer_signature_matches_erc20() {
        assert_eq!(
            ITransferToken::Transfer::SIGNATURE_HASH,
            keccak256("Transfer(address,address,uint256)")
        );
    }
}
