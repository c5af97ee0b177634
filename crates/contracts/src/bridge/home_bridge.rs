pub use IHomeBridge::IHomeBridgeEvents as HomeBridgeEvent;

crate::sol! {
    /// Home bridge on the home chain.
    ///
    /// Validators call `confirmTransfer` once per foreign deposit. The bridge
    /// emits `Confirmation` for every accepted confirmation and
    /// `TransferCompleted` once enough validators have confirmed.
    #[derive(Debug, PartialEq, Eq)]
    interface IHomeBridge {
        /// Confirm a foreign deposit.
        ///
        /// @param transferHash Identity of the transfer
        /// @param transactionHash Foreign transaction that carried the deposit
        /// @param amount Deposited amount
        /// @param recipient Home-chain beneficiary
        function confirmTransfer(
            bytes32 transferHash,
            bytes32 transactionHash,
            uint256 amount,
            address recipient
        ) external;

        /// Address of the validator proxy consulted for confirmation permissions.
        function validatorProxy() external view returns (address);

        event Confirmation(
            bytes32 transferHash,
            bytes32 transactionHash,
            uint256 amount,
            address recipient,
            address indexed validator
        );

        event TransferCompleted(
            bytes32 transferHash,
            bytes32 transactionHash,
            uint256 amount,
            address recipient,
            bool coinTransferSuccessful
        );
    }
}
