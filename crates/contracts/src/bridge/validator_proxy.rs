crate::sol! {
    /// Registry of the validators allowed to confirm transfers.
    #[derive(Debug, PartialEq, Eq)]
    interface IValidatorProxy {
        function isValidator(address validator) external view returns (bool);
    }
}
