//! Contract bindings used by the relay.
//!
//! The paymaster is a MUD world: allowance, pass and store functions are all
//! exposed on the same address, and every revert it can produce is declared on
//! [`IQuarryPaymaster`] so the revert decoder can match on it.

use alloy_primitives::{Address, address};
use alloy_sol_types::sol;

/// Canonical ERC-4337 v0.6 entry point.
pub const ENTRY_POINT_V06: Address = address!("5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");

/// Canonical ERC-4337 v0.7 entry point.
pub const ENTRY_POINT_V07: Address = address!("0000000071727De22E5E9d8BAf0edAc6f37da032");

/// Simple account factory deployed alongside the v0.6 entry point.
pub const SIMPLE_ACCOUNT_FACTORY_V06: Address = address!("9406Cc6185a346906296840746125a0E44976454");

/// Simple account factory deployed alongside the v0.7 entry point.
pub const SIMPLE_ACCOUNT_FACTORY_V07: Address = address!("91E60e0613810449d098b0b5Ec8b51A0FE8c8985");

sol! {
    #[derive(Debug, PartialEq, Eq)]
    interface IQuarryPaymaster {
        error AllowanceSystem_AllowanceBelowMinimum(uint256 allowance, uint256 minAllowance);
        error AllowanceSystem_InsufficientBalance(uint256 balance, uint256 allowance);
        error AllowanceSystem_AllowancesLimitReached(address user, uint256 length, uint256 maxLength);
        error AllowanceSystem_NotAuthorized(address caller, address sponsor, address user);
        error GrantSystem_AllowanceBelowMinimum(uint256 allowance, uint256 minAllowance);
        error GrantSystem_InsufficientBalance(uint256 balance, uint256 allowance);
        error GrantSystem_AllowancesLimitReached(address user, uint256 length, uint256 maxLength);
        error PassSystem_Unauthorized(bytes32 passId, address caller, address grantor);
        error PassSystem_PendingCooldown(bytes32 passId, uint256 claimInterval, address user, uint256 lastClaimed);
        error PassSystem_PassExpired(bytes32 passId, uint256 validityPeriod, address user, uint256 lastRenewed);
        error PassSystem_InsufficientGrantorAllowance(bytes32 passId, address grantor);
        error SpenderSystem_AlreadyRegistered(address spender, address user);
        error World_AccessDenied(string resource, address caller);
        error World_ResourceNotFound(bytes32 resourceId, string resourceIdString);

        function grantAllowance(address user, uint256 allowance) external;
        function removeAllowance(address user, address sponsor) external;
        function setGrantAllowance(address grantor, uint256 allowance) external;
        function registerPass(bytes32 passId, uint256 claimAmount, uint256 claimInterval, uint256 validityPeriod) external;
        function issuePass(bytes32 passId, address user) external;
        function claimFor(address user, bytes32 passId) external;
        function depositTo(address to) external payable;
        function registerNamespace(bytes32 namespaceId) external;
        function registerTable(
            bytes32 tableId,
            bytes32 fieldLayout,
            bytes32 keySchema,
            bytes32 valueSchema,
            string[] keyNames,
            string[] fieldNames
        ) external;
        function setField(bytes32 tableId, bytes32[] keyTuple, uint8 fieldIndex, bytes data) external;
        function getRecord(bytes32 tableId, bytes32[] keyTuple, bytes32 fieldLayout)
            external
            view
            returns (bytes staticData, bytes32 encodedLengths, bytes dynamicData);
    }

    #[derive(Debug, PartialEq, Eq)]
    interface IEntryPoint {
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }

    #[derive(Debug, PartialEq, Eq)]
    interface ISimpleAccountFactory {
        function createAccount(address owner, uint256 salt) external returns (address ret);
        function getAddress(address owner, uint256 salt) external view returns (address);
    }

    #[derive(Debug, PartialEq, Eq)]
    interface ISimpleAccount {
        function execute(address dest, uint256 value, bytes func) external;
        function executeBatch(address[] dest, uint256[] value, bytes[] func) external;
    }

    #[derive(Debug, PartialEq, Eq)]
    interface ISimpleAccountV06 {
        function executeBatch(address[] dest, bytes[] func) external;
    }
}
