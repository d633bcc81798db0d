/*!
 * Type Definitions for the License Contract
 *
 * A license is a staked capability flag: an account that has bought a license
 * holds it until it sells it back. The same contract is deployed once per role
 * (seller licenses and arbitrator licenses are separate deployments).
 */

use soroban_sdk::{contracterror, contractevent, Address};

// ================================================================================================
// ERROR DEFINITIONS
// ================================================================================================

/// Errors returned by the license contract.
///
/// # Error Code Ranges
/// - 1-2: Setup errors
/// - 3-4: License ownership errors
/// - 5-6: Token and financial errors
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    /// `initialize` was called on an already configured contract
    AlreadyInitialized = 1,

    /// The contract has not been initialized yet
    NotInitialized = 2,

    /// The account already owns a license from this deployment
    AlreadyLicensed = 3,

    /// The account does not own a license from this deployment
    NotLicensed = 4,

    /// License price must be strictly positive
    InvalidAmount = 5,

    /// Moving the stake in or out of the contract failed
    TransferFailed = 6,
}

// ================================================================================================
// EVENTS
// ================================================================================================
// Emitted on every license mutation so that off-chain indexers can rebuild the
// set of licensed accounts.

/// A license was bought.
/// Topics: `["bought", account]`, data: `{ price }`
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Bought {
    #[topic]
    pub account: Address,
    pub price: i128,
}

/// A license was sold back and its stake refunded.
/// Topics: `["sold", account]`, data: `{ refund }`
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Sold {
    #[topic]
    pub account: Address,
    pub refund: i128,
}

/// An arbitrator changed whether it accepts any seller.
/// Topics: `["accept_any", account]`, data: `{ accept_any }`
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AcceptAny {
    #[topic]
    pub account: Address,
    pub accept_any: bool,
}
