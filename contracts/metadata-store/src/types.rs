/*!
 * Type Definitions for the Metadata Store
 *
 * Offers and user records referenced by the escrow contract. Offers are
 * immutable once added; user records are rewritten only by the escrow
 * contract while it consumes the user's signing nonce.
 */

use soroban_sdk::{contracterror, contractevent, contracttype, Address, BytesN, String};

// ================================================================================================
// CORE DATA STRUCTURES
// ================================================================================================

/// A seller's standing offer.
///
/// # Design Decisions
/// - `asset` is a token contract address; the native asset is traded through
///   its Stellar Asset Contract, so every offer uses the same transfer path
/// - `arbitrator` is fixed at creation and copied into every trade
/// - `margin` is a signed percentage over the reference price, informational only
/// - The public keys let buyer and seller encrypt off-chain messages
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Offer {
    pub owner: Address,
    pub asset: Address,
    pub currency: String,
    pub payment_method: String,
    pub margin: i32,
    pub arbitrator: Address,
    pub buyer_key: BytesN<32>,
    pub seller_key: BytesN<32>,
}

/// Human readable identity bound to an account.
///
/// `identity_key` is the ed25519 key that signed the account's first trade
/// request; later requests must be signed by the same key.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UserRecord {
    pub username: String,
    pub location: String,
    pub identity_key: BytesN<32>,
}

// ================================================================================================
// ERROR DEFINITIONS
// ================================================================================================

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,

    /// Requested offer id was never added
    OfferNotFound = 3,

    /// Account has no user record yet
    UserNotFound = 4,

    /// Owner is not a licensed seller, the arbitrator is not licensed or does
    /// not accept this seller, or the caller is not the registered escrow
    Unauthorized = 5,

    /// Nonce does not match the account's current nonce
    InvalidNonce = 6,

    /// No escrow contract registered as user writer
    EscrowNotSet = 7,
}

// ================================================================================================
// EVENTS
// ================================================================================================

/// Topics: `["offer_added", owner]`, data: `{ offer_id, asset, arbitrator }`
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OfferAdded {
    #[topic]
    pub owner: Address,
    pub offer_id: u64,
    pub asset: Address,
    pub arbitrator: Address,
}

/// Topics: `["user_updated", account]`, data: `{ nonce }` (the nonce consumed)
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UserUpdated {
    #[topic]
    pub account: Address,
    pub nonce: u64,
}
