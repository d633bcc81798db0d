/*!
 * Type Definitions for the Escrow Contract
 *
 * This module defines the trade record, its lifecycle states, the identity
 * proof a buyer attaches to a trade request, the error codes and the events
 * emitted on every status change. Off-chain trackers decode exactly these
 * event layouts.
 */

use soroban_sdk::{contracterror, contractevent, contracttype, Address, BytesN, String};

// ================================================================================================
// CORE DATA STRUCTURES
// ================================================================================================

/// Represents one escrowed trade between a buyer and the owner of an offer.
///
/// A trade is created by the buyer, funded by the seller, marked paid by the
/// buyer once the off-chain payment is sent, and released by the seller once it
/// is received. Either party can bring in the offer's arbitrator by opening a
/// dispute.
///
/// # Invariants
/// - `offer_id`, `buyer`, `seller` and `arbitrator` never change after creation
/// - `fee` is fixed when the trade is funded and never recomputed
/// - `escrowed` is the value currently custodied for this trade; it drops to 0
///   in the same invocation that moves the trade to a terminal status
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Trade {
    /// Offer this trade executes against
    pub offer_id: u64,

    /// Account that created the trade and receives the asset on release
    pub buyer: Address,

    /// Owner of the offer; funds the escrow and gets refunds
    pub seller: Address,

    /// Arbitrator named by the offer at creation time. Keeps the right to
    /// resolve this trade even if its license is later given up.
    pub arbitrator: Address,

    /// Token contract of the traded asset, inherited from the offer
    pub asset: Address,

    /// Amount the buyer receives on release, in the asset's smallest unit
    pub amount: i128,

    /// Fee paid by the seller on top of `amount`; 0 until funded
    pub fee: i128,

    /// Value held by the contract for this trade
    pub escrowed: i128,

    pub status: TradeStatus,

    pub arbitration: Arbitration,

    /// Ledger timestamp at creation (seconds)
    pub created_at: u64,

    /// Past this timestamp either party may cancel a funded trade
    pub expires_at: u64,

    /// Buyer's public key for encrypted off-chain messages
    pub buyer_key: BytesN<32>,

    /// Free-form location label supplied by the buyer
    pub location: String,

    /// Data hash the buyer signed (username and both communication keys)
    pub identity_hash: BytesN<32>,
}

/// Signed identity payload attached to `create_trade`.
///
/// `signature` is an ed25519 signature by `identity_key` over the metadata
/// store's `get_data_hash(username, buyer_key, seller_key)`. `nonce` must equal
/// the buyer's current nonce in the metadata store and is consumed by the call.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IdentityProof {
    pub username: String,
    pub location: String,
    pub buyer_key: BytesN<32>,
    pub seller_key: BytesN<32>,
    pub nonce: u64,
    pub identity_key: BytesN<32>,
    pub signature: BytesN<64>,
}

// ================================================================================================
// ENUMERATIONS
// ================================================================================================

/// Lifecycle of a trade.
///
/// # State Transition Rules
/// - Created → Funded (seller deposits amount + fee)
/// - Created | Funded → Canceled (buyer, seller before funding, or expiry)
/// - Funded → Paid (buyer claims payment sent)
/// - Paid → Released (seller releases)
/// - Funded | Paid → Disputed (either party)
/// - Disputed → Released | Canceled (arbitrator ruling)
///
/// Released and Canceled are final.
#[contracttype]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TradeStatus {
    Created,
    Funded,
    Paid,
    Released,
    Canceled,
    Disputed,
}

impl TradeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TradeStatus::Released | TradeStatus::Canceled)
    }
}

/// Arbitration track of a trade. A resolved dispute leaves the status at
/// Released or Canceled and records the ruling here.
#[contracttype]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Arbitration {
    None,
    Open,
    FavoredBuyer,
    FavoredSeller,
}

// ================================================================================================
// ERROR DEFINITIONS
// ================================================================================================

/// Error codes of the escrow contract.
///
/// # Error Code Ranges
/// - 1-2: Entity not found errors
/// - 3-7: Lifecycle and authorization errors
/// - 8-10: Contract setup errors
/// - 11-13: Validation and transfer errors
///
/// A failing call leaves every trade field untouched: the host rolls back the
/// invocation when an error is returned.
#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    // ========== Entity Not Found Errors (1-2) ==========

    /// Requested trade id was never allocated
    TradeNotFound = 1,

    /// The metadata store has no offer with this id
    OfferNotFound = 2,

    // ========== Lifecycle and Authorization (3-7) ==========

    /// Operation is not legal in the trade's current status
    InvalidState = 3,

    /// Caller does not hold the role the operation requires, or a party is
    /// not licensed
    Unauthorized = 4,

    /// Negative, zero, overflowing, or mismatched funding value
    InvalidAmount = 5,

    /// Identity nonce differs from the buyer's current nonce
    ReplayedNonce = 6,

    /// Identity key differs from the key bound to the buyer's user record
    SignatureInvalid = 7,

    // ========== Contract Setup (8-10) ==========

    /// Trading operations are disabled by the admin
    ContractPaused = 8,

    AlreadyInitialized = 9,

    NotInitialized = 10,

    // ========== Validation and Transfers (11-13) ==========

    /// Expiration window outside the accepted range
    InvalidExpiration = 11,

    /// The trade's expiration has passed; it can only be canceled
    TradeExpired = 12,

    /// A token transfer into or out of escrow failed
    TransferFailed = 13,
}

// ================================================================================================
// EVENTS
// ================================================================================================
// One event per status change. The first topic is the event name; parties and
// trade ids that clients filter on are topics, the rest is map data.

/// Topics: `["created", buyer, seller]`, data: `{ trade_id, offer_id, amount }`
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Created {
    #[topic]
    pub buyer: Address,
    #[topic]
    pub seller: Address,
    pub trade_id: u64,
    pub offer_id: u64,
    pub amount: i128,
}

/// Topics: `["funded", trade_id]`, data: `{ seller, value, fee }`
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Funded {
    #[topic]
    pub trade_id: u64,
    pub seller: Address,
    pub value: i128,
    pub fee: i128,
}

/// Topics: `["paid", trade_id]`, data: `{ buyer }`
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Paid {
    #[topic]
    pub trade_id: u64,
    pub buyer: Address,
}

/// Topics: `["released", trade_id]`, data: `{ buyer, amount, fee }`
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Released {
    #[topic]
    pub trade_id: u64,
    pub buyer: Address,
    pub amount: i128,
    pub fee: i128,
}

/// Topics: `["canceled", trade_id]`, data: `{ caller, refund }`
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Canceled {
    #[topic]
    pub trade_id: u64,
    pub caller: Address,
    pub refund: i128,
}

/// Topics: `["disputed", trade_id]`, data: `{ caller, arbitrator }`
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Disputed {
    #[topic]
    pub trade_id: u64,
    pub caller: Address,
    pub arbitrator: Address,
}

/// Topics: `["resolved", trade_id]`, data: `{ arbitrator, favor_buyer }`
#[contractevent]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Resolved {
    #[topic]
    pub trade_id: u64,
    pub arbitrator: Address,
    pub favor_buyer: bool,
}
