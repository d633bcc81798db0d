/*!
 * Interfaces of the contracts the escrow consults.
 *
 * - License gate: yes/no capability check per role deployment
 * - Metadata store: read-only offers and user records, the identity data hash,
 *   and the per-user nonce that the escrow consumes when it accepts a signed
 *   identity payload
 *
 * The record types mirror the metadata store's layouts field for field; the
 * host decodes them by field name.
 */

use soroban_sdk::{contractclient, contracttype, symbol_short, Address, BytesN, Env, String, Symbol};

#[contractclient(name = "LicenseClient")]
pub trait LicenseInterface {
    fn is_licensed(env: Env, account: Address) -> bool;
}

#[contractclient(name = "MetadataStoreClient")]
pub trait MetadataStoreInterface {
    fn offer(env: Env, offer_id: u64) -> Offer;
    fn user(env: Env, account: Address) -> UserRecord;
    fn user_nonce(env: Env, account: Address) -> u64;
    fn get_data_hash(env: Env, username: String, buyer_key: BytesN<32>, seller_key: BytesN<32>) -> BytesN<32>;
    fn update_user(
        env: Env,
        account: Address,
        username: String,
        location: String,
        identity_key: BytesN<32>,
        nonce: u64,
    );
}

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

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UserRecord {
    pub username: String,
    pub location: String,
    pub identity_key: BytesN<32>,
}

/// Role whose license deployment is consulted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Role {
    Seller,
    Arbitrator,
}

impl Role {
    /// Storage key under which the escrow keeps the license contract for
    /// this role.
    pub(crate) fn license_key(self) -> Symbol {
        match self {
            Role::Seller => symbol_short!("SELL_LIC"),
            Role::Arbitrator => symbol_short!("ARB_LIC"),
        }
    }
}
