/*!
 * Metadata Store Smart Contract
 *
 * Read-mostly registry consumed by the escrow contract:
 * - Offers published by licensed sellers, naming a licensed arbitrator
 * - User records binding a username and location to an account
 * - Per-account nonces protecting signed identity payloads against replay
 *
 * Only the registered escrow contract may rewrite user records, and it must
 * present the account's current nonce to do so.
 */

#![no_std]

mod types;

#[cfg(test)]
mod test;

use soroban_sdk::{
    contract, contractclient, contractimpl, symbol_short, xdr::ToXdr, Address, Bytes, BytesN, Env,
    String, Symbol,
};

pub use types::{Error, Offer, OfferAdded, UserRecord, UserUpdated};

/// License gate as seen by the store: seller licenses for offer owners,
/// arbitrator licenses (plus the accept-any opt-in) for named arbitrators.
#[contractclient(name = "LicenseClient")]
pub trait LicenseInterface {
    fn is_licensed(env: Env, account: Address) -> bool;
    fn accepts_any(env: Env, account: Address) -> bool;
}

#[contract]
pub struct MetadataStoreContract;

const ADMIN_KEY: Symbol = symbol_short!("ADMIN");
const SELLER_LICENSE_KEY: Symbol = symbol_short!("SELL_LIC");
const ARBITRATION_LICENSE_KEY: Symbol = symbol_short!("ARB_LIC");
const ESCROW_KEY: Symbol = symbol_short!("ESCROW");
const NEXT_OFFER_ID: Symbol = symbol_short!("NEXT_O_ID");
const OFFER_KEY: Symbol = symbol_short!("OFFER");
const USER_KEY: Symbol = symbol_short!("USER");
const NONCE_KEY: Symbol = symbol_short!("NONCE");

#[contractimpl]
impl MetadataStoreContract {
    pub fn initialize(
        env: Env,
        admin: Address,
        seller_license: Address,
        arbitration_license: Address,
    ) -> Result<(), Error> {
        if env.storage().persistent().has(&ADMIN_KEY) {
            return Err(Error::AlreadyInitialized);
        }

        env.storage().persistent().set(&ADMIN_KEY, &admin);
        env.storage().persistent().set(&SELLER_LICENSE_KEY, &seller_license);
        env.storage().persistent().set(&ARBITRATION_LICENSE_KEY, &arbitration_license);
        env.storage().instance().set(&NEXT_OFFER_ID, &0u64);
        Ok(())
    }

    /// Registers the escrow contract as the only writer of user records.
    pub fn set_escrow(env: Env, escrow: Address) -> Result<(), Error> {
        let admin: Address = env.storage().persistent().get(&ADMIN_KEY).ok_or(Error::NotInitialized)?;
        admin.require_auth();

        env.storage().persistent().set(&ESCROW_KEY, &escrow);
        Ok(())
    }

    /// Publishes a new offer.
    ///
    /// # Security Checks
    /// - Requires owner authorization
    /// - Owner must hold a seller license
    /// - Arbitrator must hold an arbitrator license, accept any seller, and
    ///   differ from the owner
    ///
    /// # Returns
    /// The id of the new offer, assigned sequentially from 0
    pub fn add_offer(
        env: Env,
        owner: Address,
        asset: Address,
        currency: String,
        payment_method: String,
        margin: i32,
        arbitrator: Address,
        buyer_key: BytesN<32>,
        seller_key: BytesN<32>,
    ) -> Result<u64, Error> {
        owner.require_auth();

        if owner == arbitrator {
            return Err(Error::Unauthorized);
        }

        let seller_license: Address = env.storage().persistent().get(&SELLER_LICENSE_KEY).ok_or(Error::NotInitialized)?;
        if !LicenseClient::new(&env, &seller_license).is_licensed(&owner) {
            return Err(Error::Unauthorized);
        }

        let arbitration_license: Address = env.storage().persistent().get(&ARBITRATION_LICENSE_KEY).ok_or(Error::NotInitialized)?;
        let arbitration = LicenseClient::new(&env, &arbitration_license);
        if !arbitration.is_licensed(&arbitrator) || !arbitration.accepts_any(&arbitrator) {
            return Err(Error::Unauthorized);
        }

        let offer_id: u64 = env.storage().instance().get(&NEXT_OFFER_ID).ok_or(Error::NotInitialized)?;
        let offer = Offer {
            owner: owner.clone(),
            asset: asset.clone(),
            currency,
            payment_method,
            margin,
            arbitrator: arbitrator.clone(),
            buyer_key,
            seller_key,
        };

        env.storage().persistent().set(&(OFFER_KEY, offer_id), &offer);
        env.storage().instance().set(&NEXT_OFFER_ID, &(offer_id + 1));

        OfferAdded { owner, offer_id, asset, arbitrator }.publish(&env);
        Ok(offer_id)
    }

    /// Rewrites the user record of `account` and consumes its nonce.
    ///
    /// Only callable by the registered escrow contract, which verifies the
    /// account's signature before calling in.
    pub fn update_user(
        env: Env,
        account: Address,
        username: String,
        location: String,
        identity_key: BytesN<32>,
        nonce: u64,
    ) -> Result<(), Error> {
        let escrow: Address = env.storage().persistent().get(&ESCROW_KEY).ok_or(Error::EscrowNotSet)?;
        escrow.require_auth();

        let nonce_key = (NONCE_KEY, account.clone());
        let current: u64 = env.storage().persistent().get(&nonce_key).unwrap_or(0);
        if nonce != current {
            return Err(Error::InvalidNonce);
        }

        let record = UserRecord { username, location, identity_key };
        env.storage().persistent().set(&(USER_KEY, account.clone()), &record);
        env.storage().persistent().set(&nonce_key, &(current + 1));

        UserUpdated { account, nonce }.publish(&env);
        Ok(())
    }

    // ================================================================================================
    // QUERY FUNCTIONS
    // ================================================================================================

    pub fn offer(env: Env, offer_id: u64) -> Result<Offer, Error> {
        env.storage().persistent().get(&(OFFER_KEY, offer_id)).ok_or(Error::OfferNotFound)
    }

    pub fn get_offer_count(env: Env) -> u64 {
        env.storage().instance().get(&NEXT_OFFER_ID).unwrap_or(0)
    }

    pub fn user(env: Env, account: Address) -> Result<UserRecord, Error> {
        env.storage().persistent().get(&(USER_KEY, account)).ok_or(Error::UserNotFound)
    }

    pub fn user_nonce(env: Env, account: Address) -> u64 {
        env.storage().persistent().get(&(NONCE_KEY, account)).unwrap_or(0)
    }

    /// Hash an account signs to bind `username` and both communication keys
    /// to a trade request. The store address is mixed in so that a signature
    /// for one deployment is worthless against another.
    pub fn get_data_hash(
        env: Env,
        username: String,
        buyer_key: BytesN<32>,
        seller_key: BytesN<32>,
    ) -> BytesN<32> {
        let mut payload = Bytes::new(&env);
        payload.append(&env.current_contract_address().to_xdr(&env));
        payload.append(&username.to_xdr(&env));
        payload.append(&Bytes::from(buyer_key));
        payload.append(&Bytes::from(seller_key));
        env.crypto().sha256(&payload).into()
    }

    pub fn get_escrow(env: Env) -> Result<Address, Error> {
        env.storage().persistent().get(&ESCROW_KEY).ok_or(Error::EscrowNotSet)
    }
}
