/*!
 * P2P Escrow Smart Contract
 *
 * This contract holds a seller's asset in escrow while a buyer settles the
 * off-chain side of the trade (fiat payment through the offer's payment method).
 * Key features:
 * - Trade lifecycle: create, fund, pay, release, cancel
 * - Dispute branch resolved by the arbitrator named in the offer
 * - Basis point trading fee charged to the seller at funding time
 * - License gate for sellers and arbitrators
 * - Signed identity payload with per-user nonce against replay
 * - Pausable by the admin for emergency situations
 *
 * Business Logic:
 * 1. A licensed seller publishes an offer in the metadata store
 * 2. A buyer creates a trade against the offer, signing its identity payload
 * 3. The seller funds the trade with exactly amount + fee
 * 4. The buyer pays off-chain and marks the trade paid
 * 5. The seller releases: amount to the buyer, fee to the fee sink
 * 6. Either party can open a dispute; the arbitrator releases or refunds
 *
 * Every status change emits an event that off-chain trackers follow.
 */

#![no_std]

mod fees;
mod interfaces;
mod types;


use soroban_sdk::{contract, contractimpl, log, symbol_short, token, Address, Bytes, BytesN, Env, Symbol};

pub use fees::{compute_fee, funding_amount, BASIS_POINTS_DIVISOR, MAX_FEE_RATE};
pub use interfaces::{LicenseClient, MetadataStoreClient, Offer, Role, UserRecord};
pub use types::{
    Arbitration, Canceled, Created, Disputed, Error, Funded, IdentityProof, Paid, Released, Resolved, Trade,
    TradeStatus,
};

#[contract]
pub struct EscrowContract;

// Storage keys - short symbols. Configuration is persistent, the trade counter
// and pause flag are instance data, each trade is its own persistent entry.
const ADMIN_KEY: Symbol = symbol_short!("ADMIN");                 // Admin address
const METADATA_KEY: Symbol = symbol_short!("METADATA");           // Metadata store contract
const FEE_SINK_KEY: Symbol = symbol_short!("FEE_SINK");           // Receives trading fees
const FEE_RATE_KEY: Symbol = symbol_short!("FEE_RATE");           // Fee rate in basis points
const NEXT_TRADE_ID: Symbol = symbol_short!("NEXT_T_ID");         // Counter for trade ids
const PAUSED_KEY: Symbol = symbol_short!("PAUSED");               // Pause switch
const TRADE_KEY: Symbol = symbol_short!("TRADE");                 // (TRADE_KEY, trade_id) -> Trade

// Accepted expiration window for new trades
const MIN_EXPIRATION_MINUTES: u64 = 1;
const MAX_EXPIRATION_MINUTES: u64 = 7 * 24 * 60;

#[contractimpl]
impl EscrowContract {
    /// Initializes the escrow with its collaborators and fee configuration.
    /// Can only be called once.
    ///
    /// # Arguments
    /// * `admin` - Address allowed to pause, and to change fees and admin
    /// * `seller_license` - License deployment consulted for sellers
    /// * `arbitration_license` - License deployment consulted for arbitrators
    /// * `metadata_store` - Offer and user store; must list this contract as its escrow
    /// * `fee_sink` - Receives the fee of every released trade
    /// * `fee_rate` - Fee rate in basis points, at most `MAX_FEE_RATE`
    pub fn initialize(
        env: Env,
        admin: Address,
        seller_license: Address,
        arbitration_license: Address,
        metadata_store: Address,
        fee_sink: Address,
        fee_rate: u32,
    ) -> Result<(), Error> {
        if env.storage().persistent().has(&ADMIN_KEY) {
            return Err(Error::AlreadyInitialized);
        }
        if fee_rate > MAX_FEE_RATE {
            return Err(Error::InvalidAmount);
        }

        env.storage().persistent().set(&ADMIN_KEY, &admin);
        env.storage().persistent().set(&Role::Seller.license_key(), &seller_license);
        env.storage().persistent().set(&Role::Arbitrator.license_key(), &arbitration_license);
        env.storage().persistent().set(&METADATA_KEY, &metadata_store);
        env.storage().persistent().set(&FEE_SINK_KEY, &fee_sink);
        env.storage().persistent().set(&FEE_RATE_KEY, &fee_rate);

        env.storage().instance().set(&NEXT_TRADE_ID, &0u64);
        env.storage().instance().set(&PAUSED_KEY, &false);

        Ok(())
    }

    fn _require_admin(env: &Env) -> Result<(), Error> {
        let admin: Address = env.storage().persistent().get(&ADMIN_KEY).ok_or(Error::NotInitialized)?;
        admin.require_auth();
        Ok(())
    }

    fn _is_paused(env: &Env) -> bool {
        env.storage().instance().get(&PAUSED_KEY).unwrap_or(false)
    }

    fn _metadata_store(env: &Env) -> Result<MetadataStoreClient<'_>, Error> {
        let store_id: Address = env.storage().persistent().get(&METADATA_KEY).ok_or(Error::NotInitialized)?;
        Ok(MetadataStoreClient::new(env, &store_id))
    }

    /// Asks the license deployment of `role` whether `account` currently holds
    /// a license.
    fn _is_licensed(env: &Env, account: &Address, role: Role) -> Result<bool, Error> {
        let license_id: Address = env.storage().persistent().get(&role.license_key()).ok_or(Error::NotInitialized)?;
        Ok(LicenseClient::new(env, &license_id).is_licensed(account))
    }

    fn _load_trade(env: &Env, trade_id: u64) -> Result<Trade, Error> {
        env.storage().persistent().get(&(TRADE_KEY, trade_id)).ok_or(Error::TradeNotFound)
    }

    fn _save_trade(env: &Env, trade_id: u64, trade: &Trade) {
        env.storage().persistent().set(&(TRADE_KEY, trade_id), trade);
    }

    /// Expiration is evaluated lazily; nothing expires a trade on its own.
    fn _is_expired(env: &Env, trade: &Trade) -> bool {
        env.ledger().timestamp() >= trade.expires_at
    }

    fn _transfer(env: &Env, asset: &Address, from: &Address, to: &Address, amount: i128) -> Result<(), Error> {
        let asset_client = token::Client::new(env, asset);
        match asset_client.try_transfer(from, to, &amount) {
            Ok(Ok(())) => Ok(()),
            _ => {
                log!(env, "Transfer of {} failed", amount);
                Err(Error::TransferFailed)
            }
        }
    }

    /// Pays out a trade in the buyer's favour: amount to the buyer, fee to the
    /// fee sink, anything left over back to the seller.
    fn _settle_to_buyer(env: &Env, trade: &Trade, escrowed: i128) -> Result<(), Error> {
        let vault = env.current_contract_address();
        Self::_transfer(env, &trade.asset, &vault, &trade.buyer, trade.amount)?;

        if trade.fee > 0 {
            let fee_sink: Address = env.storage().persistent().get(&FEE_SINK_KEY).ok_or(Error::NotInitialized)?;
            Self::_transfer(env, &trade.asset, &vault, &fee_sink, trade.fee)?;
        }

        let remainder = escrowed - trade.amount - trade.fee;
        if remainder > 0 {
            Self::_transfer(env, &trade.asset, &vault, &trade.seller, remainder)?;
        }
        Ok(())
    }

    /// Checks the buyer's identity payload against the metadata store and
    /// returns the data hash it signed. The nonce is compared here and consumed
    /// by the store afterwards.
    fn _verify_identity(
        env: &Env,
        store: &MetadataStoreClient,
        buyer: &Address,
        identity: &IdentityProof,
    ) -> Result<BytesN<32>, Error> {
        if identity.nonce != store.user_nonce(buyer) {
            return Err(Error::ReplayedNonce);
        }

        if let Ok(Ok(record)) = store.try_user(buyer) {
            if record.identity_key != identity.identity_key {
                return Err(Error::SignatureInvalid);
            }
        }

        let data_hash = store.get_data_hash(&identity.username, &identity.buyer_key, &identity.seller_key);
        // Traps the invocation when the signature does not verify
        env.crypto().ed25519_verify(&identity.identity_key, &Bytes::from(data_hash.clone()), &identity.signature);

        Ok(data_hash)
    }

    // ================================================================================================
    // TRADE LIFECYCLE
    // ================================================================================================

    /// Creates a trade against an offer. The buyer's signed identity payload is
    /// verified and its nonce consumed.
    ///
    /// # Security Checks
    /// - Requires buyer authorization
    /// - Buyer cannot be the offer's seller or arbitrator
    /// - Seller and arbitrator must currently be licensed
    /// - Identity nonce must be the buyer's current nonce
    /// - Identity signature must verify over the store's data hash
    ///
    /// # Returns
    /// The id of the new trade
    ///
    /// # Errors
    /// - ContractPaused, InvalidAmount, InvalidExpiration, OfferNotFound
    /// - Unauthorized: self-trade or unlicensed seller/arbitrator
    /// - ReplayedNonce: stale or future nonce
    /// - SignatureInvalid: identity key differs from the buyer's bound key
    ///
    /// A signature that does not verify is not reported as SignatureInvalid:
    /// the host's ed25519 check traps and the invocation fails without an
    /// error code. Clients see a host error instead of `Err(Error)`.
    pub fn create_trade(
        env: Env,
        buyer: Address,
        offer_id: u64,
        amount: i128,
        expiration_minutes: u64,
        identity: IdentityProof,
    ) -> Result<u64, Error> {
        if Self::_is_paused(&env) { return Err(Error::ContractPaused); }

        buyer.require_auth();

        if amount <= 0 {
            return Err(Error::InvalidAmount);
        }
        if !(MIN_EXPIRATION_MINUTES..=MAX_EXPIRATION_MINUTES).contains(&expiration_minutes) {
            return Err(Error::InvalidExpiration);
        }

        let store = Self::_metadata_store(&env)?;
        let offer = match store.try_offer(&offer_id) {
            Ok(Ok(offer)) => offer,
            _ => return Err(Error::OfferNotFound),
        };

        if buyer == offer.owner || buyer == offer.arbitrator {
            return Err(Error::Unauthorized);
        }
        if !Self::_is_licensed(&env, &offer.owner, Role::Seller)? {
            log!(&env, "Seller license missing for offer {}", offer_id);
            return Err(Error::Unauthorized);
        }
        if !Self::_is_licensed(&env, &offer.arbitrator, Role::Arbitrator)? {
            log!(&env, "Arbitrator license missing for offer {}", offer_id);
            return Err(Error::Unauthorized);
        }

        let identity_hash = Self::_verify_identity(&env, &store, &buyer, &identity)?;
        store.update_user(&buyer, &identity.username, &identity.location, &identity.identity_key, &identity.nonce);

        let trade_id: u64 = env.storage().instance().get(&NEXT_TRADE_ID).ok_or(Error::NotInitialized)?;
        let now = env.ledger().timestamp();

        let trade = Trade {
            offer_id,
            buyer: buyer.clone(),
            seller: offer.owner.clone(),
            arbitrator: offer.arbitrator,
            asset: offer.asset,
            amount,
            fee: 0,
            escrowed: 0,
            status: TradeStatus::Created,
            arbitration: Arbitration::None,
            created_at: now,
            expires_at: now + expiration_minutes * 60,
            buyer_key: identity.buyer_key,
            location: identity.location,
            identity_hash,
        };

        Self::_save_trade(&env, trade_id, &trade);
        env.storage().instance().set(&NEXT_TRADE_ID, &(trade_id + 1));

        Created { buyer, seller: offer.owner, trade_id, offer_id, amount }.publish(&env);

        Ok(trade_id)
    }

    /// Moves `value` of the offer's asset from the seller into escrow.
    ///
    /// `value` must be exactly the trade amount plus the fee at the current
    /// rate; the fee is fixed on the trade from here on.
    ///
    /// # Errors
    /// - InvalidState: trade is not in Created status
    /// - Unauthorized: funder is not the seller
    /// - TradeExpired: the expiration passed before funding
    /// - InvalidAmount: value differs from amount + fee
    /// - TransferFailed: seller balance insufficient
    pub fn fund(env: Env, trade_id: u64, funder: Address, value: i128) -> Result<(), Error> {
        if Self::_is_paused(&env) { return Err(Error::ContractPaused); }

        funder.require_auth();

        let mut trade = Self::_load_trade(&env, trade_id)?;

        if trade.status != TradeStatus::Created {
            return Err(Error::InvalidState);
        }
        if funder != trade.seller {
            return Err(Error::Unauthorized);
        }
        if Self::_is_expired(&env, &trade) {
            return Err(Error::TradeExpired);
        }

        let fee = compute_fee(trade.amount, Self::get_fee_rate(env.clone()))?;
        let required = trade.amount.checked_add(fee).ok_or(Error::InvalidAmount)?;
        if value != required {
            log!(&env, "Funding mismatch. Required: {}, Provided: {}", required, value);
            return Err(Error::InvalidAmount);
        }

        // State first, then the transfer; a failed transfer rolls both back
        trade.fee = fee;
        trade.escrowed = value;
        trade.status = TradeStatus::Funded;
        Self::_save_trade(&env, trade_id, &trade);

        Funded { trade_id, seller: funder.clone(), value, fee }.publish(&env);

        Self::_transfer(&env, &trade.asset, &funder, &env.current_contract_address(), value)
    }

    /// Buyer's claim that the off-chain payment was sent. No value moves.
    pub fn pay(env: Env, trade_id: u64, caller: Address) -> Result<(), Error> {
        if Self::_is_paused(&env) { return Err(Error::ContractPaused); }

        caller.require_auth();

        let mut trade = Self::_load_trade(&env, trade_id)?;

        if trade.status != TradeStatus::Funded {
            return Err(Error::InvalidState);
        }
        if caller != trade.buyer {
            return Err(Error::Unauthorized);
        }

        trade.status = TradeStatus::Paid;
        Self::_save_trade(&env, trade_id, &trade);

        Paid { trade_id, buyer: caller }.publish(&env);
        Ok(())
    }

    /// Seller confirms receipt of the payment: the amount goes to the buyer
    /// and the fee to the fee sink.
    ///
    /// # Errors
    /// - InvalidState: trade is not in Paid status
    /// - Unauthorized: caller is not the seller
    pub fn release(env: Env, trade_id: u64, caller: Address) -> Result<(), Error> {
        if Self::_is_paused(&env) { return Err(Error::ContractPaused); }

        caller.require_auth();

        let mut trade = Self::_load_trade(&env, trade_id)?;

        if trade.status != TradeStatus::Paid {
            return Err(Error::InvalidState);
        }
        if caller != trade.seller {
            return Err(Error::Unauthorized);
        }

        let escrowed = trade.escrowed;
        trade.escrowed = 0;
        trade.status = TradeStatus::Released;
        Self::_save_trade(&env, trade_id, &trade);

        Released { trade_id, buyer: trade.buyer.clone(), amount: trade.amount, fee: trade.fee }.publish(&env);

        Self::_settle_to_buyer(&env, &trade, escrowed)
    }

    /// Cancels a trade that has not been paid yet and refunds the seller.
    ///
    /// # Who may cancel
    /// - The buyer, while Created or Funded
    /// - The seller, while Created
    /// - Either party once the expiration has passed
    pub fn cancel(env: Env, trade_id: u64, caller: Address) -> Result<(), Error> {
        if Self::_is_paused(&env) { return Err(Error::ContractPaused); }

        caller.require_auth();

        let mut trade = Self::_load_trade(&env, trade_id)?;

        if trade.status != TradeStatus::Created && trade.status != TradeStatus::Funded {
            return Err(Error::InvalidState);
        }

        let is_buyer = caller == trade.buyer;
        let is_seller = caller == trade.seller;
        if !is_buyer && !is_seller {
            return Err(Error::Unauthorized);
        }
        let allowed = is_buyer
            || (is_seller && trade.status == TradeStatus::Created)
            || Self::_is_expired(&env, &trade);
        if !allowed {
            return Err(Error::Unauthorized);
        }

        let refund = trade.escrowed;
        trade.escrowed = 0;
        trade.status = TradeStatus::Canceled;
        Self::_save_trade(&env, trade_id, &trade);

        Canceled { trade_id, caller, refund }.publish(&env);

        if refund > 0 {
            Self::_transfer(&env, &trade.asset, &env.current_contract_address(), &trade.seller, refund)?;
        }
        Ok(())
    }

    // ================================================================================================
    // DISPUTE RESOLUTION SYSTEM
    // ================================================================================================

    /// Brings the offer's arbitrator into a funded or paid trade.
    pub fn open_dispute(env: Env, trade_id: u64, caller: Address) -> Result<(), Error> {
        if Self::_is_paused(&env) { return Err(Error::ContractPaused); }

        caller.require_auth();

        let mut trade = Self::_load_trade(&env, trade_id)?;

        if trade.status != TradeStatus::Funded && trade.status != TradeStatus::Paid {
            return Err(Error::InvalidState);
        }
        if caller != trade.buyer && caller != trade.seller {
            return Err(Error::Unauthorized);
        }

        trade.status = TradeStatus::Disputed;
        trade.arbitration = Arbitration::Open;
        Self::_save_trade(&env, trade_id, &trade);

        Disputed { trade_id, caller, arbitrator: trade.arbitrator }.publish(&env);
        Ok(())
    }

    /// Arbitrator's ruling on a disputed trade.
    ///
    /// # Resolution Logic
    /// - `favor_buyer`: settled as a release, fee collected, status Released
    /// - otherwise: full escrow refunded to the seller, status Canceled
    ///
    /// The arbitrator's license is not re-checked: the right to resolve was
    /// granted when the trade was created.
    pub fn resolve_dispute(env: Env, trade_id: u64, arbitrator: Address, favor_buyer: bool) -> Result<(), Error> {
        arbitrator.require_auth();

        let mut trade = Self::_load_trade(&env, trade_id)?;

        if trade.status != TradeStatus::Disputed {
            return Err(Error::InvalidState);
        }
        if arbitrator != trade.arbitrator {
            return Err(Error::Unauthorized);
        }

        let escrowed = trade.escrowed;
        trade.escrowed = 0;
        if favor_buyer {
            trade.status = TradeStatus::Released;
            trade.arbitration = Arbitration::FavoredBuyer;
        } else {
            trade.status = TradeStatus::Canceled;
            trade.arbitration = Arbitration::FavoredSeller;
        }
        Self::_save_trade(&env, trade_id, &trade);

        Resolved { trade_id, arbitrator, favor_buyer }.publish(&env);

        if favor_buyer {
            Self::_settle_to_buyer(&env, &trade, escrowed)
        } else {
            Self::_transfer(&env, &trade.asset, &env.current_contract_address(), &trade.seller, escrowed)
        }
    }

    // ================================================================================================
    // ADMINISTRATIVE FUNCTIONS
    // ================================================================================================

    /// Stops every trade transition until `unpause`, except `resolve_dispute`
    /// so arbitrators can still settle disputed trades.
    ///
    /// # Security Checks
    /// - Requires admin authorization
    ///
    /// # Errors
    /// - NotInitialized: no admin stored
    pub fn pause(env: Env) -> Result<(), Error> {
        Self::_require_admin(&env)?;
        env.storage().instance().set(&PAUSED_KEY, &true);
        Ok(())
    }

    /// Resumes trading after a pause. Trades keep their expiry, so some may
    /// have expired while paused.
    ///
    /// # Security Checks
    /// - Requires admin authorization
    ///
    /// # Errors
    /// - NotInitialized: no admin stored
    pub fn unpause(env: Env) -> Result<(), Error> {
        Self::_require_admin(&env)?;
        env.storage().instance().set(&PAUSED_KEY, &false);
        Ok(())
    }

    /// Hands admin rights over. Both the current and the new admin sign.
    ///
    /// # Errors
    /// - NotInitialized: no admin stored
    pub fn update_admin(env: Env, new_admin: Address) -> Result<(), Error> {
        Self::_require_admin(&env)?;
        new_admin.require_auth();

        env.storage().persistent().set(&ADMIN_KEY, &new_admin);
        Ok(())
    }

    /// Changes the rate applied to trades funded from now on. Funded trades
    /// keep the fee they were funded with.
    ///
    /// # Arguments
    /// * `new_fee_rate` - Basis points, at most `MAX_FEE_RATE` (10%)
    ///
    /// # Security Checks
    /// - Requires admin authorization
    ///
    /// # Errors
    /// - NotInitialized: no admin stored
    /// - InvalidAmount: rate above `MAX_FEE_RATE`
    pub fn update_fee_rate(env: Env, new_fee_rate: u32) -> Result<(), Error> {
        Self::_require_admin(&env)?;

        if new_fee_rate > MAX_FEE_RATE {
            return Err(Error::InvalidAmount);
        }
        env.storage().persistent().set(&FEE_RATE_KEY, &new_fee_rate);
        Ok(())
    }

    /// Sets the address that receives fees. Applies to every release from
    /// now on, including trades funded before the change.
    ///
    /// # Arguments
    /// * `new_fee_sink` - Any account or contract address
    ///
    /// # Security Checks
    /// - Requires admin authorization
    ///
    /// # Errors
    /// - NotInitialized: no admin stored
    pub fn update_fee_sink(env: Env, new_fee_sink: Address) -> Result<(), Error> {
        Self::_require_admin(&env)?;
        env.storage().persistent().set(&FEE_SINK_KEY, &new_fee_sink);
        Ok(())
    }

    // ================================================================================================
    // QUERY FUNCTIONS (GETTERS)
    // ================================================================================================

    /// # Errors
    /// - TradeNotFound: no trade with this id
    pub fn get_trade(env: Env, trade_id: u64) -> Result<Trade, Error> {
        Self::_load_trade(&env, trade_id)
    }

    /// Id the next trade will get, which is also the number of trades created.
    pub fn get_next_trade_id(env: Env) -> u64 {
        env.storage().instance().get(&NEXT_TRADE_ID).unwrap_or(0)
    }

    /// Exact value `fund` expects for this trade: amount plus the fee at the
    /// current rate, or the fixed fee once funded.
    pub fn get_funding_amount(env: Env, trade_id: u64) -> Result<i128, Error> {
        let trade = Self::_load_trade(&env, trade_id)?;
        if trade.status == TradeStatus::Created {
            funding_amount(trade.amount, Self::get_fee_rate(env))
        } else {
            trade.amount.checked_add(trade.fee).ok_or(Error::InvalidAmount)
        }
    }

    /// Fee a trade of `amount` would be charged at the current rate.
    pub fn fee_for(env: Env, amount: i128) -> Result<i128, Error> {
        compute_fee(amount, Self::get_fee_rate(env))
    }

    pub fn get_fee_rate(env: Env) -> u32 {
        env.storage().persistent().get(&FEE_RATE_KEY).unwrap_or(0)
    }

    pub fn get_fee_sink(env: Env) -> Result<Address, Error> {
        env.storage().persistent().get(&FEE_SINK_KEY).ok_or(Error::NotInitialized)
    }

    pub fn get_admin(env: Env) -> Result<Address, Error> {
        env.storage().persistent().get(&ADMIN_KEY).ok_or(Error::NotInitialized)
    }

    pub fn is_paused(env: Env) -> bool {
        Self::_is_paused(&env)
    }
}
