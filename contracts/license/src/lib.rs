/*!
 * License Smart Contract
 *
 * Grants a role capability (seller or arbitrator) to accounts that stake the
 * license price. The escrow contract consults `is_licensed` as a yes/no gate
 * before it accepts a seller's offer or an offer's arbitrator.
 *
 * Business Logic:
 * 1. An account buys a license by staking `price` of the configured token
 * 2. The account stays licensed until it sells the license back
 * 3. Selling refunds the stake and clears every per-account flag
 * 4. Arbitrators can declare that they accept any seller
 */

#![no_std]

mod types;


use soroban_sdk::{contract, contractimpl, log, symbol_short, token, Address, Env, Symbol};

pub use types::{AcceptAny, Bought, Error, Sold};

#[contract]
pub struct LicenseContract;

// Configuration lives in persistent storage, per-account flags are keyed by
// (prefix, account) tuples.
const ADMIN_KEY: Symbol = symbol_short!("ADMIN");
const TOKEN_KEY: Symbol = symbol_short!("TOKEN");
const PRICE_KEY: Symbol = symbol_short!("PRICE");
const STAKE_KEY: Symbol = symbol_short!("STAKE");
const ACCEPT_ANY_KEY: Symbol = symbol_short!("ACPT_ANY");

#[contractimpl]
impl LicenseContract {
    /// Configures the staking token and the license price.
    ///
    /// # Errors
    /// - AlreadyInitialized: if called twice
    /// - InvalidAmount: if `price` is not strictly positive
    pub fn initialize(env: Env, admin: Address, token: Address, price: i128) -> Result<(), Error> {
        if env.storage().persistent().has(&ADMIN_KEY) {
            return Err(Error::AlreadyInitialized);
        }
        if price <= 0 {
            return Err(Error::InvalidAmount);
        }

        env.storage().persistent().set(&ADMIN_KEY, &admin);
        env.storage().persistent().set(&TOKEN_KEY, &token);
        env.storage().persistent().set(&PRICE_KEY, &price);
        Ok(())
    }

    /// Buys a license for `account` by moving the current price into the
    /// contract. The staked amount is remembered so that a later price change
    /// does not alter the refund.
    pub fn buy(env: Env, account: Address) -> Result<(), Error> {
        account.require_auth();

        let stake_key = (STAKE_KEY, account.clone());
        if env.storage().persistent().has(&stake_key) {
            return Err(Error::AlreadyLicensed);
        }

        let token_id: Address = env.storage().persistent().get(&TOKEN_KEY).ok_or(Error::NotInitialized)?;
        let price: i128 = env.storage().persistent().get(&PRICE_KEY).ok_or(Error::NotInitialized)?;

        env.storage().persistent().set(&stake_key, &price);

        let token_client = token::Client::new(&env, &token_id);
        match token_client.try_transfer(&account, &env.current_contract_address(), &price) {
            Ok(Ok(())) => {}
            _ => {
                log!(&env, "License stake transfer failed for amount: {}", price);
                return Err(Error::TransferFailed);
            }
        }

        Bought { account, price }.publish(&env);
        Ok(())
    }

    /// Gives the license back and refunds the staked amount.
    pub fn sell(env: Env, account: Address) -> Result<(), Error> {
        account.require_auth();

        let stake_key = (STAKE_KEY, account.clone());
        let refund: i128 = env.storage().persistent().get(&stake_key).ok_or(Error::NotLicensed)?;
        let token_id: Address = env.storage().persistent().get(&TOKEN_KEY).ok_or(Error::NotInitialized)?;

        env.storage().persistent().remove(&stake_key);
        env.storage().persistent().remove(&(ACCEPT_ANY_KEY, account.clone()));

        let token_client = token::Client::new(&env, &token_id);
        match token_client.try_transfer(&env.current_contract_address(), &account, &refund) {
            Ok(Ok(())) => {}
            _ => {
                log!(&env, "License refund failed for amount: {}", refund);
                return Err(Error::TransferFailed);
            }
        }

        Sold { account, refund }.publish(&env);
        Ok(())
    }

    /// Arbitrator opt-in: when set, the arbitrator can be named by any
    /// seller's offer without an individual request.
    pub fn change_accept_any(env: Env, account: Address, accept_any: bool) -> Result<(), Error> {
        account.require_auth();

        if !Self::is_licensed(env.clone(), account.clone()) {
            return Err(Error::NotLicensed);
        }

        env.storage().persistent().set(&(ACCEPT_ANY_KEY, account.clone()), &accept_any);
        AcceptAny { account, accept_any }.publish(&env);
        Ok(())
    }

    /// Changes the price paid by future buyers. Existing stakes are untouched.
    pub fn update_price(env: Env, price: i128) -> Result<(), Error> {
        let admin: Address = env.storage().persistent().get(&ADMIN_KEY).ok_or(Error::NotInitialized)?;
        admin.require_auth();

        if price <= 0 {
            return Err(Error::InvalidAmount);
        }
        env.storage().persistent().set(&PRICE_KEY, &price);
        Ok(())
    }

    // ================================================================================================
    // QUERY FUNCTIONS
    // ================================================================================================

    pub fn is_licensed(env: Env, account: Address) -> bool {
        env.storage().persistent().has(&(STAKE_KEY, account))
    }

    pub fn accepts_any(env: Env, account: Address) -> bool {
        env.storage().persistent().get(&(ACCEPT_ANY_KEY, account)).unwrap_or(false)
    }

    pub fn get_price(env: Env) -> Result<i128, Error> {
        env.storage().persistent().get(&PRICE_KEY).ok_or(Error::NotInitialized)
    }

    pub fn get_token(env: Env) -> Result<Address, Error> {
        env.storage().persistent().get(&TOKEN_KEY).ok_or(Error::NotInitialized)
    }
}
