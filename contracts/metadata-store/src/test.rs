#![cfg(test)]

use super::*;
use license::{LicenseContract, LicenseContractClient};
use soroban_sdk::{testutils::Address as _, token::StellarAssetClient, Address, BytesN, Env, String};

const PUBKEY_A: [u8; 32] = [0xAA; 32];
const PUBKEY_B: [u8; 32] = [0xBB; 32];

struct Setup {
    env: Env,
    client: MetadataStoreContractClient<'static>,
    seller_license: LicenseContractClient<'static>,
    arbitration_license: LicenseContractClient<'static>,
    stake_token: Address,
}

fn setup_test_env() -> Setup {
    let env = Env::default();
    env.mock_all_auths();

    let admin = Address::generate(&env);
    let stake_token = env.register_stellar_asset_contract_v2(Address::generate(&env)).address();

    let seller_license = LicenseContractClient::new(&env, &env.register(LicenseContract, ()));
    seller_license.initialize(&admin, &stake_token, &10);
    let arbitration_license = LicenseContractClient::new(&env, &env.register(LicenseContract, ()));
    arbitration_license.initialize(&admin, &stake_token, &10);

    let contract_id = env.register(MetadataStoreContract, ());
    let client = MetadataStoreContractClient::new(&env, &contract_id);
    client.initialize(&admin, &seller_license.address, &arbitration_license.address);

    Setup { env, client, seller_license, arbitration_license, stake_token }
}

impl Setup {
    fn licensed(&self, license: &LicenseContractClient<'static>) -> Address {
        let account = Address::generate(&self.env);
        StellarAssetClient::new(&self.env, &self.stake_token).mint(&account, &1000);
        license.buy(&account);
        account
    }

    fn seller(&self) -> Address {
        self.licensed(&self.seller_license)
    }

    fn arbitrator(&self) -> Address {
        let arbitrator = self.licensed(&self.arbitration_license);
        self.arbitration_license.change_accept_any(&arbitrator, &true);
        arbitrator
    }

    fn try_add_offer(&self, owner: &Address, arbitrator: &Address) -> Result<u64, Error> {
        let asset = Address::generate(&self.env);
        match self.client.try_add_offer(
            owner,
            &asset,
            &String::from_str(&self.env, "USD"),
            &String::from_str(&self.env, "Bank transfer"),
            &0,
            arbitrator,
            &BytesN::from_array(&self.env, &PUBKEY_A),
            &BytesN::from_array(&self.env, &PUBKEY_B),
        ) {
            Ok(Ok(id)) => Ok(id),
            Err(Ok(e)) => Err(e),
            other => panic!("unexpected invocation result: {:?}", other),
        }
    }
}

#[test]
fn test_add_offer() {
    let setup = setup_test_env();
    let seller = setup.seller();
    let arbitrator = setup.arbitrator();

    assert_eq!(setup.try_add_offer(&seller, &arbitrator), Ok(0));
    assert_eq!(setup.try_add_offer(&seller, &arbitrator), Ok(1));
    assert_eq!(setup.client.get_offer_count(), 2);

    let offer = setup.client.offer(&1);
    assert_eq!(offer.owner, seller);
    assert_eq!(offer.arbitrator, arbitrator);
    assert_eq!(offer.currency, String::from_str(&setup.env, "USD"));
}

#[test]
fn test_add_offer_requires_seller_license() {
    let setup = setup_test_env();
    let unlicensed = Address::generate(&setup.env);
    let arbitrator = setup.arbitrator();

    assert_eq!(setup.try_add_offer(&unlicensed, &arbitrator), Err(Error::Unauthorized));
}

#[test]
fn test_add_offer_requires_accepting_arbitrator() {
    let setup = setup_test_env();
    let seller = setup.seller();
    let reluctant = setup.licensed(&setup.arbitration_license);
    let unlicensed = Address::generate(&setup.env);

    assert_eq!(setup.try_add_offer(&seller, &reluctant), Err(Error::Unauthorized));
    assert_eq!(setup.try_add_offer(&seller, &unlicensed), Err(Error::Unauthorized));
    assert_eq!(setup.try_add_offer(&seller, &seller), Err(Error::Unauthorized));
}

#[test]
fn test_offer_not_found() {
    let setup = setup_test_env();
    assert_eq!(setup.client.try_offer(&7), Err(Ok(Error::OfferNotFound)));
}

#[test]
fn test_update_user_consumes_nonce() {
    let setup = setup_test_env();
    let env = &setup.env;
    let escrow = Address::generate(env);
    setup.client.set_escrow(&escrow);

    let account = Address::generate(env);
    let username = String::from_str(env, "Username");
    let location = String::from_str(env, "London");
    let identity_key = BytesN::from_array(env, &[7u8; 32]);

    assert_eq!(setup.client.user_nonce(&account), 0);
    setup.client.update_user(&account, &username, &location, &identity_key, &0);
    assert_eq!(setup.client.user_nonce(&account), 1);
    assert_eq!(setup.client.user(&account).username, username);

    assert_eq!(
        setup.client.try_update_user(&account, &username, &location, &identity_key, &0),
        Err(Ok(Error::InvalidNonce))
    );
    assert_eq!(setup.client.user_nonce(&account), 1);
}

#[test]
fn test_update_user_without_escrow() {
    let setup = setup_test_env();
    let env = &setup.env;
    let account = Address::generate(env);

    assert_eq!(
        setup.client.try_update_user(
            &account,
            &String::from_str(env, "Username"),
            &String::from_str(env, "London"),
            &BytesN::from_array(env, &[7u8; 32]),
            &0,
        ),
        Err(Ok(Error::EscrowNotSet))
    );
}

#[test]
fn test_data_hash_binds_username_and_keys() {
    let setup = setup_test_env();
    let env = &setup.env;
    let key_a = BytesN::from_array(env, &PUBKEY_A);
    let key_b = BytesN::from_array(env, &PUBKEY_B);

    let hash = setup.client.get_data_hash(&String::from_str(env, "Username"), &key_a, &key_b);
    assert_eq!(hash, setup.client.get_data_hash(&String::from_str(env, "Username"), &key_a, &key_b));
    assert_ne!(hash, setup.client.get_data_hash(&String::from_str(env, "Other"), &key_a, &key_b));
    assert_ne!(hash, setup.client.get_data_hash(&String::from_str(env, "Username"), &key_b, &key_a));
}
