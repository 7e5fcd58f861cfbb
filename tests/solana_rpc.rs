//! Solana ledger client against a mocked JSON-RPC node.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gorkwheel_keeper::ledger::accounts::{
    encode_global_state, encode_user_state, instruction_discriminator,
};
use gorkwheel_keeper::ledger::rpc::RpcClient;
use gorkwheel_keeper::ledger::{
    ConfirmSettings, KeeperKeypair, LedgerClient, LedgerError, ProgramRejection, Pubkey,
    SolanaLedgerClient,
};
use gorkwheel_keeper::models::{
    GlobalAccrualState, Receipt, RecommendationSource, SubmitContext, UserAccrualState,
};

const PROGRAM: Pubkey = Pubkey::new_from_array([9; 32]);
const MINT: Pubkey = Pubkey::new_from_array([3; 32]);

fn keeper_key() -> KeeperKeypair {
    KeeperKeypair::from_seed([7; 32])
}

fn client(server: &MockServer) -> SolanaLedgerClient {
    SolanaLedgerClient::new(
        RpcClient::new(reqwest::Client::new(), server.uri()),
        keeper_key(),
        PROGRAM,
        MINT,
    )
    .unwrap()
    .with_confirm_settings(ConfirmSettings {
        poll_interval: Duration::from_millis(10),
        timeout: Duration::from_millis(500),
    })
}

fn ctx() -> SubmitContext {
    SubmitContext {
        tick_id: 1,
        tick_ts: 1_700_000_060,
        source: RecommendationSource::Fallback,
        confidence: 0.9,
    }
}

fn rpc_result(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
}

fn account(data: &[u8]) -> Value {
    json!({
        "context": { "slot": 1 },
        "value": {
            "data": [BASE64.encode(data), "base64"],
            "executable": false,
            "lamports": 1_000_000,
            "owner": PROGRAM.to_string(),
            "rentEpoch": 0
        }
    })
}

async fn mount(server: &MockServer, rpc_method: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(response)
        .mount(server)
        .await;
}

fn global_state(reward_vault: Pubkey) -> GlobalAccrualState {
    GlobalAccrualState {
        admin: Pubkey::new_from_array([1; 32]),
        keeper: keeper_key().pubkey(),
        paused: false,
        last_update_ts: 1_700_000_000,
        global_index: 3_000_000_000_000,
        reward_mint: Pubkey::new_from_array([5; 32]),
        reward_vault,
        max_per_period: 1_000_000,
        max_per_window: 100_000_000,
        distributed_this_window: 2_000_000,
        window_start_ts: 1_699_990_000,
        bump: 253,
    }
}

fn mint_account(supply: u64) -> Vec<u8> {
    let mut data = vec![0u8; 82];
    data[36..44].copy_from_slice(&supply.to_le_bytes());
    data[44] = 6;
    data[45] = 1;
    data
}

#[tokio::test]
async fn reads_and_decodes_global_state() {
    let server = MockServer::start().await;
    let ledger = client(&server);
    let expected = global_state(ledger.reward_vault());
    mount(&server, "getAccountInfo", rpc_result(account(&encode_global_state(&expected)))).await;

    let state = ledger.read_global_state().await.unwrap();
    assert_eq!(state, expected);

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["params"][0], ledger.global_state_address().to_string());
    assert_eq!(body["params"][1]["commitment"], "confirmed");
}

#[tokio::test]
async fn missing_global_state_is_account_not_found() {
    let server = MockServer::start().await;
    mount(
        &server,
        "getAccountInfo",
        rpc_result(json!({ "context": { "slot": 1 }, "value": null })),
    )
    .await;

    let err = client(&server).read_global_state().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LedgerError>(),
        Some(LedgerError::AccountNotFound(_))
    ));
}

#[tokio::test]
async fn reads_vault_balance() {
    let server = MockServer::start().await;
    mount(
        &server,
        "getTokenAccountBalance",
        rpc_result(json!({
            "context": { "slot": 1 },
            "value": { "amount": "12345678", "decimals": 6, "uiAmountString": "12.345678" }
        })),
    )
    .await;

    let ledger = client(&server);
    assert_eq!(ledger.read_balance(&ledger.reward_vault()).await.unwrap(), 12_345_678);
}

#[tokio::test]
async fn participant_reads() {
    let server = MockServer::start().await;
    let owner = Pubkey::new_from_array([8; 32]);
    let user = UserAccrualState {
        owner,
        user_index: 1_000_000_000_000,
        pending_rewards: 250,
        bump: 252,
    };
    mount(&server, "getAccountInfo", rpc_result(account(&encode_user_state(&user)))).await;
    mount(
        &server,
        "getTokenAccountsByOwner",
        rpc_result(json!({
            "context": { "slot": 1 },
            "value": [
                { "pubkey": "a", "account": { "data": { "parsed": { "info": { "tokenAmount": { "amount": "10" } } } } } },
                { "pubkey": "b", "account": { "data": { "parsed": { "info": { "tokenAmount": { "amount": "32" } } } } } }
            ]
        })),
    )
    .await;

    let ledger = client(&server);
    assert_eq!(ledger.read_user_state(&owner).await.unwrap(), Some(user));
    assert_eq!(ledger.read_share_balance(&owner).await.unwrap(), 42);
}

#[tokio::test]
async fn submit_signs_sends_and_confirms() {
    let server = MockServer::start().await;
    let blockhash = bs58::encode([7u8; 32]).into_string();
    mount(
        &server,
        "getLatestBlockhash",
        rpc_result(json!({
            "context": { "slot": 1 },
            "value": { "blockhash": blockhash, "lastValidBlockHeight": 100 }
        })),
    )
    .await;
    mount(&server, "sendTransaction", rpc_result(json!("5igSig"))).await;
    mount(
        &server,
        "getSignatureStatuses",
        rpc_result(json!({
            "context": { "slot": 2 },
            "value": [{ "slot": 2, "confirmations": 1, "err": null, "confirmationStatus": "confirmed" }]
        })),
    )
    .await;

    let ledger = client(&server);
    let receipt = ledger
        .submit_distribution(1_000_000, &ctx(), false)
        .await
        .unwrap();
    assert_eq!(receipt, Some(Receipt("5igSig".into())));

    let requests = server.received_requests().await.unwrap();
    let send: Value = requests
        .iter()
        .map(|r| serde_json::from_slice::<Value>(&r.body).unwrap())
        .find(|b| b["method"] == "sendTransaction")
        .unwrap();
    assert_eq!(send["params"][1]["encoding"], "base64");

    let wire = BASE64
        .decode(send["params"][0].as_str().unwrap())
        .unwrap();
    assert_eq!(wire[0], 1);
    let sig_bytes: [u8; 64] = wire[1..65].try_into().unwrap();
    let signature = Signature::from_bytes(&sig_bytes);
    let message = &wire[65..];
    let vk = VerifyingKey::from_bytes(&keeper_key().pubkey().to_bytes()).unwrap();
    assert!(vk.verify(message, &signature).is_ok());

    // header, then keeper as fee payer
    assert_eq!(&message[..3], &[1u8, 0, 2]);
    assert_eq!(&message[4..36], keeper_key().pubkey().as_ref());

    let mut data = instruction_discriminator("update_index").to_vec();
    data.extend_from_slice(&1_000_000u64.to_le_bytes());
    assert!(message.ends_with(&data));
}

#[tokio::test]
async fn preflight_rejection_is_typed() {
    let server = MockServer::start().await;
    mount(
        &server,
        "getLatestBlockhash",
        rpc_result(json!({
            "context": { "slot": 1 },
            "value": { "blockhash": bs58::encode([7u8; 32]).into_string(), "lastValidBlockHeight": 100 }
        })),
    )
    .await;
    mount(
        &server,
        "sendTransaction",
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {
                "code": -32002,
                "message": "Transaction simulation failed: Error processing Instruction 0: custom program error: 0x1773",
                "data": { "logs": [] }
            }
        })),
    )
    .await;

    let err = client(&server)
        .submit_distribution(1_000_000, &ctx(), false)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LedgerError>(),
        Some(LedgerError::Rejected(ProgramRejection::TooEarly))
    ));
}

#[tokio::test]
async fn failed_transaction_status_is_an_error() {
    let server = MockServer::start().await;
    mount(
        &server,
        "getLatestBlockhash",
        rpc_result(json!({
            "context": { "slot": 1 },
            "value": { "blockhash": bs58::encode([7u8; 32]).into_string(), "lastValidBlockHeight": 100 }
        })),
    )
    .await;
    mount(&server, "sendTransaction", rpc_result(json!("5igSig"))).await;
    mount(
        &server,
        "getSignatureStatuses",
        rpc_result(json!({
            "context": { "slot": 2 },
            "value": [{
                "slot": 2,
                "err": { "InstructionError": [0, { "Custom": 6004 }] },
                "confirmationStatus": "confirmed"
            }]
        })),
    )
    .await;

    let err = client(&server)
        .submit_distribution(5_000_000, &ctx(), false)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LedgerError>(),
        Some(LedgerError::Rejected(ProgramRejection::ExceedsMinuteCap))
    ));
}

#[tokio::test]
async fn unconfirmed_transaction_times_out() {
    let server = MockServer::start().await;
    mount(
        &server,
        "getLatestBlockhash",
        rpc_result(json!({
            "context": { "slot": 1 },
            "value": { "blockhash": bs58::encode([7u8; 32]).into_string(), "lastValidBlockHeight": 100 }
        })),
    )
    .await;
    mount(&server, "sendTransaction", rpc_result(json!("5igSig"))).await;
    mount(
        &server,
        "getSignatureStatuses",
        rpc_result(json!({ "context": { "slot": 2 }, "value": [null] })),
    )
    .await;

    let err = client(&server)
        .submit_distribution(1_000_000, &ctx(), false)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LedgerError>(),
        Some(LedgerError::Unconfirmed(sig)) if sig == "5igSig"
    ));
}

#[tokio::test]
async fn dry_run_sends_nothing() {
    let server = MockServer::start().await;
    mount(&server, "getAccountInfo", rpc_result(account(&mint_account(1_000)))).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "sendTransaction" })))
        .respond_with(rpc_result(json!("never")))
        .expect(0)
        .mount(&server)
        .await;

    let ledger = client(&server);
    assert_eq!(ledger.read_share_supply().await.unwrap(), 1_000);
    let receipt = ledger
        .submit_distribution(1_000_000, &ctx(), true)
        .await
        .unwrap();
    assert_eq!(receipt, None);
}
