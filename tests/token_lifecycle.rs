//! Token and session lifecycle through the service: logout deny-listing,
//! refresh rotation, and family-wide revocation on replay.

mod common;

use common::{HarnessBuilder, login_request, settle_audit};
use kawal::Error;
use kawal::service::{AuthSuccess, LoginOutcome, TokenKind};
use kawal::store::DeviceStore;

const IP: &str = "198.51.100.1";

async fn login(harness: &common::Harness) -> AuthSuccess {
    let user = harness.seed_user("alice", "correct horse battery").await;
    harness.devices.remember_device(user.id, "fp").await.unwrap();
    let outcome = harness
        .service
        .login_with_password(login_request("alice", "correct horse battery", IP, "fp"))
        .await
        .unwrap();
    match outcome {
        LoginOutcome::Success { auth, .. } => auth,
        other => panic!("expected immediate success, got {other:?}"),
    }
}

fn harness() -> common::Harness {
    HarnessBuilder::new().ip_reputation(IP, 0.1).build()
}

#[tokio::test]
async fn logout_deny_lists_the_access_token_and_drops_the_session() {
    let harness = harness();
    let auth = login(&harness).await;

    harness
        .service
        .validate_access_token(&auth.tokens.access_token)
        .await
        .unwrap();

    harness
        .service
        .logout(&auth.tokens.access_token, Some(auth.session.id))
        .await
        .unwrap();

    // Signature and expiry are still fine; the deny-list is what rejects it.
    let result = harness
        .service
        .validate_access_token(&auth.tokens.access_token)
        .await;
    assert!(matches!(result, Err(Error::Unauthorized)));

    let session = harness.service.session(auth.session.id).await;
    assert!(matches!(session, Err(Error::NotFound)));

    settle_audit().await;
    let events = harness.audit_sink.events().await;
    assert!(events.iter().any(|event| event.action == "logout"));
}

#[tokio::test]
async fn logout_with_garbage_token_is_invalid() {
    let harness = harness();
    let result = harness.service.logout("not-a-jwt", None).await;
    assert!(matches!(result, Err(Error::InvalidToken)));
}

#[tokio::test]
async fn logout_drops_the_session_even_with_a_garbage_token() {
    let harness = harness();
    let auth = login(&harness).await;

    let result = harness.service.logout("not-a-jwt", Some(auth.session.id)).await;
    assert!(matches!(result, Err(Error::InvalidToken)));

    // Session teardown is unconditional; only the deny-listing needs a
    // verifiable token.
    let session = harness.service.session(auth.session.id).await;
    assert!(matches!(session, Err(Error::NotFound)));
    harness
        .service
        .validate_access_token(&auth.tokens.access_token)
        .await
        .unwrap();
}

#[tokio::test]
async fn refresh_rotates_and_replay_revokes_the_family() {
    let harness = harness();
    let auth = login(&harness).await;

    let rotated = harness
        .service
        .refresh_access_token(&auth.tokens.refresh_token)
        .await
        .unwrap();
    assert_ne!(rotated.refresh_token, auth.tokens.refresh_token);
    harness
        .service
        .validate_access_token(&rotated.access_token)
        .await
        .unwrap();

    // Replaying the rotated-out token is treated as theft: the whole family
    // dies, including the freshly rotated token.
    let replay = harness
        .service
        .refresh_access_token(&auth.tokens.refresh_token)
        .await;
    assert!(matches!(replay, Err(Error::Unauthorized)));

    let after = harness
        .service
        .refresh_access_token(&rotated.refresh_token)
        .await;
    assert!(after.is_err());

    settle_audit().await;
    let events = harness.audit_sink.events().await;
    assert!(events
        .iter()
        .any(|event| event.action == "token_refresh"
            && event.reason.as_deref() == Some("unauthorized")));
}

#[tokio::test]
async fn unknown_refresh_token_is_rejected() {
    let harness = harness();
    let result = harness.service.refresh_access_token("never-issued").await;
    assert!(matches!(result, Err(Error::InvalidToken)));
}

#[tokio::test]
async fn explicit_refresh_revocation_ends_the_chain() {
    let harness = harness();
    let auth = login(&harness).await;

    harness
        .service
        .revoke_token(&auth.tokens.refresh_token, TokenKind::Refresh)
        .await
        .unwrap();
    let result = harness
        .service
        .refresh_access_token(&auth.tokens.refresh_token)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn explicit_access_revocation_deny_lists_it() {
    let harness = harness();
    let auth = login(&harness).await;

    harness
        .service
        .revoke_token(&auth.tokens.access_token, TokenKind::Access)
        .await
        .unwrap();
    let result = harness
        .service
        .validate_access_token(&auth.tokens.access_token)
        .await;
    assert!(matches!(result, Err(Error::Unauthorized)));

    // The refresh chain is untouched by an access-token revocation.
    harness
        .service
        .refresh_access_token(&auth.tokens.refresh_token)
        .await
        .unwrap();
}

#[tokio::test]
async fn garbage_access_token_never_validates() {
    let harness = harness();
    for garbage in ["", "a.b", "a.b.c.d", "not-a-token"] {
        let result = harness.service.validate_access_token(garbage).await;
        assert!(matches!(result, Err(Error::InvalidToken)));
    }
}
