mod common;

use chat_fanout_service::error::AuthFailureReason;
use common::{token_for, TestApp};
use uuid::Uuid;

#[tokio::test]
async fn valid_token_binds_existing_user() {
    let app = TestApp::new();
    let alice = app.user("alice").await;

    let session = app
        .state
        .binder
        .bind(Some(&token_for(alice.id, 300)))
        .await
        .unwrap();
    assert_eq!(session.user_id(), alice.id);
}

#[tokio::test]
async fn each_failure_has_its_reason() {
    let app = TestApp::new();
    let alice = app.user("alice").await;
    let binder = &app.state.binder;

    let reason = |r: Result<_, chat_fanout_service::error::AuthFailure>| r.unwrap_err().reason;

    assert_eq!(reason(binder.bind(None).await), AuthFailureReason::Missing);
    assert_eq!(reason(binder.bind(Some("   ")).await), AuthFailureReason::Missing);
    assert_eq!(
        reason(binder.bind(Some("definitely.not.ajwt")).await),
        AuthFailureReason::Malformed
    );
    assert_eq!(
        reason(binder.bind(Some(&token_for(alice.id, -30))).await),
        AuthFailureReason::Expired
    );
    assert_eq!(
        reason(binder.bind(Some(&token_for(Uuid::new_v4(), 300))).await),
        AuthFailureReason::UnknownUser
    );
}

#[tokio::test]
async fn sessions_of_one_user_are_distinct() {
    let app = TestApp::new();
    let alice = app.user("alice").await;
    let token = token_for(alice.id, 300);

    let first = app.state.binder.bind(Some(&token)).await.unwrap();
    let second = app.state.binder.bind(Some(&token)).await.unwrap();
    assert_ne!(first.session_id(), second.session_id());
    assert_eq!(first.user_id(), second.user_id());
}
