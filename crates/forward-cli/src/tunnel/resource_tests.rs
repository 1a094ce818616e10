#![allow(clippy::unwrap_used, clippy::panic)]

use std::time::Duration;

use forward_core::tracing_init::CaptureBuffer;

use super::*;
use crate::prompt::testing::ScriptedPrompt;
use crate::testing::{FakeApi, record, rejected, summary};

fn resource(
    api: &Arc<FakeApi>,
    prompt: ScriptedPrompt,
) -> (TunnelResource, Arc<ScriptedPrompt>, CaptureBuffer) {
    let prompt = Arc::new(prompt);
    let (console, out) = Console::capture();
    let resource = TunnelResource::new(Arc::clone(api) as _, Arc::clone(&prompt) as _, console);
    (resource, prompt, out)
}

#[tokio::test]
async fn create_returns_record_and_sends_request() {
    let api = Arc::new(FakeApi::default());
    let (tunnels, _, _) = resource(&api, ScriptedPrompt::default());
    let request = TunnelRequest {
        local_port: 3000,
        subdomain_prefix: Some("bar".into()),
        ..TunnelRequest::default()
    };

    let created = tunnels.create(&request).await.unwrap();

    assert_eq!(created.id, "1");
    assert_eq!(created.subdomain, "foo");
    assert_eq!(created.remote_port, 56789);
    let sent = api.created();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].hostport, 3000);
    assert_eq!(sent[0].subdomain.as_deref(), Some("bar"));
    assert!(sent[0].client.contains("rust-client-"));
}

#[tokio::test]
async fn limit_reached_recovers_by_destroying_chosen_tunnel() {
    let api = Arc::new(FakeApi::default());
    api.respond_to_create(Err(rejected("tunnel_limit_reached", "Tunnel limit reached")));
    api.respond_to_create(Ok(record("xyz789")));
    api.hold_tunnels(vec![summary("abc123", 3000), summary("def456", 4000)]);
    let (tunnels, prompt, out) = resource(&api, ScriptedPrompt::choosing([Choice::Selected(0)]));

    let created = tunnels
        .create_with_recovery(&TunnelRequest::default())
        .await
        .unwrap();

    assert_eq!(created.id, "xyz789");
    assert_eq!(api.destroyed(), vec!["abc123".to_string()]);
    assert_eq!(api.created().len(), 2);
    assert_eq!(
        prompt.menus(),
        vec![vec![
            "Forwarding port 3000".to_string(),
            "Forwarding port 4000".to_string()
        ]]
    );
    assert_eq!(
        out.contents(),
        "Tunnel limit reached\ntunnel removed, now we're creating a new one\n"
    );
}

#[tokio::test]
async fn retry_uses_the_same_request() {
    let api = Arc::new(FakeApi::default());
    api.respond_to_create(Err(rejected("limit_reached", "")));
    api.hold_tunnels(vec![summary("abc123", 3000)]);
    let (tunnels, _, _) = resource(&api, ScriptedPrompt::choosing([Choice::Selected(0)]));
    let request = TunnelRequest {
        cname: Some("foo.com".into()),
        ..TunnelRequest::default()
    };

    tunnels.create_with_recovery(&request).await.unwrap();

    let sent = api.created();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], sent[1]);
}

#[tokio::test]
async fn repeated_limit_prompts_again() {
    let api = Arc::new(FakeApi::default());
    api.respond_to_create(Err(rejected("limit_reached", "full")));
    api.respond_to_create(Err(rejected("limit_reached", "still full")));
    api.hold_tunnels(vec![summary("a", 1000), summary("b", 2000)]);
    let (tunnels, prompt, _) = resource(
        &api,
        ScriptedPrompt::choosing([Choice::Selected(0), Choice::Selected(0)]),
    );

    tunnels
        .create_with_recovery(&TunnelRequest::default())
        .await
        .unwrap();

    assert_eq!(api.destroyed(), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(prompt.menus().len(), 2);
    assert_eq!(prompt.menus()[1], vec!["Forwarding port 2000".to_string()]);
}

#[tokio::test]
async fn out_of_range_choice_asks_again() {
    let api = Arc::new(FakeApi::default());
    api.respond_to_create(Err(rejected("limit_reached", "full")));
    api.hold_tunnels(vec![summary("a", 1000)]);
    let (tunnels, prompt, _) = resource(
        &api,
        ScriptedPrompt::choosing([Choice::Selected(5), Choice::Selected(0)]),
    );

    tunnels
        .create_with_recovery(&TunnelRequest::default())
        .await
        .unwrap();

    assert_eq!(prompt.menus().len(), 2);
    assert_eq!(api.destroyed(), vec!["a".to_string()]);
}

#[tokio::test]
async fn quit_aborts_without_destroying() {
    let api = Arc::new(FakeApi::default());
    api.respond_to_create(Err(rejected("tunnel_limit_reached", "full")));
    api.hold_tunnels(vec![summary("abc123", 3000)]);
    let (tunnels, _, _) = resource(&api, ScriptedPrompt::choosing([Choice::Quit]));

    let err = tunnels
        .create_with_recovery(&TunnelRequest::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::UserAbort));
    assert!(api.destroyed().is_empty());
    assert_eq!(api.created().len(), 1);
}

#[tokio::test]
async fn account_conditions_skip_the_menu() {
    for (kind, message) in [
        ("trial_expired", "Your trial has expired"),
        ("account_suspended", "Your account is suspended"),
    ] {
        let api = Arc::new(FakeApi::default());
        api.respond_to_create(Err(rejected(kind, message)));
        let (tunnels, prompt, _) = resource(&api, ScriptedPrompt::default());

        let err = tunnels
            .create_with_recovery(&TunnelRequest::default())
            .await
            .unwrap_err();

        match err {
            ClientError::Tunnel(e @ (TunnelError::TrialExpired(_) | TunnelError::AccountSuspended(_))) => {
                assert_eq!(e.to_string(), message);
            }
            other => panic!("unexpected error for {kind}: {other:?}"),
        }
        assert!(prompt.menus().is_empty());
        assert_eq!(api.created().len(), 1);
    }
}

#[tokio::test]
async fn destroy_is_idempotent() {
    let api = Arc::new(FakeApi::default());
    api.hold_tunnels(vec![summary("abc123", 3000)]);
    let (tunnels, _, _) = resource(&api, ScriptedPrompt::default());

    tunnels.destroy("abc123").await.unwrap();
    tunnels.destroy("abc123").await.unwrap();

    assert!(tunnels.list().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn poll_waits_for_pending_tunnel() {
    let api = Arc::new(FakeApi::default());
    api.pending_for(2);
    let (tunnels, _, _) = resource(&api, ScriptedPrompt::default());

    tunnels.poll_status(&record("1")).await.unwrap();

    assert_eq!(api.show_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn poll_gives_up_after_bound() {
    let api = Arc::new(FakeApi::default());
    api.hide_tunnels();
    let (tunnels, _, _) = resource(&api, ScriptedPrompt::default());
    let policy = PollPolicy::default();
    let started = tokio::time::Instant::now();

    let err = tunnels.poll_status(&record("1")).await.unwrap_err();

    assert_eq!(err.attempts, policy.max_attempts);
    assert_eq!(api.show_calls(), policy.max_attempts);
    let waited = started.elapsed();
    assert!(waited >= policy.total_wait());
    assert!(waited < policy.total_wait() + Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn custom_poll_policy_is_honoured() {
    let api = Arc::new(FakeApi::default());
    api.hide_tunnels();
    let (tunnels, _, _) = resource(&api, ScriptedPrompt::default());
    let tunnels = tunnels.with_poll_policy(PollPolicy {
        max_attempts: 2,
        initial_delay: Duration::from_millis(10),
        ..PollPolicy::default()
    });

    let err = tunnels.poll_status(&record("1")).await.unwrap_err();

    assert_eq!(err.attempts, 2);
    assert_eq!(api.show_calls(), 2);
}
