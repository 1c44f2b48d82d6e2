//! Full-pipeline scenarios: frames in, topic deliveries out, counters.

mod common;

use std::time::Duration;

use alpha_stream::config::{Config, OutputsConfig, ReconnectConfig, ShutdownRecovery};
use alpha_stream::orchestrator::AlphaStream;
use alpha_stream::types::event::{EventKind, InternalEvent};
use alpha_stream::types::subscription::Channel;
use common::MockUpstream;
use serde_json::json;
use tokio::sync::broadcast;

fn test_config(server: &MockUpstream, users: &[&str]) -> Config {
    Config {
        base_url: server.url(),
        token: "test-token".into(),
        channels: vec![Channel::All],
        users: users.iter().map(|u| u.to_string()).collect(),
        reconnect: ReconnectConfig {
            initial_delay_ms: 100,
            max_delay_ms: 500,
            multiplier: 2.0,
            max_attempts: 0,
        },
        dedup_ttl_secs: 60,
        shutdown_recovery: ShutdownRecovery::FixedDelay { delay_ms: 200 },
        outputs: OutputsConfig {
            cli: true,
            dashboard: true,
            alerts: true,
        },
    }
}

fn alice_tweet(id: &str) -> serde_json::Value {
    json!({
        "event_type": "post_created",
        "data": {
            "tweetId": id,
            "username": "alice",
            "tweet": {
                "author": {
                    "handle": "alice",
                    "id": "u1",
                    "profile": { "name": "Alice" }
                },
                "body": { "text": "hello" }
            }
        }
    })
}

async fn recv_event(rx: &mut broadcast::Receiver<InternalEvent>) -> InternalEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("bus channel closed")
}

#[tokio::test]
async fn happy_path_delivers_once_to_every_topic() {
    let server = MockUpstream::start().await;
    let client = AlphaStream::new(test_config(&server, &["alice"])).expect("config valid");

    let mut cli = client.bus().channel("cli", 16);
    let mut dashboard = client.bus().channel("dashboard", 16);
    let mut alerts = client.bus().channel("alerts", 16);

    client.start().await.expect("start failed");
    server.send_json(alice_tweet("t1"));

    for rx in [&mut cli, &mut dashboard, &mut alerts] {
        let event = recv_event(rx).await;
        assert_eq!(event.kind, EventKind::PostCreated);
        assert_eq!(event.primary_id, "t1");
        assert_eq!(event.actor.handle, "alice");
        assert_eq!(event.actor.display_name, "Alice");
        assert_eq!(event.actor.user_id, "u1");
    }

    let stats = client.stats();
    assert_eq!(stats.total_received, 1);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.deduped, 0);

    client.stop().await;
}

#[tokio::test]
async fn duplicate_within_ttl_is_suppressed() {
    let server = MockUpstream::start().await;
    let client = AlphaStream::new(test_config(&server, &["alice"])).expect("config valid");
    let mut cli = client.bus().channel("cli", 16);

    client.start().await.expect("start failed");

    server.send_json(alice_tweet("t1"));
    let first = recv_event(&mut cli).await;
    assert_eq!(first.primary_id, "t1");

    server.send_json(alice_tweet("t1"));
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(
        matches!(cli.try_recv(), Err(broadcast::error::TryRecvError::Empty)),
        "the duplicate must not be delivered"
    );
    let stats = client.stats();
    assert_eq!(stats.total_received, 2);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.deduped, 1);

    client.stop().await;
}

#[tokio::test]
async fn distinct_ids_are_not_duplicates() {
    let server = MockUpstream::start().await;
    let client = AlphaStream::new(test_config(&server, &["alice"])).expect("config valid");
    let mut cli = client.bus().channel("cli", 16);

    client.start().await.expect("start failed");

    server.send_json(alice_tweet("t1"));
    server.send_json(alice_tweet("t2"));

    assert_eq!(recv_event(&mut cli).await.primary_id, "t1");
    assert_eq!(recv_event(&mut cli).await.primary_id, "t2");
    assert_eq!(client.stats().deduped, 0);

    client.stop().await;
}

#[tokio::test]
async fn follow_update_is_rewritten_through_the_pipeline() {
    let server = MockUpstream::start().await;
    let client = AlphaStream::new(test_config(&server, &[])).expect("config valid");
    let mut cli = client.bus().channel("cli", 16);

    client.start().await.expect("start failed");
    server.send_json(json!({
        "event_type": "follow_created",
        "data": {
            "action": "follow_update",
            "user": { "id": "u1", "handle": "a" },
            "following": { "id": "u2", "handle": "b" }
        }
    }));

    let event = recv_event(&mut cli).await;
    assert_eq!(event.kind, EventKind::FollowUpdated);
    assert_eq!(event.primary_id, "u1-u2");
    assert_eq!(event.actor.handle, "a");

    client.stop().await;
}

#[tokio::test]
async fn user_filter_drops_other_handles() {
    let server = MockUpstream::start().await;
    let client = AlphaStream::new(test_config(&server, &["alice"])).expect("config valid");
    let mut cli = client.bus().channel("cli", 16);

    client.start().await.expect("start failed");

    server.send_json(json!({
        "event_type": "post_created",
        "data": { "tweetId": "b1", "username": "bob" }
    }));
    server.send_json(alice_tweet("a1"));

    // Only alice's event comes through; bob's was filtered ahead of it.
    let event = recv_event(&mut cli).await;
    assert_eq!(event.actor.handle, "alice");

    let stats = client.stats();
    assert_eq!(stats.filtered, 1);
    assert_eq!(stats.delivered, 1);

    client.stop().await;
}

#[tokio::test]
async fn keyword_filter_scopes_delivery_to_matching_text() {
    let server = MockUpstream::start().await;
    let client = AlphaStream::new(test_config(&server, &[])).expect("config valid");
    let mut cli = client.bus().channel("cli", 16);

    client.set_keywords(["launch"]);
    client.start().await.expect("start failed");

    server.send_json(json!({
        "event_type": "post_created",
        "data": {
            "tweetId": "quiet",
            "username": "alice",
            "tweet": { "body": { "text": "nothing happening" } }
        }
    }));
    server.send_json(json!({
        "event_type": "post_created",
        "data": {
            "tweetId": "loud",
            "username": "alice",
            "tweet": { "body": { "text": "big LAUNCH incoming" } }
        }
    }));

    let event = recv_event(&mut cli).await;
    assert_eq!(event.primary_id, "loud");
    assert_eq!(client.stats().filtered, 1);

    client.stop().await;
}

#[tokio::test]
async fn kind_filter_scopes_delivery_through_the_client() {
    let server = MockUpstream::start().await;
    let client = AlphaStream::new(test_config(&server, &[])).expect("config valid");
    let mut cli = client.bus().channel("cli", 16);

    client.set_kind_filter([EventKind::FollowCreated]);
    client.start().await.expect("start failed");

    server.send_json(alice_tweet("filtered-out"));
    server.send_json(json!({
        "event_type": "follow_created",
        "data": {
            "user": { "id": "u1", "handle": "alice" },
            "following": { "id": "u2", "handle": "bob" }
        }
    }));

    let event = recv_event(&mut cli).await;
    assert_eq!(event.kind, EventKind::FollowCreated);
    assert_eq!(event.primary_id, "u1-u2");
    assert_eq!(client.stats().filtered, 1);

    // Clearing the set restores all-kinds delivery.
    client.set_kind_filter([]);
    server.send_json(alice_tweet("back-again"));
    assert_eq!(recv_event(&mut cli).await.primary_id, "back-again");

    client.stop().await;
}

#[tokio::test]
async fn invalid_frames_count_as_rejected_not_delivered() {
    let server = MockUpstream::start().await;
    let client = AlphaStream::new(test_config(&server, &[])).expect("config valid");
    let mut cli = client.bus().channel("cli", 16);

    client.start().await.expect("start failed");

    // Unknown kind, then no resolvable handle, then a good one.
    server.send_json(json!({ "event_type": "mystery", "data": { "username": "alice" } }));
    server.send_json(json!({ "event_type": "post_created", "data": { "tweetId": "x" } }));
    server.send_json(alice_tweet("ok"));

    assert_eq!(recv_event(&mut cli).await.primary_id, "ok");
    let stats = client.stats();
    assert_eq!(stats.rejected, 2);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.total_received, 3);

    client.stop().await;
}

#[tokio::test]
async fn stop_tears_the_whole_stack_down() {
    let server = MockUpstream::start().await;
    let client = AlphaStream::new(test_config(&server, &[])).expect("config valid");
    let _cli = client.bus().channel("cli", 16);

    client.start().await.expect("start failed");
    client.stop().await;

    use alpha_stream::ws::transport::ConnectionState;
    assert_eq!(client.stats().connection_state, ConnectionState::Disconnected);
    assert_eq!(client.bus().sink_count("cli"), 0);
}

#[tokio::test]
async fn runtime_update_followed_by_reconnect_keeps_new_subscription() {
    let server = MockUpstream::start().await;
    let client = AlphaStream::new(test_config(&server, &[])).expect("config valid");
    let _cli = client.bus().channel("cli", 16);

    client.start().await.expect("start failed");
    let state = client
        .update_subscription(&[Channel::Tweets, Channel::Following], &["carol".to_owned()])
        .await
        .expect("update failed");
    assert_eq!(state.channels, vec![Channel::Following, Channel::Tweets]);

    server.abort_current();
    let resub = server.wait_for_subscribe(3).await;
    assert_eq!(resub["channels"], json!(["following", "tweets"]));
    assert_eq!(resub["users"], json!(["carol"]));

    client.stop().await;
}
