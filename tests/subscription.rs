//! Channel/user normalization and subscription-state bookkeeping.

use alpha_stream::types::subscription::{
    Channel, SubscriptionMode, SubscriptionSource, SubscriptionState, normalize_channels,
    normalize_users,
};

#[test]
fn channel_parse_accepts_the_closed_set() {
    assert_eq!(Channel::parse("all").unwrap(), Channel::All);
    assert_eq!(Channel::parse("tweets").unwrap(), Channel::Tweets);
    assert_eq!(Channel::parse("following").unwrap(), Channel::Following);
    assert_eq!(Channel::parse("profile").unwrap(), Channel::Profile);
    assert!(Channel::parse("everything").is_err());
    assert!(Channel::parse("").is_err());
}

#[test]
fn all_collapses_to_the_sole_element() {
    let normalized = normalize_channels(&[Channel::Tweets, Channel::All, Channel::Profile]);
    assert_eq!(normalized, vec![Channel::All]);
}

#[test]
fn channels_are_deduplicated_and_sorted() {
    let normalized = normalize_channels(&[
        Channel::Tweets,
        Channel::Following,
        Channel::Tweets,
        Channel::Following,
    ]);
    assert_eq!(normalized, vec![Channel::Following, Channel::Tweets]);
}

#[test]
fn empty_channel_list_stays_empty() {
    assert!(normalize_channels(&[]).is_empty());
}

#[test]
fn users_are_trimmed_lowercased_deduped_sorted() {
    let normalized = normalize_users(&["  Carol ", "ALICE", "alice", "bob", "", "   "]);
    assert_eq!(normalized, vec!["alice", "bob", "carol"]);
}

#[test]
fn state_mode_follows_channel_emptiness() {
    let active = SubscriptionState::from_config(&[Channel::Tweets], &[]);
    assert_eq!(active.mode(), SubscriptionMode::Active);

    let idle = SubscriptionState::from_config(&[], &[]);
    assert_eq!(idle.mode(), SubscriptionMode::Idle);
}

#[test]
fn config_seed_is_normalized() {
    let state = SubscriptionState::from_config(
        &[Channel::Tweets, Channel::Tweets, Channel::Following],
        &["  Bob ".to_owned(), "alice".to_owned()],
    );
    assert_eq!(state.channels, vec![Channel::Following, Channel::Tweets]);
    assert_eq!(state.users, vec!["alice", "bob"]);
    assert_eq!(state.source, SubscriptionSource::Config);
}

#[test]
fn runtime_commit_switches_source_and_touches_timestamp() {
    let mut state = SubscriptionState::from_config(&[Channel::All], &[]);
    let seeded_at = state.updated_at.clone();

    // Timestamps carry millisecond precision; make sure the clock moves.
    std::thread::sleep(std::time::Duration::from_millis(5));
    state.commit_runtime(vec![Channel::Tweets], vec!["carol".to_owned()]);

    assert_eq!(state.source, SubscriptionSource::Runtime);
    assert_eq!(state.channels, vec![Channel::Tweets]);
    assert_eq!(state.users, vec!["carol"]);
    assert_ne!(state.updated_at, seeded_at);
}
