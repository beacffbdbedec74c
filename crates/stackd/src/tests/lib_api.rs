//! Checks the public surface re-exported from the crate root.

use std::time::Duration;

use rstest::rstest;

use stackd_config::Config;

use crate::{
    Action, Payload, QueueError, RequestOutcome, ServerSettings, Store, wire,
};

#[rstest]
fn wire_helpers_are_reachable_from_the_root() {
    let header = wire::encode_header(Action::Push, 3).expect("short payload");
    let decoded = wire::decode_header(header).expect("valid header");
    assert_eq!(decoded.action, Action::Push);
    assert_eq!(decoded.payload_len, 3);

    let payload = Payload::try_from(&b"abc"[..]).expect("payload within limit");
    assert_eq!(wire::encode_pop_response(&payload), b"\x03abc".to_vec());
}

#[rstest]
fn default_settings_follow_the_default_config() {
    let config = Config::default();
    let settings = ServerSettings::default();
    assert_eq!(settings.max_connections, config.max_connections());
    assert_eq!(settings.stack_length, config.stack_length());
    assert_eq!(settings.conn_expiration, config.conn_expiration());
    assert_eq!(settings.reader.read_deadline, Duration::from_secs(20));
    assert_eq!(settings.shutdown_grace, Duration::from_secs(1));
}

#[rstest]
#[case(RequestOutcome::Completed, true)]
#[case(RequestOutcome::Parked, false)]
#[case(RequestOutcome::Stale, false)]
fn only_completed_requests_release_their_slot(
    #[case] outcome: RequestOutcome,
    #[case] releases: bool,
) {
    assert_eq!(outcome.should_release(), releases);
}

#[rstest]
fn queue_errors_render_their_context() {
    let error = QueueError::WriterOverflow { limit: 4 };
    assert!(error.to_string().contains('4'));
    let error = QueueError::UnregisteredAction { slot: Some(2) };
    assert!(error.to_string().contains('2'));
}

#[rstest]
fn store_is_usable_with_connections() {
    let store: Store<crate::Connection> = Store::new(2, 1);
    assert_eq!(store.capacity(), 2);
    assert_eq!(store.max_waiting_writers(), 1);
    assert!(store.is_empty());
}
