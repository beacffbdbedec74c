use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use rstest::{fixture, rstest};

use super::*;
use crate::peer::MockPeer;
use crate::test_support::{FakePeer, Response, payload};

type TestStore = Store<FakePeer>;

#[fixture]
fn single_slot() -> TestStore {
    Store::new(1, 4)
}

#[rstest]
fn pushes_succeed_until_capacity() {
    let store = TestStore::new(3, 4);
    for item in [b"a", b"b", b"c"] {
        assert!(store.push(payload(item)));
    }
    assert!(store.is_full());
    assert!(!store.push(payload(b"d")), "push beyond capacity must fail");
    assert_eq!(store.len(), 3);
}

#[rstest]
fn pops_in_reverse_push_order() {
    let store = TestStore::new(4, 4);
    assert!(store.push(payload(b"A")));
    assert!(store.push(payload(b"B")));
    assert_eq!(store.pop(), Some(payload(b"B")));
    assert_eq!(store.pop(), Some(payload(b"A")));
    assert_eq!(store.pop(), None);
    assert!(store.is_empty());
}

#[rstest]
fn zero_capacity_store_rejects_everything() {
    let store = TestStore::new(0, 4);
    assert!(store.is_full());
    assert!(!store.push(payload(b"x")));
    assert_eq!(store.pop(), None);
}

#[rstest]
fn push_or_wait_parks_writer_on_full_stack(single_slot: TestStore) {
    let first = FakePeer::push(0, b"A");
    let second = FakePeer::push(1, b"B");

    assert_eq!(single_slot.push_or_wait(&first), PushOutcome::Accepted);
    assert_eq!(single_slot.push_or_wait(&second), PushOutcome::Waiting);
    assert_eq!(single_slot.waiting_writers(), 1);
    assert!(second.responses().is_empty(), "parked writer gets no reply yet");
}

#[rstest]
fn pop_refills_slot_from_parked_writer(single_slot: TestStore) {
    let first = FakePeer::push(0, b"A");
    let second = FakePeer::push(1, b"B");
    single_slot.push_or_wait(&first);
    single_slot.push_or_wait(&second);

    assert_eq!(single_slot.pop(), Some(payload(b"A")));

    assert_eq!(single_slot.len(), 1, "freed slot is refilled within the pop");
    assert_eq!(second.responses(), vec![Response::PushAck]);
    assert_eq!(single_slot.waiting_writers(), 0);
    assert_eq!(single_slot.pop(), Some(payload(b"B")));
}

#[rstest]
fn pop_services_one_writer_in_fifo_order(single_slot: TestStore) {
    let writers: Vec<_> = (0..3)
        .map(|slot| FakePeer::push(slot, &[b'0' + u8::try_from(slot).expect("small slot")]))
        .collect();
    assert!(single_slot.push(payload(b"base")));
    for writer in &writers {
        assert_eq!(single_slot.push_or_wait(writer), PushOutcome::Waiting);
    }

    single_slot.pop();

    assert_eq!(writers[0].responses(), vec![Response::PushAck]);
    assert!(writers[1].responses().is_empty());
    assert!(writers[2].responses().is_empty());
    assert_eq!(single_slot.waiting_writers(), 2);
    assert_eq!(single_slot.pop(), Some(payload(b"0")));
}

#[rstest]
fn dead_parked_writer_is_dropped_without_refill(single_slot: TestStore) {
    let writer = FakePeer::push(1, b"B");
    assert!(single_slot.push(payload(b"A")));
    single_slot.push_or_wait(&writer);
    writer.disconnect();

    assert_eq!(single_slot.pop(), Some(payload(b"A")));

    assert!(single_slot.is_empty(), "dead writer must not refill the slot");
    assert!(writer.responses().is_empty(), "dead writer gets no reply");
    assert_eq!(single_slot.waiting_writers(), 0);
}

#[rstest]
fn overflowing_writer_queue_is_reported() {
    let store = TestStore::new(0, 1);
    assert_eq!(store.push_or_wait(&FakePeer::push(0, b"a")), PushOutcome::Waiting);
    assert_eq!(store.push_or_wait(&FakePeer::push(1, b"b")), PushOutcome::Overflow);
    assert_eq!(store.waiting_writers(), 1);
}

#[rstest]
fn empty_pop_leaves_parked_writers_alone() {
    let store = TestStore::new(0, 2);
    let writer = FakePeer::push(0, b"a");
    store.push_or_wait(&writer);
    assert_eq!(store.pop(), None);
    assert_eq!(store.waiting_writers(), 1);
    assert!(writer.responses().is_empty());
}

#[rstest]
fn concurrent_pushes_never_exceed_capacity() {
    let store = Arc::new(TestStore::new(50, 4));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || (0..20).filter(|_| store.push(payload(b"x"))).count())
        })
        .collect();
    let accepted: usize = handles
        .into_iter()
        .map(|handle| handle.join().expect("join pusher"))
        .sum();
    assert_eq!(accepted, 50);
    assert_eq!(store.len(), 50);
}

#[rstest]
fn parked_writer_is_acknowledged_outside_the_store_lock() {
    let store = Arc::new(Store::<MockPeer>::new(1, 1));
    assert!(store.push(payload(b"top")));

    let lock_was_free = Arc::new(AtomicBool::new(false));
    let observed = Arc::clone(&lock_was_free);
    let handle = Arc::downgrade(&store);
    let mut writer = MockPeer::new();
    writer.expect_payload().returning(|| payload(b"next"));
    writer.expect_slot_id().return_const(Some(1));
    writer.expect_probe_liveness().return_const(true);
    writer.expect_write_push_ack().times(1).returning(move || {
        let store = handle.upgrade().expect("store still alive");
        observed.store(store.state.try_lock().is_ok(), Ordering::SeqCst);
    });
    let writer = Arc::new(writer);

    assert_eq!(store.push_or_wait(&writer), PushOutcome::Waiting);
    let popped = store.pop_refilling().expect("stocked store pops");

    assert_eq!(popped.payload, payload(b"top"));
    assert!(
        popped
            .refilled_by
            .as_ref()
            .is_some_and(|refilled| Arc::ptr_eq(refilled, &writer))
    );
    assert!(
        lock_was_free.load(Ordering::SeqCst),
        "acknowledgement ran while the store lock was held"
    );
    assert_eq!(store.len(), 1);
    assert_eq!(store.pop(), Some(payload(b"next")));
}

#[rstest]
fn pop_without_parked_writers_refills_nothing(single_slot: TestStore) {
    assert!(single_slot.push(payload(b"only")));
    let popped = single_slot.pop_refilling().expect("stocked store pops");
    assert_eq!(popped.payload, payload(b"only"));
    assert!(popped.refilled_by.is_none());
}
