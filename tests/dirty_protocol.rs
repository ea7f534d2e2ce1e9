//! Dirty-flag handshake between a simulated producer and the session.
//!
//! The producer holds a clone of the arena, so its writes are visible to the
//! session the way a live shared segment would be.

use frame_store::layout::{R_MCV_DIRTY, W_FRAME_OFFSET_BASE};
use frame_store::testing::{ArenaBuilder, FrameSpec, HeapProvider};
use frame_store::{Arena, DirtyStrategy, FrameStoreConfig, FrameStoreError, FrameStoreSession, HeapArena};

const KEY: i32 = 7;

struct Producer {
    arena: HeapArena,
}

impl Producer {
    fn mcv_word(&self, frame: i32) -> usize {
        self.arena.read_word(W_FRAME_OFFSET_BASE + frame as usize).unwrap() as usize + R_MCV_DIRTY
    }

    fn touch(&self, frame: i32, value: i32) {
        self.arena.write_i32_at(self.mcv_word(frame), value).unwrap();
    }

    fn flag(&self, frame: i32) -> i32 {
        self.arena.read_i32_at(self.mcv_word(frame)).unwrap()
    }
}

fn setup(strategy: DirtyStrategy) -> (Producer, FrameStoreSession<HeapProvider>) {
    let arena = ArenaBuilder::new(3)
        .frame(1, FrameSpec::new(2, 2))
        .frame(2, FrameSpec::new(2, 2))
        .build();
    let provider = HeapProvider::new();
    provider.insert(KEY, arena.clone());
    let config = FrameStoreConfig::default()
        .with_key(KEY)
        .with_dirty_strategy(strategy);
    (Producer { arena }, FrameStoreSession::new(provider, config))
}

#[test]
fn test_first_query_of_new_frame_is_dirty() {
    let (producer, mut session) = setup(DirtyStrategy::RawValue);
    assert_eq!(session.last_serviced_frame(), 0);

    let result = session.is_dirty(1).unwrap();
    assert!(result.is_dirty());
    assert_eq!(result.value, -1);
    assert_eq!(session.last_serviced_frame(), 1);
    assert_eq!(producer.flag(1), 0);

    // Nothing changed since
    assert!(!session.is_dirty(1).unwrap().is_dirty());
}

#[test]
fn test_producer_change_seen_exactly_once() {
    let (producer, mut session) = setup(DirtyStrategy::RawValue);
    session.is_dirty(1).unwrap();

    producer.touch(1, -1);
    let seen = session.is_dirty(1).unwrap();
    assert!(seen.is_dirty());
    assert_eq!(seen.value, -1);
    assert_eq!(producer.flag(1), 0);

    assert_eq!(session.is_dirty(1).unwrap().value, 0);
}

#[test]
fn test_raw_value_passes_flag_bits_through() {
    let (producer, mut session) = setup(DirtyStrategy::RawValue);
    session.is_dirty(2).unwrap();

    producer.touch(2, 0x0F);
    assert_eq!(session.is_dirty(2).unwrap().value, 0x0F);
    assert_eq!(producer.flag(2), 0);
}

#[test]
fn test_consume_reports_boolean() {
    let (producer, mut session) = setup(DirtyStrategy::Consume);
    session.is_dirty(2).unwrap();

    producer.touch(2, 0x0F);
    let seen = session.is_dirty(2).unwrap();
    assert_eq!(seen.value, -1);
    assert_eq!(producer.flag(2), 0);
    assert_eq!(session.is_dirty(2).unwrap().value, 0);
}

#[test]
fn test_frame_switch_clears_pending_flag() {
    let (producer, mut session) = setup(DirtyStrategy::RawValue);
    session.is_dirty(1).unwrap();

    producer.touch(2, 0x3);
    let switched = session.is_dirty(2).unwrap();
    assert_eq!(switched.value, -1);
    assert_eq!(producer.flag(2), 0);

    // Switching back counts as dirty again
    assert!(session.is_dirty(1).unwrap().is_dirty());
    assert_eq!(session.last_serviced_frame(), 1);
}

#[test]
fn test_current_frame_resolution() {
    let (_producer, mut session) = setup(DirtyStrategy::RawValue);
    // Builder default current frame is 1
    let result = session.is_dirty(-1).unwrap();
    assert_eq!(result.frame, 1);
}

#[test]
fn test_invalid_frame_propagates() {
    let (_producer, mut session) = setup(DirtyStrategy::RawValue);
    assert!(matches!(session.is_dirty(4), Err(FrameStoreError::InvalidFrame { .. })));
    assert!(!session.is_attached());
    assert_eq!(session.last_serviced_frame(), 0);
}
