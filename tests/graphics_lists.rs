//! Graphics overlay traversal through a session.
//!
//! The graphics arena must be released after every call, whether it
//! succeeds, stops early or fails.

use frame_store::graphics::overlay_points;
use frame_store::layout::END_OF_LIST;
use frame_store::testing::{ArenaBuilder, FrameSpec, GraphicsBuilder, HeapProvider};
use frame_store::{FrameSize, FrameStoreConfig, FrameStoreError, FrameStoreSession, GraphicsPoint};

const MAIN_KEY: i32 = 10;
const GRAPHICS_KEY: i32 = 11;

fn open(main: ArenaBuilder, graphics: GraphicsBuilder) -> (HeapProvider, FrameStoreSession<HeapProvider>) {
    let provider = HeapProvider::new();
    provider.insert(MAIN_KEY, main.graphics_key(GRAPHICS_KEY).build());
    provider.insert(GRAPHICS_KEY, graphics.build());
    let session = FrameStoreSession::new(provider.clone(), FrameStoreConfig::default().with_key(MAIN_KEY));
    (provider, session)
}

fn points(n: i32) -> Vec<i32> {
    (1..=n).map(|i| GraphicsPoint { location: i, color: (i % 7) as u8 }.to_packed()).collect()
}

#[test]
fn test_empty_overlay() {
    let (provider, mut session) = open(ArenaBuilder::new(2), GraphicsBuilder::new());
    let summary = session.graphics_size(1).unwrap();
    assert_eq!((summary.points, summary.blocks), (0, 0));
    assert!(session.fetch_graphics(1, 10).unwrap().is_empty());
    // Only the main arena stays attached
    assert_eq!(provider.live_count(), 1);
}

#[test]
fn test_size_and_fetch_agree() {
    let mut graphics = GraphicsBuilder::new();
    let all = points(600);
    let head = graphics.chain(0, &all);
    let main = ArenaBuilder::new(2)
        .frame(1, FrameSpec::new(10, 10).graphics_mask(0x00FF))
        .graphics_head(1, head);
    let (provider, mut session) = open(main, graphics);

    let summary = session.graphics_size(1).unwrap();
    assert_eq!(summary.points, 600);
    assert_eq!(summary.blocks, 3);
    assert_eq!(summary.mask, 0x00FF);

    let fetched = session.fetch_graphics(1, summary.points).unwrap();
    assert_eq!(fetched, all);
    assert_eq!(provider.live_count(), 1);
}

#[test]
fn test_fetch_stops_at_capacity() {
    let mut graphics = GraphicsBuilder::new();
    let all = points(300);
    let head = graphics.chain(4, &all);
    let (provider, mut session) = open(ArenaBuilder::new(1).graphics_head(1, head), graphics);

    let mut out = [0i32; 100];
    assert_eq!(session.fetch_graphics_into(1, &mut out).unwrap(), 100);
    assert_eq!(&out[..], &all[..100]);
    assert_eq!(provider.live_count(), 1);
}

#[test]
fn test_fetch_zeroes_unused_capacity() {
    let mut graphics = GraphicsBuilder::new();
    let head = graphics.chain(0, &points(3));
    let (_provider, mut session) = open(ArenaBuilder::new(1).graphics_head(1, head), graphics);

    let mut out = [-9i32; 8];
    assert_eq!(session.fetch_graphics_into(1, &mut out).unwrap(), 3);
    assert_eq!(&out[3..], &[0; 5]);
}

#[test]
fn test_display_frame_maps_to_graphics_frame() {
    let mut graphics = GraphicsBuilder::new();
    let head = graphics.chain(0, &points(5));
    let main = ArenaBuilder::new(3)
        .frame(3, FrameSpec::new(4, 4).graphics_mask(0x3))
        .graphics_frame(1, 3)
        .graphics_head(3, head);
    let (_provider, mut session) = open(main, graphics);

    let summary = session.graphics_size(1).unwrap();
    assert_eq!(summary.points, 5);
    assert_eq!(summary.mask, 0x3);
}

#[test]
fn test_cycle_reports_corrupt_and_releases() {
    let graphics = GraphicsBuilder::new().block(0, &[1, 2], 1).block(1, &[3], 0);
    let (provider, mut session) = open(ArenaBuilder::new(1).graphics_head(1, 0), graphics);

    assert!(matches!(
        session.graphics_size(1),
        Err(FrameStoreError::CorruptGraphics { frame: 1, .. })
    ));
    assert!(matches!(
        session.fetch_graphics(1, 1000),
        Err(FrameStoreError::CorruptGraphics { .. })
    ));
    // Main arena is untouched by a corrupt list
    assert!(session.is_attached());
    assert_eq!(provider.live_count(), 1);
}

#[test]
fn test_missing_graphics_segment_detaches_main() {
    let (provider, mut session) = open(ArenaBuilder::new(1), GraphicsBuilder::new());
    provider.remove(GRAPHICS_KEY);

    assert!(matches!(
        session.fetch_graphics(1, 4),
        Err(FrameStoreError::GraphicsAttach { key: GRAPHICS_KEY, .. })
    ));
    assert!(!session.is_attached());
    assert_eq!(provider.live_count(), 0);
}

#[test]
fn test_terminated_list_stops_at_end_marker() {
    let graphics = GraphicsBuilder::new()
        .block(2, &[5, 6], END_OF_LIST)
        .block(3, &[99; 10], END_OF_LIST);
    let (_provider, mut session) = open(ArenaBuilder::new(1).graphics_head(1, 2), graphics);
    assert_eq!(session.fetch_graphics(1, 50).unwrap(), vec![5, 6]);
}

#[test]
fn test_overlay_from_fetched_points() {
    let size = FrameSize::new(20, 10);
    let raw = vec![
        GraphicsPoint { location: 15 * 10 + 4, color: 2 }.to_packed(),
        GraphicsPoint { location: 3, color: 2 }.to_packed(),
    ];
    let mut graphics = GraphicsBuilder::new();
    let head = graphics.chain(0, &raw);
    let (_provider, mut session) = open(ArenaBuilder::new(1).graphics_head(1, head), graphics);

    let fetched = session.fetch_graphics(1, 10).unwrap();
    let overlay = overlay_points(&fetched, size, (1, 1));
    assert_eq!(overlay.len(), 1);
    assert_eq!((overlay[0].line, overlay[0].element), (15, 3));
}

#[test]
fn test_cycle_after_capacity_filled_is_not_seen() {
    let graphics = GraphicsBuilder::new().block(0, &[1, 2], 1).block(1, &[3], 0);
    let (provider, mut session) = open(ArenaBuilder::new(1).graphics_head(1, 0), graphics);

    assert_eq!(session.fetch_graphics(1, 3).unwrap(), vec![1, 2, 3]);
    assert!(matches!(
        session.fetch_graphics(1, 5),
        Err(FrameStoreError::CorruptGraphics { frame: 1, .. })
    ));
    assert_eq!(provider.live_count(), 1);
}
