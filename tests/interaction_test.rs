//! Gesture handling against a manual camera.

use camfeed::preferences::MemoryPreferenceStore;
use camfeed::testing::{phone_capabilities, ManualBackend, ManualDeviceHandle, RecordingListener};
use camfeed::{
    CamfeedConfig, DeviceCapabilities, DisplayInfo, Facing, GestureAction, GestureEvent,
    InteractionController, Rotation, Session,
};
use std::sync::Arc;

fn setup(caps: DeviceCapabilities) -> (Session, ManualDeviceHandle) {
    let mut backend = ManualBackend::new();
    let camera = backend.add_camera("back", caps);
    let session = Session::new(
        Box::new(backend),
        Arc::new(RecordingListener::new()),
        DisplayInfo::new(640, 480, Rotation::Deg0),
        Box::new(MemoryPreferenceStore::new()),
        CamfeedConfig::default(),
    )
    .unwrap();
    (session, camera)
}

fn pinch(action: GestureAction, spread: f32) -> GestureEvent {
    GestureEvent::new(action, vec![(100.0, 100.0), (100.0 + spread, 100.0)])
}

fn tap(action: GestureAction) -> GestureEvent {
    GestureEvent::new(action, vec![(50.0, 50.0)])
}

#[test]
fn test_closed_session_does_not_consume_events() {
    let (session, _camera) = setup(phone_capabilities(Facing::Back, Rotation::Deg90));
    let mut controller = InteractionController::new();
    assert!(!controller.handle(&session, &tap(GestureAction::Up)));
    assert!(!controller.handle(&session, &pinch(GestureAction::Move, 10.0)));
}

#[test]
fn test_pinch_steps_zoom_one_at_a_time() {
    let (session, camera) = setup(phone_capabilities(Facing::Back, Rotation::Deg90));
    session.open().unwrap();
    let mut controller = InteractionController::new();

    assert!(controller.handle(&session, &pinch(GestureAction::PointerDown, 100.0)));
    assert!(controller.handle(&session, &pinch(GestureAction::Move, 150.0)));
    assert_eq!(session.zoom(), Some(1));
    assert!(controller.handle(&session, &pinch(GestureAction::Move, 300.0)));
    assert_eq!(session.zoom(), Some(2));

    let updates = camera.counters().parameter_updates;
    assert!(controller.handle(&session, &pinch(GestureAction::Move, 300.0)));
    assert_eq!(session.zoom(), Some(2));
    assert_eq!(camera.counters().parameter_updates, updates);

    assert!(controller.handle(&session, &pinch(GestureAction::Move, 120.0)));
    assert_eq!(session.zoom(), Some(1));

    // Every multi-pointer event cancels a running autofocus first.
    assert_eq!(camera.counters().autofocus_cancels, 5);
}

#[test]
fn test_pinch_clamps_at_bounds() {
    let mut caps = phone_capabilities(Facing::Back, Rotation::Deg90);
    caps.max_zoom = 1;
    let (session, _camera) = setup(caps);
    session.open().unwrap();
    let mut controller = InteractionController::new();

    controller.handle(&session, &pinch(GestureAction::PointerDown, 100.0));
    controller.handle(&session, &pinch(GestureAction::Move, 50.0));
    assert_eq!(session.zoom(), Some(0));
    controller.handle(&session, &pinch(GestureAction::Move, 100.0));
    controller.handle(&session, &pinch(GestureAction::Move, 200.0));
    controller.handle(&session, &pinch(GestureAction::Move, 400.0));
    assert_eq!(session.zoom(), Some(1));
}

#[test]
fn test_pinch_without_zoom_is_consumed_without_effect() {
    let mut caps = phone_capabilities(Facing::Back, Rotation::Deg90);
    caps.can_zoom = false;
    let (session, camera) = setup(caps);
    session.open().unwrap();
    let mut controller = InteractionController::new();

    assert!(controller.handle(&session, &pinch(GestureAction::PointerDown, 100.0)));
    assert!(controller.handle(&session, &pinch(GestureAction::Move, 200.0)));
    assert_eq!(session.zoom(), Some(0));
    assert_eq!(camera.counters().autofocus_cancels, 0);
}

#[test]
fn test_tap_release_refocuses_only_when_capturable() {
    let (session, camera) = setup(phone_capabilities(Facing::Back, Rotation::Deg90));
    session.open().unwrap();
    let mut controller = InteractionController::new();

    assert!(controller.handle(&session, &tap(GestureAction::Up)));
    assert_eq!(camera.counters().autofocus_requests, 0);

    session.start_streaming().unwrap();
    let after_start = camera.counters().autofocus_requests;
    assert!(controller.handle(&session, &tap(GestureAction::Down)));
    assert!(controller.handle(&session, &tap(GestureAction::Up)));
    assert_eq!(camera.counters().autofocus_requests, after_start + 1);

    session.take_capture().unwrap();
    assert!(controller.handle(&session, &tap(GestureAction::Up)));
    assert_eq!(camera.counters().autofocus_requests, after_start + 1);
}

#[test]
fn test_autofocus_failure_is_ignored() {
    let (session, camera) = setup(phone_capabilities(Facing::Back, Rotation::Deg90));
    camera.fail_autofocus(true);
    session.start().unwrap();
    let mut controller = InteractionController::new();
    assert!(controller.handle(&session, &tap(GestureAction::Up)));
    assert_eq!(camera.counters().autofocus_requests, 2);
}

#[test]
fn test_fixed_focus_camera_never_refocuses() {
    let mut caps = phone_capabilities(Facing::Front, Rotation::Deg270);
    caps.can_autofocus = false;
    let (session, camera) = setup(caps);
    session.start().unwrap();
    let mut controller = InteractionController::new();
    assert!(controller.handle(&session, &tap(GestureAction::Up)));
    assert_eq!(camera.counters().autofocus_requests, 0);
}
