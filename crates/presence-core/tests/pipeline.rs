use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use presence_core::{
    extract, AttendanceGate, AttendancePipeline, Decision, FrameOutcome, OutboundEvent,
    PipelineError, TemplateStore, DEFAULT_MATCH_THRESHOLD, DEFAULT_PATCH_SIZE,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

const SIZE: u32 = DEFAULT_PATCH_SIZE;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 7, 30, 0).unwrap()
}

/// Deterministic textured patch; different seeds give different textures.
fn face(seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..SIZE * SIZE)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        })
        .collect()
}

fn uniform() -> Vec<u8> {
    vec![128u8; (SIZE * SIZE) as usize]
}

fn recording_pipeline(
    cooldown: Duration,
) -> (
    AttendancePipeline<impl Fn(OutboundEvent)>,
    Rc<RefCell<Vec<OutboundEvent>>>,
) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink_seen = Rc::clone(&seen);
    let pipeline = AttendancePipeline::new(
        TemplateStore::new(),
        AttendanceGate::new(cooldown),
        move |event: OutboundEvent| sink_seen.borrow_mut().push(event),
    );
    (pipeline, seen)
}

#[test]
fn enroll_then_attend_with_cooldown() {
    let (mut pipeline, seen) = recording_pipeline(Duration::from_secs(10));
    let alice = face(1);

    pipeline.begin_enrollment("alice", 3).unwrap();
    for i in 1..=2 {
        let outcome = pipeline
            .process_patch(&alice, SIZE, SIZE, t0(), DEFAULT_MATCH_THRESHOLD)
            .unwrap();
        assert_eq!(
            outcome,
            FrameOutcome::Sampled {
                label: "alice".into(),
                samples_taken: i,
                target_count: 3,
            }
        );
    }
    let outcome = pipeline
        .process_patch(&alice, SIZE, SIZE, t0(), DEFAULT_MATCH_THRESHOLD)
        .unwrap();
    let FrameOutcome::Enrolled(template) = outcome else {
        panic!("expected commit, got {outcome:?}");
    };
    assert_eq!(template.vector, extract(&alice, SIZE, SIZE).unwrap());
    assert!(pipeline.enrollment().is_none());

    // Same face: identified, first event passes the gate.
    let first = pipeline
        .process_patch(&alice, SIZE, SIZE, t0(), DEFAULT_MATCH_THRESHOLD)
        .unwrap();
    let FrameOutcome::Recognized { decision, event } = first else {
        panic!("expected recognition");
    };
    assert!(decision.is_identified());
    assert_eq!(decision.label(), "alice");
    assert!(event.is_some());

    // One second later: still identified, but no event.
    let second = pipeline
        .process_patch(
            &alice,
            SIZE,
            SIZE,
            t0() + TimeDelta::seconds(1),
            DEFAULT_MATCH_THRESHOLD,
        )
        .unwrap();
    let FrameOutcome::Recognized { decision, event } = second else {
        panic!("expected recognition");
    };
    assert!(decision.is_identified());
    assert!(event.is_none());

    // Past the cooldown.
    let third = pipeline
        .process_patch(
            &alice,
            SIZE,
            SIZE,
            t0() + TimeDelta::seconds(11),
            DEFAULT_MATCH_THRESHOLD,
        )
        .unwrap();
    assert!(matches!(
        third,
        FrameOutcome::Recognized { event: Some(_), .. }
    ));

    let seen = seen.borrow();
    assert_eq!(seen.len(), 3);
    assert!(matches!(&seen[0], OutboundEvent::TemplateCommitted(t) if t.label == "alice"));
    assert!(matches!(&seen[1], OutboundEvent::Attendance(e) if e.timestamp == t0()));
    let later = t0() + TimeDelta::seconds(11);
    assert!(matches!(&seen[2], OutboundEvent::Attendance(e) if e.timestamp == later));
}

#[test]
fn uniform_patch_descriptor_is_bin_255() {
    let d = extract(&uniform(), SIZE, SIZE).unwrap();
    assert_eq!(d.values()[255], 1.0);
    assert_eq!(d.values().iter().filter(|&&v| v != 0.0).count(), 1);
}

#[test]
fn rejection_emits_nothing() {
    let (mut pipeline, seen) = recording_pipeline(Duration::from_secs(10));
    pipeline.begin_enrollment("flat", 1).unwrap();
    pipeline
        .process_patch(&uniform(), SIZE, SIZE, t0(), DEFAULT_MATCH_THRESHOLD)
        .unwrap();
    seen.borrow_mut().clear();

    // A threshold above 1 rejects even an exact match.
    let outcome = pipeline
        .process_patch(&uniform(), SIZE, SIZE, t0(), 1.01)
        .unwrap();
    let FrameOutcome::Recognized { decision, event } = outcome else {
        panic!("expected recognition");
    };
    assert!(matches!(decision, Decision::Unknown { score } if score > 0.99));
    assert!(event.is_none());
    assert!(seen.borrow().is_empty());
}

#[test]
fn second_enrollment_replaces_first() {
    let (mut pipeline, _seen) = recording_pipeline(Duration::ZERO);
    for seed in [4, 5] {
        pipeline.begin_enrollment("L", 2).unwrap();
        for _ in 0..2 {
            pipeline
                .process_patch(&face(seed), SIZE, SIZE, t0(), DEFAULT_MATCH_THRESHOLD)
                .unwrap();
        }
    }
    let entries: Vec<_> = pipeline
        .store()
        .list()
        .iter()
        .filter(|t| t.label == "L")
        .collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].vector, extract(&face(5), SIZE, SIZE).unwrap());
}

#[test]
fn concurrent_enrollment_rejected_and_cancel_recovers() {
    let (mut pipeline, seen) = recording_pipeline(Duration::ZERO);
    pipeline.begin_enrollment("a", 5).unwrap();
    assert!(matches!(
        pipeline.begin_enrollment("b", 5),
        Err(PipelineError::Enrollment(_))
    ));

    pipeline
        .process_patch(&face(9), SIZE, SIZE, t0(), DEFAULT_MATCH_THRESHOLD)
        .unwrap();
    assert!(pipeline.cancel_enrollment());
    assert!(pipeline.store().is_empty());
    assert!(seen.borrow().is_empty());

    pipeline.begin_enrollment("b", 1).unwrap();
    let outcome = pipeline
        .process_patch(&face(9), SIZE, SIZE, t0(), DEFAULT_MATCH_THRESHOLD)
        .unwrap();
    assert!(matches!(outcome, FrameOutcome::Enrolled(t) if t.label == "b"));
}

#[test]
fn zero_cooldown_emits_every_identification() {
    let (mut pipeline, seen) = recording_pipeline(Duration::ZERO);
    pipeline.begin_enrollment("z", 1).unwrap();
    pipeline
        .process_patch(&face(2), SIZE, SIZE, t0(), DEFAULT_MATCH_THRESHOLD)
        .unwrap();

    for _ in 0..3 {
        pipeline
            .process_patch(&face(2), SIZE, SIZE, t0(), DEFAULT_MATCH_THRESHOLD)
            .unwrap();
    }
    let attendance = seen
        .borrow()
        .iter()
        .filter(|e| matches!(e, OutboundEvent::Attendance(_)))
        .count();
    assert_eq!(attendance, 3);
}
