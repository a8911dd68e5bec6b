//! End-to-end scenarios driving the tracker with synthetic depth streams

use std::collections::BTreeSet;

use anyhow::Result;
use depthgrid::{DepthFrame, ProjectionCache};
use hand_tracker::{HandFrame, HandSettings, HandTracker, TrackingStatus};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const WIDTH: usize = 320;
const HEIGHT: usize = 240;

fn projection() -> ProjectionCache {
    ProjectionCache::new(320.0, 240.0, 1.11, 0.83).unwrap()
}

fn empty_frame(index: u64) -> DepthFrame {
    DepthFrame::new(WIDTH, HEIGHT, index, vec![0u16; WIDTH * HEIGHT]).unwrap()
}

fn stamp_disk(data: &mut [u16], cx: usize, cy: usize, radius: usize, depth_mm: u16) {
    let r2 = (radius * radius) as isize;
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let dx = x as isize - cx as isize;
            let dy = y as isize - cy as isize;
            if dx * dx + dy * dy <= r2 {
                data[y * WIDTH + x] = depth_mm;
            }
        }
    }
}

fn disk_frame(cx: usize, cy: usize, radius: usize, depth_mm: u16, index: u64) -> DepthFrame {
    let mut data = vec![0u16; WIDTH * HEIGHT];
    stamp_disk(&mut data, cx, cy, radius, depth_mm);
    DepthFrame::new(WIDTH, HEIGHT, index, data).unwrap()
}

/// Every emitted id, in order of first appearance, plus per-frame checks of
/// the emission invariants: the bound, the slot layout, and candidate
/// gating.
fn check_frame(frame: &HandFrame, settings: &HandSettings, seen: &mut BTreeSet<i32>) {
    let max = settings.point_processor.max_hand_count;
    assert!(frame.hand_count <= max);
    assert_eq!(frame.hands.len(), max);
    for record in frame.active_hands() {
        assert!(record.tracking_id >= 0);
        if record.status == TrackingStatus::Candidate {
            assert!(settings.point_processor.include_candidate_points);
        }
        seen.insert(record.tracking_id);
    }
    for record in &frame.hands[frame.hand_count..] {
        assert_eq!(record.tracking_id, -1);
        assert_eq!(record.status, TrackingStatus::NotTracking);
    }
}

#[test]
fn scenario_empty_scene_emits_nothing() -> Result<()> {
    let settings = HandSettings::default();
    let mut tracker = HandTracker::new(settings.clone())?;
    let projection = projection();
    let mut seen = BTreeSet::new();

    for index in 0..30 {
        let frame = tracker.on_frame(&empty_frame(index), &projection)?;
        check_frame(&frame, &settings, &mut seen);
        assert_eq!(frame.hand_count, 0);
        assert_eq!(tracker.tracked_points().count(), 0);
    }
    assert!(seen.is_empty());
    Ok(())
}

#[test]
fn scenario_static_blob_never_becomes_a_hand() -> Result<()> {
    let settings = HandSettings::default();
    let mut tracker = HandTracker::new(settings.clone())?;
    let projection = projection();
    let mut seen = BTreeSet::new();

    // Present from the very first frame: the temporal average locks onto it
    // immediately, so it never produces motion.
    for index in 0..30 {
        let frame = tracker.on_frame(&disk_frame(160, 120, 30, 700, index), &projection)?;
        check_frame(&frame, &settings, &mut seen);
        assert_eq!(frame.hand_count, 0);
        assert_eq!(tracker.tracked_points().count(), 0);
    }
    assert!(seen.is_empty());
    Ok(())
}

#[test]
fn scenario_appearing_hand_full_lifecycle() -> Result<()> {
    let mut settings = HandSettings::default();
    settings.point_processor.include_candidate_points = true;
    settings.point_processor.lost_timeout = 10;
    settings.point_processor.dead_timeout = 20;
    settings.point_processor.max_failed_tests = 30;
    let mut tracker = HandTracker::new(settings.clone())?;
    let projection = projection();
    let mut seen = BTreeSet::new();

    let promotion_frame = 11 + settings.point_processor.second_chance_min_frames as u64;
    let mut last_emitted_frame = 0u64;

    for index in 1..=80u64 {
        let raw = if (11..=40).contains(&index) {
            disk_frame(160, 120, 30, 700, index)
        } else {
            empty_frame(index)
        };
        let frame = tracker.on_frame(&raw, &projection)?;
        check_frame(&frame, &settings, &mut seen);

        match index {
            1..=10 => assert_eq!(frame.hand_count, 0, "frame {index}"),
            11 => {
                assert_eq!(frame.hand_count, 1);
                let hand = frame.hands[0];
                assert_eq!(hand.tracking_id, 1);
                assert_eq!(hand.status, TrackingStatus::Candidate);
            }
            40 => {
                let hand = frame.hands[0];
                assert_eq!(hand.tracking_id, 1);
                assert_eq!(hand.status, TrackingStatus::Tracking);
                // True disk centroid projects to the optical axis at 700 mm.
                assert!(hand.world_position[0].abs() < 20.0);
                assert!(hand.world_position[1].abs() < 20.0);
                assert!((hand.world_position[2] - 700.0).abs() < 20.0);
            }
            41 => {
                assert_eq!(frame.hand_count, 1);
                assert_eq!(frame.hands[0].status, TrackingStatus::Lost);
            }
            _ => {}
        }
        if index == promotion_frame {
            assert_eq!(frame.hands[0].status, TrackingStatus::Tracking, "frame {index}");
        }
        if frame.hand_count > 0 {
            last_emitted_frame = index;
        }
    }

    // Lost at 41, dead within dead_timeout frames of that, and never again.
    assert!(last_emitted_frame >= 59 && last_emitted_frame <= 41 + 20);
    assert_eq!(tracker.tracked_points().count(), 0);
    assert_eq!(seen.iter().copied().collect::<Vec<_>>(), vec![1]);
    Ok(())
}

#[test]
fn scenario_candidates_are_gated_by_settings() -> Result<()> {
    // Same appearing disk, but candidates are not emitted: nothing shows
    // until the point promotes.
    let settings = HandSettings::default();
    assert!(!settings.point_processor.include_candidate_points);
    let mut tracker = HandTracker::new(settings.clone())?;
    let projection = projection();
    let mut seen = BTreeSet::new();

    let mut first_emission = None;
    for index in 1..=30u64 {
        let raw = if index >= 11 {
            disk_frame(160, 120, 30, 700, index)
        } else {
            empty_frame(index)
        };
        let frame = tracker.on_frame(&raw, &projection)?;
        check_frame(&frame, &settings, &mut seen);
        if index >= 11 && index < 11 + settings.point_processor.second_chance_min_frames as u64 - 1
        {
            assert_eq!(frame.hand_count, 0, "unpromoted candidate leaked at {index}");
            assert_eq!(tracker.tracked_points().count(), 1);
        }
        if frame.hand_count > 0 && first_emission.is_none() {
            first_emission = Some((index, frame.hands[0].status));
        }
    }

    let (index, status) = first_emission.expect("promoted hand was emitted");
    assert!(index >= 11 + settings.point_processor.second_chance_min_frames as u64 - 1);
    assert_eq!(status, TrackingStatus::Tracking);
    Ok(())
}

#[test]
fn scenario_merging_hands_keep_lower_id() -> Result<()> {
    let mut settings = HandSettings::default();
    settings.point_processor.include_candidate_points = true;
    let mut tracker = HandTracker::new(settings.clone())?;
    let projection = projection();
    let mut seen = BTreeSet::new();

    for index in 0..5u64 {
        let frame = tracker.on_frame(&empty_frame(index), &projection)?;
        check_frame(&frame, &settings, &mut seen);
    }

    let mut both_emitted = false;
    for t in 0..25u64 {
        let offset = (2 * t) as usize;
        let mut data = vec![0u16; WIDTH * HEIGHT];
        stamp_disk(&mut data, (110 + offset).min(160), 120, 30, 700);
        stamp_disk(&mut data, (210 - offset).max(160), 120, 30, 700);
        let raw = DepthFrame::new(WIDTH, HEIGHT, 5 + t, data).unwrap();

        let frame = tracker.on_frame(&raw, &projection)?;
        check_frame(&frame, &settings, &mut seen);
        if frame.hand_count == 2 {
            both_emitted = true;
        }
    }

    assert!(both_emitted, "both hands were visible before the merge");
    assert_eq!(seen.iter().copied().collect::<Vec<_>>(), vec![1, 2]);

    // After the merge exactly one point survives, and it is the older one.
    let survivors: Vec<u32> = tracker.tracked_points().map(|p| p.tracking_id).collect();
    assert_eq!(survivors, vec![1]);
    Ok(())
}

#[test]
fn scenario_hand_leaving_depth_range_dies() -> Result<()> {
    let mut settings = HandSettings::default();
    settings.depth_utility.max_depth = 1500.0;
    settings.point_processor.include_candidate_points = true;
    settings.point_processor.lost_timeout = 5;
    settings.point_processor.dead_timeout = 10;
    settings.point_processor.max_failed_tests = 15;
    let mut tracker = HandTracker::new(settings.clone())?;
    let projection = projection();
    let mut seen = BTreeSet::new();

    for index in 0..5u64 {
        let frame = tracker.on_frame(&empty_frame(index), &projection)?;
        check_frame(&frame, &settings, &mut seen);
    }

    let mut lost_frame = None;
    let mut first_out_of_range = None;
    // Recede along z at 45 mm per frame, shrinking like a real object, and
    // hold the out-of-range depth afterwards.
    for t in 0..30u64 {
        let depth = (745 + 45 * t).min(1600) as u16;
        let radius = (30 * 700 / depth as usize).max(8);
        let raw = disk_frame(160, 120, radius, depth, 5 + t);
        let frame = tracker.on_frame(&raw, &projection)?;
        check_frame(&frame, &settings, &mut seen);

        if depth > 1500 && first_out_of_range.is_none() {
            first_out_of_range = Some(5 + t);
        }
        if lost_frame.is_none()
            && frame
                .active_hands()
                .iter()
                .any(|h| h.status == TrackingStatus::Lost)
        {
            lost_frame = Some(5 + t);
        }
    }

    // Lost in the frame the range test first fails, dead soon after.
    assert_eq!(lost_frame, first_out_of_range);
    assert_eq!(tracker.tracked_points().count(), 0);
    assert_eq!(seen.iter().copied().collect::<Vec<_>>(), vec![1]);
    Ok(())
}

#[test]
fn scenario_recovery_within_lost_window_keeps_id() -> Result<()> {
    let mut settings = HandSettings::default();
    settings.point_processor.include_candidate_points = true;
    settings.point_processor.lost_timeout = 10;
    settings.point_processor.dead_timeout = 20;
    settings.point_processor.max_failed_tests = 30;
    let mut tracker = HandTracker::new(settings.clone())?;
    let projection = projection();
    let mut seen = BTreeSet::new();

    let occlusion_start = 15u64;
    let occlusion_frames = settings.point_processor.lost_timeout as u64 - 1;
    let reappear = occlusion_start + occlusion_frames;

    for index in 0..(reappear + 12) {
        let raw = if index < 5 {
            empty_frame(index)
        } else if index < occlusion_start {
            disk_frame(160, 120, 30, 700, index)
        } else if index < reappear {
            empty_frame(index)
        } else {
            disk_frame(160, 120, 30, 700, index)
        };
        let frame = tracker.on_frame(&raw, &projection)?;
        check_frame(&frame, &settings, &mut seen);

        if index == occlusion_start {
            assert_eq!(frame.hands[0].status, TrackingStatus::Lost);
        }
        if index == reappear + 1 {
            assert_eq!(frame.hands[0].tracking_id, 1);
            assert_eq!(frame.hands[0].status, TrackingStatus::Tracking);
        }
    }

    // The occluded hand came back under its original id; no second id was
    // ever allocated.
    assert_eq!(seen.iter().copied().collect::<Vec<_>>(), vec![1]);
    let survivors: Vec<u32> = tracker.tracked_points().map(|p| p.tracking_id).collect();
    assert_eq!(survivors, vec![1]);
    Ok(())
}

#[test]
fn scenario_random_speckle_never_becomes_a_hand() -> Result<()> {
    let settings = HandSettings::default();
    let mut tracker = HandTracker::new(settings.clone())?;
    let projection = projection();
    let mut seen = BTreeSet::new();
    let mut rng = StdRng::seed_from_u64(7);

    // Per-pixel random depth, reshuffled each frame: motion everywhere, but
    // nothing hand-shaped survives the geometric tests long enough to be
    // promoted and emitted.
    for index in 0..15u64 {
        let data: Vec<u16> = (0..WIDTH * HEIGHT)
            .map(|_| rng.gen_range(500u16..4000))
            .collect();
        let raw = DepthFrame::new(WIDTH, HEIGHT, index, data).unwrap();
        let frame = tracker.on_frame(&raw, &projection)?;
        check_frame(&frame, &settings, &mut seen);
        assert_eq!(frame.hand_count, 0, "frame {index}");
    }
    assert!(seen.is_empty());
    Ok(())
}

#[test]
fn scenario_dimension_change_rebaselines_without_stale_points() -> Result<()> {
    let mut settings = HandSettings::default();
    settings.point_processor.include_candidate_points = true;
    let mut tracker = HandTracker::new(settings.clone())?;
    let projection = projection();
    let mut seen = BTreeSet::new();

    for index in 0..5u64 {
        tracker.on_frame(&empty_frame(index), &projection)?;
    }
    tracker.on_frame(&disk_frame(160, 120, 30, 700, 5), &projection)?;
    assert_eq!(tracker.tracked_points().count(), 1);

    // Switch to a 640x480 producer mid-stream: the utility re-baselines, so
    // the identical scene raises no motion and no new ids appear.
    let mut data = vec![0u16; 640 * 480];
    let r2 = 60isize * 60;
    for y in 0..480usize {
        for x in 0..640usize {
            let dx = x as isize - 320;
            let dy = y as isize - 240;
            if dx * dx + dy * dy <= r2 {
                data[y * 640 + x] = 700;
            }
        }
    }
    let big = DepthFrame::new(640, 480, 6, data).unwrap();
    let frame = tracker.on_frame(&big, &projection)?;
    check_frame(&frame, &settings, &mut seen);

    let ids: Vec<u32> = tracker.tracked_points().map(|p| p.tracking_id).collect();
    assert_eq!(ids, vec![1]);
    Ok(())
}
