use proptest::prelude::*;

use scenestitch_timeline_model::{ElementKind, TimelineElement};

proptest! {
    #[test]
    fn active_instants_lie_inside_overlapping_ranges(
        start in 0.0f64..100.0,
        duration in 0.0f64..50.0,
        trim_start in 0.0f64..10.0,
        trim_end in 0.0f64..10.0,
        at in 0.0f64..200.0,
    ) {
        let el = TimelineElement::new("el", ElementKind::Video, start, duration)
            .with_trim(trim_start, trim_end);

        if el.is_active_at(at) {
            prop_assert!(el.overlaps(at, at + 0.001));
            prop_assert!(el.visible_duration() > 0.0);
        }
        prop_assert!(!el.is_active_at(el.visible_end()));
    }

    #[test]
    fn visible_duration_never_negative(
        duration in 0.0f64..10.0,
        trim_start in 0.0f64..20.0,
        trim_end in 0.0f64..20.0,
    ) {
        let el = TimelineElement::new("el", ElementKind::Image, 0.0, duration)
            .with_trim(trim_start, trim_end);
        prop_assert!(el.visible_duration() >= 0.0);
    }
}
