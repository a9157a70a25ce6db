use proptest::prelude::*;

use adaptive_practice::engine::bkt::{update, BktParams};
use adaptive_practice::engine::spaced_repetition::{next_interval_days, next_review_time};

const EPS: f64 = 1e-4;

fn params(p_transit: f64, p_guess: f64, p_slip: f64) -> BktParams {
    BktParams {
        p_init: 0.1,
        p_transit,
        p_guess,
        p_slip,
    }
}

proptest! {
    #[test]
    fn pt_bkt_output_stays_inside_bounds(
        p_l in 0.0_f64..=1.0,
        p_t in 0.0_f64..=1.0,
        p_g in 0.0_f64..=1.0,
        p_s in 0.0_f64..=1.0,
        correct in any::<bool>(),
    ) {
        let next = update(p_l, correct, &params(p_t, p_g, p_s), EPS);
        prop_assert!(next.is_finite());
        prop_assert!(next >= EPS && next <= 1.0 - EPS);
    }

    #[test]
    fn pt_bkt_correct_never_below_wrong(
        p_l in 0.001_f64..0.999,
        p_t in 0.0_f64..=1.0,
        p_g in 0.0_f64..0.5,
        p_s in 0.0_f64..0.5,
    ) {
        let p = params(p_t, p_g, p_s);
        let right = update(p_l, true, &p, EPS);
        let wrong = update(p_l, false, &p, EPS);
        prop_assert!(right + 1e-12 >= wrong, "right {} < wrong {}", right, wrong);
    }

    #[test]
    fn pt_sm2_failure_always_resets(
        prev in 0_u32..10_000,
        reps in 0_u32..100,
        quality in 0_u8..3,
    ) {
        prop_assert_eq!(next_interval_days(prev, reps, quality, 3, 2.5), 1);
    }

    #[test]
    fn pt_sm2_growth_after_second_review(
        prev in 1_u32..10_000,
        reps in 2_u32..100,
        quality in 3_u8..=5,
    ) {
        let next = next_interval_days(prev, reps, quality, 3, 2.5);
        prop_assert_eq!(next, (f64::from(prev) * 2.5).round() as u32);
        prop_assert!(next > prev);
    }

    #[test]
    fn pt_sm2_due_time_is_in_the_future(
        prev in 0_u32..1_000,
        reps in 0_u32..10,
        quality in 0_u8..=5,
        now in 0_i64..4_000_000_000,
    ) {
        let due = next_review_time(prev, reps, quality, 3, 2.5, now);
        prop_assert!(due >= now + 86_400);
        prop_assert_eq!((due - now) % 86_400, 0);
    }
}
