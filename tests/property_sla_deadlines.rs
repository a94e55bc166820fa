use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use harmony::adapters::DirectoryContextProvider;
use harmony::domain::models::{BusinessHoursConfig, ContextFlags, Metadata, RuleBook, SeverityTier};
use harmony::services::{BusinessCalendar, Classifier, PriorityResolver};

fn resolver() -> PriorityResolver {
    PriorityResolver::new(
        &RuleBook::builtin().unwrap(),
        Arc::new(DirectoryContextProvider::new()),
        &[],
        StdDuration::from_millis(100),
        1,
    )
    .unwrap()
}

fn tier_strategy() -> impl Strategy<Value = SeverityTier> {
    prop::sample::select(SeverityTier::ALL.to_vec())
}

/// Instants spread over a few years around 2026.
fn instant_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..3 * 365 * 24 * 60).prop_map(|mins| {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(mins)
    })
}

fn office_calendar() -> BusinessCalendar {
    BusinessCalendar::from_config(&BusinessHoursConfig::default())
}

proptest! {
    /// Property: initial response always comes before escalation
    #[test]
    fn prop_initial_response_precedes_escalation(
        tier in tier_strategy(),
        vip in any::<bool>(),
        prior_escalations in 0u32..5,
    ) {
        let flags = ContextFlags { vip, prior_escalations };
        let assignment = resolver().assign(tier, Some(&flags));
        prop_assert!(assignment.initial_response_mins < assignment.escalation_mins);
    }

    /// Property: each active flag raises the class one step, capped at urgent
    #[test]
    fn prop_each_flag_raises_one_class(
        tier in tier_strategy(),
        vip in any::<bool>(),
        prior_escalations in 0u32..5,
    ) {
        let flags = ContextFlags { vip, prior_escalations };
        let assignment = resolver().assign(tier, Some(&flags));
        let active = usize::from(vip) + usize::from(prior_escalations >= 1);
        prop_assert_eq!(assignment.raised_by.len(), active);

        let expected = (0..active).fold(assignment.base_class, |class, _| class.raised());
        prop_assert_eq!(assignment.class, expected);
        prop_assert!(assignment.class >= assignment.base_class);
    }

    /// Property: business deadlines never precede the start instant
    #[test]
    fn prop_deadline_not_before_start(
        start in instant_strategy(),
        minutes in 0i64..5_000,
    ) {
        let deadline = office_calendar().deadline_after(start, Duration::minutes(minutes));
        prop_assert!(deadline >= start);
    }

    /// Property: a longer business budget never yields an earlier deadline
    #[test]
    fn prop_deadline_monotonic(
        start in instant_strategy(),
        a in 0i64..3_000,
        b in 0i64..3_000,
    ) {
        let calendar = office_calendar();
        let (short, long) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            calendar.deadline_after(start, Duration::minutes(short))
                <= calendar.deadline_after(start, Duration::minutes(long))
        );
    }

    /// Property: business deadlines are never shorter than wall-clock ones
    #[test]
    fn prop_business_deadline_at_least_wall_clock(
        start in instant_strategy(),
        minutes in 1i64..3_000,
    ) {
        let business = office_calendar().deadline_after(start, Duration::minutes(minutes));
        let wall = BusinessCalendar::always_open().deadline_after(start, Duration::minutes(minutes));
        prop_assert_eq!(wall, start + Duration::minutes(minutes));
        prop_assert!(business >= wall);
    }

    /// Property: a positive business deadline lands inside open hours
    #[test]
    fn prop_deadline_inside_business_hours(
        start in instant_strategy(),
        minutes in 1i64..3_000,
    ) {
        let calendar = office_calendar();
        let deadline = calendar.deadline_after(start, Duration::minutes(minutes));
        prop_assert!(calendar.is_open_at(deadline - Duration::seconds(1)));
    }

    /// Property: a legal threat anywhere in the text forces tier 4
    #[test]
    fn prop_legal_threat_forces_tier_four(
        prefix in "[a-z ]{0,40}",
        suffix in "[a-z ]{0,40}",
    ) {
        let classifier = Classifier::new(Arc::new(RuleBook::builtin().unwrap())).unwrap();
        let text = format!("{prefix} we will file a lawsuit {suffix}");
        let c = classifier.classify_text(&text, &Metadata::new());
        prop_assert_eq!(c.tier, SeverityTier::Tier4);
        prop_assert!(c.hard_trigger.is_some());
        prop_assert!((0.0..=1.0).contains(&c.confidence));
    }
}
