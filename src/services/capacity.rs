//! Concurrent-assignment counters per specialist role.
//!
//! These counters are the only mutable state shared across requests. All
//! updates are single atomic operations, so no lock is taken.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::models::{RuleBook, SpecialistRole};

#[derive(Debug)]
struct RoleSlot {
    in_use: AtomicUsize,
    limit: Option<usize>,
}

#[derive(Debug)]
pub struct CapacityRegistry {
    slots: HashMap<SpecialistRole, RoleSlot>,
}

impl CapacityRegistry {
    pub fn from_rules(rules: &RuleBook) -> Self {
        let slots = SpecialistRole::ALL
            .into_iter()
            .map(|role| {
                (
                    role,
                    RoleSlot {
                        in_use: AtomicUsize::new(0),
                        limit: rules.capacity_for(role),
                    },
                )
            })
            .collect();
        Self { slots }
    }

    /// Take one slot if the role is below its limit.
    pub fn try_acquire(&self, role: SpecialistRole) -> bool {
        let Some(slot) = self.slots.get(&role) else {
            return false;
        };
        slot.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| match slot.limit {
                Some(limit) if current >= limit => None,
                _ => Some(current + 1),
            })
            .is_ok()
    }

    /// Take one slot even if the role is at its limit.
    pub fn force_acquire(&self, role: SpecialistRole) {
        if let Some(slot) = self.slots.get(&role) {
            slot.in_use.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Return one slot. Never underflows.
    pub fn release(&self, role: SpecialistRole) {
        if let Some(slot) = self.slots.get(&role) {
            let _ = slot
                .in_use
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    current.checked_sub(1)
                });
        }
    }

    pub fn in_use(&self, role: SpecialistRole) -> usize {
        self.slots
            .get(&role)
            .map_or(0, |slot| slot.in_use.load(Ordering::Acquire))
    }

    pub fn has_capacity(&self, role: SpecialistRole) -> bool {
        self.slots.get(&role).is_some_and(|slot| match slot.limit {
            Some(limit) => slot.in_use.load(Ordering::Acquire) < limit,
            None => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn registry_with_limit(role: SpecialistRole, limit: usize) -> CapacityRegistry {
        let mut rules = RuleBook::builtin().unwrap();
        rules.role_capacity.retain(|entry| entry.role != role);
        rules
            .role_capacity
            .push(crate::domain::models::rules::RoleCapacity {
                role,
                max_concurrent: limit,
            });
        CapacityRegistry::from_rules(&rules)
    }

    #[test]
    fn test_acquire_stops_at_limit() {
        let registry = registry_with_limit(SpecialistRole::BillingSupport, 2);
        assert!(registry.try_acquire(SpecialistRole::BillingSupport));
        assert!(registry.try_acquire(SpecialistRole::BillingSupport));
        assert!(!registry.try_acquire(SpecialistRole::BillingSupport));
        assert!(!registry.has_capacity(SpecialistRole::BillingSupport));

        registry.release(SpecialistRole::BillingSupport);
        assert!(registry.try_acquire(SpecialistRole::BillingSupport));
    }

    #[test]
    fn test_release_never_underflows() {
        let registry = registry_with_limit(SpecialistRole::BillingSupport, 1);
        registry.release(SpecialistRole::BillingSupport);
        assert_eq!(registry.in_use(SpecialistRole::BillingSupport), 0);
    }

    #[test]
    fn test_unlimited_role() {
        let registry = CapacityRegistry::from_rules(&RuleBook::builtin().unwrap());
        for _ in 0..1000 {
            assert!(registry.try_acquire(SpecialistRole::GeneralSupport));
        }
        assert_eq!(registry.in_use(SpecialistRole::GeneralSupport), 1000);
    }

    #[test]
    fn test_concurrent_acquire_respects_limit() {
        let registry = Arc::new(registry_with_limit(SpecialistRole::QualityReview, 10));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    (0..10)
                        .filter(|_| registry.try_acquire(SpecialistRole::QualityReview))
                        .count()
                })
            })
            .collect();
        let acquired: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(acquired, 10);
        assert_eq!(registry.in_use(SpecialistRole::QualityReview), 10);
    }
}
