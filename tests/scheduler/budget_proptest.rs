/*!
 * Core Budget Property Tests
 * The budget invariant under random slot and core-count mutations
 */

use pipeline_supervisor::{JobRegistry, ModuleSelection};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Add,
    Remove(usize),
    SetCores(usize, usize),
    SetPopulation(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Add),
        (0usize..8).prop_map(Op::Remove),
        (0usize..8, 0usize..10).prop_map(|(job, cores)| Op::SetCores(job, cores)),
        (0usize..8).prop_map(Op::SetPopulation),
    ]
}

proptest! {
    #[test]
    fn prop_used_cores_never_exceed_budget(
        budget in 1usize..9,
        ops in prop::collection::vec(op(), 1..64),
    ) {
        let registry = JobRegistry::new(budget);

        for op in ops {
            let slots: Vec<usize> = registry.jobs().iter().map(|job| job.index).collect();
            let pick = |n: usize| slots.get(n % slots.len().max(1)).copied();

            match op {
                Op::Add => {
                    let _ = registry.add_job_slot();
                }
                Op::Remove(n) => {
                    if let Some(index) = pick(n) {
                        let _ = registry.remove_job_slot(index);
                    }
                }
                Op::SetCores(n, cores) => {
                    if let Some(index) = pick(n) {
                        let before = registry.job(index).unwrap().core_count;
                        if registry.set_core_count(index, cores).is_err() {
                            prop_assert_eq!(registry.job(index).unwrap().core_count, before);
                        }
                    }
                }
                Op::SetPopulation(n) => {
                    if let Some(index) = pick(n) {
                        let _ = registry.set_module_selection(index, ModuleSelection::Population);
                    }
                }
            }

            prop_assert!(registry.used_cores() <= registry.physical_core_budget());
            for job in registry.jobs() {
                prop_assert!(job.core_count >= 1);
                if job.module == ModuleSelection::Population {
                    prop_assert_eq!(job.core_count, 1);
                }
            }
        }
    }
}
