//! Migrator - Core migration execution engine

use crate::config::{LedgerConfig, DEFAULT_LOCK_KEY};
use crate::executor::Executor;
use crate::migration::lock::MigrationLockGuard;
use crate::migration::{
    Direction, Migration, MigrationChain, MigrationError, MigrationStatus, Reversibility,
    SchemaManager, StateTable, TransactionMode,
};
use std::time::Instant;

/// Revert target meaning "before the first step"
pub const BASE: &str = "base";

const DEFAULT_LOCK_TIMEOUT_SECONDS: u64 = 60;

/// One step of a planned walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub id: String,
    pub description: String,
    pub mode: TransactionMode,
    pub reversibility: Reversibility,
}

/// The ordered steps a walk would execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    pub direction: Direction,
    pub head_before: Option<String>,
    /// Head once every planned step has run
    pub head_after: Option<String>,
    pub steps: Vec<PlannedStep>,
}

impl MigrationPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Outcome of one executed step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub id: String,
    pub direction: Direction,
    pub execution_time_ms: i64,
    /// The step's effect was already present; only the tracker was updated
    pub reconciled: bool,
}

/// Outcome of a completed walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub direction: Direction,
    pub head_before: Option<String>,
    pub head_after: Option<String>,
    pub steps: Vec<StepOutcome>,
}

impl MigrationReport {
    #[must_use]
    pub fn count(&self) -> usize {
        self.steps.len()
    }
}

/// Core migration execution engine
///
/// Walks the chain forward (apply) or backward (revert) one step at a time.
/// Each step is its own unit of work; a failure halts the walk with every
/// earlier step committed and the failing step rolled back, so the applied
/// set always stays a prefix of the chain.
///
/// Every walk holds the advisory lock for its whole duration.
pub struct Migrator {
    chain: MigrationChain,
    state_table: StateTable,
    lock_key: i64,
    lock_timeout_seconds: u64,
}

impl Migrator {
    /// Create a migrator over `chain` with the default state table and lock
    ///
    /// # Arguments
    ///
    /// * `chain` - The validated step chain to walk
    #[must_use]
    pub fn new(chain: MigrationChain) -> Self {
        Self {
            chain,
            state_table: StateTable::default(),
            lock_key: DEFAULT_LOCK_KEY,
            lock_timeout_seconds: DEFAULT_LOCK_TIMEOUT_SECONDS,
        }
    }

    /// Build a migrator using the state table and lock settings from `config`
    ///
    /// # Arguments
    ///
    /// * `chain` - The validated step chain to walk
    /// * `config` - Loaded settings; only the `migrations` section is read
    #[must_use]
    pub fn from_config(chain: MigrationChain, config: &LedgerConfig) -> Self {
        Self::new(chain)
            .with_state_table(StateTable::new(config.migrations.state_table.clone()))
            .with_lock(config.migrations.lock_key, config.migrations.lock_timeout_seconds)
    }

    #[must_use]
    pub fn with_state_table(mut self, state_table: StateTable) -> Self {
        self.state_table = state_table;
        self
    }

    #[must_use]
    pub fn with_lock(mut self, key: i64, timeout_seconds: u64) -> Self {
        self.lock_key = key;
        self.lock_timeout_seconds = timeout_seconds;
        self
    }

    pub fn chain(&self) -> &MigrationChain {
        &self.chain
    }

    pub fn state_table(&self) -> &StateTable {
        &self.state_table
    }

    /// Applied and pending steps, validated against the chain
    ///
    /// # Arguments
    ///
    /// * `executor` - Connection to the target database
    ///
    /// # Returns
    ///
    /// The applied steps in chain order, the head, and the pending ids.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable, or if the applied set is
    /// inconsistent with the chain (unknown id, gap, or checksum drift).
    pub fn status(&self, executor: &dyn Executor) -> Result<MigrationStatus, MigrationError> {
        self.state_table.ensure(executor)?;
        let records = self.state_table.records(executor)?;
        MigrationStatus::evaluate(&self.chain, records)
    }

    /// The most recently applied step, `None` when nothing is applied
    ///
    /// # Errors
    ///
    /// Same as [`Migrator::status`].
    pub fn head(&self, executor: &dyn Executor) -> Result<Option<String>, MigrationError> {
        let status = self.status(executor)?;
        Ok(status.head().map(str::to_string))
    }

    /// Steps [`Migrator::apply_to`] would run, without running them
    ///
    /// # Arguments
    ///
    /// * `executor` - Connection to the target database
    /// * `target` - Last step to apply; `None` targets the latest step
    ///
    /// # Returns
    ///
    /// The steps in execution order, empty when `target` is already the head.
    ///
    /// # Errors
    ///
    /// Returns `UnknownMigration` for a target outside the chain and
    /// `Precondition` for a target behind the current head.
    pub fn plan_apply(
        &self,
        executor: &dyn Executor,
        target: Option<&str>,
    ) -> Result<MigrationPlan, MigrationError> {
        let status = self.status(executor)?;
        self.apply_plan(&status, target)
    }

    /// Steps [`Migrator::revert_to`] would run, without running them
    ///
    /// # Arguments
    ///
    /// * `executor` - Connection to the target database
    /// * `target` - Step that becomes the head, or [`BASE`]
    ///
    /// # Errors
    ///
    /// Returns `UnknownMigration` for a target outside the chain, and
    /// `Precondition` for an unapplied target or an irreversible step in range.
    pub fn plan_revert(
        &self,
        executor: &dyn Executor,
        target: &str,
    ) -> Result<MigrationPlan, MigrationError> {
        let status = self.status(executor)?;
        self.revert_plan(&status, target)
    }

    /// Apply every pending step
    ///
    /// Returns an empty report when the head is already the latest step.
    ///
    /// # Errors
    ///
    /// Returns the first failure; earlier steps of the walk remain applied.
    pub fn apply_latest(&self, executor: &dyn Executor) -> Result<MigrationReport, MigrationError> {
        self.walk(executor, |status| self.apply_plan(status, None))
    }

    /// Apply pending steps up to and including `target`
    ///
    /// # Returns
    ///
    /// One outcome per executed step, in the order they ran.
    ///
    /// # Errors
    ///
    /// In addition to step failures, returns `UnknownMigration` if `target` is
    /// not in the chain and `Precondition` if it lies behind the head.
    pub fn apply_to(
        &self,
        executor: &dyn Executor,
        target: &str,
    ) -> Result<MigrationReport, MigrationError> {
        self.walk(executor, |status| self.apply_plan(status, Some(target)))
    }

    /// Revert applied steps newest-first until `target` is the head
    ///
    /// # Arguments
    ///
    /// * `executor` - Connection to the target database
    /// * `target` - Step that stays applied; [`BASE`] reverts every step
    ///
    /// # Returns
    ///
    /// One outcome per reverted step, newest first.
    ///
    /// # Errors
    ///
    /// In addition to step failures, returns `UnknownMigration` if `target` is
    /// not in the chain, and `Precondition` if it is not applied or if any
    /// step in range is irreversible (checked before anything runs).
    pub fn revert_to(
        &self,
        executor: &dyn Executor,
        target: &str,
    ) -> Result<MigrationReport, MigrationError> {
        self.walk(executor, |status| self.revert_plan(status, target))
    }

    fn walk<F>(&self, executor: &dyn Executor, plan_fn: F) -> Result<MigrationReport, MigrationError>
    where
        F: FnOnce(&MigrationStatus) -> Result<MigrationPlan, MigrationError>,
    {
        let _lock = MigrationLockGuard::acquire(executor, self.lock_key, self.lock_timeout_seconds)?;

        // Read state only after the lock is held; a concurrent run may have moved the head
        let status = self.status(executor)?;
        let plan = plan_fn(&status)?;

        if plan.is_empty() {
            log::info!(
                "No migrations to {}; head is {}",
                plan.direction,
                plan.head_before.as_deref().unwrap_or(BASE)
            );
        }

        let mut steps = Vec::with_capacity(plan.steps.len());
        for planned in &plan.steps {
            let Some(step) = self.chain.get(&planned.id) else {
                return Err(MigrationError::UnknownMigration(planned.id.clone()));
            };
            match self.run_step(executor, step, plan.direction) {
                Ok(outcome) => steps.push(outcome),
                Err(e) => {
                    log::error!(
                        "Migration walk halted after {} of {} step(s): {e}",
                        steps.len(),
                        plan.steps.len()
                    );
                    return Err(e);
                }
            }
        }

        if !steps.is_empty() {
            log::info!(
                "{} {} migration(s); head is now {}",
                match plan.direction {
                    Direction::Apply => "Applied",
                    Direction::Revert => "Reverted",
                },
                steps.len(),
                plan.head_after.as_deref().unwrap_or(BASE)
            );
        }

        Ok(MigrationReport {
            direction: plan.direction,
            head_before: plan.head_before,
            head_after: plan.head_after,
            steps,
        })
    }

    fn apply_plan(
        &self,
        status: &MigrationStatus,
        target: Option<&str>,
    ) -> Result<MigrationPlan, MigrationError> {
        let head_before = status.head().map(str::to_string);
        let target_pos = match target {
            Some(id) => self.target_position(id)?,
            None => self.chain.len() - 1,
        };

        if target_pos + 1 < status.applied_count {
            return Err(MigrationError::Precondition(format!(
                "cannot apply to '{}': it is behind the current head '{}'; revert instead",
                target.unwrap_or_default(),
                head_before.as_deref().unwrap_or(BASE)
            )));
        }

        let steps: Vec<PlannedStep> = (status.applied_count..=target_pos)
            .filter_map(|pos| self.chain.at(pos))
            .map(|step| planned(step, Direction::Apply))
            .collect();
        let head_after = if steps.is_empty() {
            head_before.clone()
        } else {
            self.chain.at(target_pos).map(|s| s.id().to_string())
        };

        Ok(MigrationPlan {
            direction: Direction::Apply,
            head_before,
            head_after,
            steps,
        })
    }

    fn revert_plan(
        &self,
        status: &MigrationStatus,
        target: &str,
    ) -> Result<MigrationPlan, MigrationError> {
        let head_before = status.head().map(str::to_string);

        // number of steps that stay applied
        let keep = if target == BASE {
            0
        } else {
            let pos = self.target_position(target)?;
            if pos >= status.applied_count {
                return Err(MigrationError::Precondition(format!(
                    "cannot revert to '{target}': it is not applied (head is {})",
                    head_before.as_deref().unwrap_or(BASE)
                )));
            }
            pos + 1
        };

        let steps: Vec<PlannedStep> = (keep..status.applied_count)
            .rev()
            .filter_map(|pos| self.chain.at(pos))
            .map(|step| planned(step, Direction::Revert))
            .collect();

        if let Some(blocked) = steps
            .iter()
            .find(|s| matches!(s.reversibility, Reversibility::Irreversible(_)))
        {
            let reason = match blocked.reversibility {
                Reversibility::Irreversible(reason) => reason,
                _ => "",
            };
            return Err(MigrationError::Precondition(format!(
                "cannot revert past '{}': the step is irreversible ({reason})",
                blocked.id
            )));
        }

        let head_after = keep
            .checked_sub(1)
            .and_then(|pos| self.chain.at(pos))
            .map(|s| s.id().to_string());

        Ok(MigrationPlan {
            direction: Direction::Revert,
            head_before,
            head_after,
            steps,
        })
    }

    fn target_position(&self, id: &str) -> Result<usize, MigrationError> {
        self.chain
            .position(id)
            .ok_or_else(|| MigrationError::UnknownMigration(id.to_string()))
    }

    /// Run one direction of one step as its own unit of work
    fn run_step(
        &self,
        executor: &dyn Executor,
        step: &dyn Migration,
        direction: Direction,
    ) -> Result<StepOutcome, MigrationError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("ledgerline.migration", id = step.id(), %direction).entered();

        let manager = SchemaManager::new(executor);
        let start = Instant::now();

        if let Reversibility::BestEffort(caveat) = step.reversibility() {
            if direction == Direction::Revert {
                log::warn!("Reverting '{}' is best-effort: {caveat}", step.id());
            }
        }

        let reconciled = direction == Direction::Apply
            && step
                .is_present(&manager)
                .map_err(|e| MigrationError::step_failed(step.id(), direction, e))?;

        match step.mode(direction) {
            TransactionMode::Transactional => {
                executor.execute("BEGIN", &[])?;
                let result = self
                    .run_action(&manager, step, direction, reconciled)
                    .and_then(|()| self.record(executor, step, direction, elapsed_ms(start)));
                match result {
                    Ok(()) => {
                        executor
                            .execute("COMMIT", &[])
                            .map_err(|e| MigrationError::step_failed(step.id(), direction, e.into()))?;
                    }
                    Err(e) => {
                        if let Err(rollback) = executor.execute("ROLLBACK", &[]) {
                            log::error!("Rollback of '{}' failed: {rollback}", step.id());
                        }
                        return Err(MigrationError::step_failed(step.id(), direction, e));
                    }
                }
            }
            TransactionMode::NonTransactional => {
                // The effect commits on its own; a crash before the tracker write
                // is reconciled through is_present() on the next run.
                self.run_action(&manager, step, direction, reconciled)
                    .and_then(|()| self.record(executor, step, direction, elapsed_ms(start)))
                    .map_err(|e| MigrationError::step_failed(step.id(), direction, e))?;
            }
        }

        let execution_time_ms = elapsed_ms(start);
        log::info!(
            "{} {} ({execution_time_ms} ms){}",
            match direction {
                Direction::Apply => "Applied",
                Direction::Revert => "Reverted",
            },
            step.id(),
            if reconciled { ", already present" } else { "" }
        );

        Ok(StepOutcome {
            id: step.id().to_string(),
            direction,
            execution_time_ms,
            reconciled,
        })
    }

    fn run_action(
        &self,
        manager: &SchemaManager<'_>,
        step: &dyn Migration,
        direction: Direction,
        reconciled: bool,
    ) -> Result<(), MigrationError> {
        if reconciled {
            log::warn!(
                "Effect of '{}' is already present in the schema; recording it as applied",
                step.id()
            );
            return Ok(());
        }
        log::debug!("Running {direction} of {}", step.id());
        step.run(manager, direction)
    }

    fn record(
        &self,
        executor: &dyn Executor,
        step: &dyn Migration,
        direction: Direction,
        execution_time_ms: i64,
    ) -> Result<(), MigrationError> {
        match direction {
            Direction::Apply => self.state_table.insert(
                executor,
                step.id(),
                step.predecessor(),
                &step.checksum(),
                execution_time_ms,
            )?,
            Direction::Revert => self.state_table.remove(executor, step.id())?,
        }
        Ok(())
    }
}

fn planned(step: &dyn Migration, direction: Direction) -> PlannedStep {
    PlannedStep {
        id: step.id().to_string(),
        description: step.description().to_string(),
        mode: step.mode(direction),
        reversibility: step.reversibility(),
    }
}

fn elapsed_ms(start: Instant) -> i64 {
    i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::ErrorKind;
    use crate::testing::RecordingExecutor;

    struct Step {
        id: &'static str,
        predecessor: Option<&'static str>,
        mode: TransactionMode,
        reversibility: Reversibility,
    }

    impl Migration for Step {
        fn id(&self) -> &str {
            self.id
        }
        fn predecessor(&self) -> Option<&str> {
            self.predecessor
        }
        fn apply(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
            manager.execute(&format!("-- apply {}", self.id))?;
            Ok(())
        }
        fn revert(&self, manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
            manager.execute(&format!("-- revert {}", self.id))?;
            Ok(())
        }
        fn apply_mode(&self) -> TransactionMode {
            self.mode
        }
        fn reversibility(&self) -> Reversibility {
            self.reversibility
        }
        fn is_present(&self, manager: &SchemaManager<'_>) -> Result<bool, MigrationError> {
            Ok(manager.count(&format!("SELECT COUNT(*) -- presence of {}", self.id), &[])? > 0)
        }
    }

    const A: &str = "m20240101000000_create_base";
    const B: &str = "m20240102000000_add_column_nullable";
    const C: &str = "m20240103000000_backfill";
    const D: &str = "m20240104000000_make_required";

    fn step(id: &'static str, predecessor: Option<&'static str>) -> Step {
        Step {
            id,
            predecessor,
            mode: TransactionMode::Transactional,
            reversibility: Reversibility::Exact,
        }
    }

    fn migrator_with(steps: Vec<Step>) -> Migrator {
        let boxed: Vec<Box<dyn Migration>> = steps
            .into_iter()
            .map(|s| Box::new(s) as Box<dyn Migration>)
            .collect();
        Migrator::new(MigrationChain::resolve(boxed).unwrap()).with_lock(99, 0)
    }

    fn migrator() -> Migrator {
        migrator_with(vec![
            step(A, None),
            step(B, Some(A)),
            step(C, Some(B)),
            step(D, Some(C)),
        ])
    }

    #[test]
    fn test_apply_latest_runs_all_pending_in_order() {
        let store = RecordingExecutor::new();
        let migrator = migrator();

        let report = migrator.apply_latest(&store).unwrap();
        assert_eq!(report.count(), 4);
        assert_eq!(report.head_before, None);
        assert_eq!(report.head_after.as_deref(), Some(D));
        assert_eq!(store.applied_ids(), vec![A, B, C, D]);

        let applies = store.statements_matching("-- apply");
        assert_eq!(
            applies,
            vec![
                format!("-- apply {A}"),
                format!("-- apply {B}"),
                format!("-- apply {C}"),
                format!("-- apply {D}"),
            ]
        );
        assert_eq!(store.statements_matching("BEGIN").len(), 4);
        assert!(!store.lock_held());
    }

    #[test]
    fn test_apply_latest_is_idempotent() {
        let store = RecordingExecutor::new();
        let migrator = migrator();
        migrator.apply_latest(&store).unwrap();
        let inserts = store.insert_count();

        let report = migrator.apply_latest(&store).unwrap();
        assert_eq!(report.count(), 0);
        assert_eq!(store.insert_count(), inserts);
        assert_eq!(migrator.head(&store).unwrap().as_deref(), Some(D));
    }

    #[test]
    fn test_apply_to_stops_at_target() {
        let store = RecordingExecutor::new();
        let migrator = migrator();
        let report = migrator.apply_to(&store, B).unwrap();
        assert_eq!(report.head_after.as_deref(), Some(B));
        assert_eq!(store.applied_ids(), vec![A, B]);

        // already at the target
        assert_eq!(migrator.apply_to(&store, B).unwrap().count(), 0);
        let err = migrator.apply_to(&store, A).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }

    #[test]
    fn test_unknown_target_touches_nothing() {
        let store = RecordingExecutor::new();
        let migrator = migrator();
        let err = migrator
            .apply_to(&store, "m20991231000000_nope")
            .unwrap_err();
        assert!(matches!(err, MigrationError::UnknownMigration(_)));
        assert!(store.statements_matching("-- apply").is_empty());
        assert!(!store.lock_held());
    }

    #[test]
    fn test_failure_halts_walk_and_rolls_back_step() {
        let store = RecordingExecutor::new();
        let migrator = migrator();
        store.fail_on(&format!("-- apply {C}"), "column \"x\" contains null values");

        let err = migrator.apply_latest(&store).unwrap_err();
        match &err {
            MigrationError::StepFailed { id, direction, .. } => {
                assert_eq!(id, C);
                assert_eq!(*direction, Direction::Apply);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.kind(), ErrorKind::Store);
        // A and B committed; C rolled back; D never attempted
        assert_eq!(store.applied_ids(), vec![A, B]);
        assert!(store.statements_matching(&format!("-- apply {D}")).is_empty());
        assert_eq!(store.statements_matching("ROLLBACK").len(), 1);
        assert!(!store.in_transaction());
        assert!(!store.lock_held());
    }

    #[test]
    fn test_revert_to_keeps_target_applied() {
        let store = RecordingExecutor::new();
        let migrator = migrator();
        migrator.apply_latest(&store).unwrap();

        let report = migrator.revert_to(&store, B).unwrap();
        assert_eq!(report.head_after.as_deref(), Some(B));
        assert_eq!(
            report.steps.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
            vec![D, C]
        );
        assert_eq!(store.applied_ids(), vec![A, B]);
    }

    #[test]
    fn test_revert_to_base_reverts_everything() {
        let store = RecordingExecutor::new();
        let migrator = migrator();
        migrator.apply_to(&store, C).unwrap();

        let report = migrator.revert_to(&store, BASE).unwrap();
        assert_eq!(report.count(), 3);
        assert_eq!(report.head_after, None);
        assert!(store.applied_ids().is_empty());
        assert_eq!(migrator.head(&store).unwrap(), None);
    }

    #[test]
    fn test_revert_to_unapplied_target_is_precondition() {
        let store = RecordingExecutor::new();
        let migrator = migrator();
        migrator.apply_to(&store, B).unwrap();
        let err = migrator.revert_to(&store, C).unwrap_err();
        assert!(matches!(err, MigrationError::Precondition(_)));
        assert_eq!(store.applied_ids(), vec![A, B]);
    }

    #[test]
    fn test_irreversible_step_refuses_revert_before_any_change() {
        let store = RecordingExecutor::new();
        let mut c = step(C, Some(B));
        c.reversibility = Reversibility::Irreversible("drops ledger history");
        let migrator = migrator_with(vec![step(A, None), step(B, Some(A)), c, step(D, Some(C))]);
        migrator.apply_latest(&store).unwrap();

        let err = migrator.revert_to(&store, A).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(err.to_string().contains("drops ledger history"));
        // D would have been reverted first, but nothing ran
        assert!(store.statements_matching("-- revert").is_empty());
        assert_eq!(store.applied_ids().len(), 4);

        // reverting only D is still possible
        migrator.revert_to(&store, C).unwrap();
        assert_eq!(store.applied_ids(), vec![A, B, C]);
    }

    #[test]
    fn test_non_transactional_step_runs_outside_transaction() {
        let store = RecordingExecutor::new();
        let mut b = step(B, Some(A));
        b.mode = TransactionMode::NonTransactional;
        let migrator = migrator_with(vec![step(A, None), b]);

        migrator.apply_latest(&store).unwrap();
        assert_eq!(store.statements_matching("BEGIN").len(), 1);
        assert_eq!(store.applied_ids(), vec![A, B]);
    }

    #[test]
    fn test_present_effect_is_reconciled_without_running() {
        let store = RecordingExecutor::new();
        store.respond(
            &format!("-- presence of {B}"),
            vec![crate::value::Row::new(vec![crate::value::Value::BigInt(1)])],
        );
        let migrator = migrator_with(vec![step(A, None), step(B, Some(A))]);

        let report = migrator.apply_latest(&store).unwrap();
        assert!(!report.steps[0].reconciled);
        assert!(report.steps[1].reconciled);
        assert!(store.statements_matching(&format!("-- apply {B}")).is_empty());
        assert_eq!(store.applied_ids(), vec![A, B]);
    }

    #[test]
    fn test_busy_lock_fails_without_touching_store() {
        let store = RecordingExecutor::new();
        store.hold_lock_elsewhere();
        let err = migrator().apply_latest(&store).unwrap_err();
        assert!(matches!(err, MigrationError::LockTimeout { key: 99, .. }));
        assert!(store.statements().is_empty());
    }

    #[test]
    fn test_plans_do_not_execute() {
        let store = RecordingExecutor::new();
        let migrator = migrator();
        let plan = migrator.plan_apply(&store, Some(C)).unwrap();
        assert_eq!(
            plan.steps.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
            vec![A, B, C]
        );
        assert_eq!(plan.head_after.as_deref(), Some(C));
        assert!(store.applied_ids().is_empty());

        migrator.apply_latest(&store).unwrap();
        let plan = migrator.plan_revert(&store, BASE).unwrap();
        assert_eq!(plan.steps.first().map(|s| s.id.as_str()), Some(D));
        assert_eq!(plan.head_after, None);
        assert_eq!(store.applied_ids().len(), 4);
    }

    #[test]
    fn test_gap_in_applied_set_blocks_walks() {
        let store = RecordingExecutor::new();
        let migrator = migrator();
        let a = migrator.chain().get(A).unwrap().checksum();
        let c = migrator.chain().get(C).unwrap().checksum();
        store.seed_applied(A, None, &a);
        store.seed_applied(C, Some(B), &c);

        let err = migrator.apply_latest(&store).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(store.statements_matching("-- apply").is_empty());
    }
}
