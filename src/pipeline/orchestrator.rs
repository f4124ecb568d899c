//! Update orchestration
//!
//! One run: ping the store, take the run lock, execute the requested stages
//! in order, and append exactly one [`UpdateReport`]. A failing stage is
//! recorded once and the run moves on. An unreachable store or a lost lock
//! ends the run at the next boundary or checkpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::collect::{collect, CollectOptions};
use super::process::{process, ProcessOptions};
use super::{cluster, dedup, expire, retain, CancelFlag, Checkpoint};
use crate::config::{Settings, Targets};
use crate::core::{ClusterParams, Stage, Status, UpdateReport};
use crate::error::{Error, Result};
use crate::services::{LanguageModel, PageFetcher, SearchProvider};
use crate::storage::{owner_token, Store};
use crate::ui;

/// Stages selected for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
	pub collect: bool,
	pub process: bool,
	pub cluster: bool,
	pub deduplicate: bool,
	pub expire: bool,
	pub retain: bool,
}

impl UpdateOptions {
	/// The full daily run
	pub fn daily() -> Self {
		Self {
			collect: true,
			process: true,
			cluster: true,
			deduplicate: true,
			expire: true,
			retain: true,
		}
	}

	pub fn stages(&self) -> Vec<Stage> {
		[
			(self.collect, Stage::Collecting),
			(self.process, Stage::Processing),
			(self.cluster, Stage::Clustering),
			(self.deduplicate, Stage::Deduplicating),
			(self.expire, Stage::Expiring),
			(self.retain, Stage::Retaining),
		]
		.into_iter()
		.filter_map(|(enabled, stage)| enabled.then_some(stage))
		.collect()
	}

	pub fn is_empty(&self) -> bool {
		self.stages().is_empty()
	}
}

#[derive(Debug, Clone)]
pub struct UpdateConfig {
	pub targets: Targets,
	pub collect: CollectOptions,
	pub process: ProcessOptions,
	pub cluster: ClusterParams,
	pub workers: usize,
	pub max_age_days: i64,
	pub max_listings: usize,
	pub duplicate_threshold: f32,
	pub lock_stale_after: Duration,
}

impl UpdateConfig {
	pub fn from_settings(settings: &Settings, targets: Targets) -> Self {
		Self {
			targets,
			collect: CollectOptions::default(),
			process: ProcessOptions {
				batch_size: settings.batch_size,
				max_listings: None,
				listing_id: None,
			},
			cluster: ClusterParams {
				min_cluster_size: settings.min_cluster_size,
				min_samples: None,
			},
			workers: settings.workers,
			max_age_days: settings.max_age_days,
			max_listings: settings.max_listings,
			duplicate_threshold: settings.duplicate_threshold,
			lock_stale_after: settings.lock_stale_after,
		}
	}
}

/// External collaborators. Stages that need a missing one fail the run up front.
#[derive(Clone, Copy, Default)]
pub struct Services<'a> {
	pub search: Option<&'a dyn SearchProvider>,
	pub fetcher: Option<&'a dyn PageFetcher>,
	pub llm: Option<&'a dyn LanguageModel>,
}

pub struct Orchestrator<'a> {
	store: &'a Store,
	services: Services<'a>,
	config: UpdateConfig,
	cancel: CancelFlag,
	owner: String,
	clock: fn() -> DateTime<Utc>,
}

impl<'a> Orchestrator<'a> {
	pub fn new(store: &'a Store, services: Services<'a>, config: UpdateConfig, cancel: CancelFlag) -> Self {
		Self {
			store,
			services,
			config,
			cancel,
			owner: owner_token(),
			clock: Utc::now,
		}
	}

	pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
		self.clock = clock;
		self
	}

	pub fn owner(&self) -> &str {
		&self.owner
	}

	/// Execute the selected stages and persist the report.
	///
	/// Returns `Err` only when the run could not start: missing services,
	/// unreachable store, or a lock held by another run. The store is pinged
	/// and the lock heartbeat refreshed at every stage boundary, and the
	/// heartbeat again at each checkpoint inside the long stages. A failure of
	/// either stops the run.
	pub fn run(&self, options: &UpdateOptions) -> Result<UpdateReport> {
		let stages = options.stages();
		self.check_services(&stages)?;
		self.store.ping()?;

		let started = self.now();
		self.store
			.acquire_lock(&self.owner, started, self.config.lock_stale_after)?;

		let mut report = UpdateReport::start(started);
		tracing::info!(id = %report.id, owner = %self.owner, ?stages, "update started");

		let lock_lost = AtomicBool::new(false);
		let (store, owner, clock) = (self.store, self.owner.as_str(), self.clock);
		let keepalive = || -> Result<()> {
			store
				.heartbeat(owner, clock())
				.inspect_err(|_| lock_lost.store(true, Ordering::SeqCst))
		};
		let checkpoint = Checkpoint::new(self.cancel.clone()).with_keepalive(&keepalive);

		for stage in stages {
			if let Err(e) = self.store.ping().and_then(|()| keepalive()) {
				tracing::error!(%stage, error = %e, "cannot continue update");
				report.record(stage, &e);
				break;
			}

			ui::header(&format!("Stage: {}", stage));
			if let Some(err) = self.run_stage(stage, &checkpoint, &mut report) {
				ui::warn(&format!("{} failed: {}", stage, err));
				tracing::warn!(%stage, kind = %err.kind(), error = %err, "stage failed");
				report.record(stage, &err);
			}

			if lock_lost.load(Ordering::SeqCst) {
				tracing::error!(%stage, "run lock lost, stopping");
				break;
			}
			if self.cancel.is_cancelled() {
				report.record(stage, &Error::Cancelled);
				break;
			}
		}

		self.finish(&mut report);
		Ok(report)
	}

	fn run_stage(&self, stage: Stage, checkpoint: &Checkpoint, report: &mut UpdateReport) -> Option<Error> {
		let store = self.store;
		let result = match stage {
			Stage::Collecting => self.collaborators_for_collect().and_then(|(search, fetcher)| {
				let outcome = collect(
					store,
					search,
					fetcher,
					&self.config.targets,
					&self.config.collect,
					self.config.workers,
					checkpoint,
					self.now(),
				)?;
				report.collected = outcome.collected;
				report.reobserved = outcome.reobserved;
				Ok(outcome.error())
			}),
			Stage::Processing => self.llm().and_then(|llm| {
				let outcome = process(store, llm, &self.config.process, self.config.workers, checkpoint)?;
				report.processed = outcome.processed;
				Ok(outcome.error())
			}),
			Stage::Clustering => self.llm().and_then(|llm| {
				let clustered = cluster::recluster(store, &self.config.cluster, self.now())?;
				report.clusters = clustered.clusters;
				let summaries = cluster::update_summaries(store, llm, false, checkpoint)?;
				report.summaries = summaries.generated;
				Ok(summaries.error())
			}),
			Stage::Deduplicating => dedup::deduplicate(store, self.config.duplicate_threshold, self.now()).map(|outcome| {
				report.duplicates_marked = outcome.marked;
				None
			}),
			Stage::Expiring => expire::expire(store, self.config.max_age_days, self.now()).map(|expired| {
				report.expired = expired;
				None
			}),
			Stage::Retaining => retain::enforce(store, self.config.max_listings).map(|outcome| {
				report.removed_for_capacity = outcome.removed;
				None
			}),
			Stage::Reporting => Ok(None),
		};

		result.unwrap_or_else(Some)
	}

	/// Terminal step, always reached once the lock is held
	fn finish(&self, report: &mut UpdateReport) {
		match self.store.count_listings(Status::Active) {
			Ok(active) => report.active_after = active,
			Err(e) => report.record(Stage::Reporting, &e),
		}
		report.finished_at = Some(self.now());

		if let Err(e) = self.store.append_report(report) {
			ui::error(&format!("Could not write update report: {}", e));
			report.record(Stage::Reporting, &e);
		}
		if let Err(e) = self.store.release_lock(&self.owner) {
			tracing::warn!(error = %e, "could not release run lock");
		}

		tracing::info!(
			id = %report.id,
			errors = report.errors.len(),
			active = report.active_after,
			"update finished"
		);
	}

	fn check_services(&self, stages: &[Stage]) -> Result<()> {
		for stage in stages {
			match stage {
				Stage::Collecting => {
					self.collaborators_for_collect()?;
				}
				Stage::Processing | Stage::Clustering => {
					self.llm()?;
				}
				_ => {}
			}
		}
		Ok(())
	}

	fn collaborators_for_collect(&self) -> Result<(&'a dyn SearchProvider, &'a dyn PageFetcher)> {
		match (self.services.search, self.services.fetcher) {
			(Some(search), Some(fetcher)) => Ok((search, fetcher)),
			_ => Err(Error::Configuration("collection needs a search provider and page fetcher".into())),
		}
	}

	fn llm(&self) -> Result<&'a dyn LanguageModel> {
		self.services
			.llm
			.ok_or_else(|| Error::Configuration("this stage needs a language model".into()))
	}

	fn now(&self) -> DateTime<Utc> {
		(self.clock)()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn daily_runs_every_stage_in_order() {
		assert_eq!(
			UpdateOptions::daily().stages(),
			vec![
				Stage::Collecting,
				Stage::Processing,
				Stage::Clustering,
				Stage::Deduplicating,
				Stage::Expiring,
				Stage::Retaining,
			]
		);
	}

	#[test]
	fn maintenance_subset_keeps_order() {
		let options = UpdateOptions {
			retain: true,
			deduplicate: true,
			..Default::default()
		};
		assert_eq!(options.stages(), vec![Stage::Deduplicating, Stage::Retaining]);
		assert!(UpdateOptions::default().is_empty());
	}

	#[test]
	fn missing_language_model_fails_before_locking() {
		let dir = tempfile::tempdir().unwrap();
		let store = Store::open(dir.path()).unwrap();
		let settings = Settings::from_lookup(|_| None).unwrap();
		let config = UpdateConfig::from_settings(&settings, Targets::default());
		let orchestrator = Orchestrator::new(&store, Services::default(), config, CancelFlag::new());

		let options = UpdateOptions {
			process: true,
			..Default::default()
		};
		let err = orchestrator.run(&options).unwrap_err();
		assert!(matches!(err, Error::Configuration(_)));
		assert!(store.read_lock().unwrap().is_none());
		assert!(store.list_reports().unwrap().is_empty());
	}

	#[test]
	fn maintenance_run_writes_one_report_and_releases_lock() {
		let dir = tempfile::tempdir().unwrap();
		let store = Store::open(dir.path()).unwrap();
		let settings = Settings::from_lookup(|_| None).unwrap();
		let config = UpdateConfig::from_settings(&settings, Targets::default());
		let orchestrator = Orchestrator::new(&store, Services::default(), config, CancelFlag::new());

		let options = UpdateOptions {
			deduplicate: true,
			expire: true,
			retain: true,
			..Default::default()
		};
		let report = orchestrator.run(&options).unwrap();
		assert!(!report.has_errors());
		assert!(report.finished_at.is_some());
		assert_eq!(store.list_reports().unwrap().len(), 1);
		assert!(store.read_lock().unwrap().is_none());
	}

	#[test]
	fn cancellation_is_recorded_once() {
		let dir = tempfile::tempdir().unwrap();
		let store = Store::open(dir.path()).unwrap();
		let settings = Settings::from_lookup(|_| None).unwrap();
		let config = UpdateConfig::from_settings(&settings, Targets::default());
		let cancel = CancelFlag::new();
		cancel.cancel();
		let orchestrator = Orchestrator::new(&store, Services::default(), config, cancel);

		let options = UpdateOptions {
			deduplicate: true,
			expire: true,
			..Default::default()
		};
		let report = orchestrator.run(&options).unwrap();
		assert_eq!(report.errors.len(), 1);
		assert_eq!(report.errors[0].stage, Stage::Deduplicating);
		assert_eq!(report.errors[0].kind, crate::error::ErrorKind::Cancelled);
	}
}
