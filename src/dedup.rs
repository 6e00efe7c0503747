use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::cluster::SimilarityGraph;
use crate::config::DedupConfig;
use crate::error::{DedupError, Result};
use crate::hasher::{Fingerprint, PerceptualHasher, SkippedImage};
use crate::history::{self, HistoryAction, HistoryRecord};
use crate::scanner::{ImageFile, scan_folder};

/// Default directory, relative to the cleaned folder, for moved duplicates.
pub const DEFAULT_MOVE_DIR: &str = "duplicates";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MatchKind {
    /// Same bytes as the survivor
    Identical,
    Similar { distance: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedImage {
    pub name: String,
    #[serde(flatten)]
    pub kind: MatchKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateCluster {
    pub survivor: String,
    pub rejected: Vec<RejectedImage>,
}

/// Result of detection alone. Building a plan never changes the folder.
#[derive(Debug, Clone, Serialize)]
pub struct DedupPlan {
    pub folder: PathBuf,
    pub image_count: usize,
    pub clusters: Vec<DuplicateCluster>,
    pub skipped: Vec<SkippedImage>,
}

impl DedupPlan {
    /// Rejected names in the order clusters were resolved.
    pub fn rejected_in_order(&self) -> Vec<&str> {
        self.clusters
            .iter()
            .flat_map(|c| c.rejected.iter().map(|r| r.name.as_str()))
            .collect()
    }

    pub fn rejected(&self) -> BTreeSet<String> {
        self.rejected_in_order()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn has_duplicates(&self) -> bool {
        !self.clusters.is_empty()
    }

    /// Some files could not be hashed and were left out.
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyAction {
    Delete,
    Move { target_dir: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    pub action: ApplyAction,
    pub dry_run: bool,
    pub record_history: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            action: ApplyAction::Delete,
            dry_run: false,
            record_history: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Deleted, or that would be deleted on a dry run.
    pub removed: Vec<String>,
    /// Name and destination of every moved file.
    pub moved: Vec<(String, PathBuf)>,
    /// Rejected names whose file was no longer there.
    pub already_gone: Vec<String>,
    pub dry_run: bool,
}

/// What `find_duplicates_to_reject` detected and did.
#[derive(Debug, Clone)]
pub struct RejectOutcome {
    pub plan: DedupPlan,
    pub applied: ApplyReport,
}

impl RejectOutcome {
    pub fn rejected(&self) -> BTreeSet<String> {
        self.plan.rejected()
    }

    pub fn skipped(&self) -> &[SkippedImage] {
        &self.plan.skipped
    }

    pub fn is_partial(&self) -> bool {
        self.plan.is_partial()
    }
}

/// Progress callback events for long scans.
#[derive(Debug, Clone, Copy)]
pub enum Progress<'a> {
    Discovered { count: usize },
    Hashed { name: &'a str },
}

pub struct Deduplicator {
    config: DedupConfig,
    hasher: PerceptualHasher,
}

impl Deduplicator {
    /// Validate `config` and build its hasher. The threshold may not exceed
    /// the bit length of the configured hash.
    pub fn new(config: DedupConfig) -> Result<Self> {
        config.validate()?;
        let hasher = PerceptualHasher::new(&config.hash);
        if config.threshold > hasher.bit_len() {
            return Err(DedupError::InvalidConfig {
                message: format!(
                    "threshold {} exceeds the {} bits of a {:?} hash of size {}",
                    config.threshold,
                    hasher.bit_len(),
                    config.hash.algorithm,
                    config.hash.size
                ),
            });
        }
        Ok(Self { config, hasher })
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    pub fn plan(&self, folder: &Path) -> Result<DedupPlan> {
        self.plan_with_progress(folder, &|_: Progress<'_>| {})
    }

    /// Hash every image in `folder` and cluster near-duplicates.
    ///
    /// Images that fail to decode are logged and listed in `skipped`; only an
    /// unreadable folder is an error.
    pub fn plan_with_progress(
        &self,
        folder: &Path,
        progress: &(dyn Fn(Progress<'_>) + Sync),
    ) -> Result<DedupPlan> {
        let files = scan_folder(folder, &self.config.scan)?;
        progress(Progress::Discovered { count: files.len() });

        let (mut prints, skipped) = self.fingerprint_all(&files, progress);
        self.config.keep.order(&mut prints);

        let graph = SimilarityGraph::build(&prints, self.config.threshold, |a, b| a.distance(b));
        let clusters = graph
            .resolve(self.config.strategy)
            .into_iter()
            .map(|cluster| {
                let survivor = &prints[cluster.survivor];
                DuplicateCluster {
                    survivor: survivor.name().to_string(),
                    rejected: cluster
                        .rejected
                        .iter()
                        .map(|&idx| describe(&prints[idx], survivor))
                        .collect(),
                }
            })
            .collect::<Vec<_>>();

        log::debug!(
            "{} image(s) in {}, {} cluster(s), {} skipped",
            files.len(),
            folder.display(),
            clusters.len(),
            skipped.len()
        );

        Ok(DedupPlan {
            folder: folder.to_path_buf(),
            image_count: files.len(),
            clusters,
            skipped,
        })
    }

    fn fingerprint_all(
        &self,
        files: &[ImageFile],
        progress: &(dyn Fn(Progress<'_>) + Sync),
    ) -> (Vec<Fingerprint>, Vec<SkippedImage>) {
        let hash_one = |file: &ImageFile| {
            let result = self.hasher.fingerprint(file).map_err(|err| {
                log::warn!("Skipping {}: {}", file.name, err);
                SkippedImage {
                    name: file.name.clone(),
                    reason: err.to_string(),
                }
            });
            progress(Progress::Hashed { name: &file.name });
            result
        };

        // collect keeps input order on both paths
        let results: Vec<std::result::Result<Fingerprint, SkippedImage>> = if self.config.parallel {
            files.par_iter().map(hash_one).collect()
        } else {
            files.iter().map(hash_one).collect()
        };

        let mut prints = Vec::with_capacity(results.len());
        let mut skipped = Vec::new();
        for result in results {
            match result {
                Ok(print) => prints.push(print),
                Err(skip) => skipped.push(skip),
            }
        }
        (prints, skipped)
    }

    /// Delete or move the rejected files of `plan`.
    ///
    /// A rejected file that no longer exists is counted in `already_gone`.
    /// Moves keep the path relative to the folder under the target dir, and
    /// every destination is checked before the first file moves. Each
    /// cluster's history record is written as soon as that cluster is done.
    pub fn apply(&self, plan: &DedupPlan, options: &ApplyOptions) -> Result<ApplyReport> {
        let folder = plan.folder.as_path();
        let mut report = ApplyReport {
            dry_run: options.dry_run,
            ..ApplyReport::default()
        };

        if options.dry_run {
            for name in plan.rejected_in_order() {
                if !folder.join(name).exists() {
                    report.already_gone.push(name.to_string());
                    continue;
                }
                match &options.action {
                    ApplyAction::Delete => report.removed.push(name.to_string()),
                    ApplyAction::Move { target_dir } => report
                        .moved
                        .push((name.to_string(), move_destination(target_dir, name))),
                }
            }
            return Ok(report);
        }

        if let ApplyAction::Move { target_dir } = &options.action {
            check_destinations(plan, target_dir)?;
        }

        for cluster in &plan.clusters {
            let mut culled = Vec::new();
            let result = apply_cluster(folder, cluster, &options.action, &mut report, &mut culled);

            if options.record_history && !culled.is_empty() {
                let (action, target_dir) = match &options.action {
                    ApplyAction::Delete => (HistoryAction::Deleted, None),
                    ApplyAction::Move { target_dir } => {
                        (HistoryAction::Moved, Some(target_dir.clone()))
                    }
                };
                history::append(
                    folder,
                    &[HistoryRecord::new(
                        cluster.survivor.clone(),
                        culled,
                        action,
                        target_dir,
                    )],
                )?;
            }
            result?;
        }

        Ok(report)
    }

    /// Detect near-duplicates in `folder` and delete every rejected file.
    ///
    /// The first discovered member of each cluster survives; see
    /// [`crate::policy::SurvivorPolicy`] for how discovery order is chosen.
    pub fn find_duplicates_to_reject(&self, folder: &Path) -> Result<RejectOutcome> {
        let plan = self.plan(folder)?;
        let options = ApplyOptions {
            record_history: self.config.history,
            ..ApplyOptions::default()
        };
        let applied = self.apply(&plan, &options)?;
        Ok(RejectOutcome { plan, applied })
    }
}

fn apply_cluster(
    folder: &Path,
    cluster: &DuplicateCluster,
    action: &ApplyAction,
    report: &mut ApplyReport,
    culled: &mut Vec<String>,
) -> Result<()> {
    for rejected in &cluster.rejected {
        let name = rejected.name.as_str();
        let path = folder.join(name);

        let outcome = match action {
            ApplyAction::Delete => fs::remove_file(&path).map(|()| None),
            ApplyAction::Move { target_dir } => {
                let dest = move_destination(target_dir, name);
                match dest.parent() {
                    Some(parent) => fs::create_dir_all(parent),
                    None => Ok(()),
                }
                .and_then(|()| fs::rename(&path, &dest))
                .map(|()| Some(dest))
            }
        };

        match outcome {
            Ok(None) => {
                log::info!("Deleted {} (duplicate of {})", name, cluster.survivor);
                report.removed.push(name.to_string());
                culled.push(name.to_string());
            }
            Ok(Some(dest)) => {
                log::info!("Moved {} -> {}", name, dest.display());
                report.moved.push((name.to_string(), dest));
                culled.push(name.to_string());
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::debug!("{} already gone", name);
                report.already_gone.push(name.to_string());
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Where a moved file lands: its folder-relative path under `target_dir`.
pub fn move_destination(target_dir: &Path, name: &str) -> PathBuf {
    target_dir.join(name)
}

/// Fail before anything moves if a destination is taken.
fn check_destinations(plan: &DedupPlan, target_dir: &Path) -> Result<()> {
    let mut seen = HashSet::new();
    for name in plan.rejected_in_order() {
        if !plan.folder.join(name).exists() {
            continue;
        }
        let dest = move_destination(target_dir, name);
        if dest.exists() || !seen.insert(dest.clone()) {
            return Err(std::io::Error::new(
                ErrorKind::AlreadyExists,
                format!("{} already exists", dest.display()),
            )
            .into());
        }
    }
    Ok(())
}

fn describe(print: &Fingerprint, survivor: &Fingerprint) -> RejectedImage {
    let kind = if print.is_identical_to(survivor) {
        MatchKind::Identical
    } else {
        MatchKind::Similar {
            distance: print.distance(survivor),
        }
    };
    RejectedImage {
        name: print.name().to_string(),
        kind,
    }
}

/// [`Deduplicator::find_duplicates_to_reject`] with the default configuration.
pub fn find_duplicates_to_reject(folder: &Path) -> Result<RejectOutcome> {
    Deduplicator::new(DedupConfig::default())?.find_duplicates_to_reject(folder)
}
