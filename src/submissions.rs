//! Submissions are the assignments of a photo-collection pool, each carrying
//! at most one uploaded photo. This module maps a reject set back onto them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use crate::error::Result;

pub const DUPLICATE_COMMENT: &str =
    "It seems that this image's duplicate has already been provided by someone else";
pub const ACCEPT_COMMENT: &str = "Well done!";
pub const MISSING_PHOTO_COMMENT: &str = "no photo uploaded";

const DEFAULT_EXTENSION: &str = "jpg";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedImage {
    pub image_id: String,
    pub image_name: String,
    #[serde(default)]
    pub is_duplicate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub assignment_id: String,
    /// `None` when the performer uploaded nothing.
    pub image: Option<SubmittedImage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub submissions: Vec<Submission>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn images(&self) -> impl Iterator<Item = &SubmittedImage> {
        self.submissions.iter().filter_map(|s| s.image.as_ref())
    }

    /// Give every image a distinct file name so downloads cannot overwrite
    /// each other. The first image with a given stem keeps its name; later
    /// ones become `<stem>_2.<ext>`, `<stem>_3.<ext>`, ...
    ///
    /// Returns how many images were renamed.
    pub fn assign_unique_names(&mut self) -> usize {
        let mut seen: HashMap<String, u32> = HashMap::new();
        let mut taken: BTreeSet<String> = self.images().map(|i| i.image_name.clone()).collect();
        let mut renamed = 0;

        for image in self.submissions.iter_mut().filter_map(|s| s.image.as_mut()) {
            let (stem, ext) = split_name(&image.image_name);
            let count = seen.entry(stem.to_string()).or_insert(0);
            *count += 1;
            if *count == 1 {
                continue;
            }

            // skip suffixes that some other upload already uses verbatim
            let mut candidate = format!("{}_{}.{}", stem, count, ext);
            while taken.contains(&candidate) {
                *count += 1;
                candidate = format!("{}_{}.{}", stem, count, ext);
            }
            taken.insert(candidate.clone());
            image.image_name = candidate;
            renamed += 1;
        }

        renamed
    }
}

fn split_name(name: &str) -> (&str, &str) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, ext),
        _ => (name, DEFAULT_EXTENSION),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Accepted,
    Rejected,
}

/// A status change an API client should submit for one assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub assignment_id: String,
    pub status: Decision,
    pub public_comment: String,
}

impl Verdict {
    fn new(assignment_id: &str, status: Decision, comment: &str) -> Self {
        Self {
            assignment_id: assignment_id.to_string(),
            status,
            public_comment: comment.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewOptions {
    pub reject_duplicates: bool,
    pub accept_uniques: bool,
    pub reject_missing: bool,
}

/// Flag submissions whose image is in `rejected` and decide a verdict for
/// each submission the options cover. Submissions no option covers get no
/// verdict.
pub fn review(
    manifest: &mut Manifest,
    rejected: &BTreeSet<String>,
    options: &ReviewOptions,
) -> Vec<Verdict> {
    let mut verdicts = Vec::new();

    for submission in &mut manifest.submissions {
        let id = submission.assignment_id.as_str();
        match submission.image.as_mut() {
            None => {
                if options.reject_missing {
                    verdicts.push(Verdict::new(id, Decision::Rejected, MISSING_PHOTO_COMMENT));
                }
            }
            Some(image) if rejected.contains(&image.image_name) => {
                image.is_duplicate = true;
                if options.reject_duplicates {
                    verdicts.push(Verdict::new(id, Decision::Rejected, DUPLICATE_COMMENT));
                }
            }
            Some(_) => {
                if options.accept_uniques {
                    verdicts.push(Verdict::new(id, Decision::Accepted, ACCEPT_COMMENT));
                }
            }
        }
    }

    verdicts
}
