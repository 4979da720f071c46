//! Task catalog: enumerates jobs from a fixed input directory layout.
//!
//! A catalog root holds `reports/<job_id>.<ext>` (the primary input document)
//! and, optionally, `assets/<job_id>/` with supporting files. Job ids embed
//! their ordinal (`001-84a2fb2`), so sorting by filename yields execution
//! order.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// One unit of work, keyed by an ordinal-prefixed id. Immutable once listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    /// Primary input document (`reports/<id>.<ext>`).
    pub report: PathBuf,
    /// Supporting asset directory, when one exists for this id.
    pub assets: Option<PathBuf>,
}

/// List all jobs under `catalog_root`, in execution order.
///
/// Pure and deterministic for an unchanged catalog. An empty or missing
/// `reports/` directory yields an empty list, not an error.
pub fn list_jobs(catalog_root: &Path, doc_ext: &str) -> Result<Vec<Job>> {
    let reports_dir = catalog_root.join("reports");
    if !reports_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut reports: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(&reports_dir)
        .with_context(|| format!("failed to read {}", reports_dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(doc_ext) {
            reports.push(path);
        }
    }
    reports.sort();

    let assets_root = catalog_root.join("assets");
    let jobs = reports
        .into_iter()
        .filter_map(|report| {
            let id = report.file_stem()?.to_str()?.to_string();
            let assets = assets_root.join(&id);
            Some(Job {
                id,
                report,
                assets: assets.is_dir().then_some(assets),
            })
        })
        .collect();
    Ok(jobs)
}

/// Resolve shorthand for a job id against the catalog order.
///
/// Accepts the full id, a bare ordinal ("3"), or a zero-padded ordinal
/// ("003"). Returns the full id when a unique match exists.
pub fn resolve_job_id(jobs: &[Job], target: &str) -> Option<String> {
    if jobs.iter().any(|j| j.id == target) {
        return Some(target.to_string());
    }
    let ordinal: u32 = target.parse().ok()?;
    let prefix = format!("{ordinal:03}-");
    jobs.iter()
        .find(|j| j.id.starts_with(&prefix))
        .map(|j| j.id.clone())
}
