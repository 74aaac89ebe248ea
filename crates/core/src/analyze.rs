//! Offline savings estimation.
//!
//! Walks a bucket's key space, groups objects by (prefix, family), and
//! projects what delta storage would cost: the first file of each group
//! stays whole as the reference, each subsequent file costs
//! `(1 - typical_ratio) * size`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::classify::{classify, family, FileClass};
use crate::error::DeltaError;
use crate::naming::{is_reference_key, split_key};
use crate::traits::{ObjectInfo, ObjectStore};

/// Expected delta compression for archive families.
const ARCHIVE_TYPICAL_RATIO: f64 = 0.99;

/// Page size used while walking the bucket.
const ANALYZE_PAGE_SIZE: usize = 1000;

/// Projected savings for one (prefix, family) group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupEstimate {
    /// Group identity: `{prefix}::{family}`.
    pub group_id: String,
    /// Objects in the group.
    pub file_count: u64,
    /// Current bytes.
    pub original_bytes: u64,
    /// Projected bytes under delta storage.
    pub projected_bytes: u64,
}

/// Whole-bucket projection.
#[derive(Debug, Clone, Serialize, Default)]
pub struct BucketAnalysis {
    /// Current bytes across all analyzed objects.
    pub original_bytes: u64,
    /// Projected bytes under delta storage.
    pub projected_bytes: u64,
    /// projected/original (1.0 when nothing would shrink).
    pub projected_ratio: f64,
    /// Per-group breakdown, sorted by group id.
    pub groups: Vec<GroupEstimate>,
}

/// Estimate potential savings for a bucket or prefix.
///
/// Objects are classified by filename and size exactly as the engine would
/// classify an upload; nothing is downloaded.
pub async fn analyze_bucket<S: ObjectStore>(
    store: &S,
    bucket: &str,
    prefix: &str,
) -> Result<BucketAnalysis, DeltaError> {
    let mut groups: BTreeMap<String, GroupEstimate> = BTreeMap::new();
    let mut direct_bytes: u64 = 0;

    let mut start_after: Option<String> = None;
    loop {
        let page = store
            .list_objects(bucket, prefix, start_after.as_deref(), ANALYZE_PAGE_SIZE)
            .await?;

        for info in &page.objects {
            if is_reference_key(&info.key) {
                continue;
            }
            accumulate(&mut groups, &mut direct_bytes, info);
        }

        if !page.is_truncated {
            break;
        }
        start_after = page.next_start_after;
        if start_after.is_none() {
            break;
        }
    }

    let mut analysis: BucketAnalysis = BucketAnalysis {
        original_bytes: direct_bytes,
        projected_bytes: direct_bytes,
        ..Default::default()
    };
    for group in groups.into_values() {
        analysis.original_bytes += group.original_bytes;
        analysis.projected_bytes += group.projected_bytes;
        analysis.groups.push(group);
    }
    analysis.projected_ratio = if analysis.original_bytes > 0 {
        analysis.projected_bytes as f64 / analysis.original_bytes as f64
    } else {
        1.0
    };
    Ok(analysis)
}

/// Fold one listed object into the running estimate.
fn accumulate(
    groups: &mut BTreeMap<String, GroupEstimate>,
    direct_bytes: &mut u64,
    info: &ObjectInfo,
) {
    let (obj_prefix, filename): (&str, &str) = split_key(&info.key);

    match classify(filename, info.size) {
        FileClass::Direct | FileClass::SkipSmall => {
            *direct_bytes += info.size;
        }
        FileClass::DeltaCandidate => {
            let group_id: String = format!("{}::{}", obj_prefix, family(filename));
            let group: &mut GroupEstimate =
                groups.entry(group_id.clone()).or_insert_with(|| GroupEstimate {
                    group_id,
                    file_count: 0,
                    original_bytes: 0,
                    projected_bytes: 0,
                });

            group.file_count += 1;
            group.original_bytes += info.size;
            if group.file_count == 1 {
                // First file becomes the reference, stored whole.
                group.projected_bytes += info.size;
            } else {
                group.projected_bytes +=
                    ((1.0 - ARCHIVE_TYPICAL_RATIO) * info.size as f64) as u64;
            }
        }
    }
}
