use crate::model::CommitRecord;

/// Cumulative net lines (added - removed) sampled at `points` positions
/// along the commits in ascending time order.
///
/// Always returns exactly `points` values, and the last value is always the
/// final net total, whatever the commit count.
pub fn lines_histogram(commits: &[CommitRecord], points: usize) -> Vec<i64> {
    let mut histogram = vec![0; points];
    if commits.is_empty() || points == 0 {
        return histogram;
    }

    let mut sorted: Vec<&CommitRecord> = commits.iter().collect();
    sorted.sort_by_key(|c| c.timestamp);

    let bucket_size = (sorted.len() / points).max(1);
    let mut running = 0i64;
    let mut filled = 0;

    for (i, commit) in sorted.iter().enumerate() {
        running += commit.net_lines();

        if (i + 1) % bucket_size == 0 && filled < points {
            histogram[filled] = running;
            filled += 1;
        }
    }

    for slot in &mut histogram[filled..] {
        *slot = running;
    }
    // When the count isn't a multiple of the bucket size the buckets fill
    // before the walk ends; the last one must still show the final total.
    histogram[points - 1] = running;

    histogram
}
