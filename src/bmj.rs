//! Balanced Majority Judgment (C5): the signed-median, percentile-tiebreak,
//! veto-aware ranking computed synchronously in the close-poll handler.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One voter's (possibly partial) ballot, as input to the engine.
#[derive(Debug, Clone)]
pub struct BallotInput {
    pub ballot_id: String,
    /// option_id -> value01
    pub scores: std::collections::HashMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct OptionInput {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptionStats {
    pub option_id: String,
    pub label: String,
    pub rank: u32,
    pub median: f64,
    pub p10: f64,
    pub p90: f64,
    pub mean: f64,
    pub neg_share: f64,
    pub veto: bool,
    pub sample_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub rankings: Vec<OptionStats>,
    pub inputs_hash: String,
}

/// Type-7 linear-interpolation percentile over an already-sorted slice.
/// `p` in `[0, 1]`. `n=0` returns 0; `n=1` returns the single element.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted[0];
    }
    let h = (n - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Per-option signed-score statistics. Missing scores are treated as
/// `s = 0` (the "meh as missing" tolerant interpretation, see spec §9).
fn option_stats(option: &OptionInput, ballots: &[BallotInput]) -> (f64, f64, f64, f64, f64, bool, usize) {
    let mut signed: Vec<f64> = ballots
        .iter()
        .map(|b| {
            let v = b.scores.get(&option.id).copied().unwrap_or(0.5);
            2.0 * v - 1.0
        })
        .collect();
    signed.sort_by(|a, b| a.partial_cmp(b).expect("scores are never NaN"));

    let n = signed.len();
    let median = percentile_sorted(&signed, 0.5);
    let p10 = percentile_sorted(&signed, 0.10);
    let p90 = percentile_sorted(&signed, 0.90);
    let mean = if n == 0 {
        0.0
    } else {
        signed.iter().sum::<f64>() / n as f64
    };
    let neg_count = signed.iter().filter(|&&s| s < 0.0).count();
    let neg_share = if n == 0 {
        0.0
    } else {
        neg_count as f64 / n as f64
    };
    let veto = neg_share >= 0.33 && median <= 0.0;

    (median, p10, p90, mean, neg_share, veto, n)
}

/// Compute the final ranking and sealed snapshot for a closed poll.
/// `ballots` need not be sorted; they are sorted by id before hashing so
/// `inputs_hash` is invariant under insertion order.
pub fn compute_snapshot(options: &[OptionInput], ballots: &[BallotInput]) -> Snapshot {
    let mut stats: Vec<OptionStats> = options
        .iter()
        .map(|opt| {
            let (median, p10, p90, mean, neg_share, veto, sample_size) =
                option_stats(opt, ballots);
            OptionStats {
                option_id: opt.id.clone(),
                label: opt.label.clone(),
                rank: 0,
                median,
                p10,
                p90,
                mean,
                neg_share,
                veto,
                sample_size,
            }
        })
        .collect();

    // (veto_asc, median_desc, p10_desc, mean_desc, label_asc)
    stats.sort_by(|a, b| {
        a.veto
            .cmp(&b.veto)
            .then(b.median.partial_cmp(&a.median).unwrap())
            .then(b.p10.partial_cmp(&a.p10).unwrap())
            .then(b.mean.partial_cmp(&a.mean).unwrap())
            .then(a.label.cmp(&b.label))
    });

    for (i, s) in stats.iter_mut().enumerate() {
        s.rank = (i + 1) as u32;
    }

    let mut ballot_ids: Vec<&str> = ballots.iter().map(|b| b.ballot_id.as_str()).collect();
    ballot_ids.sort_unstable();
    let joined = ballot_ids.join("\n");
    let inputs_hash = hex::encode(Sha256::digest(joined.as_bytes()));

    Snapshot {
        rankings: stats,
        inputs_hash,
    }
}
