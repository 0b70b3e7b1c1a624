//! Character-level diff between raw reference and sample text
//!
//! Used when reviewing history: it shows which characters of the sample
//! disagree with the reference, before normalization.

use serde::Serialize;
use std::ops::Range;

/// Kind of a diff segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffTag {
    Equal,
    Replace,
    Delete,
    Insert,
}

/// A run of characters with the same diff tag.
///
/// Ranges are character indices into the left (`a`) and right (`b`) input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffSegment {
    pub tag: DiffTag,
    pub a_range: Range<usize>,
    pub b_range: Range<usize>,
    pub a_text: String,
    pub b_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Keep,
    Drop,
    Add,
}

/// Diff two strings by longest common subsequence over characters.
///
/// Consecutive deletions and insertions between two equal runs are merged
/// into a single `Replace` segment.
pub fn diff(a: &str, b: &str) -> Vec<DiffSegment> {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let steps = edit_script(&a_chars, &b_chars);

    let mut segments = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    let mut idx = 0;

    while idx < steps.len() {
        let (start_i, start_j) = (i, j);

        if steps[idx] == Step::Keep {
            while idx < steps.len() && steps[idx] == Step::Keep {
                i += 1;
                j += 1;
                idx += 1;
            }
            segments.push(segment(DiffTag::Equal, &a_chars, start_i..i, &b_chars, start_j..j));
            continue;
        }

        while idx < steps.len() && steps[idx] != Step::Keep {
            match steps[idx] {
                Step::Drop => i += 1,
                Step::Add => j += 1,
                Step::Keep => unreachable!(),
            }
            idx += 1;
        }

        let tag = match (i > start_i, j > start_j) {
            (true, true) => DiffTag::Replace,
            (true, false) => DiffTag::Delete,
            _ => DiffTag::Insert,
        };
        segments.push(segment(tag, &a_chars, start_i..i, &b_chars, start_j..j));
    }

    segments
}

/// Render a diff as a single line, marking removed text as `[-x-]` and
/// added text as `{+y+}`.
pub fn render_inline(segments: &[DiffSegment]) -> String {
    let mut out = String::new();
    for seg in segments {
        match seg.tag {
            DiffTag::Equal => out.push_str(&seg.a_text),
            DiffTag::Replace => {
                out.push_str(&format!("[-{}-]{{+{}+}}", seg.a_text, seg.b_text));
            }
            DiffTag::Delete => out.push_str(&format!("[-{}-]", seg.a_text)),
            DiffTag::Insert => out.push_str(&format!("{{+{}+}}", seg.b_text)),
        }
    }
    out
}

fn segment(
    tag: DiffTag,
    a: &[char],
    a_range: Range<usize>,
    b: &[char],
    b_range: Range<usize>,
) -> DiffSegment {
    DiffSegment {
        tag,
        a_text: a[a_range.clone()].iter().collect(),
        b_text: b[b_range.clone()].iter().collect(),
        a_range,
        b_range,
    }
}

/// Largest LCS table, in cells, built for one diff. Beyond it the differing
/// middle of the inputs is reported as a single replacement.
const MAX_LCS_CELLS: usize = 1 << 20;

fn edit_script(a: &[char], b: &[char]) -> Vec<Step> {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let mut steps = Vec::with_capacity(a.len() + b.len());
    steps.extend(std::iter::repeat(Step::Keep).take(prefix));
    steps.extend(middle_script(
        &a[prefix..a.len() - suffix],
        &b[prefix..b.len() - suffix],
    ));
    steps.extend(std::iter::repeat(Step::Keep).take(suffix));
    steps
}

fn middle_script(a: &[char], b: &[char]) -> Vec<Step> {
    let (n, m) = (a.len(), b.len());

    if (n + 1).saturating_mul(m + 1) > MAX_LCS_CELLS {
        let mut steps = vec![Step::Drop; n];
        steps.extend(std::iter::repeat(Step::Add).take(m));
        return steps;
    }

    // lcs[i][j] = LCS length of a[i..] and b[j..]
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut steps = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            steps.push(Step::Keep);
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            steps.push(Step::Drop);
            i += 1;
        } else {
            steps.push(Step::Add);
            j += 1;
        }
    }
    steps.extend(std::iter::repeat(Step::Drop).take(n - i));
    steps.extend(std::iter::repeat(Step::Add).take(m - j));

    steps
}
