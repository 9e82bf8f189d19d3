//! Line diffs between pre-check and post-check device output
//!
//! The pre-check stage usually captures device state before a change and
//! the post-check stage captures it again afterwards. Comparing the two
//! transcripts shows what the change actually did on the device.

use serde::{Deserialize, Serialize};

/// Context lines around each hunk of a unified diff
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Above this many table cells the changed middle is reported as replaced
/// wholesale instead of aligned line by line.
const MAX_LCS_CELLS: usize = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Equal,
    Delete,
    Insert,
}

/// A run of lines: `before[i1..i2]` against `after[j1..j2]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Opcode {
    tag: Tag,
    i1: usize,
    i2: usize,
    j1: usize,
    j2: usize,
}

/// Added and removed line counts between two texts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub additions: usize,
    pub deletions: usize,
    pub total_changes: usize,
}

/// Pre-check versus post-check comparison attached to an execution result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDiff {
    pub stats: DiffStats,

    /// Unified diff text, empty when both sides are identical
    pub unified: String,
}

impl OutputDiff {
    /// Compare two transcripts
    pub fn between(before: &str, after: &str) -> Self {
        let a: Vec<&str> = before.lines().collect();
        let b: Vec<&str> = after.lines().collect();
        let opcodes = opcodes(&a, &b);

        Self {
            stats: stats_of(&opcodes),
            unified: render_unified(
                &a,
                &b,
                &opcodes,
                "pre_check",
                "post_check",
                DEFAULT_CONTEXT_LINES,
            ),
        }
    }

    pub fn has_changes(&self) -> bool {
        self.stats.total_changes > 0
    }
}

/// Count added and removed lines between two texts
pub fn diff_stats(before: &str, after: &str) -> DiffStats {
    let a: Vec<&str> = before.lines().collect();
    let b: Vec<&str> = after.lines().collect();
    stats_of(&opcodes(&a, &b))
}

/// Unified diff of two texts with `context` lines around each hunk
pub fn unified_diff(before: &str, after: &str, from: &str, to: &str, context: usize) -> String {
    let a: Vec<&str> = before.lines().collect();
    let b: Vec<&str> = after.lines().collect();
    render_unified(&a, &b, &opcodes(&a, &b), from, to, context)
}

fn stats_of(opcodes: &[Opcode]) -> DiffStats {
    let (mut additions, mut deletions) = (0, 0);
    for op in opcodes {
        match op.tag {
            Tag::Insert => additions += op.j2 - op.j1,
            Tag::Delete => deletions += op.i2 - op.i1,
            Tag::Equal => {}
        }
    }
    DiffStats {
        additions,
        deletions,
        total_changes: additions + deletions,
    }
}

/// Align two line sequences and describe them as merged runs
fn opcodes(a: &[&str], b: &[&str]) -> Vec<Opcode> {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let mid_a = &a[prefix..a.len() - suffix];
    let mid_b = &b[prefix..b.len() - suffix];

    let mut tags = Vec::with_capacity(a.len() + b.len());
    tags.extend(std::iter::repeat(Tag::Equal).take(prefix));
    tags.extend(align(mid_a, mid_b));
    tags.extend(std::iter::repeat(Tag::Equal).take(suffix));

    let mut codes: Vec<Opcode> = Vec::new();
    let (mut i, mut j) = (0, 0);
    for tag in tags {
        let (di, dj) = match tag {
            Tag::Equal => (1, 1),
            Tag::Delete => (1, 0),
            Tag::Insert => (0, 1),
        };
        match codes.last_mut() {
            Some(last) if last.tag == tag => {
                last.i2 += di;
                last.j2 += dj;
            }
            _ => codes.push(Opcode {
                tag,
                i1: i,
                i2: i + di,
                j1: j,
                j2: j + dj,
            }),
        }
        i += di;
        j += dj;
    }
    codes
}

/// Edit script for the changed middle, deletions before insertions
fn align(a: &[&str], b: &[&str]) -> Vec<Tag> {
    let (n, m) = (a.len(), b.len());
    if n == 0 || m == 0 || (n + 1).saturating_mul(m + 1) > MAX_LCS_CELLS {
        let mut tags = vec![Tag::Delete; n];
        tags.extend(std::iter::repeat(Tag::Insert).take(m));
        return tags;
    }

    // lcs[i * (m + 1) + j] = longest common subsequence of a[i..] and b[j..]
    let width = m + 1;
    let mut lcs = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i * width + j] = if a[i] == b[j] {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }

    let mut tags = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            tags.push(Tag::Equal);
            i += 1;
            j += 1;
        } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
            tags.push(Tag::Delete);
            i += 1;
        } else {
            tags.push(Tag::Insert);
            j += 1;
        }
    }
    tags.extend(std::iter::repeat(Tag::Delete).take(n - i));
    tags.extend(std::iter::repeat(Tag::Insert).take(m - j));
    tags
}

/// Split opcodes into hunks separated by more than `2 * context` equal lines
fn hunks(opcodes: &[Opcode], context: usize) -> Vec<Vec<Opcode>> {
    if opcodes.iter().all(|op| op.tag == Tag::Equal) {
        return Vec::new();
    }

    let mut codes = opcodes.to_vec();
    if let Some(first) = codes.first_mut().filter(|op| op.tag == Tag::Equal) {
        first.i1 = first.i1.max(first.i2.saturating_sub(context));
        first.j1 = first.j1.max(first.j2.saturating_sub(context));
    }
    if let Some(last) = codes.last_mut().filter(|op| op.tag == Tag::Equal) {
        last.i2 = last.i2.min(last.i1 + context);
        last.j2 = last.j2.min(last.j1 + context);
    }

    let mut groups = Vec::new();
    let mut group = Vec::new();
    for mut op in codes {
        if op.tag == Tag::Equal && op.i2 - op.i1 > 2 * context {
            group.push(Opcode {
                i2: op.i2.min(op.i1 + context),
                j2: op.j2.min(op.j1 + context),
                ..op
            });
            groups.push(std::mem::take(&mut group));
            op.i1 = op.i1.max(op.i2.saturating_sub(context));
            op.j1 = op.j1.max(op.j2.saturating_sub(context));
        }
        group.push(op);
    }
    if !(group.is_empty() || (group.len() == 1 && group[0].tag == Tag::Equal)) {
        groups.push(group);
    }
    groups
}

fn range(start: usize, stop: usize) -> String {
    match stop - start {
        1 => format!("{}", start + 1),
        0 => format!("{},0", start),
        length => format!("{},{}", start + 1, length),
    }
}

fn render_unified(
    a: &[&str],
    b: &[&str],
    opcodes: &[Opcode],
    from: &str,
    to: &str,
    context: usize,
) -> String {
    let groups = hunks(opcodes, context);
    if groups.is_empty() {
        return String::new();
    }

    let mut out = format!("--- {}\n+++ {}\n", from, to);
    for group in groups {
        let (first, last) = (group[0], group[group.len() - 1]);
        out.push_str(&format!(
            "@@ -{} +{} @@\n",
            range(first.i1, last.i2),
            range(first.j1, last.j2)
        ));
        for op in group {
            match op.tag {
                Tag::Equal => a[op.i1..op.i2]
                    .iter()
                    .for_each(|line| out.push_str(&format!(" {}\n", line))),
                Tag::Delete => a[op.i1..op.i2]
                    .iter()
                    .for_each(|line| out.push_str(&format!("-{}\n", line))),
                Tag::Insert => b[op.j1..op.j2]
                    .iter()
                    .for_each(|line| out.push_str(&format!("+{}\n", line))),
            }
        }
    }
    out
}
