//! Duplicate detection and renumbering.
//!
//! Occurrences are clustered greedily in document order: each one joins the
//! first existing cluster whose representative (first member) it matches,
//! otherwise it starts a new cluster. This is first-match, not best-match,
//! and is order dependent. Clusters are then numbered 1..K by the position of
//! their first member. Only the representative keeps its number in the
//! annotated document; every other member is struck as a duplicate.

use crate::model::CitationOccurrence;
use serde::Serialize;
use std::collections::BTreeMap;

/// Scores within this distance below the threshold still match, so that a
/// score of exactly the threshold is not lost to float rounding.
const MATCH_EPSILON: f64 = 1e-9;

/// Normalized edit similarity of two contexts in [0, 1], ignoring case and
/// whitespace runs. An empty context is never similar to anything.
pub fn context_similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(&a, &b)
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A set of occurrences judged to cite the same source. Members are indices
/// into the occurrence list, in document order.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ReferenceCluster {
    pub members: Vec<usize>,
    pub canonical_number: u32,
}

impl ReferenceCluster {
    pub fn representative(&self) -> usize {
        self.members[0]
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Disposition {
    Kept {
        new_number: u32,
    },
    Duplicate {
        duplicate_of: u32,
        /// Similarity to the cluster representative.
        similarity: f64,
    },
}

impl Disposition {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Disposition::Duplicate { .. })
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MappingEntry {
    pub occurrence: usize,
    pub old_number: u32,
    pub disposition: Disposition,
}

/// What happens to every occurrence, in document order.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct RenumberMapping {
    pub entries: Vec<MappingEntry>,
}

impl RenumberMapping {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, occurrence: usize) -> Option<&MappingEntry> {
        self.entries.iter().find(|e| e.occurrence == occurrence)
    }

    pub fn kept(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.iter().filter(|e| !e.disposition.is_duplicate())
    }

    pub fn duplicates(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.iter().filter(|e| e.disposition.is_duplicate())
    }

    /// Every disposition a printed numeral received. A numeral reused for two
    /// different sources shows up with two `Kept` entries.
    pub fn by_old_number(&self) -> BTreeMap<u32, Vec<Disposition>> {
        let mut out: BTreeMap<u32, Vec<Disposition>> = BTreeMap::new();
        for entry in &self.entries {
            out.entry(entry.old_number)
                .or_default()
                .push(entry.disposition);
        }
        out
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AnnotationAction {
    /// Show the old number struck through, followed by the new one.
    Renumber { old: u32, new: u32 },
    /// Strike the old number; nothing replaces it.
    Strike { old: u32, duplicate_of: u32 },
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationStep {
    pub occurrence: usize,
    pub action: AnnotationAction,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationPlan {
    pub steps: Vec<AnnotationStep>,
}

impl AnnotationPlan {
    pub fn from_mapping(mapping: &RenumberMapping) -> AnnotationPlan {
        let steps = mapping
            .entries
            .iter()
            .map(|entry| AnnotationStep {
                occurrence: entry.occurrence,
                action: match entry.disposition {
                    Disposition::Kept { new_number } => AnnotationAction::Renumber {
                        old: entry.old_number,
                        new: new_number,
                    },
                    Disposition::Duplicate { duplicate_of, .. } => AnnotationAction::Strike {
                        old: entry.old_number,
                        duplicate_of,
                    },
                },
            })
            .collect();
        AnnotationPlan { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub clusters: Vec<ReferenceCluster>,
    pub mapping: RenumberMapping,
}

impl Resolution {
    pub fn plan(&self) -> AnnotationPlan {
        AnnotationPlan::from_mapping(&self.mapping)
    }
}

pub struct Resolver {
    threshold: f64,
}

impl Resolver {
    pub fn new(threshold: f64) -> Resolver {
        Resolver { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_match(&self, score: f64) -> bool {
        score + MATCH_EPSILON >= self.threshold
    }

    pub fn resolve(&self, occurrences: &[CitationOccurrence]) -> Resolution {
        let mut order: Vec<usize> = (0..occurrences.len()).collect();
        order.sort_by_key(|&i| occurrences[i].position);

        // (members, similarity of each member to the representative)
        let mut clusters: Vec<(Vec<usize>, Vec<f64>)> = Vec::new();
        for &i in &order {
            let context = &occurrences[i].context_text;
            let hit = clusters.iter().enumerate().find_map(|(c, (members, _))| {
                let score = context_similarity(context, &occurrences[members[0]].context_text);
                self.is_match(score).then_some((c, score))
            });
            match hit {
                Some((c, score)) => {
                    clusters[c].0.push(i);
                    clusters[c].1.push(score);
                }
                None => clusters.push((vec![i], vec![1.0])),
            }
        }

        clusters.sort_by_key(|(members, _)| occurrences[members[0]].position);

        let mut dispositions: BTreeMap<usize, Disposition> = BTreeMap::new();
        let mut out = Vec::with_capacity(clusters.len());
        for (n, (members, scores)) in clusters.into_iter().enumerate() {
            let canonical_number = n as u32 + 1;
            for (k, (&member, &similarity)) in members.iter().zip(scores.iter()).enumerate() {
                let disposition = if k == 0 {
                    Disposition::Kept {
                        new_number: canonical_number,
                    }
                } else {
                    Disposition::Duplicate {
                        duplicate_of: canonical_number,
                        similarity,
                    }
                };
                dispositions.insert(member, disposition);
            }
            out.push(ReferenceCluster {
                members,
                canonical_number,
            });
        }

        let entries = order
            .iter()
            .filter_map(|&i| {
                dispositions.get(&i).map(|&disposition| MappingEntry {
                    occurrence: i,
                    old_number: occurrences[i].old_number,
                    disposition,
                })
            })
            .collect();

        Resolution {
            clusters: out,
            mapping: RenumberMapping { entries },
        }
    }
}
