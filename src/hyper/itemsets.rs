//! Apriori frequent-itemset mining over the columns of a binary matrix.
//!
//! A row is a transaction and a column an item. An itemset is frequent when the
//! fraction of rows containing all of its columns is at least `min_support`.

use std::collections::HashSet;

use nalgebra_sparse::CscMatrix;

use crate::sparse::ActiveIndices;

/// A frequent itemset together with the sorted rows that contain it.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequentItemset {
    pub items: Vec<usize>,
    pub rows: Vec<usize>,
}

impl FrequentItemset {
    pub fn support(&self, n_rows: usize) -> f64 {
        self.rows.len() as f64 / n_rows.max(1) as f64
    }
}

fn intersect_sorted(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Mine all frequent itemsets, level by level.
///
/// Output is grouped by size and lexicographically ordered within a size, which
/// keeps every downstream tie-break deterministic. `max_len` bounds the size of
/// mined itemsets.
pub fn apriori(x: &CscMatrix<f64>, min_support: f64, max_len: Option<usize>) -> Vec<FrequentItemset> {
    let m = x.nrows();
    let is_frequent = |rows: &[usize]| m > 0 && rows.len() as f64 / m as f64 >= min_support;

    let mut level: Vec<FrequentItemset> = (0..x.lanes())
        .map(|c| FrequentItemset {
            items: vec![c],
            rows: x.active_indices(c),
        })
        .filter(|set| is_frequent(&set.rows))
        .collect();

    let mut result = Vec::new();
    let mut size = 1;
    while !level.is_empty() {
        result.extend(level.iter().cloned());
        if max_len.is_some_and(|max| size >= max) {
            break;
        }

        let known: HashSet<&[usize]> = level.iter().map(|set| set.items.as_slice()).collect();
        let mut next = Vec::new();
        for (a_idx, a) in level.iter().enumerate() {
            for b in &level[a_idx + 1..] {
                // join only itemsets sharing everything but the last item
                if a.items[..size - 1] != b.items[..size - 1] {
                    break;
                }
                let mut items = a.items.clone();
                items.push(b.items[size - 1]);

                let all_subsets_frequent = (0..items.len() - 2).all(|skip| {
                    let subset: Vec<usize> = items
                        .iter()
                        .enumerate()
                        .filter(|&(i, _)| i != skip)
                        .map(|(_, &c)| c)
                        .collect();
                    known.contains(subset.as_slice())
                });
                if !all_subsets_frequent {
                    continue;
                }

                let rows = intersect_sorted(&a.rows, &b.rows);
                if is_frequent(&rows) {
                    next.push(FrequentItemset { items, rows });
                }
            }
        }
        level = next;
        size += 1;
    }
    result
}
