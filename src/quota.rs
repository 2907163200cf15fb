//! Reparto de variantes sintéticas por categoría.
//!
//! Cada documento produce su original más `minimum` variantes; si con eso la
//! categoría no llega al objetivo, lo que falta se reparte a partes iguales y
//! el resto recae en documentos elegidos al azar, sin repetición.

use std::collections::HashMap;
use std::hash::Hash;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Plan de variantes para el lote de una categoría.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaPlan<K: Eq + Hash> {
    pub quotas: HashMap<K, usize>,
    pub minimum: usize,
    /// Variantes añadidas a todos por encima del mínimo.
    pub base_add: usize,
    /// Documentos que reciben una variante extra.
    pub remainder: usize,
}

impl<K: Eq + Hash> QuotaPlan<K> {
    pub fn quota(&self, key: &K) -> usize {
        self.quotas.get(key).copied().unwrap_or(self.minimum)
    }

    pub fn total_variants(&self) -> usize {
        self.quotas.values().sum()
    }

    /// Originales más variantes.
    pub fn projected_total(&self) -> usize {
        self.quotas.len() + self.total_variants()
    }
}

/// Calcula la cuota de cada documento del lote.
pub fn allocate<K, R>(files: &[K], minimum: usize, target: usize, rng: &mut R) -> QuotaPlan<K>
where
    K: Clone + Eq + Hash,
    R: Rng + ?Sized,
{
    let n = files.len();
    let mut quotas: HashMap<K, usize> = files.iter().map(|f| (f.clone(), minimum)).collect();

    let baseline = n * (1 + minimum);
    let missing = target.saturating_sub(baseline);
    if n == 0 || missing == 0 {
        return QuotaPlan {
            quotas,
            minimum,
            base_add: 0,
            remainder: 0,
        };
    }

    let base_add = missing / n;
    let remainder = missing % n;
    for quota in quotas.values_mut() {
        *quota += base_add;
    }
    for index in rand::seq::index::sample(rng, n, remainder) {
        if let Some(quota) = quotas.get_mut(&files[index]) {
            *quota += 1;
        }
    }

    QuotaPlan {
        quotas,
        minimum,
        base_add,
        remainder,
    }
}

/// Objetivo efectivo por categoría: `0` significa "igualar a la categoría más
/// grande"; un objetivo menor que esa categoría se eleva a
/// `mayor × (1 + minimum)`.
pub fn effective_target(configured: usize, largest_category: usize, minimum: usize) -> usize {
    let target = if configured > 0 {
        configured
    } else {
        largest_category
    };
    if target < largest_category {
        largest_category + largest_category * minimum
    } else {
        target
    }
}

/// Generador para el reparto del resto: fijo si se da semilla, aleatorio si no.
pub fn quota_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("cat/f{i}.txt")).collect()
    }

    fn expected_sum(n: usize, m: usize, t: usize) -> usize {
        if t <= n * (1 + m) {
            n * m
        } else {
            n * m + (t - n * (1 + m))
        }
    }

    #[test]
    fn even_split_reaches_target_exactly() {
        let files = files(10);
        let plan = allocate(&files, 1, 60, &mut quota_rng(None));
        assert_eq!(plan.base_add, 4);
        assert_eq!(plan.remainder, 0);
        assert!(plan.quotas.values().all(|q| *q == 5));
        assert_eq!(plan.total_variants(), 50);
        assert_eq!(plan.projected_total(), 60);
    }

    #[test]
    fn sum_and_floor_hold_across_inputs() {
        let mut rng = quota_rng(None);
        for n in 1..12 {
            for m in 0..3 {
                for t in [0, 1, n, n * 2, n * 3 + 1, 37, 60, 101] {
                    let files = files(n);
                    let plan = allocate(&files, m, t, &mut rng);
                    assert_eq!(plan.total_variants(), expected_sum(n, m, t), "n={n} m={m} t={t}");
                    assert!(plan.quotas.values().all(|q| *q >= m));
                    assert_eq!(plan.quotas.len(), n);
                }
            }
        }
    }

    #[test]
    fn remainder_goes_to_distinct_documents() {
        let files = files(7);
        // baseline 14, missing 26 -> base_add 3, remainder 5
        let plan = allocate(&files, 1, 40, &mut quota_rng(None));
        assert_eq!((plan.base_add, plan.remainder), (3, 5));
        let boosted = plan.quotas.values().filter(|q| **q == 1 + 3 + 1).count();
        let plain = plan.quotas.values().filter(|q| **q == 1 + 3).count();
        assert_eq!(boosted, 5);
        assert_eq!(plain, 2);
        assert_eq!(plan.projected_total(), 40);
    }

    #[test]
    fn seeded_selection_is_reproducible() {
        let files = files(9);
        let a = allocate(&files, 1, 31, &mut quota_rng(Some(7)));
        let b = allocate(&files, 1, 31, &mut quota_rng(Some(7)));
        assert_eq!(a, b);
    }

    #[test]
    fn target_already_met_keeps_minimum() {
        let files = files(30);
        let plan = allocate(&files, 2, 60, &mut quota_rng(None));
        assert!(plan.quotas.values().all(|q| *q == 2));
        assert_eq!(plan.total_variants(), 60);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let plan = allocate::<String, _>(&[], 1, 60, &mut quota_rng(None));
        assert!(plan.quotas.is_empty());
        assert_eq!(plan.total_variants(), 0);
    }

    #[test]
    fn effective_target_rules() {
        assert_eq!(effective_target(60, 12, 1), 60);
        assert_eq!(effective_target(0, 12, 1), 12);
        assert_eq!(effective_target(10, 12, 1), 24);
        assert_eq!(effective_target(10, 12, 0), 12);
    }
}
