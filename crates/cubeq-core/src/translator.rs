//! Compact, order-preserving binary keys for paths.
//!
//! Each dimension gets just enough bits for its largest identifier. Fields
//! are packed from the most significant bit of a `u64` bin downward, and a
//! new bin starts when the next field does not fit. Comparing two
//! [`BinPath`]s word by word therefore orders them exactly like their paths.

use crate::area::Area;
use crate::error::{Error, Result};
use crate::id::Identifier;
use crate::path::Path;

const BIN_BITS: u32 = u64::BITS;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BinPath(Vec<u64>);

#[derive(Debug, Clone, Copy)]
struct Field {
    bin: usize,
    shift: u32,
    max: u32,
}

#[derive(Debug, Clone)]
pub struct PathTranslator {
    fields: Vec<Field>,
    bins: usize,
}

impl PathTranslator {
    pub fn new(max_ids: &[Identifier]) -> Self {
        let mut fields = Vec::with_capacity(max_ids.len());
        let mut bin = 0usize;
        let mut used = 0u32;
        for max in max_ids {
            let bits = BIN_BITS - (u64::from(max.get()) + 2).leading_zeros();
            if used + bits > BIN_BITS {
                bin += 1;
                used = 0;
            }
            used += bits;
            fields.push(Field {
                bin,
                shift: BIN_BITS - used,
                max: max.get(),
            });
        }
        let bins = if fields.is_empty() { 0 } else { bin + 1 };
        Self { fields, bins }
    }

    pub fn for_area(area: &Area) -> Self {
        Self::new(&area.max_ids())
    }

    pub fn dim_count(&self) -> usize {
        self.fields.len()
    }

    /// Number of `u64` words per key.
    pub fn bin_count(&self) -> usize {
        self.bins
    }

    pub fn path_to_bin(&self, path: &Path) -> Result<BinPath> {
        if path.dim_count() != self.fields.len() {
            return Err(Error::Plan(format!(
                "path {path} has {} dimensions, translator expects {}",
                path.dim_count(),
                self.fields.len()
            )));
        }
        let mut words = vec![0u64; self.bins];
        for (d, (field, id)) in self.fields.iter().zip(path.iter()).enumerate() {
            if id.get() > field.max {
                return Err(Error::Plan(format!(
                    "identifier {} in dimension {d} exceeds translator maximum {}",
                    id.get(),
                    field.max
                )));
            }
            words[field.bin] |= u64::from(id.get()) << field.shift;
        }
        Ok(BinPath(words))
    }

    pub fn bin_to_path(&self, bin: &BinPath) -> Path {
        self.fields
            .iter()
            .map(|field| {
                let mask = mask_for(field.max);
                Identifier::new(((bin.0[field.bin] >> field.shift) & mask) as u32)
            })
            .collect::<Vec<_>>()
            .into()
    }
}

fn mask_for(max: u32) -> u64 {
    let bits = BIN_BITS - (u64::from(max) + 2).leading_zeros();
    if bits >= BIN_BITS {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use proptest::prelude::*;

    #[test]
    fn packs_small_dims_into_one_bin() {
        let t = PathTranslator::new(&[Identifier::new(5), Identifier::new(300)]);
        assert_eq!(t.bin_count(), 1);
        let b = t.path_to_bin(&path![3, 299]).unwrap();
        assert_eq!(t.bin_to_path(&b), path![3, 299]);
    }

    #[test]
    fn wide_dims_spill_into_new_bins() {
        let max = Identifier::new(u32::MAX - 2);
        let t = PathTranslator::new(&[max, max, max]);
        assert_eq!(t.bin_count(), 2);
        let p = path![u32::MAX - 2, 0, 17];
        assert_eq!(t.bin_to_path(&t.path_to_bin(&p).unwrap()), p);
    }

    #[test]
    fn rejects_out_of_range_ids() {
        let t = PathTranslator::new(&[Identifier::new(4)]);
        assert!(t.path_to_bin(&path![5]).is_err());
        assert!(t.path_to_bin(&path![1, 1]).is_err());
    }

    proptest! {
        #[test]
        fn prop_bin_order_matches_path_order(
            maxes in prop::collection::vec(0u32..100_000, 1..6),
            seed_a in prop::collection::vec(any::<u32>(), 6),
            seed_b in prop::collection::vec(any::<u32>(), 6),
        ) {
            let max_ids: Vec<Identifier> = maxes.iter().copied().map(Identifier::new).collect();
            let t = PathTranslator::new(&max_ids);
            let a = Path::from_raw(&maxes.iter().zip(&seed_a).map(|(m, s)| s % (m + 1)).collect::<Vec<_>>());
            let b = Path::from_raw(&maxes.iter().zip(&seed_b).map(|(m, s)| s % (m + 1)).collect::<Vec<_>>());
            let (ba, bb) = (t.path_to_bin(&a).unwrap(), t.path_to_bin(&b).unwrap());
            prop_assert_eq!(a.cmp(&b), ba.cmp(&bb));
            prop_assert_eq!(t.bin_to_path(&ba), a);
        }
    }
}
