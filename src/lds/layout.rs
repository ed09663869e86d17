use super::LdsSymbol;
use crate::{Result, error::overflow_error};
use alloc::{format, vec::Vec};
use core::cmp::Reverse;

/// Rounds `value` up to a multiple of `align`, a power of two.
#[inline]
pub fn align_up(value: u64, align: u64) -> Option<u64> {
    debug_assert!(align.is_power_of_two());
    Some(value.checked_add(align - 1)? & !(align - 1))
}

/// Assigns an offset to every symbol, starting at `base`.
///
/// Symbols are placed by descending alignment, which keeps padding small.
/// Symbols with the same alignment keep their relative order. The slice
/// itself is not reordered. Returns the end of the last symbol, or `base`
/// if there is none.
pub fn layout(symbols: &mut [LdsSymbol], base: u64) -> Result<u64> {
    let mut order: Vec<usize> = (0..symbols.len()).collect();
    order.sort_by_key(|&idx| Reverse(symbols[idx].align));

    let mut size = base;
    for idx in order {
        let symbol = &mut symbols[idx];
        let offset = align_up(size, symbol.align)
            .ok_or_else(|| overflow_error(format!("LDS symbol {}", symbol.name)))?;
        size = offset
            .checked_add(symbol.size)
            .ok_or_else(|| overflow_error(format!("LDS symbol {}", symbol.name)))?;
        symbol.set_offset(offset);
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lds::Owner;
    use alloc::vec;

    fn sym(name: &str, size: u64, align: u64) -> LdsSymbol {
        LdsSymbol::new(name, size, align, Owner::Part(0))
    }

    fn assert_disjoint(symbols: &[LdsSymbol]) {
        for (i, a) in symbols.iter().enumerate() {
            assert_eq!(a.offset() % a.align(), 0, "{} misaligned", a.name());
            for b in &symbols[i + 1..] {
                let apart = a.offset() + a.size() <= b.offset() || b.offset() + b.size() <= a.offset();
                assert!(apart || a.size() == 0 || b.size() == 0, "{} overlaps {}", a.name(), b.name());
            }
        }
    }

    #[test]
    fn descending_alignment() {
        let mut symbols = vec![sym("a", 4, 4), sym("b", 16, 16), sym("c", 2, 2), sym("d", 8, 16)];
        let size = layout(&mut symbols, 0).unwrap();
        assert_eq!(symbols[1].offset(), 0);
        assert_eq!(symbols[3].offset(), 16);
        assert_eq!(symbols[0].offset(), 24);
        assert_eq!(symbols[2].offset(), 28);
        assert_eq!(size, 30);
        assert_disjoint(&symbols);
    }

    #[test]
    fn starts_at_base() {
        let mut shared = vec![LdsSymbol::shared("X", 8, 8)];
        let shared_size = layout(&mut shared, 0).unwrap();
        let mut private = vec![sym("Y", 4, 4)];
        let size = layout(&mut private, shared_size).unwrap();
        assert_eq!(shared[0].offset(), 0);
        assert_eq!(private[0].offset(), 8);
        assert_eq!(size, 12);

        assert_eq!(layout(&mut [], 20).unwrap(), 20);
        let mut late = vec![sym("z", 1, 64)];
        assert_eq!(layout(&mut late, 20).unwrap(), 65);
        assert_eq!(late[0].offset(), 64);
    }

    #[test]
    fn deterministic() {
        let input: Vec<LdsSymbol> = (0..32u64)
            .map(|i| sym("s", (i * 7) % 13 + 1, 1 << (i % 5)))
            .collect();
        let mut first = input.clone();
        let mut second = input;
        assert_eq!(layout(&mut first, 4).unwrap(), layout(&mut second, 4).unwrap());
        assert_eq!(first, second);
        assert_disjoint(&first);
    }

    #[test]
    fn overflow() {
        let mut symbols = vec![sym("big", u64::MAX - 2, 1), sym("more", 8, 1)];
        assert!(matches!(
            layout(&mut symbols, 0),
            Err(crate::Error::SizeOverflow { .. })
        ));
        assert_eq!(align_up(u64::MAX, 4), None);
        assert_eq!(align_up(13, 8), Some(16));
    }
}
