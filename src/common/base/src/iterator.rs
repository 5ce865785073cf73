/// TryIterator is a fallible, forward-only iterator. `Ok(None)` marks a clean end.
pub trait TryIterator {
    type Item;
    fn try_next(&mut self) -> anyhow::Result<Option<Self::Item>>;
}

/// Drains `itr` into a vector, stopping at the first error.
pub fn try_collect<I: TryIterator>(itr: &mut I) -> anyhow::Result<Vec<I::Item>> {
    let mut items = Vec::new();
    while let Some(item) = itr.try_next()? {
        items.push(item);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use crate::iterator::{try_collect, TryIterator};

    struct Countdown(u32);

    impl TryIterator for Countdown {
        type Item = u32;

        fn try_next(&mut self) -> anyhow::Result<Option<Self::Item>> {
            if self.0 == 0 {
                return Ok(None);
            }
            if self.0 == 99 {
                return Err(anyhow!("bad countdown"));
            }
            self.0 -= 1;
            Ok(Some(self.0))
        }
    }

    #[test]
    fn test_try_collect() {
        let items = try_collect(&mut Countdown(3)).unwrap();
        assert_eq!(items, vec![2, 1, 0]);

        assert!(try_collect(&mut Countdown(99)).is_err());
    }
}
