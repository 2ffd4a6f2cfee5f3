//! Field merge policies used when an aggregate is upserted.

use crate::Usage;

/// How a stored field combines with an incoming value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Merge {
    /// Keep the stored value if set (first writer wins).
    PreserveFirst,
    /// Take the incoming value if set.
    OverwriteLatest,
    /// Take the incoming value only if it is "present" (see [`Presence`]).
    OverwriteIfPresent,
    /// Larger of the two.
    MaxOf,
    /// Smaller of the two.
    MinOf,
    /// Sum of the two (absent counts as nothing).
    SumOf,
}

/// Whether a value carries information worth overwriting with.
pub trait Presence {
    /// `true` for non-empty values.
    fn is_present(&self) -> bool;
}

impl Presence for i64 {
    fn is_present(&self) -> bool {
        *self > 0
    }
}

impl Presence for f64 {
    fn is_present(&self) -> bool {
        *self > 0.0
    }
}

impl Presence for String {
    fn is_present(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl<T> Presence for Vec<T> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl Presence for Usage {
    fn is_present(&self) -> bool {
        Usage::is_present(self)
    }
}

impl Presence for serde_json::Value {
    fn is_present(&self) -> bool {
        !self.is_null()
    }
}

impl Presence for bool {
    fn is_present(&self) -> bool {
        true
    }
}

/// Numbers a [`Merge::SumOf`] policy can add.
pub trait Accumulate: Copy {
    /// `self + other`, saturating for integers.
    #[must_use]
    fn accumulate(self, other: Self) -> Self;
}

impl Accumulate for i64 {
    fn accumulate(self, other: Self) -> Self {
        self.saturating_add(other)
    }
}

impl Accumulate for f64 {
    fn accumulate(self, other: Self) -> Self {
        self + other
    }
}

impl Merge {
    /// Merge `incoming` into `current` in place.
    ///
    /// `MaxOf`, `MinOf` and `SumOf` need ordering or addition and only fill
    /// an empty field here; use [`Merge::apply_num`] for numbers.
    pub fn apply<T: Presence>(self, current: &mut Option<T>, incoming: Option<T>) {
        match self {
            Self::PreserveFirst => {
                if current.is_none() {
                    *current = incoming;
                }
            }
            Self::OverwriteLatest => {
                if incoming.is_some() {
                    *current = incoming;
                }
            }
            Self::OverwriteIfPresent => {
                if incoming.as_ref().is_some_and(Presence::is_present) {
                    *current = incoming;
                }
            }
            Self::MaxOf | Self::MinOf | Self::SumOf => {
                if current.is_none() {
                    *current = incoming;
                }
            }
        }
    }

    /// Merge a numeric field in place. Falls back to [`Merge::apply`]
    /// semantics for the non-arithmetic policies.
    pub fn apply_num<T>(self, current: &mut Option<T>, incoming: Option<T>)
    where
        T: Presence + PartialOrd + Accumulate,
    {
        let Some(new) = incoming else { return };
        *current = Some(match (self, *current) {
            (_, None) => new,
            (Self::MaxOf, Some(old)) => {
                if new > old { new } else { old }
            }
            (Self::MinOf, Some(old)) => {
                if new < old { new } else { old }
            }
            (Self::SumOf, Some(old)) => old.accumulate(new),
            (Self::PreserveFirst, Some(old)) => old,
            (Self::OverwriteLatest, Some(_)) => new,
            (Self::OverwriteIfPresent, Some(old)) => {
                if new.is_present() { new } else { old }
            }
        });
    }

    /// [`Merge::apply_num`] for a field that always has a value.
    #[must_use]
    pub fn fold_num<T>(self, current: T, incoming: Option<T>) -> T
    where
        T: Presence + PartialOrd + Accumulate,
    {
        let mut slot = Some(current);
        self.apply_num(&mut slot, incoming);
        slot.unwrap_or(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserve_first_keeps_existing() {
        let mut v = Some(1_i64);
        Merge::PreserveFirst.apply(&mut v, Some(2));
        assert_eq!(v, Some(1));

        let mut empty: Option<i64> = None;
        Merge::PreserveFirst.apply(&mut empty, Some(2));
        assert_eq!(empty, Some(2));
    }

    #[test]
    fn overwrite_latest_ignores_none() {
        let mut v = Some("a".to_string());
        Merge::OverwriteLatest.apply(&mut v, None);
        assert_eq!(v.as_deref(), Some("a"));
        Merge::OverwriteLatest.apply(&mut v, Some(String::new()));
        assert_eq!(v.as_deref(), Some(""));
    }

    #[test]
    fn overwrite_if_present_skips_empty_values() {
        let mut count = Some(4_i64);
        Merge::OverwriteIfPresent.apply(&mut count, Some(0));
        assert_eq!(count, Some(4));
        Merge::OverwriteIfPresent.apply(&mut count, Some(9));
        assert_eq!(count, Some(9));

        let mut name = Some("model-a".to_string());
        Merge::OverwriteIfPresent.apply(&mut name, Some("  ".into()));
        assert_eq!(name.as_deref(), Some("model-a"));
    }

    #[test]
    fn numeric_policies() {
        let mut v = Some(5_i64);
        Merge::MaxOf.apply_num(&mut v, Some(3));
        assert_eq!(v, Some(5));
        Merge::MinOf.apply_num(&mut v, Some(3));
        assert_eq!(v, Some(3));
        Merge::SumOf.apply_num(&mut v, Some(4));
        assert_eq!(v, Some(7));
        Merge::SumOf.apply_num(&mut v, None);
        assert_eq!(v, Some(7));

        let mut empty: Option<f64> = None;
        Merge::MinOf.apply_num(&mut empty, Some(1.5));
        assert_eq!(empty, Some(1.5));
    }

    #[test]
    fn fold_num_on_plain_counters() {
        assert_eq!(Merge::MaxOf.fold_num(3_i64, Some(5)), 5);
        assert_eq!(Merge::MaxOf.fold_num(7_i64, Some(5)), 7);
        assert_eq!(Merge::OverwriteIfPresent.fold_num(7_i64, Some(0)), 7);
        assert_eq!(Merge::OverwriteIfPresent.fold_num(7_i64, None), 7);
        assert!((Merge::OverwriteIfPresent.fold_num(1.0_f64, Some(2.5)) - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn integer_sums_saturate() {
        assert_eq!(Merge::SumOf.fold_num(i64::MAX, Some(1)), i64::MAX);
        assert_eq!(Merge::SumOf.fold_num(i64::MIN, Some(-1)), i64::MIN);
    }
}
