//! Reference identity for items held in observable collections.
//!
//! Collection combinators key their caches on identity rather than on
//! structural equality: two model handles are "the same item" only when
//! they point at the same allocation.

use std::rc::Rc;

/// A value with a stable identity key.
pub trait Identity {
    /// Key that is equal for two values iff they denote the same item.
    fn identity(&self) -> usize;

    fn same(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl<T: ?Sized> Identity for Rc<T> {
    fn identity(&self) -> usize {
        Rc::as_ptr(self).cast::<()>() as usize
    }
}

/// Compare two optional items by identity.
pub fn same_option<T: Identity>(a: &Option<T>, b: &Option<T>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.same(b),
        (None, None) => true,
        _ => false,
    }
}

/// Order-independent comparison of two item lists by identity.
pub fn shallow_set_eq<T: Identity>(a: &[T], b: &[T]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut left: Vec<usize> = a.iter().map(Identity::identity).collect();
    let mut right: Vec<usize> = b.iter().map(Identity::identity).collect();
    left.sort_unstable();
    right.sort_unstable();
    left == right
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rc_identity_is_pointer_identity() {
        let a = Rc::new(5);
        let b = Rc::new(5);
        assert!(a.same(&Rc::clone(&a)));
        assert!(!a.same(&b));
    }

    #[test]
    fn shallow_set_eq_ignores_order() {
        let a = Rc::new("a");
        let b = Rc::new("b");
        let first = vec![Rc::clone(&a), Rc::clone(&b)];
        let second = vec![Rc::clone(&b), Rc::clone(&a)];
        assert!(shallow_set_eq(&first, &second));
    }

    #[test]
    fn shallow_set_eq_uses_identity_not_value() {
        let first = vec![Rc::new("a")];
        let second = vec![Rc::new("a")];
        assert!(!shallow_set_eq(&first, &second));
        assert!(!shallow_set_eq(&first, &[]));
    }

    #[test]
    fn same_option_cases() {
        let a = Rc::new(1);
        assert!(same_option::<Rc<i32>>(&None, &None));
        assert!(same_option(&Some(Rc::clone(&a)), &Some(Rc::clone(&a))));
        assert!(!same_option(&Some(Rc::clone(&a)), &None));
        assert!(!same_option(&Some(a), &Some(Rc::new(1))));
    }
}
