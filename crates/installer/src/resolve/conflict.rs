//! Mutual-exclusion checks between mods

use crate::catalogue::{ModDescriptor, ModId};

/// First mod in `selected` that conflicts with `candidate`, if any
///
/// A conflict exists when either side lists the other as incompatible.
/// `selected` is checked in iteration order, and an entry with the
/// candidate's own identifier is ignored. This is a pure predicate; refusing
/// the selection is up to the caller.
pub fn find_conflict<'a, I>(candidate: &ModDescriptor, selected: I) -> Option<ModId>
where
    I: IntoIterator<Item = &'a ModDescriptor>,
{
    selected
        .into_iter()
        .filter(|other| other.id != candidate.id)
        .find(|other| candidate.declares_incompatible(&other.id) || other.declares_incompatible(&candidate.id))
        .map(|other| other.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_declared_by_candidate() {
        let x = ModDescriptor::new("X", "X").with_incompatible("y");
        let y = ModDescriptor::new("Y", "Y");
        assert_eq!(find_conflict(&x, [&y]), Some(ModId::from("Y")));
    }

    #[test]
    fn test_conflict_declared_by_selected() {
        let x = ModDescriptor::new("X", "X");
        let y = ModDescriptor::new("Y", "Y").with_incompatible("X");
        assert_eq!(find_conflict(&x, [&y]), Some(ModId::from("Y")));
    }

    #[test]
    fn test_first_conflict_wins() {
        let x = ModDescriptor::new("X", "X").with_incompatible("B").with_incompatible("C");
        let a = ModDescriptor::new("A", "A");
        let b = ModDescriptor::new("B", "B");
        let c = ModDescriptor::new("C", "C");
        assert_eq!(find_conflict(&x, [&a, &c, &b]), Some(ModId::from("C")));
    }

    #[test]
    fn test_no_conflict() {
        let x = ModDescriptor::new("X", "X").with_incompatible("Z");
        let y = ModDescriptor::new("Y", "Y");
        assert_eq!(find_conflict(&x, [&y, &x]), None);
        assert_eq!(find_conflict(&x, std::iter::empty()), None);
    }
}
