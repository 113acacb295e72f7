use std::collections::HashSet;

/// Items of `other` that `baseline` lacks, in `other`'s order.
pub fn difference(baseline: &[String], other: &[String]) -> Vec<String> {
    let known: HashSet<&str> = baseline.iter().map(String::as_str).collect();
    other
        .iter()
        .filter(|item| !known.contains(item.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn items(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn keeps_order_of_the_compared_list() {
        let baseline = items(&["b", "d"]);
        let other = items(&["e", "d", "a", "b", "c"]);
        assert_eq!(difference(&baseline, &other), items(&["e", "a", "c"]));
    }

    #[test]
    fn empty_baseline_keeps_everything() {
        let other = items(&["x", "y"]);
        assert_eq!(difference(&[], &other), other);
    }

    #[test]
    fn identical_lists_have_no_difference() {
        let both = items(&["x", "y"]);
        assert!(difference(&both, &both).is_empty());
    }
}
