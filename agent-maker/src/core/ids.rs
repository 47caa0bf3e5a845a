//! Random identifiers for plan items and runs.

use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};

const PLAN_ITEM_ID_LEN: usize = 12;
const RUN_SUFFIX_LEN: usize = 8;

/// Random lowercase alphanumeric string of `len` characters.
pub fn random_id(len: usize) -> String {
    let mut rng = rand::thread_rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(len)
        .collect::<String>()
        .to_lowercase()
}

pub fn plan_item_id() -> String {
    random_id(PLAN_ITEM_ID_LEN)
}

/// Run id of the form `run-<YYYYmmdd_HHMMSS>-<suffix>`.
pub fn run_id() -> String {
    format!(
        "run-{}-{}",
        Utc::now().format("%Y%m%d_%H%M%S"),
        random_id(RUN_SUFFIX_LEN)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn plan_item_ids_do_not_collide() {
        let ids: HashSet<String> = (0..500).map(|_| plan_item_id()).collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn run_id_has_prefix_and_suffix() {
        let id = run_id();
        assert!(id.starts_with("run-"));
        let suffix = id.rsplit('-').next().expect("suffix");
        assert_eq!(suffix.len(), RUN_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
