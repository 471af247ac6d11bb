use std::collections::HashMap;

use crate::models::Record;

/// Fold `fresh` into `prior`, keeping exactly one row per id.
///
/// The survivor of a duplicate pair is the row with the greater
/// `created_utc`; on an exact tie the later-arriving copy wins, and since
/// fresh rows are folded in after prior ones, a tie always keeps the newly
/// fetched row. First-seen order is preserved so rewritten files diff
/// cleanly.
pub fn merge<T: Record>(prior: Vec<T>, fresh: Vec<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(prior.len() + fresh.len());
    let mut slots: HashMap<String, usize> = HashMap::new();
    for row in prior.into_iter().chain(fresh) {
        match slots.get(row.id()) {
            Some(&i) => {
                if out[i].created_utc() <= row.created_utc() {
                    out[i] = row;
                }
            }
            None => {
                slots.insert(row.id().to_string(), out.len());
                out.push(row);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PostRow;
    use crate::times;

    fn row(id: &str, epoch: i64, score: i64) -> PostRow {
        let (created_utc, created_central) = times::normalize(epoch).unwrap();
        PostRow {
            id: id.to_string(),
            title: format!("title {id}"),
            subreddit: "pickleball".to_string(),
            selftext: None,
            score,
            author: Some("someone".to_string()),
            num_comments: 0,
            url: format!("https://reddit.com/{id}"),
            created_utc,
            created_central,
        }
    }

    #[test]
    fn distinct_ids_all_survive_unchanged() {
        let prior = vec![row("a", 100, 1)];
        let fresh = vec![row("b", 200, 2)];
        let merged = merge(prior.clone(), fresh.clone());
        assert_eq!(merged, vec![prior[0].clone(), fresh[0].clone()]);
    }

    #[test]
    fn merging_with_itself_is_idempotent() {
        let rows = vec![row("a", 100, 1), row("b", 200, 2), row("c", 300, 3)];
        let merged = merge(rows.clone(), rows.clone());
        assert_eq!(merged, rows);
    }

    #[test]
    fn one_row_per_id() {
        let prior = vec![row("a", 100, 1), row("b", 200, 2)];
        let fresh = vec![row("b", 250, 5), row("c", 300, 3), row("a", 90, 9)];
        let merged = merge(prior, fresh);
        let mut ids: Vec<&str> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn greater_creation_instant_wins() {
        let merged = merge(vec![row("a", 100, 1)], vec![row("a", 200, 2)]);
        assert_eq!(merged, vec![row("a", 200, 2)]);

        // prior copy newer than the fetched one: prior survives
        let merged = merge(vec![row("a", 300, 1)], vec![row("a", 200, 2)]);
        assert_eq!(merged, vec![row("a", 300, 1)]);
    }

    #[test]
    fn equal_instants_keep_the_fresh_copy() {
        let merged = merge(vec![row("a", 100, 1)], vec![row("a", 100, 7)]);
        assert_eq!(merged, vec![row("a", 100, 7)]);
    }

    #[test]
    fn empty_prior_passes_fresh_through() {
        let fresh = vec![row("a", 100, 1), row("b", 200, 2)];
        assert_eq!(merge(vec![], fresh.clone()), fresh);
    }
}
