pub mod geo;
pub mod time;

pub use geo::*;
pub use time::*;

/// Splits a result set into pages the way every listing endpoint does.
pub fn paginate<T>(mut items: Vec<T>, count: usize, start_page: usize) -> Vec<T> {
    let begin = count.saturating_mul(start_page);
    if begin >= items.len() {
        return Vec::new();
    }
    let end = begin.saturating_add(count).min(items.len());
    items.drain(..begin);
    items.truncate(end - begin);
    items
}

#[test]
fn paginate_test() {
    let items: Vec<u32> = (0..10).collect();
    assert_eq!(paginate(items.clone(), 3, 0), vec![0, 1, 2]);
    assert_eq!(paginate(items.clone(), 3, 2), vec![6, 7, 8]);
    assert_eq!(paginate(items.clone(), 3, 3), vec![9]);
    assert!(paginate(items, 3, 4).is_empty());
}
