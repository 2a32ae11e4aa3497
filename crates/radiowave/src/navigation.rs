use radiowave_proto::protocol::Station;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Next,
    Previous,
}

/// Wrap-around neighbour of `current` in `list`.
///
/// With no current station (or one no longer listed) `Next` starts at the
/// top and `Previous` at the bottom. `None` only for an empty list.
pub fn neighbour(list: &[Station], current: Option<&str>, step: Step) -> Option<Station> {
    let len = list.len();
    if len == 0 {
        return None;
    }
    let position = current.and_then(|id| list.iter().position(|s| s.id == id));
    let index = match (position, step) {
        (Some(i), Step::Next) => (i + 1) % len,
        (Some(i), Step::Previous) => (i + len - 1) % len,
        (None, Step::Next) => 0,
        (None, Step::Previous) => len - 1,
    };
    list.get(index).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(ids: &[&str]) -> Vec<Station> {
        ids.iter()
            .map(|id| Station {
                id: id.to_string(),
                ..Station::default()
            })
            .collect()
    }

    fn id(station: Option<Station>) -> Option<String> {
        station.map(|s| s.id)
    }

    #[test]
    fn test_wraps_both_ways() {
        let stations = list(&["a", "b", "c"]);
        assert_eq!(id(neighbour(&stations, Some("a"), Step::Next)), Some("b".into()));
        assert_eq!(id(neighbour(&stations, Some("c"), Step::Next)), Some("a".into()));
        assert_eq!(id(neighbour(&stations, Some("a"), Step::Previous)), Some("c".into()));
        assert_eq!(id(neighbour(&stations, Some("b"), Step::Previous)), Some("a".into()));
    }

    #[test]
    fn test_unlisted_current() {
        let stations = list(&["a", "b", "c"]);
        assert_eq!(id(neighbour(&stations, None, Step::Next)), Some("a".into()));
        assert_eq!(id(neighbour(&stations, Some("zz"), Step::Previous)), Some("c".into()));
    }

    #[test]
    fn test_empty_and_single() {
        assert_eq!(neighbour(&[], Some("a"), Step::Next), None);
        let one = list(&["a"]);
        assert_eq!(id(neighbour(&one, Some("a"), Step::Next)), Some("a".into()));
    }
}
